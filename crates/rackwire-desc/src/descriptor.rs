use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{GraphInstance, Symbol, TemplateStore};

/// Tray/port coordinate on one physical unit.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct PortLoc {
    pub tray: u32,
    pub port: u32,
}

impl PortLoc {
    pub fn new(tray: u32, port: u32) -> Self {
        Self { tray, port }
    }
}

/// Per-device-type layout plus internal (intra-unit) wiring, e.g. torus
/// cabling inside one chassis. Internal connections never go through the
/// template/instance mechanism; they are instantiated once per leaf of the
/// matching device type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub trays: u32,
    pub ports_per_tray: u32,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub internal: BTreeMap<Symbol, Vec<(PortLoc, PortLoc)>>,
}

impl NodeDescriptor {
    pub fn new(trays: u32, ports_per_tray: u32) -> Self {
        Self {
            trays,
            ports_per_tray,
            internal: BTreeMap::new(),
        }
    }

    pub fn with_internal(
        mut self,
        port_type: impl Into<Symbol>,
        pairs: Vec<(PortLoc, PortLoc)>,
    ) -> Self {
        self.internal.insert(port_type.into(), pairs);
        self
    }
}

/// Complete cluster cabling descriptor: templates, their instantiation into
/// the concrete topology, and device-type definitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterDescriptor {
    pub templates: TemplateStore,
    pub root: GraphInstance,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_descriptors: BTreeMap<Symbol, NodeDescriptor>,
}

impl ClusterDescriptor {
    pub fn new(templates: TemplateStore, root: GraphInstance) -> Self {
        Self {
            templates,
            root,
            node_descriptors: BTreeMap::new(),
        }
    }

    pub fn with_node_descriptor(
        mut self,
        device_type: impl Into<Symbol>,
        descriptor: NodeDescriptor,
    ) -> Self {
        self.node_descriptors.insert(device_type.into(), descriptor);
        self
    }

    /// Serialize to canonical (deterministic) JSON. Uses RFC 8785 canonical
    /// JSON format with sorted keys. Empty templates are pruned first; they
    /// must never appear in a serialized descriptor.
    pub fn to_json(&self) -> anyhow::Result<String> {
        let mut out = self.clone();
        let pruned = out.templates.prune_empty();
        if !pruned.is_empty() {
            log::warn!(
                "pruned {} empty template(s) before serialization: {}",
                pruned.len(),
                pruned.join(", ")
            );
        }
        let mut buf = Vec::new();
        let mut ser =
            serde_json::Serializer::with_formatter(&mut buf, canon_json::CanonicalFormatter::new());
        serde::Serialize::serialize(&out, &mut ser)?;
        Ok(String::from_utf8(buf)?)
    }

    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Physical placement of one host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployedHost {
    pub hostname: Symbol,
    pub hall: String,
    pub aisle: String,
    pub rack: String,
    pub shelf_u: u32,
    pub device_type: Symbol,
}

/// Companion descriptor mapping host ids to physical locations.
///
/// Contract with [`ClusterDescriptor`]: `hosts[i]` describes the same
/// physical unit as the leaf whose resolved host id is `i`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentDescriptor {
    pub hosts: Vec<DeployedHost>,
}

impl DeploymentDescriptor {
    pub fn new(hosts: Vec<DeployedHost>) -> Self {
        Self { hosts }
    }

    /// Serialize to canonical (deterministic) JSON.
    pub fn to_json(&self) -> anyhow::Result<String> {
        let mut buf = Vec::new();
        let mut ser =
            serde_json::Serializer::with_formatter(&mut buf, canon_json::CanonicalFormatter::new());
        serde::Serialize::serialize(self, &mut ser)?;
        Ok(String::from_utf8(buf)?)
    }

    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ConnectionDef, HostId, PortDef, Template};

    fn sample() -> ClusterDescriptor {
        let mut templates = TemplateStore::new();
        templates.insert(
            Template::new("rack")
                .with_leaf("switch", "tor40")
                .with_leaf("server", "srv2u")
                .with_connection(
                    "ethernet",
                    ConnectionDef::new(
                        PortDef::new(["switch"], 0, 0),
                        PortDef::new(["server"], 0, 0),
                    ),
                ),
        );
        let root = GraphInstance::new("rack")
            .with_host("switch", HostId(0))
            .with_host("server", HostId(1));
        ClusterDescriptor::new(templates, root).with_node_descriptor(
            "srv2u",
            NodeDescriptor::new(2, 8).with_internal(
                "torus",
                vec![(PortLoc::new(0, 0), PortLoc::new(1, 0))],
            ),
        )
    }

    #[test]
    fn json_roundtrip() {
        let descriptor = sample();
        let json = descriptor.to_json().unwrap();
        let back = ClusterDescriptor::from_json(&json).unwrap();
        assert_eq!(back, descriptor);
    }

    #[test]
    fn to_json_is_deterministic() {
        let descriptor = sample();
        assert_eq!(descriptor.to_json().unwrap(), descriptor.to_json().unwrap());
    }

    #[test]
    fn to_json_prunes_empty_templates() {
        let mut descriptor = sample();
        descriptor.templates.insert(Template::new("ghost"));
        let json = descriptor.to_json().unwrap();
        let back = ClusterDescriptor::from_json(&json).unwrap();
        assert!(!back.templates.contains("ghost"));
        // The in-memory descriptor is untouched.
        assert!(descriptor.templates.contains("ghost"));
    }

    #[test]
    fn deployment_roundtrip() {
        let deployment = DeploymentDescriptor::new(vec![DeployedHost {
            hostname: "sw-a1".into(),
            hall: "h1".into(),
            aisle: "a3".into(),
            rack: "r12".into(),
            shelf_u: 40,
            device_type: "tor40".into(),
        }]);
        let json = deployment.to_json().unwrap();
        assert_eq!(DeploymentDescriptor::from_json(&json).unwrap(), deployment);
    }
}
