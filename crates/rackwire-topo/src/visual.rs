use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use rackwire_desc::{GraphInstance, HostId, Symbol, TemplateStore, TreePath};

use crate::connection::ResolvedConnection;
use crate::traverse::{TreeVisitor, walk};

/// Classifies a visual node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// A physical leaf unit (host).
    Device,
    /// A logical grouping (cluster, superpod, rack group, ...); carries a
    /// template tag in hierarchical graphs.
    Container,
    /// Physical-organization container (rack, tray, port). Never part of the
    /// logical hierarchy; the template builder skips these subtrees
    /// entirely.
    Physical,
}

/// Physical placement attributes a device node may carry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub hall: String,
    pub aisle: String,
    pub rack: String,
    pub shelf_u: u32,
}

/// Flat node record of the visualization boundary format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisualNode {
    pub id: Symbol,
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<Symbol>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_tag: Option<Symbol>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<Symbol>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<Symbol>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl VisualNode {
    pub fn device(id: impl Into<Symbol>, device_type: impl Into<Symbol>) -> Self {
        Self {
            id: id.into(),
            kind: NodeKind::Device,
            parent: None,
            template_tag: None,
            device_type: Some(device_type.into()),
            hostname: None,
            location: None,
        }
    }

    pub fn container(id: impl Into<Symbol>, template_tag: impl Into<Symbol>) -> Self {
        Self {
            id: id.into(),
            kind: NodeKind::Container,
            parent: None,
            template_tag: Some(template_tag.into()),
            device_type: None,
            hostname: None,
            location: None,
        }
    }

    pub fn physical(id: impl Into<Symbol>) -> Self {
        Self {
            id: id.into(),
            kind: NodeKind::Physical,
            parent: None,
            template_tag: None,
            device_type: None,
            hostname: None,
            location: None,
        }
    }

    pub fn with_parent(mut self, parent: impl Into<Symbol>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_hostname(mut self, hostname: impl Into<Symbol>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }
}

/// Flat edge record: one cable between two device nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisualEdge {
    pub source: Symbol,
    pub target: Symbol,
    pub port_type: Symbol,
    pub source_tray: u32,
    pub source_port: u32,
    pub target_tray: u32,
    pub target_port: u32,
}

impl VisualEdge {
    pub fn new(
        source: impl Into<Symbol>,
        target: impl Into<Symbol>,
        port_type: impl Into<Symbol>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            port_type: port_type.into(),
            source_tray: 0,
            source_port: 0,
            target_tray: 0,
            target_port: 0,
        }
    }

    pub fn at(mut self, source_tray: u32, source_port: u32, target_tray: u32, target_port: u32) -> Self {
        self.source_tray = source_tray;
        self.source_port = source_port;
        self.target_tray = target_tray;
        self.target_port = target_port;
        self
    }
}

/// Node-and-edge model consumed by the template builder and produced for the
/// external layout collaborator. Node order in `nodes` is the encounter
/// order all traversals follow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisualGraph {
    pub nodes: Vec<VisualNode>,
    pub edges: Vec<VisualEdge>,
}

impl VisualGraph {
    pub fn new(nodes: Vec<VisualNode>, edges: Vec<VisualEdge>) -> Self {
        Self { nodes, edges }
    }

    pub fn node(&self, id: &str) -> Option<&VisualNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Direct children of `parent` (`None` for top-level nodes), in
    /// encounter order.
    pub fn children_of(&self, parent: Option<&str>) -> Vec<&VisualNode> {
        self.nodes
            .iter()
            .filter(|n| n.parent.as_deref() == parent)
            .collect()
    }

    /// Top-level logical nodes: no parent, not physical.
    pub fn logical_roots(&self) -> Vec<&VisualNode> {
        self.nodes
            .iter()
            .filter(|n| n.parent.is_none() && n.kind != NodeKind::Physical)
            .collect()
    }

    /// True once any node carries a template tag; untagged graphs take the
    /// flat export path instead of the template builder.
    pub fn is_tagged(&self) -> bool {
        self.nodes.iter().any(|n| n.template_tag.is_some())
    }

    /// Hostname of a node, falling back to its id.
    pub fn hostname_of<'a>(&self, node: &'a VisualNode) -> &'a str {
        node.hostname.as_deref().unwrap_or(&node.id)
    }

    /// Render resolver output back into the boundary format: one container
    /// per instance, one device per hierarchy leaf, one edge per resolved
    /// inter-device connection. Node ids are the absolute tree paths (the
    /// root container takes its template's name), so re-exporting this graph
    /// reproduces the same child names. Intra-device connections are not
    /// rendered; they are regenerated from the node descriptors. Positioning
    /// stays with the external layout collaborator.
    pub fn from_resolved(
        store: &TemplateStore,
        root: &GraphInstance,
        connections: &[ResolvedConnection],
    ) -> Self {
        struct Renderer<'a> {
            root_id: &'a str,
            nodes: Vec<VisualNode>,
        }

        impl Renderer<'_> {
            fn parent_id(&self, path: &TreePath) -> Symbol {
                match path.parent() {
                    Some(parent) if !parent.is_empty() => parent.to_string(),
                    _ => self.root_id.to_string(),
                }
            }
        }

        impl TreeVisitor for Renderer<'_> {
            fn on_leaf(
                &mut self,
                path: &TreePath,
                _child_name: &str,
                device_type: &str,
                _host_id: HostId,
                _depth: u32,
            ) {
                let parent = self.parent_id(path);
                self.nodes
                    .push(VisualNode::device(path.to_string(), device_type).with_parent(parent));
            }

            fn on_subgraph(&mut self, path: &TreePath, instance: &GraphInstance, _depth: u32) -> bool {
                if path.is_empty() {
                    self.nodes
                        .push(VisualNode::container(self.root_id, instance.template.clone()));
                } else {
                    let parent = self.parent_id(path);
                    self.nodes.push(
                        VisualNode::container(path.to_string(), instance.template.clone())
                            .with_parent(parent),
                    );
                }
                true
            }
        }

        let mut renderer = Renderer {
            root_id: &root.template,
            nodes: Vec::new(),
        };
        walk(store, root, &mut renderer);

        let edges = connections
            .iter()
            .filter(|c| !c.is_intra_device())
            .map(|c| {
                VisualEdge::new(c.a.path.to_string(), c.b.path.to_string(), c.port_type.clone())
                    .at(c.a.tray, c.a.port, c.b.tray, c.b.port)
            })
            .collect();

        Self {
            nodes: renderer.nodes,
            edges,
        }
    }

    /// Local (template-relative) name of a node: its id with the parent id
    /// prefix stripped, or the full id when ids are not path-shaped.
    pub fn local_name<'a>(&self, node: &'a VisualNode) -> &'a str {
        if let Some(parent) = node.parent.as_deref()
            && let Some(rest) = node.id.strip_prefix(parent)
            && let Some(rest) = rest.strip_prefix('.')
        {
            return rest;
        }
        &node.id
    }

    /// Derived id → node index for graphs too large for linear scans.
    pub fn index(&self) -> HashMap<&str, &VisualNode> {
        self.nodes.iter().map(|n| (n.id.as_str(), n)).collect()
    }
}
