use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use rackwire_desc::{
    GraphInstance, HostId, NodeDescriptor, Symbol, TemplateStore, TreePath,
};

use crate::hierarchy::Hierarchy;
use crate::traverse::{TreeVisitor, walk};

/// Sentinel depth tagging intra-device wiring (cabling internal to one
/// physical unit). Inter-device connections carry plain nesting depths.
pub const INTRA_DEVICE_DEPTH: u32 = u32::MAX;

/// A fully resolved cable endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedPort {
    pub path: TreePath,
    pub host_id: HostId,
    pub tray: u32,
    pub port: u32,
}

/// One intra-template connection instantiated at a specific tree position.
///
/// `depth` is the nesting depth of the instance that declared the owning
/// template (consumers use it to group or color-code by hierarchy level);
/// `template` and `instance_path` identify where the declaration fired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedConnection {
    pub a: ResolvedPort,
    pub b: ResolvedPort,
    pub port_type: Symbol,
    pub depth: u32,
    pub template: Symbol,
    pub instance_path: TreePath,
}

impl ResolvedConnection {
    pub fn is_intra_device(&self) -> bool {
        self.depth == INTRA_DEVICE_DEPTH
    }
}

/// Instantiate every intra-template connection of every instance in the
/// tree.
///
/// At each instance the declared relative endpoint paths are prefixed with
/// the instance's absolute path and resolved through `hierarchy`: exact
/// lookup first, base-identity fallback second. A connection with an
/// unresolvable endpoint is dropped with a warning; hosts are never dropped
/// this way, only cables.
pub fn resolve_connections(
    store: &TemplateStore,
    root: &GraphInstance,
    hierarchy: &Hierarchy,
) -> Vec<ResolvedConnection> {
    struct Resolver<'a> {
        store: &'a TemplateStore,
        hierarchy: &'a Hierarchy,
        out: Vec<ResolvedConnection>,
    }

    impl Resolver<'_> {
        fn lookup(&self, path: &TreePath) -> Option<HostId> {
            self.hierarchy
                .host_id(path)
                .or_else(|| self.hierarchy.host_id_by_base(path))
        }
    }

    impl TreeVisitor for Resolver<'_> {
        fn on_leaf(&mut self, _: &TreePath, _: &str, _: &str, _: HostId, _: u32) {}

        fn on_subgraph(&mut self, path: &TreePath, instance: &GraphInstance, depth: u32) -> bool {
            // Missing templates are warned about by the walk itself.
            let Some(template) = self.store.get(&instance.template) else {
                return true;
            };
            for (port_type, defs) in &template.connections {
                for def in defs {
                    let abs_a = path.join(&def.a.path);
                    let abs_b = path.join(&def.b.path);
                    match (self.lookup(&abs_a), self.lookup(&abs_b)) {
                        (Some(host_a), Some(host_b)) => self.out.push(ResolvedConnection {
                            a: ResolvedPort {
                                path: abs_a,
                                host_id: host_a,
                                tray: def.a.tray,
                                port: def.a.port,
                            },
                            b: ResolvedPort {
                                path: abs_b,
                                host_id: host_b,
                                tray: def.b.tray,
                                port: def.b.port,
                            },
                            port_type: port_type.clone(),
                            depth,
                            template: template.name.clone(),
                            instance_path: path.clone(),
                        }),
                        (a, b) => {
                            let missing = match (a, b) {
                                (None, None) => "either endpoint",
                                (None, Some(_)) => "endpoint a",
                                _ => "endpoint b",
                            };
                            log::warn!(
                                "dropping '{port_type}' connection of template '{}' at \
                                 instance '{path}': could not resolve {missing} \
                                 ('{abs_a}' / '{abs_b}')",
                                template.name,
                            );
                        }
                    }
                }
            }
            true
        }
    }

    let mut resolver = Resolver {
        store,
        hierarchy,
        out: Vec::new(),
    };
    walk(store, root, &mut resolver);
    resolver.out
}

/// Instantiate per-device-type internal wiring for every leaf.
///
/// This class of cabling never goes through the template/instance mechanism:
/// both endpoints sit on the same host, driven purely by the device type's
/// connection table, and the result is tagged with [`INTRA_DEVICE_DEPTH`].
pub fn resolve_internal_connections(
    node_descriptors: &BTreeMap<Symbol, NodeDescriptor>,
    hierarchy: &Hierarchy,
) -> Vec<ResolvedConnection> {
    let mut out = Vec::new();
    for record in hierarchy.records() {
        let Some(descriptor) = node_descriptors.get(&record.device_type) else {
            continue;
        };
        for (port_type, pairs) in &descriptor.internal {
            for (a, b) in pairs {
                out.push(ResolvedConnection {
                    a: ResolvedPort {
                        path: record.path.clone(),
                        host_id: record.host_id,
                        tray: a.tray,
                        port: a.port,
                    },
                    b: ResolvedPort {
                        path: record.path.clone(),
                        host_id: record.host_id,
                        tray: b.tray,
                        port: b.port,
                    },
                    port_type: port_type.clone(),
                    depth: INTRA_DEVICE_DEPTH,
                    // No template declared this; attribute it to the device
                    // type at the leaf itself.
                    template: record.device_type.clone(),
                    instance_path: record.path.clone(),
                });
            }
        }
    }
    out
}
