use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Symbol, TreePath};

/// Identifier of a leaf device (host). Densely assigned `0..N-1` across one
/// instance tree; the same integers index the companion deployment
/// descriptor's host list.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct HostId(pub u32);

impl HostId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for HostId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What an instance assigns to one declared template child: either a concrete
/// host, or a nested instance of another template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChildMapping {
    Host(HostId),
    Sub(GraphInstance),
}

impl ChildMapping {
    pub fn host(&self) -> Option<HostId> {
        match self {
            ChildMapping::Host(id) => Some(*id),
            ChildMapping::Sub(_) => None,
        }
    }

    pub fn sub(&self) -> Option<&GraphInstance> {
        match self {
            ChildMapping::Host(_) => None,
            ChildMapping::Sub(instance) => Some(instance),
        }
    }
}

/// Concrete instantiation of a [`crate::Template`].
///
/// `children` is keyed by child name; its storage order is irrelevant, every
/// consumer traverses in the declaration order of the referenced template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphInstance {
    pub template: Symbol,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub children: BTreeMap<Symbol, ChildMapping>,
}

impl GraphInstance {
    pub fn new(template: impl Into<Symbol>) -> Self {
        Self {
            template: template.into(),
            children: BTreeMap::new(),
        }
    }

    // Builder-style mutators -------------------------------------------------

    pub fn with_host(mut self, name: impl Into<Symbol>, id: HostId) -> Self {
        self.children.insert(name.into(), ChildMapping::Host(id));
        self
    }

    pub fn with_sub(mut self, name: impl Into<Symbol>, instance: GraphInstance) -> Self {
        self.children
            .insert(name.into(), ChildMapping::Sub(instance));
        self
    }

    pub fn add_host(&mut self, name: impl Into<Symbol>, id: HostId) -> &mut Self {
        self.children.insert(name.into(), ChildMapping::Host(id));
        self
    }

    pub fn add_sub(&mut self, name: impl Into<Symbol>, instance: GraphInstance) -> &mut Self {
        self.children
            .insert(name.into(), ChildMapping::Sub(instance));
        self
    }

    // Lookups ----------------------------------------------------------------

    pub fn mapping(&self, name: &str) -> Option<&ChildMapping> {
        self.children.get(name)
    }

    pub fn host(&self, name: &str) -> Option<HostId> {
        self.children.get(name).and_then(ChildMapping::host)
    }

    pub fn sub(&self, name: &str) -> Option<&GraphInstance> {
        self.children.get(name).and_then(ChildMapping::sub)
    }

    /// Every `(path, host_id)` assignment in the whole tree, in storage
    /// order. Used by validation; resolution goes through the hierarchy
    /// resolver instead, which honours template declaration order.
    pub fn host_assignments(&self) -> Vec<(TreePath, HostId)> {
        let mut out = Vec::new();
        self.collect_hosts(&TreePath::root(), &mut out);
        out
    }

    fn collect_hosts(&self, path: &TreePath, out: &mut Vec<(TreePath, HostId)>) {
        for (name, mapping) in &self.children {
            match mapping {
                ChildMapping::Host(id) => out.push((path.child(name.clone()), *id)),
                ChildMapping::Sub(instance) => {
                    instance.collect_hosts(&path.child(name.clone()), out)
                }
            }
        }
    }
}
