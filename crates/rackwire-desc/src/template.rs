use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Symbol, TreePath};

/// One endpoint of an intra-template connection. `path` is relative to the
/// instance using the template: length 1 for a direct child, longer when the
/// connection reaches into a nested subgraph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortDef {
    pub path: TreePath,
    pub tray: u32,
    pub port: u32,
}

impl PortDef {
    pub fn new(path: impl Into<TreePath>, tray: u32, port: u32) -> Self {
        Self {
            path: path.into(),
            tray,
            port,
        }
    }
}

/// A cable declared inside a template, between two relative endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionDef {
    pub a: PortDef,
    pub b: PortDef,
}

impl ConnectionDef {
    pub fn new(a: PortDef, b: PortDef) -> Self {
        Self { a, b }
    }
}

/// Discriminates the kind of a declared template child.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChildKind {
    /// A physical leaf device of the given device type.
    Leaf { device_type: Symbol },
    /// A nested subgraph, instantiating another template.
    Graph { template: Symbol },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateChild {
    pub name: Symbol,
    pub kind: ChildKind,
}

/// Reusable named pattern: an ordered list of children plus the cables wired
/// between them, grouped by port type.
///
/// `children` order is canonical: it drives traversal order everywhere and
/// is the basis for per-template enumeration of normalized names, so it must
/// survive import/export untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub name: Symbol,
    pub children: Vec<TemplateChild>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub connections: BTreeMap<Symbol, Vec<ConnectionDef>>,
}

impl Template {
    pub fn new(name: impl Into<Symbol>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
            connections: BTreeMap::new(),
        }
    }

    // Builder-style mutators -------------------------------------------------

    pub fn with_leaf(mut self, name: impl Into<Symbol>, device_type: impl Into<Symbol>) -> Self {
        self.push_leaf(name, device_type);
        self
    }

    pub fn with_graph(mut self, name: impl Into<Symbol>, template: impl Into<Symbol>) -> Self {
        self.push_graph(name, template);
        self
    }

    pub fn with_connection(mut self, port_type: impl Into<Symbol>, def: ConnectionDef) -> Self {
        self.push_connection(port_type, def);
        self
    }

    pub fn push_leaf(&mut self, name: impl Into<Symbol>, device_type: impl Into<Symbol>) {
        self.children.push(TemplateChild {
            name: name.into(),
            kind: ChildKind::Leaf {
                device_type: device_type.into(),
            },
        });
    }

    pub fn push_graph(&mut self, name: impl Into<Symbol>, template: impl Into<Symbol>) {
        self.children.push(TemplateChild {
            name: name.into(),
            kind: ChildKind::Graph {
                template: template.into(),
            },
        });
    }

    pub fn push_connection(&mut self, port_type: impl Into<Symbol>, def: ConnectionDef) {
        self.connections.entry(port_type.into()).or_default().push(def);
    }

    // Lookups ----------------------------------------------------------------

    pub fn child(&self, name: &str) -> Option<&TemplateChild> {
        self.children.iter().find(|c| c.name == name)
    }

    /// A template with zero children is *empty* and must never be referenced
    /// or serialized.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.values().map(Vec::len).sum()
    }
}

/// All templates of one descriptor, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateStore {
    templates: BTreeMap<Symbol, Template>,
}

impl TemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert (or replace) a template under its own name.
    pub fn insert(&mut self, template: Template) -> &mut Self {
        self.templates.insert(template.name.clone(), template);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Template> {
        self.templates.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Template> {
        self.templates.remove(name)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Template> {
        self.templates.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(|s| s.as_str())
    }

    /// Drop every empty template and return the pruned names. Called before
    /// serialization; the export path never emits references to empty
    /// templates in the first place.
    pub fn prune_empty(&mut self) -> Vec<Symbol> {
        let pruned: Vec<Symbol> = self
            .templates
            .iter()
            .filter(|(_, t)| t.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        for name in &pruned {
            self.templates.remove(name);
        }
        pruned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn children_order_is_preserved() {
        let template = Template::new("rack")
            .with_leaf("switch", "tor40")
            .with_leaf("node_1", "srv2u")
            .with_leaf("node_0", "srv2u");
        let names: Vec<&str> = template.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["switch", "node_1", "node_0"]);

        let json = serde_json::to_string(&template).unwrap();
        let back: Template = serde_json::from_str(&json).unwrap();
        assert_eq!(back, template);
    }

    #[test]
    fn prune_empty_drops_only_empty_templates() {
        let mut store = TemplateStore::new();
        store.insert(Template::new("rack").with_leaf("switch", "tor40"));
        store.insert(Template::new("ghost"));
        store.insert(Template::new("shell"));

        let mut pruned = store.prune_empty();
        pruned.sort();
        assert_eq!(pruned, vec!["ghost".to_string(), "shell".to_string()]);
        assert_eq!(store.len(), 1);
        assert!(store.contains("rack"));
    }

    #[test]
    fn connection_grouping_by_port_type() {
        let template = Template::new("rack")
            .with_leaf("a", "srv2u")
            .with_leaf("b", "srv2u")
            .with_connection(
                "ethernet",
                ConnectionDef::new(PortDef::new(["a"], 0, 1), PortDef::new(["b"], 0, 1)),
            )
            .with_connection(
                "ethernet",
                ConnectionDef::new(PortDef::new(["a"], 0, 2), PortDef::new(["b"], 0, 2)),
            )
            .with_connection(
                "optical",
                ConnectionDef::new(PortDef::new(["a"], 1, 0), PortDef::new(["b"], 1, 0)),
            );
        assert_eq!(template.connection_count(), 3);
        assert_eq!(template.connections["ethernet"].len(), 2);
        assert_eq!(template.connections["optical"].len(), 1);
    }
}
