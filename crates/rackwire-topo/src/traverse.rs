use rackwire_desc::{ChildKind, ChildMapping, GraphInstance, HostId, TemplateStore, TreePath};

/// Visitor over the depth-first traversal of an instance tree.
///
/// Children are visited in *template declaration order*, never in whatever
/// order the mappings happen to be stored, so traversal order is
/// deterministic and independent of the storage representation. `depth` is
/// the nesting depth of the visited instance (root = 0); leaves report the
/// depth of their containing instance.
pub trait TreeVisitor {
    /// A leaf child with a host mapping.
    fn on_leaf(
        &mut self,
        path: &TreePath,
        child_name: &str,
        device_type: &str,
        host_id: HostId,
        depth: u32,
    );

    /// An instance, before its children. Return `false` to skip the branch.
    fn on_subgraph(&mut self, path: &TreePath, instance: &GraphInstance, depth: u32) -> bool {
        let _ = (path, instance, depth);
        true
    }
}

/// Walk the tree rooted at `root` in template declaration order.
///
/// An instance whose template is missing from the store is skipped with a
/// warning; this is the single local-recovery path shared by every resolver.
pub fn walk<V: TreeVisitor>(store: &TemplateStore, root: &GraphInstance, visitor: &mut V) {
    walk_instance(store, root, &TreePath::root(), 0, visitor);
}

fn walk_instance<V: TreeVisitor>(
    store: &TemplateStore,
    instance: &GraphInstance,
    path: &TreePath,
    depth: u32,
    visitor: &mut V,
) {
    if !visitor.on_subgraph(path, instance, depth) {
        return;
    }
    let Some(template) = store.get(&instance.template) else {
        log::warn!(
            "template '{}' referenced at instance '{}' is missing from the store; skipping branch",
            instance.template,
            path
        );
        return;
    };
    for child in &template.children {
        match (&child.kind, instance.mapping(&child.name)) {
            (ChildKind::Leaf { device_type }, Some(ChildMapping::Host(id))) => {
                visitor.on_leaf(
                    &path.child(child.name.clone()),
                    &child.name,
                    device_type,
                    *id,
                    depth,
                );
            }
            (ChildKind::Graph { .. }, Some(ChildMapping::Sub(sub))) => {
                walk_instance(store, sub, &path.child(child.name.clone()), depth + 1, visitor);
            }
            // Kind mismatches are rejected by validation before any resolver
            // runs; absent subgraph mappings are simply smaller topologies.
            _ => {}
        }
    }
}
