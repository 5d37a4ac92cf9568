use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use rackwire_desc::{
    GraphInstance, HostId, Symbol, TemplateStore, TreePath, ValidationError, validate,
};

use crate::traverse::{TreeVisitor, walk};

/// One leaf device of the flattened instance tree. `depth` is the nesting
/// depth of the leaf's containing instance (root instance = 0).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyRecord {
    pub path: TreePath,
    pub child_name: Symbol,
    pub device_type: Symbol,
    pub host_id: HostId,
    pub depth: u32,
}

/// Flattened view of one instance tree: leaf records in canonical order plus
/// the derived path indexes used by connection resolution. Derived data only;
/// rebuild it whenever the tree is rebuilt.
#[derive(Debug, Clone)]
pub struct Hierarchy {
    records: Vec<HierarchyRecord>,
    by_path: HashMap<TreePath, HostId>,
    template_by_path: BTreeMap<TreePath, Symbol>,
    by_base: HashMap<TreePath, Option<HostId>>,
}

impl Hierarchy {
    /// Flatten `root` into leaf records, sorted by path (lexicographic tuple
    /// comparison, the documented canonical order, independent of tree
    /// shape).
    ///
    /// Validation runs first and any fatal issue aborts the whole resolve;
    /// a tree known to be incomplete is never resolved. Branches whose
    /// template is missing from the store are skipped with a warning and
    /// yield a partial hierarchy.
    pub fn resolve(store: &TemplateStore, root: &GraphInstance) -> Result<Self, ValidationError> {
        validate(store, root)?;

        #[derive(Default)]
        struct Collector {
            records: Vec<HierarchyRecord>,
            template_by_path: BTreeMap<TreePath, Symbol>,
        }

        impl TreeVisitor for Collector {
            fn on_leaf(
                &mut self,
                path: &TreePath,
                child_name: &str,
                device_type: &str,
                host_id: HostId,
                depth: u32,
            ) {
                self.records.push(HierarchyRecord {
                    path: path.clone(),
                    child_name: child_name.to_string(),
                    device_type: device_type.to_string(),
                    host_id,
                    depth,
                });
            }

            fn on_subgraph(
                &mut self,
                path: &TreePath,
                instance: &GraphInstance,
                _depth: u32,
            ) -> bool {
                self.template_by_path
                    .insert(path.clone(), instance.template.clone());
                true
            }
        }

        let mut collector = Collector::default();
        walk(store, root, &mut collector);
        collector.records.sort_by(|a, b| a.path.cmp(&b.path));

        let by_path: HashMap<TreePath, HostId> = collector
            .records
            .iter()
            .map(|r| (r.path.clone(), r.host_id))
            .collect();

        // Secondary index keyed by base identity (every `_<digits>` suffix
        // stripped). Ambiguous bases are poisoned so the fallback never
        // guesses between candidates.
        let mut by_base: HashMap<TreePath, Option<HostId>> = HashMap::new();
        for record in &collector.records {
            by_base
                .entry(base_identity(&record.path))
                .and_modify(|slot| *slot = None)
                .or_insert(Some(record.host_id));
        }

        Ok(Self {
            records: collector.records,
            by_path,
            template_by_path: collector.template_by_path,
            by_base,
        })
    }

    pub fn records(&self) -> &[HierarchyRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Exact path → host id lookup. O(1); the primary resolution path.
    pub fn host_id(&self, path: &TreePath) -> Option<HostId> {
        self.by_path.get(path).copied()
    }

    /// Template name governing an instance path (`TreePath::root()` for the
    /// root instance itself).
    pub fn template_at(&self, path: &TreePath) -> Option<&str> {
        self.template_by_path.get(path).map(|s| s.as_str())
    }

    /// Instance paths and their governing templates, in path order.
    pub fn instance_paths(&self) -> impl Iterator<Item = (&TreePath, &str)> {
        self.template_by_path
            .iter()
            .map(|(path, template)| (path, template.as_str()))
    }

    /// Best-effort fallback lookup by base identity: strips the trailing
    /// `_<digits>` suffix from every segment of `path` and matches it against
    /// the similarly stripped leaf paths. Heuristic recovery with no
    /// correctness guarantee: ambiguous bases never match, every hit is
    /// logged, and callers must try [`Hierarchy::host_id`] first.
    pub fn host_id_by_base(&self, path: &TreePath) -> Option<HostId> {
        let base = base_identity(path);
        let hit = self.by_base.get(&base).copied().flatten()?;
        log::warn!(
            "exact lookup of '{path}' failed; matched base identity '{base}' to host {hit}"
        );
        Some(hit)
    }
}

/// Strip the trailing `_<digits>` suffix from every segment, recovering the
/// "base template" identity of a decorated instance path.
pub(crate) fn base_identity(path: &TreePath) -> TreePath {
    path.map_segments(strip_index_suffix)
}

fn strip_index_suffix(segment: &str) -> Symbol {
    match segment.rsplit_once('_') {
        Some((base, digits))
            if !base.is_empty()
                && !digits.is_empty()
                && digits.bytes().all(|b| b.is_ascii_digit()) =>
        {
            base.to_string()
        }
        _ => segment.to_string(),
    }
}
