use std::collections::BTreeMap;
use std::fmt::Display;

use crate::{ChildKind, ChildMapping, GraphInstance, HostId, Symbol, TemplateStore, TreePath};

/// How many issues [`ValidationError`]'s `Display` shows before truncating.
const MAX_DISPLAY_ISSUES: usize = 20;

/// One structural violation found while validating an instance tree against
/// its template store. Every variant carries the full path of the offending
/// node so callers can locate it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    /// The root instance has no child mappings at all.
    EmptyRoot,
    /// A declared leaf child has no host mapping.
    MissingHostMapping { instance: TreePath, child: Symbol },
    /// A declared leaf child is mapped to a sub-instance.
    LeafMappedToSub { instance: TreePath, child: Symbol },
    /// A declared subgraph child is mapped to a host id.
    GraphMappedToHost { instance: TreePath, child: Symbol },
    /// A sub-instance names a template other than the one its declaration
    /// references.
    SubTemplateMismatch {
        instance: TreePath,
        child: Symbol,
        declared: Symbol,
        found: Symbol,
    },
    /// A mapping is keyed by a child name the template does not declare.
    UndeclaredChild { instance: TreePath, child: Symbol },
    /// The same host id is assigned to more than one leaf.
    DuplicateHostId { id: HostId, paths: Vec<TreePath> },
    /// A host id lies outside `0..leaf_count`.
    HostIdOutOfRange {
        id: HostId,
        path: TreePath,
        leaf_count: usize,
    },
    /// Ids in `0..leaf_count` that no leaf carries.
    MissingHostIds { missing: Vec<u32>, leaf_count: usize },
}

impl Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationIssue::EmptyRoot => {
                write!(f, "root instance has no child mappings")
            }
            ValidationIssue::MissingHostMapping { instance, child } => {
                write!(
                    f,
                    "leaf child '{child}' of instance '{instance}' has no host id mapping"
                )
            }
            ValidationIssue::LeafMappedToSub { instance, child } => {
                write!(
                    f,
                    "leaf child '{child}' of instance '{instance}' is mapped to a sub-instance"
                )
            }
            ValidationIssue::GraphMappedToHost { instance, child } => {
                write!(
                    f,
                    "subgraph child '{child}' of instance '{instance}' is mapped to a host id"
                )
            }
            ValidationIssue::SubTemplateMismatch {
                instance,
                child,
                declared,
                found,
            } => write!(
                f,
                "child '{child}' of instance '{instance}' should instantiate template \
                 '{declared}' but instantiates '{found}'"
            ),
            ValidationIssue::UndeclaredChild { instance, child } => {
                write!(
                    f,
                    "instance '{instance}' maps child '{child}' which its template does not declare"
                )
            }
            ValidationIssue::DuplicateHostId { id, paths } => {
                let paths: Vec<String> = paths.iter().map(|p| p.to_string()).collect();
                write!(f, "host id {id} assigned to {} leaves: {}", paths.len(), paths.join(", "))
            }
            ValidationIssue::HostIdOutOfRange {
                id,
                path,
                leaf_count,
            } => write!(
                f,
                "host id {id} at '{path}' is outside 0..{leaf_count}"
            ),
            ValidationIssue::MissingHostIds {
                missing,
                leaf_count,
            } => {
                let shown: Vec<String> = missing.iter().take(8).map(|i| i.to_string()).collect();
                let suffix = if missing.len() > 8 { ", ..." } else { "" };
                write!(
                    f,
                    "{} host id(s) missing from 0..{leaf_count}: {}{suffix}",
                    missing.len(),
                    shown.join(", ")
                )
            }
        }
    }
}

/// Fatal validation outcome: the operation is rejected as a whole, nothing is
/// partially resolved or exported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "descriptor validation failed with {} issue(s):", self.issues.len())?;
        for issue in self.issues.iter().take(MAX_DISPLAY_ISSUES) {
            writeln!(f, "  - {issue}")?;
        }
        if self.issues.len() > MAX_DISPLAY_ISSUES {
            writeln!(f, "  ... and {} more", self.issues.len() - MAX_DISPLAY_ISSUES)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Validate an instance tree against its template store.
///
/// Checks the fatal invariants: every declared leaf has a host mapping,
/// mapping kinds agree with declarations, sub-instances name the declared
/// template, no undeclared children, and host ids form exactly `{0..N-1}`.
/// A referenced template missing from the store is *not* fatal here; the
/// resolvers skip such branches with a warning at traversal time.
pub fn validate(store: &TemplateStore, root: &GraphInstance) -> Result<(), ValidationError> {
    let mut issues = Vec::new();

    if root.children.is_empty() {
        issues.push(ValidationIssue::EmptyRoot);
    }

    check_instance(store, root, &TreePath::root(), &mut issues);

    // Host id uniqueness and contiguity over the whole tree.
    let assignments = root.host_assignments();
    let leaf_count = assignments.len();
    let mut by_id: BTreeMap<u32, Vec<TreePath>> = BTreeMap::new();
    for (path, id) in &assignments {
        by_id.entry(id.0).or_default().push(path.clone());
    }
    for (id, paths) in &by_id {
        if paths.len() > 1 {
            issues.push(ValidationIssue::DuplicateHostId {
                id: HostId(*id),
                paths: paths.clone(),
            });
        }
        if *id as usize >= leaf_count {
            issues.push(ValidationIssue::HostIdOutOfRange {
                id: HostId(*id),
                path: paths[0].clone(),
                leaf_count,
            });
        }
    }
    let missing: Vec<u32> = (0..leaf_count as u32)
        .filter(|i| !by_id.contains_key(i))
        .collect();
    if !missing.is_empty() {
        issues.push(ValidationIssue::MissingHostIds {
            missing,
            leaf_count,
        });
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(ValidationError { issues })
    }
}

fn check_instance(
    store: &TemplateStore,
    instance: &GraphInstance,
    path: &TreePath,
    issues: &mut Vec<ValidationIssue>,
) {
    if let Some(template) = store.get(&instance.template) {
        for child in &template.children {
            match (&child.kind, instance.children.get(&child.name)) {
                (ChildKind::Leaf { .. }, None) => issues.push(ValidationIssue::MissingHostMapping {
                    instance: path.clone(),
                    child: child.name.clone(),
                }),
                (ChildKind::Leaf { .. }, Some(ChildMapping::Sub(_))) => {
                    issues.push(ValidationIssue::LeafMappedToSub {
                        instance: path.clone(),
                        child: child.name.clone(),
                    })
                }
                (ChildKind::Leaf { .. }, Some(ChildMapping::Host(_))) => {}
                (ChildKind::Graph { .. }, Some(ChildMapping::Host(_))) => {
                    issues.push(ValidationIssue::GraphMappedToHost {
                        instance: path.clone(),
                        child: child.name.clone(),
                    })
                }
                (ChildKind::Graph { template: declared }, Some(ChildMapping::Sub(sub))) => {
                    if sub.template != *declared {
                        issues.push(ValidationIssue::SubTemplateMismatch {
                            instance: path.clone(),
                            child: child.name.clone(),
                            declared: declared.clone(),
                            found: sub.template.clone(),
                        });
                    }
                }
                // An absent subtree is a smaller topology, not an error.
                (ChildKind::Graph { .. }, None) => {}
            }
        }
        for name in instance.children.keys() {
            if template.child(name).is_none() {
                issues.push(ValidationIssue::UndeclaredChild {
                    instance: path.clone(),
                    child: name.clone(),
                });
            }
        }
    }

    // Recurse through storage regardless of whether the template resolved, so
    // host id accounting and nested checks still see the whole tree.
    for (name, mapping) in &instance.children {
        if let ChildMapping::Sub(sub) = mapping {
            check_instance(store, sub, &path.child(name.clone()), issues);
        }
    }
}
