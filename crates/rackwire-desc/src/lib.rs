//! Data model for rackwire cluster cabling descriptors.
//!
//! A cluster descriptor describes a datacenter cabling topology as a set of
//! reusable *graph templates* instantiated into a concrete *instance tree*.
//! The structures here are serialisable with `serde` so descriptors can be
//! stored or transferred as JSON; [`ClusterDescriptor::to_json`] produces
//! canonical (deterministic) output.
//!
//! The two central structures are:
//!
//! * [`TemplateStore`]: reusable named patterns of children and internal
//!   connections, keyed by template name.
//! * [`GraphInstance`]: the instantiation of templates into a concrete
//!   topology, assigning a [`HostId`] to every leaf device.
//!
//! Host identifiers are the load-bearing contract of the whole model: across
//! one instance tree they must form exactly the set `{0..N-1}` where `N` is
//! the leaf count, because a companion [`DeploymentDescriptor`] is indexed by
//! the same integers. [`validate`] checks this (and the other structural
//! invariants) before any resolution is attempted.

pub mod descriptor;
pub mod instance;
pub mod path;
pub mod template;
pub mod validate;

/// Helper type alias: child names, template names and device types are all
/// plain UTF-8 strings.
pub type Symbol = String;

pub use descriptor::{
    ClusterDescriptor, DeployedHost, DeploymentDescriptor, NodeDescriptor, PortLoc,
};
pub use instance::{ChildMapping, GraphInstance, HostId};
pub use path::TreePath;
pub use template::{ChildKind, ConnectionDef, PortDef, Template, TemplateChild, TemplateStore};
pub use validate::{ValidationError, ValidationIssue, validate};
