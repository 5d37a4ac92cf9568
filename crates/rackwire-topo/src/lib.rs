//! Resolution and export for rackwire cluster descriptors.
//!
//! The import direction flattens a descriptor's instance tree into host and
//! cable lists ready for visualization:
//!
//! * [`Hierarchy`]: one record per leaf device with a stable host id, plus
//!   an O(1) path → host id index.
//! * [`resolve_connections`]: every intra-template cable instantiated at
//!   every tree position, with both endpoints resolved to host ids.
//!
//! The export direction goes the other way: [`build_cluster`] turns a
//! [`VisualGraph`] into deduplicated templates and a root instance whose host
//! ids are contiguous by construction, and [`build_deployment`] emits the
//! companion location descriptor over the identical host ordering.
//!
//! Everything here is a pure, synchronous tree transform; all context is
//! passed explicitly per call and nothing is cached across invocations.

pub mod builder;
pub mod connection;
pub mod hierarchy;
pub mod hosts;
pub mod traverse;
pub mod visual;

pub use builder::{BuildError, CANONICAL_ROOT_ID, build_cluster, build_deployment};
pub use connection::{
    INTRA_DEVICE_DEPTH, ResolvedConnection, ResolvedPort, resolve_connections,
    resolve_internal_connections,
};
pub use hierarchy::{Hierarchy, HierarchyRecord};
pub use hosts::{HostExtractError, extract_hosts};
pub use traverse::{TreeVisitor, walk};
pub use visual::{Location, NodeKind, VisualEdge, VisualGraph, VisualNode};
