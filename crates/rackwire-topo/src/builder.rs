use std::collections::{BTreeSet, HashMap};

use thiserror::Error;

use rackwire_desc::{
    ChildKind, ConnectionDef, DeployedHost, DeploymentDescriptor, GraphInstance, HostId, PortDef,
    Symbol, Template, TemplateChild, TemplateStore, TreePath,
};

use crate::hosts::{HostExtractError, extract_hosts};
use crate::visual::{NodeKind, VisualEdge, VisualGraph, VisualNode};

/// Well-known id of the canonical root container. A visual graph with
/// exactly one top-level container of this id is exported as-is; any other
/// root arrangement gets a synthesized wrapper template of the same name.
pub const CANONICAL_ROOT_ID: &str = "cluster";

/// Fatal problems during descriptor export. Any of these aborts the whole
/// export with no partial output.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error(transparent)]
    Hosts(#[from] HostExtractError),
    #[error("visual graph contains no device nodes")]
    NoDevices,
    #[error("container '{id}' carries no template tag")]
    UntaggedContainer { id: Symbol },
    #[error("device node '{id}' carries no device type")]
    MissingDeviceType { id: Symbol },
}

/// Export a visual graph into deduplicated templates plus a root instance.
///
/// Containers sharing a template tag contribute exactly one template,
/// sourced from the first instance encountered; host ids are assigned
/// 0,1,2,... per leaf in depth-first template-declaration order, so the
/// contiguous `{0..N-1}` invariant holds by construction. A graph with no
/// template tags at all takes the flat export path instead: one leaf per
/// host, no nesting.
pub fn build_cluster(graph: &VisualGraph) -> Result<(TemplateStore, GraphInstance), BuildError> {
    let (store, root, _) = assemble(graph)?;
    Ok((store, root))
}

/// Export the companion deployment descriptor.
///
/// `hosts[i]` describes the device whose exported host id is `i`: the
/// deployment walk is the same assembly [`build_cluster`] performs, so the
/// two descriptors line up by construction in both flat and hierarchical
/// mode.
pub fn build_deployment(graph: &VisualGraph) -> Result<DeploymentDescriptor, BuildError> {
    let (_, _, devices) = assemble(graph)?;
    let mut hosts = Vec::with_capacity(devices.len());
    for node in devices {
        let device_type =
            node.device_type
                .clone()
                .ok_or_else(|| BuildError::MissingDeviceType {
                    id: node.id.clone(),
                })?;
        let location = node.location.clone().unwrap_or_default();
        hosts.push(DeployedHost {
            hostname: graph.hostname_of(node).to_string(),
            hall: location.hall,
            aisle: location.aisle,
            rack: location.rack,
            shelf_u: location.shelf_u,
            device_type,
        });
    }
    Ok(DeploymentDescriptor::new(hosts))
}

/// Shared assembly: templates, root instance, and the device nodes in host
/// id order (`devices[i]` is the node assigned host id `i`).
fn assemble(
    graph: &VisualGraph,
) -> Result<(TemplateStore, GraphInstance, Vec<&VisualNode>), BuildError> {
    if !graph.is_tagged() {
        return build_flat(graph);
    }

    let mut builder = TemplateBuilder::new(graph);
    let roots = graph.logical_roots();
    if roots.is_empty() {
        return Err(BuildError::NoDevices);
    }

    for &root in &roots {
        if root.kind == NodeKind::Container {
            builder.build_template(root)?;
        }
    }

    if roots.len() == 1
        && roots[0].kind == NodeKind::Container
        && roots[0].id == CANONICAL_ROOT_ID
    {
        // An all-empty canonical root has no template left to instantiate.
        let tag = roots[0].template_tag.as_deref().unwrap_or_default();
        if !builder.store.contains(tag) {
            return Err(BuildError::NoDevices);
        }
        let instance = builder.build_instance(roots[0])?;
        return Ok((builder.store, instance, builder.devices));
    }

    builder.build_wrapper(&roots)
}

/// Which template owns an edge: the lowest logical container containing both
/// endpoints, or the synthetic top level when the endpoints share no
/// container.
enum EdgeOwner<'a> {
    TopLevel,
    Container(&'a str),
}

struct TemplateBuilder<'a> {
    graph: &'a VisualGraph,
    index: HashMap<&'a str, &'a VisualNode>,
    /// Logical ancestor chain (root..parent) per reachable node; nodes under
    /// physical containers never appear here.
    chains: HashMap<&'a str, Vec<&'a VisualNode>>,
    /// Owner per edge index; `None` for edges that cannot be expressed in
    /// any template (warned once during construction).
    owners: Vec<Option<EdgeOwner<'a>>>,
    store: TemplateStore,
    /// Tags marked before recursion, so repeated (or malformed cyclic) tags
    /// build exactly once from the first instance encountered.
    built: BTreeSet<Symbol>,
    next_host: u32,
    /// Device nodes in assignment order: `devices[i]` got host id `i`.
    devices: Vec<&'a VisualNode>,
}

impl<'a> TemplateBuilder<'a> {
    fn new(graph: &'a VisualGraph) -> Self {
        let index = graph.index();

        let mut chains: HashMap<&'a str, Vec<&'a VisualNode>> = HashMap::new();
        let mut stack: Vec<(&'a VisualNode, Vec<&'a VisualNode>)> = graph
            .logical_roots()
            .into_iter()
            .map(|n| (n, Vec::new()))
            .collect();
        while let Some((node, ancestors)) = stack.pop() {
            chains.insert(node.id.as_str(), ancestors.clone());
            if node.kind == NodeKind::Container {
                for child in graph.children_of(Some(&node.id)) {
                    if child.kind == NodeKind::Physical {
                        continue;
                    }
                    let mut chain = ancestors.clone();
                    chain.push(node);
                    stack.push((child, chain));
                }
            }
        }

        let owners = graph
            .edges
            .iter()
            .map(|edge| Self::owner_of(&index, &chains, edge))
            .collect();

        Self {
            graph,
            index,
            chains,
            owners,
            store: TemplateStore::new(),
            built: BTreeSet::new(),
            next_host: 0,
            devices: Vec::new(),
        }
    }

    /// Whether a container's logical subtree contains any device at all.
    /// Containers that fail this are omitted from instances entirely; a
    /// sibling may still have sourced a template for their tag.
    fn subtree_has_device(&self, container: &VisualNode) -> bool {
        self.graph
            .children_of(Some(&container.id))
            .into_iter()
            .any(|child| match child.kind {
                NodeKind::Device => true,
                NodeKind::Container => self.subtree_has_device(child),
                NodeKind::Physical => false,
            })
    }

    fn owner_of(
        index: &HashMap<&'a str, &'a VisualNode>,
        chains: &HashMap<&'a str, Vec<&'a VisualNode>>,
        edge: &VisualEdge,
    ) -> Option<EdgeOwner<'a>> {
        for id in [&edge.source, &edge.target] {
            match index.get(id.as_str()) {
                None => {
                    log::warn!(
                        "edge {} - {} references unknown node '{id}'; cable dropped",
                        edge.source,
                        edge.target
                    );
                    return None;
                }
                Some(node) if node.kind != NodeKind::Device => {
                    log::warn!(
                        "edge {} - {} endpoint '{id}' is not a device; cable dropped",
                        edge.source,
                        edge.target
                    );
                    return None;
                }
                Some(_) => {}
            }
        }
        let (Some(a), Some(b)) = (
            chains.get(edge.source.as_str()),
            chains.get(edge.target.as_str()),
        ) else {
            log::warn!(
                "edge {} - {} has an endpoint outside the logical hierarchy; cable dropped",
                edge.source,
                edge.target
            );
            return None;
        };
        let common = a
            .iter()
            .zip(b.iter())
            .take_while(|(x, y)| x.id == y.id)
            .count();
        Some(if common == 0 {
            EdgeOwner::TopLevel
        } else {
            EdgeOwner::Container(a[common - 1].id.as_str())
        })
    }

    /// Build (once) the template for this container's tag. Returns the tag
    /// when a non-empty template exists for it, `None` when the instance had
    /// no logical children and the template was discarded.
    fn build_template(&mut self, container: &'a VisualNode) -> Result<Option<Symbol>, BuildError> {
        let Some(tag) = container.template_tag.clone() else {
            return Err(BuildError::UntaggedContainer {
                id: container.id.clone(),
            });
        };
        if self.built.contains(&tag) {
            // Already sourced from an earlier instance (or being built right
            // now, for malformed cyclic tags): reuse, never rebuild.
            return Ok(Some(tag));
        }
        self.built.insert(tag.clone());

        let mut template = Template::new(tag.clone());
        for child in self.graph.children_of(Some(&container.id)) {
            match child.kind {
                NodeKind::Physical => {}
                NodeKind::Device => {
                    let device_type = child.device_type.clone().ok_or_else(|| {
                        BuildError::MissingDeviceType {
                            id: child.id.clone(),
                        }
                    })?;
                    template.push_leaf(self.graph.local_name(child), device_type);
                }
                NodeKind::Container => {
                    if let Some(sub_tag) = self.build_template(child)? {
                        template.push_graph(self.graph.local_name(child), sub_tag);
                    }
                }
            }
        }

        // Wiring: only cables fully inside *this* instance's subtree end up
        // in the shared definition; other instances of the tag must not leak
        // their wiring into it.
        for (edge, owner) in self.graph.edges.iter().zip(&self.owners) {
            let Some(EdgeOwner::Container(owner_id)) = owner else {
                continue;
            };
            if *owner_id != container.id {
                continue;
            }
            let (Some(a), Some(b)) = (
                self.relative_path(&edge.source, &container.id),
                self.relative_path(&edge.target, &container.id),
            ) else {
                continue;
            };
            template.push_connection(
                edge.port_type.clone(),
                ConnectionDef::new(
                    PortDef::new(a, edge.source_tray, edge.source_port),
                    PortDef::new(b, edge.target_tray, edge.target_port),
                ),
            );
        }

        if template.is_empty() {
            // Unmark so a sibling never references a template that does not
            // exist; a later, non-empty instance of the tag may rebuild it.
            self.built.remove(&tag);
            log::debug!(
                "discarding empty template '{tag}' sourced from container '{}'",
                container.id
            );
            return Ok(None);
        }
        self.store.insert(template);
        Ok(Some(tag))
    }

    /// Template-relative endpoint path: local names from just below
    /// `container_id` down to the endpoint itself.
    fn relative_path(&self, endpoint_id: &str, container_id: &str) -> Option<TreePath> {
        let node = self.index.get(endpoint_id)?;
        let chain = self.chains.get(endpoint_id)?;
        let pos = chain.iter().position(|n| n.id == container_id)?;
        let mut segments: Vec<Symbol> = chain[pos + 1..]
            .iter()
            .map(|n| self.graph.local_name(n).to_string())
            .collect();
        segments.push(self.graph.local_name(node).to_string());
        Some(TreePath::new(segments))
    }

    /// Second walk: instantiate. Host ids are handed out per leaf in
    /// depth-first *template declaration* order, so sibling instances of one
    /// tag number their hosts identically no matter how the visual graph
    /// happens to list their children.
    fn build_instance(&mut self, container: &'a VisualNode) -> Result<GraphInstance, BuildError> {
        let Some(tag) = container.template_tag.clone() else {
            return Err(BuildError::UntaggedContainer {
                id: container.id.clone(),
            });
        };
        let declared: Vec<TemplateChild> = self
            .store
            .get(&tag)
            .map(|t| t.children.clone())
            .unwrap_or_default();
        let mut by_name: HashMap<&str, &'a VisualNode> = self
            .graph
            .children_of(Some(&container.id))
            .into_iter()
            .filter(|c| c.kind != NodeKind::Physical)
            .map(|c| (self.graph.local_name(c), c))
            .collect();

        let mut instance = GraphInstance::new(tag.clone());
        for child in &declared {
            match (&child.kind, by_name.remove(child.name.as_str())) {
                (ChildKind::Leaf { .. }, Some(node)) if node.kind == NodeKind::Device => {
                    instance.add_host(child.name.clone(), HostId(self.next_host));
                    self.next_host += 1;
                    self.devices.push(node);
                }
                (ChildKind::Graph { template: sub_tag }, Some(node))
                    if node.kind == NodeKind::Container =>
                {
                    // Logically empty containers are omitted; an absent
                    // subgraph mapping is just a smaller topology.
                    if self.subtree_has_device(node) {
                        if self.store.contains(sub_tag) {
                            let sub = self.build_instance(node)?;
                            instance.add_sub(child.name.clone(), sub);
                        } else {
                            log::warn!(
                                "no usable template '{sub_tag}' for container '{}'; \
                                 branch skipped",
                                node.id
                            );
                        }
                    }
                }
                (_, Some(node)) => {
                    log::warn!(
                        "child '{}' of container '{}' does not match the kind template \
                         '{tag}' declares; skipped",
                        node.id,
                        container.id
                    );
                }
                // Absent leaves are left for validation to report.
                (_, None) => {}
            }
        }
        for name in by_name.keys() {
            log::warn!(
                "container '{}' has child '{name}' that template '{tag}' does not \
                 declare; skipped",
                container.id
            );
        }
        Ok(instance)
    }

    /// No single canonical root: wrap every top-level node in a synthetic
    /// template, children named `{tag}_{index}` with the index enumerating
    /// repeated tags from 0 in encounter order.
    fn build_wrapper(
        mut self,
        roots: &[&'a VisualNode],
    ) -> Result<(TemplateStore, GraphInstance, Vec<&'a VisualNode>), BuildError> {
        let mut wrapper = Template::new(CANONICAL_ROOT_ID);
        let mut tag_counts: HashMap<Symbol, u32> = HashMap::new();
        let mut top_names: HashMap<&str, Symbol> = HashMap::new();
        let mut ordered: Vec<(&'a VisualNode, Symbol)> = Vec::new();

        for &root in roots {
            match root.kind {
                NodeKind::Physical => {}
                NodeKind::Container => {
                    let Some(tag) = root.template_tag.clone() else {
                        return Err(BuildError::UntaggedContainer {
                            id: root.id.clone(),
                        });
                    };
                    // Only instances that would actually carry children get
                    // a wrapper slot; a logically empty instance is omitted
                    // even when a sibling sourced a template for its tag.
                    if !self.store.contains(&tag) || !self.subtree_has_device(root) {
                        continue;
                    }
                    let counter = tag_counts.entry(tag.clone()).or_insert(0);
                    let name = format!("{tag}_{counter}");
                    *counter += 1;
                    top_names.insert(root.id.as_str(), name.clone());
                    wrapper.push_graph(name.clone(), tag);
                    ordered.push((root, name));
                }
                NodeKind::Device => {
                    let device_type = root.device_type.clone().ok_or_else(|| {
                        BuildError::MissingDeviceType {
                            id: root.id.clone(),
                        }
                    })?;
                    let name = self.graph.local_name(root).to_string();
                    top_names.insert(root.id.as_str(), name.clone());
                    wrapper.push_leaf(name.clone(), device_type);
                    ordered.push((root, name));
                }
            }
        }

        // Cables between different top-level subtrees belong to the wrapper.
        for (edge, owner) in self.graph.edges.iter().zip(&self.owners) {
            if !matches!(owner, Some(EdgeOwner::TopLevel)) {
                continue;
            }
            let (Some(a), Some(b)) = (
                self.wrapper_relative_path(&edge.source, &top_names),
                self.wrapper_relative_path(&edge.target, &top_names),
            ) else {
                log::warn!(
                    "top-level edge {} - {} crosses a discarded subtree; cable dropped",
                    edge.source,
                    edge.target
                );
                continue;
            };
            wrapper.push_connection(
                edge.port_type.clone(),
                ConnectionDef::new(
                    PortDef::new(a, edge.source_tray, edge.source_port),
                    PortDef::new(b, edge.target_tray, edge.target_port),
                ),
            );
        }

        if wrapper.is_empty() {
            return Err(BuildError::NoDevices);
        }

        let mut instance = GraphInstance::new(CANONICAL_ROOT_ID);
        for (root, name) in ordered {
            match root.kind {
                NodeKind::Device => {
                    instance.add_host(name, HostId(self.next_host));
                    self.next_host += 1;
                    self.devices.push(root);
                }
                NodeKind::Container => {
                    let sub = self.build_instance(root)?;
                    instance.add_sub(name, sub);
                }
                NodeKind::Physical => {}
            }
        }

        self.store.insert(wrapper);
        Ok((self.store, instance, self.devices))
    }

    /// Like [`Self::relative_path`] but rooted at the synthetic wrapper,
    /// whose direct children carry synthesized names.
    fn wrapper_relative_path(
        &self,
        endpoint_id: &str,
        top_names: &HashMap<&str, Symbol>,
    ) -> Option<TreePath> {
        let node = self.index.get(endpoint_id)?;
        let chain = self.chains.get(endpoint_id)?;
        let Some(top) = chain.first() else {
            // Top-level device: a single-segment path of its wrapper name.
            return Some(TreePath::new(vec![top_names.get(endpoint_id)?.clone()]));
        };
        let mut segments = vec![top_names.get(top.id.as_str())?.clone()];
        segments.extend(
            chain[1..]
                .iter()
                .map(|n| self.graph.local_name(n).to_string()),
        );
        segments.push(self.graph.local_name(node).to_string());
        Some(TreePath::new(segments))
    }
}

/// No template tags anywhere: export one flat template with a leaf per host
/// (named by hostname) and every cable as a direct leaf-to-leaf connection.
/// Host ids follow the [`extract_hosts`] sorted order, which is also the
/// deployment descriptor's host order.
fn build_flat(
    graph: &VisualGraph,
) -> Result<(TemplateStore, GraphInstance, Vec<&VisualNode>), BuildError> {
    let hosts = extract_hosts(graph)?;
    if hosts.is_empty() {
        return Err(BuildError::NoDevices);
    }

    // One representative node per hostname, preferring records that carry a
    // location so deployment metadata survives duplicates.
    let mut by_hostname: HashMap<&str, &VisualNode> = HashMap::new();
    for node in &graph.nodes {
        if node.kind != NodeKind::Device {
            continue;
        }
        let slot = by_hostname.entry(graph.hostname_of(node)).or_insert(node);
        if slot.location.is_none() && node.location.is_some() {
            *slot = node;
        }
    }
    let devices: Vec<&VisualNode> = hosts
        .iter()
        .map(|(hostname, _)| by_hostname[hostname.as_str()])
        .collect();

    let mut template = Template::new(CANONICAL_ROOT_ID);
    let mut root = GraphInstance::new(CANONICAL_ROOT_ID);
    for (i, (hostname, device_type)) in hosts.iter().enumerate() {
        template.push_leaf(hostname.clone(), device_type.clone());
        root.add_host(hostname.clone(), HostId(i as u32));
    }

    let index = graph.index();
    for edge in &graph.edges {
        // Endpoint existence was verified by extract_hosts.
        let src = index[edge.source.as_str()];
        let dst = index[edge.target.as_str()];
        if src.kind != NodeKind::Device || dst.kind != NodeKind::Device {
            log::warn!(
                "edge {} - {} does not connect two devices; cable dropped",
                edge.source,
                edge.target
            );
            continue;
        }
        template.push_connection(
            edge.port_type.clone(),
            ConnectionDef::new(
                PortDef::new(
                    vec![graph.hostname_of(src).to_string()],
                    edge.source_tray,
                    edge.source_port,
                ),
                PortDef::new(
                    vec![graph.hostname_of(dst).to_string()],
                    edge.target_tray,
                    edge.target_port,
                ),
            ),
        );
    }

    let mut store = TemplateStore::new();
    store.insert(template);
    Ok((store, root, devices))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rackwire_desc::validate;

    use crate::connection::resolve_connections;
    use crate::hierarchy::Hierarchy;
    use crate::visual::VisualEdge;

    /// Two pods sharing one tag, each with a switch and two servers, plus a
    /// pod-to-pod spine cable.
    fn two_pod_graph() -> VisualGraph {
        let mut nodes = Vec::new();
        let mut edges = Vec::new();
        for pod in ["pod_0", "pod_1"] {
            nodes.push(VisualNode::container(pod, "pod"));
            nodes.push(VisualNode::device(format!("{pod}.sw"), "tor40").with_parent(pod));
            for i in 0..2 {
                nodes.push(VisualNode::device(format!("{pod}.srv_{i}"), "srv2u").with_parent(pod));
                edges.push(
                    VisualEdge::new(format!("{pod}.sw"), format!("{pod}.srv_{i}"), "ethernet")
                        .at(0, i as u32, 0, 0),
                );
            }
        }
        edges.push(VisualEdge::new("pod_0.sw", "pod_1.sw", "optical").at(1, 0, 1, 0));
        VisualGraph::new(nodes, edges)
    }

    #[test]
    fn repeated_tags_build_exactly_one_template() {
        let (store, root) = build_cluster(&two_pod_graph()).unwrap();
        // 'pod' once, plus the synthesized wrapper.
        assert_eq!(store.len(), 2);
        let pod = store.get("pod").unwrap();
        assert_eq!(pod.children.len(), 3);
        // Wiring sourced from pod_0 only: two ethernet cables, no leak of
        // pod_1's wiring, and no pod-to-pod cable inside the pod template.
        assert_eq!(pod.connection_count(), 2);
        assert!(pod.connections.contains_key("ethernet"));

        let wrapper = store.get(CANONICAL_ROOT_ID).unwrap();
        let names: Vec<&str> = wrapper.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["pod_0", "pod_1"]);
        assert!(wrapper.children.iter().all(|c| matches!(
            &c.kind,
            ChildKind::Graph { template } if template == "pod"
        )));
        // The spine cable lives in the wrapper, with paths reaching into the
        // pods.
        let optical = &wrapper.connections["optical"];
        assert_eq!(optical.len(), 1);
        assert_eq!(optical[0].a.path.to_string(), "pod_0.sw");
        assert_eq!(optical[0].b.path.to_string(), "pod_1.sw");

        assert_eq!(root.template, CANONICAL_ROOT_ID);
        validate(&store, &root).unwrap();
    }

    #[test]
    fn host_ids_are_contiguous_in_dfs_order() {
        let (store, root) = build_cluster(&two_pod_graph()).unwrap();
        let hierarchy = Hierarchy::resolve(&store, &root).unwrap();
        assert_eq!(hierarchy.len(), 6);
        // pod_0 first: sw, srv_0, srv_1 get 0,1,2; then pod_1.
        assert_eq!(
            hierarchy.host_id(&TreePath::from(["pod_0", "sw"])),
            Some(HostId(0))
        );
        assert_eq!(
            hierarchy.host_id(&TreePath::from(["pod_1", "srv_1"])),
            Some(HostId(5))
        );
    }

    #[test]
    fn resolved_connections_multiply_per_instance() {
        let (store, root) = build_cluster(&two_pod_graph()).unwrap();
        let hierarchy = Hierarchy::resolve(&store, &root).unwrap();
        let connections = resolve_connections(&store, &root, &hierarchy);
        // 2 ethernet x 2 pod instances + 1 spine.
        assert_eq!(connections.len(), 5);
        assert_eq!(
            connections
                .iter()
                .filter(|c| c.port_type == "ethernet")
                .count(),
            4
        );
    }

    #[test]
    fn canonical_root_is_used_without_wrapper() {
        let graph = VisualGraph::new(
            vec![
                VisualNode::container(CANONICAL_ROOT_ID, "cluster"),
                VisualNode::device("cluster.a", "srv2u").with_parent(CANONICAL_ROOT_ID),
                VisualNode::device("cluster.b", "srv2u").with_parent(CANONICAL_ROOT_ID),
            ],
            vec![VisualEdge::new("cluster.a", "cluster.b", "ethernet")],
        );
        let (store, root) = build_cluster(&graph).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(root.template, "cluster");
        assert_eq!(root.host("a"), Some(HostId(0)));
        assert_eq!(root.host("b"), Some(HostId(1)));
        assert_eq!(store.get("cluster").unwrap().connection_count(), 1);
    }

    #[test]
    fn empty_containers_are_discarded_and_never_referenced() {
        let graph = VisualGraph::new(
            vec![
                VisualNode::container("pod_0", "pod"),
                VisualNode::device("pod_0.sw", "tor40").with_parent("pod_0"),
                // Only physical children: logically empty.
                VisualNode::container("pod_0.shelfgrp", "shelfgrp").with_parent("pod_0"),
                VisualNode::physical("pod_0.shelfgrp.rack").with_parent("pod_0.shelfgrp"),
            ],
            vec![],
        );
        let (store, root) = build_cluster(&graph).unwrap();
        assert!(!store.contains("shelfgrp"));
        for template in store.iter() {
            for child in &template.children {
                if let ChildKind::Graph { template } = &child.kind {
                    assert_ne!(template, "shelfgrp");
                }
            }
        }
        validate(&store, &root).unwrap();
    }

    #[test]
    fn physical_subtrees_are_invisible_to_templates() {
        let graph = VisualGraph::new(
            vec![
                VisualNode::container("pod_0", "pod"),
                VisualNode::device("pod_0.sw", "tor40").with_parent("pod_0"),
                VisualNode::physical("pod_0.rack").with_parent("pod_0"),
            ],
            vec![],
        );
        let (store, _) = build_cluster(&graph).unwrap();
        let pod = store.get("pod").unwrap();
        assert_eq!(pod.children.len(), 1);
        assert_eq!(pod.children[0].name, "sw");
    }

    #[test]
    fn wrapper_indices_enumerate_repeated_tags() {
        let graph = VisualGraph::new(
            vec![
                VisualNode::container("east", "pod"),
                VisualNode::device("east.sw", "tor40").with_parent("east"),
                VisualNode::container("spine-block", "spine"),
                VisualNode::device("spine-block.sw", "tor40").with_parent("spine-block"),
                VisualNode::container("west", "pod"),
                VisualNode::device("west.sw", "tor40").with_parent("west"),
            ],
            vec![],
        );
        let (store, root) = build_cluster(&graph).unwrap();
        let wrapper = store.get(CANONICAL_ROOT_ID).unwrap();
        let names: Vec<&str> = wrapper.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["pod_0", "spine_0", "pod_1"]);
        assert!(root.sub("pod_1").is_some());
        validate(&store, &root).unwrap();
    }

    #[test]
    fn flat_export_matches_the_three_host_scenario() {
        // Hosts A,B,C with device types X,X,Y; one cable A.t1.p1 - B.t1.p1;
        // C unconnected.
        let graph = VisualGraph::new(
            vec![
                VisualNode::device("C", "Y"),
                VisualNode::device("A", "X"),
                VisualNode::device("B", "X"),
            ],
            vec![VisualEdge::new("A", "B", "ethernet").at(1, 1, 1, 1)],
        );
        let (store, root) = build_cluster(&graph).unwrap();
        assert_eq!(store.len(), 1);
        let flat = store.get(CANONICAL_ROOT_ID).unwrap();
        let children: Vec<(&str, &ChildKind)> = flat
            .children
            .iter()
            .map(|c| (c.name.as_str(), &c.kind))
            .collect();
        assert_eq!(children.len(), 3);
        assert_eq!(children[0].0, "A");
        assert_eq!(children[2].0, "C");

        assert_eq!(root.host("A"), Some(HostId(0)));
        assert_eq!(root.host("B"), Some(HostId(1)));
        assert_eq!(root.host("C"), Some(HostId(2)));

        let hierarchy = Hierarchy::resolve(&store, &root).unwrap();
        assert_eq!(hierarchy.len(), 3);
        let connections = resolve_connections(&store, &root, &hierarchy);
        assert_eq!(connections.len(), 1);
        assert_eq!(connections[0].a.host_id, HostId(0));
        assert_eq!(connections[0].b.host_id, HostId(1));
        assert_eq!((connections[0].a.tray, connections[0].a.port), (1, 1));
    }

    #[test]
    fn deployment_aligns_with_hierarchical_host_ids() {
        let graph = two_pod_graph();
        let (store, root) = build_cluster(&graph).unwrap();
        let hierarchy = Hierarchy::resolve(&store, &root).unwrap();
        let deployment = build_deployment(&graph).unwrap();
        assert_eq!(deployment.hosts.len(), hierarchy.len());
        // hosts[i] describes the leaf whose host id is i, not the
        // alphabetically i-th hostname.
        for record in hierarchy.records() {
            let host = &deployment.hosts[record.host_id.index()];
            assert_eq!(host.hostname, record.path.to_string());
            assert_eq!(host.device_type, record.device_type);
        }
    }

    #[test]
    fn empty_first_instance_defers_to_a_populated_sibling() {
        let graph = VisualGraph::new(
            vec![
                VisualNode::container("pod_0", "pod"),
                VisualNode::physical("pod_0.rack").with_parent("pod_0"),
                VisualNode::container("pod_1", "pod"),
                VisualNode::device("pod_1.sw", "tor40").with_parent("pod_1"),
            ],
            vec![],
        );
        let (store, root) = build_cluster(&graph).unwrap();
        // The tag's template comes from the populated sibling; the empty
        // instance gets no wrapper slot and no sub-instance at all, so the
        // result still validates.
        validate(&store, &root).unwrap();
        assert!(store.contains("pod"));
        let wrapper = store.get(CANONICAL_ROOT_ID).unwrap();
        let names: Vec<&str> = wrapper.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["pod_0"]);
        assert_eq!(root.sub("pod_0").unwrap().host("sw"), Some(HostId(0)));
    }

    #[test]
    fn sibling_instances_number_hosts_in_template_order() {
        let graph = VisualGraph::new(
            vec![
                VisualNode::container("pod_0", "pod"),
                VisualNode::device("pod_0.sw", "tor40").with_parent("pod_0"),
                VisualNode::device("pod_0.srv", "srv2u").with_parent("pod_0"),
                VisualNode::container("pod_1", "pod"),
                // Children listed in the opposite order; numbering must
                // follow the template's declaration order anyway.
                VisualNode::device("pod_1.srv", "srv2u").with_parent("pod_1"),
                VisualNode::device("pod_1.sw", "tor40").with_parent("pod_1"),
            ],
            vec![],
        );
        let (store, root) = build_cluster(&graph).unwrap();
        let hierarchy = Hierarchy::resolve(&store, &root).unwrap();
        assert_eq!(
            hierarchy.host_id(&TreePath::from(["pod_1", "sw"])),
            Some(HostId(2))
        );
        assert_eq!(
            hierarchy.host_id(&TreePath::from(["pod_1", "srv"])),
            Some(HostId(3))
        );
    }

    #[test]
    fn deployment_order_aligns_with_flat_host_ids() {
        let graph = VisualGraph::new(
            vec![
                VisualNode::device("C", "Y").with_location(crate::Location {
                    hall: "h1".into(),
                    aisle: "a2".into(),
                    rack: "r3".into(),
                    shelf_u: 17,
                }),
                VisualNode::device("A", "X"),
                VisualNode::device("B", "X"),
            ],
            vec![VisualEdge::new("A", "B", "ethernet")],
        );
        let (_, root) = build_cluster(&graph).unwrap();
        let deployment = build_deployment(&graph).unwrap();
        assert_eq!(deployment.hosts.len(), 3);
        for (hostname, id) in [("A", 0), ("B", 1), ("C", 2)] {
            assert_eq!(root.host(hostname), Some(HostId(id)));
            assert_eq!(deployment.hosts[id as usize].hostname, hostname);
        }
        assert_eq!(deployment.hosts[2].hall, "h1");
        assert_eq!(deployment.hosts[2].shelf_u, 17);
        assert_eq!(deployment.hosts[0].hall, "");
    }

    #[test]
    fn graphs_with_no_devices_are_rejected() {
        assert_eq!(
            build_cluster(&VisualGraph::default()).unwrap_err(),
            BuildError::NoDevices
        );

        let untagged_empty = VisualGraph::new(vec![VisualNode::physical("rack-1")], vec![]);
        assert_eq!(
            build_cluster(&untagged_empty).unwrap_err(),
            BuildError::NoDevices
        );

        // A canonical root whose subtree is all physical still has no hosts.
        let hollow_root = VisualGraph::new(
            vec![
                VisualNode::container(CANONICAL_ROOT_ID, "cluster"),
                VisualNode::physical("cluster.rack-1").with_parent(CANONICAL_ROOT_ID),
            ],
            vec![],
        );
        assert_eq!(
            build_cluster(&hollow_root).unwrap_err(),
            BuildError::NoDevices
        );
    }

    #[test]
    fn untagged_container_in_tagged_graph_is_fatal() {
        let graph = VisualGraph::new(
            vec![
                VisualNode::container("pod_0", "pod"),
                VisualNode::device("pod_0.sw", "tor40").with_parent("pod_0"),
                VisualNode {
                    template_tag: None,
                    ..VisualNode::container("bare", "x")
                },
            ],
            vec![],
        );
        assert_eq!(
            build_cluster(&graph).unwrap_err(),
            BuildError::UntaggedContainer { id: "bare".into() }
        );
    }
}
