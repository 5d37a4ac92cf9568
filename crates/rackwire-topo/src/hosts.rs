use std::collections::HashMap;

use itertools::Itertools;
use thiserror::Error;

use rackwire_desc::Symbol;

use crate::visual::{NodeKind, VisualGraph};

/// Fatal problems during host-list extraction. Any of these aborts the whole
/// export; hosts are never silently dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostExtractError {
    #[error("hostname '{hostname}' appears with conflicting device types '{first}' and '{second}'")]
    ConflictingDeviceType {
        hostname: Symbol,
        first: Symbol,
        second: Symbol,
    },
    #[error("edge references unknown node '{id}'")]
    UnknownEndpoint { id: Symbol },
    #[error("device node '{id}' carries no device type")]
    MissingDeviceType { id: Symbol },
}

/// Extract the authoritative `(hostname, device_type)` list of a visual
/// graph: sorted alphabetically by hostname, deduplicated with first
/// occurrence winning, connection-referenced devices taking precedence over
/// standalone unconnected nodes.
///
/// Both the flat exporter and the deployment exporter call exactly this
/// function; the resulting order is the cross-descriptor host-id contract,
/// so it must be byte-identical for identical input.
pub fn extract_hosts(graph: &VisualGraph) -> Result<Vec<(Symbol, Symbol)>, HostExtractError> {
    let index = graph.index();
    let mut seen: HashMap<Symbol, Symbol> = HashMap::new();

    let mut consider = |hostname: &str, device_type: &str| match seen.get(hostname) {
        None => {
            seen.insert(hostname.to_string(), device_type.to_string());
            Ok(())
        }
        Some(existing) if existing == device_type => Ok(()),
        Some(existing) => Err(HostExtractError::ConflictingDeviceType {
            hostname: hostname.to_string(),
            first: existing.clone(),
            second: device_type.to_string(),
        }),
    };

    // Connection endpoints first, so they win over standalone node records.
    for edge in &graph.edges {
        for id in [&edge.source, &edge.target] {
            let node = index
                .get(id.as_str())
                .ok_or_else(|| HostExtractError::UnknownEndpoint { id: id.clone() })?;
            if node.kind != NodeKind::Device {
                continue;
            }
            let device_type = node.device_type.as_deref().ok_or_else(|| {
                HostExtractError::MissingDeviceType {
                    id: node.id.clone(),
                }
            })?;
            consider(graph.hostname_of(node), device_type)?;
        }
    }

    for node in &graph.nodes {
        if node.kind != NodeKind::Device {
            continue;
        }
        let device_type = node.device_type.as_deref().ok_or_else(|| {
            HostExtractError::MissingDeviceType {
                id: node.id.clone(),
            }
        })?;
        consider(graph.hostname_of(node), device_type)?;
    }

    Ok(seen.into_iter().sorted().collect())
}
