use serde_json::Value;
use sidecar_config_controller_core::{
    Cluster, Endpoint, Listener, Namespace, ProxyConfig, Route, ServiceColorGroup,
    PRIVATE_PATH_MARKER,
};
use sidecar_config_controller_discovery::{Aggregator, DiscoveryError, DiscoverySource};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    /// A proxy config with no listeners is meaningless; nothing downstream
    /// can recover from it.
    #[error("proxy config has no listeners")]
    NoListeners,

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
}

/// Everything one generation cycle needs from discovery: the refreshed
/// namespace set, the resolved local group (when running as a sidecar), and
/// the proxy config derived from both.
#[derive(Clone, Debug)]
pub struct ProxyInput {
    pub namespaces: Vec<Namespace>,
    pub local: Option<ServiceColorGroup>,
    pub config: ProxyConfig,
}

// === impl ProxyInput ===

impl ProxyInput {
    pub fn render_context(&self) -> Result<Value, BuildError> {
        crate::context::proxy_context(&self.config)
    }
}

/// Builds the proxy input for a target identity.
///
/// With a local identity (a non-gateway sidecar), the identity's own group
/// is force-loaded to discover its namespace/service/color; its namespace is
/// fetched and appended when not already present. Every namespace is then
/// (re)loaded through the aggregator's cache; `force_refresh` bypasses it.
pub async fn build_input<S: DiscoverySource>(
    aggregator: &Aggregator<S>,
    mut namespaces: Vec<Namespace>,
    local_service_id: Option<&str>,
    force_refresh: bool,
) -> Result<ProxyInput, BuildError> {
    let local = match local_service_id {
        Some(service_id) => {
            let group = aggregator.find_group(service_id).await?;
            if !namespaces.iter().any(|ns| ns.id == group.namespace_id) {
                tracing::debug!(
                    namespace = %group.namespace_id,
                    "local service's namespace not in configured set, appending"
                );
                namespaces.push(aggregator.get_namespace(&group.namespace_id).await?);
            }
            Some(group)
        }
        None => None,
    };

    for ns in &mut namespaces {
        aggregator.load_namespace(ns, force_refresh).await?;
    }

    let config = build_config(&namespaces, local.as_ref())?;
    Ok(ProxyInput {
        namespaces,
        local,
        config,
    })
}

/// Derives listeners, routes, and clusters from the aggregated model.
fn build_config(
    namespaces: &[Namespace],
    local: Option<&ServiceColorGroup>,
) -> Result<ProxyConfig, BuildError> {
    let mut listeners = Vec::with_capacity(namespaces.len());
    let mut clusters: BTreeMap<String, Cluster> = BTreeMap::new();

    for ns in namespaces {
        // Private routes are only exposed on the listener of the namespace
        // the local service itself lives in.
        let private_context = local.map(|l| l.namespace_id == ns.id).unwrap_or(false);

        let included: Vec<&ServiceColorGroup> = ns
            .groups
            .iter()
            .filter(|group| {
                // Self-routing is forbidden: the local group must never
                // appear as a cluster in its own sidecar config.
                if local.map(|l| l.service_id == group.service_id).unwrap_or(false) {
                    return false;
                }
                // A group with no path weights contributes no route, so it
                // contributes no cluster either.
                !group.path_weights.is_empty()
            })
            .collect();

        let names = cluster_names(&included);
        let mut paths: BTreeMap<String, BTreeMap<String, u32>> = BTreeMap::new();
        for (group, name) in included.iter().zip(&names) {
            clusters
                .entry(name.clone())
                .and_modify(|cluster| {
                    cluster.uses_http2 |= group.uses_http2;
                    cluster.endpoints.extend(endpoints(group));
                })
                .or_insert_with(|| Cluster::new(name.clone(), group.uses_http2, endpoints(group)));

            for (path, weight) in &group.path_weights {
                *paths
                    .entry(path.clone())
                    .or_default()
                    .entry(name.clone())
                    .or_insert(0) += weight;
            }
        }

        let routes = paths
            .into_iter()
            .filter_map(|(path, weights)| {
                let is_private = path.starts_with(PRIVATE_PATH_MARKER);
                if is_private && !private_context {
                    tracing::debug!(namespace = %ns.id, %path, "dropping private route");
                    return None;
                }
                if weights.is_empty() {
                    return None;
                }
                let path = path
                    .strip_prefix(PRIVATE_PATH_MARKER)
                    .map(str::to_string)
                    .unwrap_or(path);
                Some(Route::new(path, is_private, weights))
            })
            .collect();

        // Emitted even with zero routes: the proxy depends on the listener
        // existing at startup, before peer containers come up.
        listeners.push(Listener {
            namespace_id: ns.id.clone(),
            port: ns.listen_port,
            routes,
        });
    }

    if listeners.is_empty() {
        return Err(BuildError::NoListeners);
    }

    Ok(ProxyConfig {
        listeners,
        clusters: clusters.into_values().collect(),
    })
}

/// Resolves one cluster name per group. Names are `{service}-{color}`;
/// groups sharing that name on different ports are all disambiguated with a
/// port suffix. Groups sharing both name and port merge into one cluster.
fn cluster_names(groups: &[&ServiceColorGroup]) -> Vec<String> {
    let mut ports_by_base: BTreeMap<String, Vec<Option<u16>>> = BTreeMap::new();
    for group in groups {
        ports_by_base
            .entry(base_name(group))
            .or_default()
            .push(group.primary_port());
    }

    groups
        .iter()
        .map(|group| {
            let base = base_name(group);
            let ports = &ports_by_base[&base];
            let distinct = {
                let mut seen: Vec<Option<u16>> = Vec::new();
                for port in ports {
                    if !seen.contains(port) {
                        seen.push(*port);
                    }
                }
                seen.len()
            };
            if distinct > 1 {
                let port = group.primary_port().unwrap_or(0);
                format!("{base}-{port}")
            } else {
                base
            }
        })
        .collect()
}

fn base_name(group: &ServiceColorGroup) -> String {
    format!("{}-{}", group.service(), group.color())
}

fn endpoints(group: &ServiceColorGroup) -> Vec<Endpoint> {
    group
        .instances
        .iter()
        .filter_map(|instance| match (instance.host(), instance.port_number()) {
            (Some(host), Some(port)) => Some(Endpoint {
                host: host.to_string(),
                port,
            }),
            _ => {
                tracing::warn!(
                    instance = %instance.id,
                    "instance has no dialable address, skipping endpoint"
                );
                None
            }
        })
        .collect()
}
