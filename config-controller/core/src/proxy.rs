use std::collections::BTreeMap;

/// Host substituted when a cluster resolves with zero endpoints, so the
/// cluster is still representable downstream instead of disappearing.
pub const PLACEHOLDER_ENDPOINT_HOST: &str = "127.255.255.254";
pub const PLACEHOLDER_ENDPOINT_PORT: u16 = 9;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

/// A named upstream: one service/color group's reachable instances.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cluster {
    pub name: String,
    pub uses_http2: bool,
    pub endpoints: Vec<Endpoint>,
}

/// A weighted path route across one or more clusters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Route {
    pub path: String,
    pub is_private: bool,
    pub cluster_weights: BTreeMap<String, u32>,
    pub total_weight: u32,
}

/// One listener per namespace, on the namespace's configured port. A
/// listener with no routes is still emitted: downstream processes depend on
/// the listener existing at startup, before peer containers are ready.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Listener {
    pub namespace_id: String,
    pub port: u16,
    pub routes: Vec<Route>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProxyConfig {
    pub listeners: Vec<Listener>,
    pub clusters: Vec<Cluster>,
}

// === impl Endpoint ===

impl Endpoint {
    pub fn placeholder() -> Self {
        Self {
            host: PLACEHOLDER_ENDPOINT_HOST.to_string(),
            port: PLACEHOLDER_ENDPOINT_PORT,
        }
    }
}

// === impl Cluster ===

impl Cluster {
    /// Builds a cluster, substituting the placeholder endpoint when none
    /// resolved so the cluster never renders as nonexistent.
    pub fn new(name: impl Into<String>, uses_http2: bool, endpoints: Vec<Endpoint>) -> Self {
        let endpoints = if endpoints.is_empty() {
            vec![Endpoint::placeholder()]
        } else {
            endpoints
        };
        Self {
            name: name.into(),
            uses_http2,
            endpoints,
        }
    }
}

// === impl Route ===

impl Route {
    pub fn new(path: impl Into<String>, is_private: bool, cluster_weights: BTreeMap<String, u32>) -> Self {
        let total_weight = cluster_weights.values().sum();
        Self {
            path: path.into(),
            is_private,
            cluster_weights,
            total_weight,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_cluster_gets_placeholder_endpoint() {
        let cluster = Cluster::new("s1-c1", false, vec![]);
        assert_eq!(cluster.endpoints, vec![Endpoint::placeholder()]);
    }

    #[test]
    fn resolved_endpoints_are_kept() {
        let ep = Endpoint {
            host: "10.0.0.1".into(),
            port: 9080,
        };
        let cluster = Cluster::new("s1-c1", true, vec![ep.clone()]);
        assert_eq!(cluster.endpoints, vec![ep]);
    }

    #[test]
    fn route_totals_weights() {
        let route = Route::new(
            "/a",
            false,
            [("s1-c1".to_string(), 3), ("s1-c2".to_string(), 7)].into(),
        );
        assert_eq!(route.total_weight, 10);
    }
}
