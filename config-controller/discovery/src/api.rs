use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

/// A namespace as returned by the discovery source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NamespaceRecord {
    pub id: String,
    pub arn: String,
    pub name: String,

    /// The namespace type reported by the source (e.g. a private-DNS or
    /// HTTP-only namespace).
    pub kind: String,

    /// The mesh listener port associated with the namespace, when the
    /// source carries one.
    pub listen_port: Option<u16>,
}

/// A service registration as returned by the discovery source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceRecord {
    pub id: String,
    pub arn: String,
    pub namespace_id: String,
    pub name: String,
}

/// A single instance registration: an id plus its raw attribute map.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstanceRecord {
    pub id: String,
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The queried entity does not exist (or no longer exists). Degraded to
    /// empty data by the aggregator, never fatal.
    #[error("entity not found")]
    NotFound,

    /// The source is rate-limiting. Retried with bounded attempts before
    /// becoming terminal for the call.
    #[error("request throttled by discovery source")]
    Throttled,

    /// Any other communication failure.
    #[error("discovery transport error: {0}")]
    Transport(String),
}

/// The external discovery API seam. List operations return the fully-drained
/// pagination; the transport's paging and its own retry policy live behind
/// this trait.
#[async_trait]
pub trait DiscoverySource {
    async fn list_namespaces(&self) -> Result<Vec<NamespaceRecord>, DiscoveryError>;

    async fn list_services(
        &self,
        namespace_id: &str,
    ) -> Result<Vec<ServiceRecord>, DiscoveryError>;

    async fn list_instances(
        &self,
        service_id: &str,
    ) -> Result<Vec<InstanceRecord>, DiscoveryError>;

    async fn get_service(&self, service_id: &str) -> Result<ServiceRecord, DiscoveryError>;
}

// === impl NamespaceRecord ===

impl From<NamespaceRecord> for sidecar_config_controller_core::Namespace {
    fn from(record: NamespaceRecord) -> Self {
        Self {
            id: record.id,
            arn: record.arn,
            name: record.name,
            kind: record.kind,
            listen_port: record.listen_port.unwrap_or(NamespaceRecord::DEFAULT_LISTEN_PORT),
            groups: Vec::new(),
            last_loaded: None,
        }
    }
}

impl NamespaceRecord {
    /// Listener port assumed for namespaces registered without one.
    pub const DEFAULT_LISTEN_PORT: u16 = 8080;
}

// === impl DiscoveryError ===

impl DiscoveryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    pub fn is_throttle(&self) -> bool {
        matches!(self, Self::Throttled)
    }

    /// Whether a reload failing with this error should clear a group that
    /// was previously known, rather than surface the failure.
    pub(crate) fn degrades_known_entity(&self) -> bool {
        matches!(self, Self::NotFound | Self::Transport(_))
    }
}
