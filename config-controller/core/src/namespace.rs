use crate::Instance;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

/// A service/color group: all instances registered under one discovery
/// service, plus the routing metadata carried by its settings record.
///
/// Reload mutates the group in place; a group whose backing service has
/// disappeared is cleared rather than left stale.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceColorGroup {
    pub namespace_id: String,
    pub service_id: String,

    /// The name the group was registered under in the discovery source.
    pub discovery_name: String,

    /// Service name from the settings record, when one was present.
    pub service_name: Option<String>,

    /// Color name from the settings record, when one was present.
    pub color_name: Option<String>,

    pub uses_http2: bool,

    /// Route path -> weight. Keys beginning with the private marker are
    /// mesh-internal.
    pub path_weights: BTreeMap<String, u32>,

    pub instances: Vec<Instance>,

    pub last_loaded: Option<DateTime<Utc>>,
}

/// A discovery namespace and the groups registered in it.
///
/// Reload replaces `groups` wholesale; a failed load clears the sequence
/// rather than leaving stale and fresh entries mixed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Namespace {
    pub id: String,
    pub arn: String,
    pub name: String,
    pub kind: String,
    pub listen_port: u16,
    pub groups: Vec<ServiceColorGroup>,
    pub last_loaded: Option<DateTime<Utc>>,
}

// === impl ServiceColorGroup ===

impl ServiceColorGroup {
    pub fn new(
        namespace_id: impl Into<String>,
        service_id: impl Into<String>,
        discovery_name: impl Into<String>,
    ) -> Self {
        Self {
            namespace_id: namespace_id.into(),
            service_id: service_id.into(),
            discovery_name: discovery_name.into(),
            service_name: None,
            color_name: None,
            uses_http2: false,
            path_weights: BTreeMap::new(),
            instances: Vec::new(),
            last_loaded: None,
        }
    }

    /// The service name used for cluster naming and template matching,
    /// falling back to the discovery registration name when the settings
    /// record did not carry one.
    pub fn service(&self) -> &str {
        self.service_name.as_deref().unwrap_or(&self.discovery_name)
    }

    /// The color used for cluster naming and template matching. Groups
    /// without an explicit color belong to the `default` color.
    pub fn color(&self) -> &str {
        self.color_name.as_deref().unwrap_or("default")
    }

    /// The port this group's instances serve on, taken from the first
    /// instance carrying a numeric port.
    pub fn primary_port(&self) -> Option<u16> {
        self.instances.iter().find_map(Instance::port_number)
    }

    /// Drops all reloadable state, keeping the group's identity. Used when
    /// the backing service has disappeared from the discovery source.
    pub fn clear(&mut self) {
        self.service_name = None;
        self.color_name = None;
        self.uses_http2 = false;
        self.path_weights.clear();
        self.instances.clear();
    }

    pub fn is_fresh(&self, limit: Duration, now: DateTime<Utc>) -> bool {
        self.last_loaded
            .map(|loaded| now - loaded < limit)
            .unwrap_or(false)
    }
}

// === impl Namespace ===

impl Namespace {
    pub fn is_fresh(&self, limit: Duration, now: DateTime<Utc>) -> bool {
        self.last_loaded
            .map(|loaded| now - loaded < limit)
            .unwrap_or(false)
    }
}
