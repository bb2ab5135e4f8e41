#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod attr;
pub mod instance;
pub mod namespace;
pub mod proxy;
pub mod template;

pub use self::instance::Instance;
pub use self::namespace::{Namespace, ServiceColorGroup};
pub use self::proxy::{Cluster, Endpoint, Listener, ProxyConfig, Route};
pub use self::template::{MatchedContext, MatchedTemplate, Protection, TemplateEntity};

/// Instance id reserved for the per-group settings record.
///
/// A record with this id carries group metadata (service name, color name,
/// protocol flag, path weights) rather than a reachable endpoint.
pub const SETTINGS_INSTANCE_ID: &str = "reserved-settings";

/// Route paths beginning with this marker are mesh-internal and must never be
/// exposed on a non-local listener.
pub const PRIVATE_PATH_MARKER: char = '?';
