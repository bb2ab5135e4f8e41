#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod aggregator;
mod api;
mod retry;
pub mod snapshot;

pub use self::aggregator::{Aggregator, DEFAULT_REFRESH_LIMIT};
pub use self::api::{
    DiscoveryError, DiscoverySource, InstanceRecord, NamespaceRecord, ServiceRecord,
};
pub use self::snapshot::{Snapshot, SnapshotSource};
