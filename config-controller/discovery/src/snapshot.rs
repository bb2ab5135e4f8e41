//! A discovery source backed by a JSON snapshot document.
//!
//! The snapshot holds the same shape the paginated API returns, fully
//! drained: namespaces, each with its services and their instance records.
//! `SnapshotSource::watching` re-reads the file on every query so changes
//! to the document show up on the next generation cycle.

use crate::api::{
    DiscoveryError, DiscoverySource, InstanceRecord, NamespaceRecord, ServiceRecord,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub namespaces: Vec<NamespaceEntry>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NamespaceEntry {
    pub id: String,
    #[serde(default)]
    pub arn: String,
    pub name: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub listen_port: Option<u16>,
    #[serde(default)]
    pub services: Vec<ServiceEntry>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ServiceEntry {
    pub id: String,
    #[serde(default)]
    pub arn: String,
    pub name: String,
    #[serde(default)]
    pub instances: Vec<InstanceEntry>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct InstanceEntry {
    pub id: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

#[derive(Clone, Debug)]
enum Backing {
    Fixed(Snapshot),
    File(PathBuf),
}

#[derive(Clone, Debug)]
pub struct SnapshotSource {
    backing: Backing,
}

// === impl SnapshotSource ===

impl SnapshotSource {
    /// A source over an in-memory snapshot that never changes.
    pub fn fixed(snapshot: Snapshot) -> Self {
        Self {
            backing: Backing::Fixed(snapshot),
        }
    }

    /// A source that re-reads the snapshot document on every query.
    pub fn watching(path: impl Into<PathBuf>) -> Self {
        Self {
            backing: Backing::File(path.into()),
        }
    }

    fn load(&self) -> Result<Snapshot, DiscoveryError> {
        match &self.backing {
            Backing::Fixed(snapshot) => Ok(snapshot.clone()),
            Backing::File(path) => {
                let contents = std::fs::read_to_string(path).map_err(|e| {
                    DiscoveryError::Transport(format!("reading {}: {e}", path.display()))
                })?;
                serde_json::from_str(&contents).map_err(|e| {
                    DiscoveryError::Transport(format!("parsing {}: {e}", path.display()))
                })
            }
        }
    }
}

#[async_trait]
impl DiscoverySource for SnapshotSource {
    async fn list_namespaces(&self) -> Result<Vec<NamespaceRecord>, DiscoveryError> {
        Ok(self
            .load()?
            .namespaces
            .into_iter()
            .map(|ns| NamespaceRecord {
                id: ns.id,
                arn: ns.arn,
                name: ns.name,
                kind: ns.kind,
                listen_port: ns.listen_port,
            })
            .collect())
    }

    async fn list_services(
        &self,
        namespace_id: &str,
    ) -> Result<Vec<ServiceRecord>, DiscoveryError> {
        let snapshot = self.load()?;
        let ns = snapshot
            .namespaces
            .into_iter()
            .find(|ns| ns.id == namespace_id)
            .ok_or(DiscoveryError::NotFound)?;
        Ok(ns
            .services
            .into_iter()
            .map(|svc| ServiceRecord {
                id: svc.id,
                arn: svc.arn,
                namespace_id: ns.id.clone(),
                name: svc.name,
            })
            .collect())
    }

    async fn list_instances(
        &self,
        service_id: &str,
    ) -> Result<Vec<InstanceRecord>, DiscoveryError> {
        let snapshot = self.load()?;
        for ns in snapshot.namespaces {
            if let Some(svc) = ns.services.into_iter().find(|svc| svc.id == service_id) {
                return Ok(svc
                    .instances
                    .into_iter()
                    .map(|i| InstanceRecord {
                        id: i.id,
                        attributes: i.attributes,
                    })
                    .collect());
            }
        }
        Err(DiscoveryError::NotFound)
    }

    async fn get_service(&self, service_id: &str) -> Result<ServiceRecord, DiscoveryError> {
        let snapshot = self.load()?;
        for ns in snapshot.namespaces {
            if let Some(svc) = ns.services.iter().find(|svc| svc.id == service_id) {
                return Ok(ServiceRecord {
                    id: svc.id.clone(),
                    arn: svc.arn.clone(),
                    namespace_id: ns.id.clone(),
                    name: svc.name.clone(),
                });
            }
        }
        Err(DiscoveryError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn nested_services_carry_their_namespace_id() {
        let snapshot: Snapshot = serde_json::from_value(serde_json::json!({
            "namespaces": [
                {"id": "n1", "name": "a", "services": [{"id": "s1", "name": "web"}]},
                {"id": "n2", "name": "b", "services": [{"id": "s2", "name": "api"}]}
            ]
        }))
        .unwrap();
        let source = SnapshotSource::fixed(snapshot);

        let services = source.list_services("n2").await.unwrap();
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].namespace_id, "n2");

        let svc = source.get_service("s1").await.unwrap();
        assert_eq!(svc.namespace_id, "n1");

        assert!(matches!(
            source.list_instances("missing").await,
            Err(DiscoveryError::NotFound)
        ));
    }
}
