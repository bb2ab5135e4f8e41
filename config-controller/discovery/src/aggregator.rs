use crate::{
    api::{DiscoveryError, DiscoverySource, InstanceRecord, NamespaceRecord},
    retry::with_throttle_retry,
};
use chrono::{Duration, Utc};
use sidecar_config_controller_core::{attr, Instance, Namespace, ServiceColorGroup};
use std::collections::BTreeMap;

/// How long a loaded namespace or group is served from cache before a
/// non-forced load goes back to the source.
pub const DEFAULT_REFRESH_LIMIT: std::time::Duration = std::time::Duration::from_secs(120);

/// Port assumed for instance records registered without one.
const DEFAULT_INSTANCE_PORT: &str = "80";

/// Turns raw discovery query results into the normalized in-memory model:
/// namespaces, service/color groups, instances, and per-group path-weight
/// tables.
///
/// The source handle is injected at construction; the aggregator holds no
/// process-global state.
pub struct Aggregator<S> {
    source: S,
    refresh_limit: Duration,
}

// === impl Aggregator ===

impl<S: DiscoverySource> Aggregator<S> {
    pub fn new(source: S, refresh_limit: std::time::Duration) -> Self {
        Self {
            source,
            refresh_limit: Duration::from_std(refresh_limit).unwrap_or(Duration::MAX),
        }
    }

    /// Lists namespace records, optionally filtered to the given names.
    pub async fn list_namespace_records(
        &self,
        names: &[String],
    ) -> Result<Vec<NamespaceRecord>, DiscoveryError> {
        let records = with_throttle_retry("list_namespaces", || self.source.list_namespaces())
            .await?;
        Ok(records
            .into_iter()
            .filter(|r| names.is_empty() || names.iter().any(|n| *n == r.name))
            .collect())
    }

    /// Fetches a single namespace by id and eagerly loads its groups.
    pub async fn get_namespace(&self, namespace_id: &str) -> Result<Namespace, DiscoveryError> {
        let record = self
            .list_namespace_records(&[])
            .await?
            .into_iter()
            .find(|r| r.id == namespace_id)
            .ok_or(DiscoveryError::NotFound)?;
        let mut ns = Namespace::from(record);
        self.load_namespace(&mut ns, true).await?;
        Ok(ns)
    }

    /// Reloads a namespace's group list wholesale, eagerly force-loading
    /// each group's instances. Skipped when the namespace is still fresh and
    /// `force` is not set. On failure the group list is cleared so stale and
    /// fresh data are never mixed.
    pub async fn load_namespace(
        &self,
        ns: &mut Namespace,
        force: bool,
    ) -> Result<(), DiscoveryError> {
        if !force && ns.is_fresh(self.refresh_limit, Utc::now()) {
            tracing::debug!(namespace = %ns.id, "namespace cache is fresh, skipping load");
            return Ok(());
        }

        let loaded = self.load_groups(ns).await;
        match loaded {
            Ok(groups) => {
                ns.groups = groups;
                ns.last_loaded = Some(Utc::now());
                Ok(())
            }
            Err(error) => {
                ns.groups.clear();
                ns.last_loaded = None;
                Err(error)
            }
        }
    }

    async fn load_groups(&self, ns: &Namespace) -> Result<Vec<ServiceColorGroup>, DiscoveryError> {
        let services =
            with_throttle_retry("list_services", || self.source.list_services(&ns.id)).await?;

        let mut groups = Vec::with_capacity(services.len());
        for service in services {
            if service.namespace_id != ns.id {
                continue;
            }
            let mut group = ServiceColorGroup::new(ns.id.clone(), service.id, service.name);
            self.load_group(&mut group, true).await?;
            groups.push(group);
        }
        Ok(groups)
    }

    /// Reloads a group's instances and settings in place. Skipped when the
    /// group is still fresh and `force` is not set.
    ///
    /// A group that was previously known and has disappeared from the source
    /// (or cannot be reached) is cleared rather than left looking valid.
    pub async fn load_group(
        &self,
        group: &mut ServiceColorGroup,
        force: bool,
    ) -> Result<(), DiscoveryError> {
        if !force && group.is_fresh(self.refresh_limit, Utc::now()) {
            tracing::debug!(service = %group.service_id, "group cache is fresh, skipping load");
            return Ok(());
        }

        let fetched = with_throttle_retry("list_instances", || {
            self.source.list_instances(&group.service_id)
        })
        .await;
        let records = match fetched {
            Ok(records) => records,
            Err(error) if group.last_loaded.is_some() && error.degrades_known_entity() => {
                tracing::warn!(
                    %error,
                    service = %group.service_id,
                    "group unavailable, clearing instances and path weights"
                );
                group.clear();
                group.last_loaded = Some(Utc::now());
                return Ok(());
            }
            Err(error) => return Err(error),
        };

        group.clear();
        for record in records {
            if record.id == sidecar_config_controller_core::SETTINGS_INSTANCE_ID {
                apply_settings(group, &record.attributes);
            } else {
                group.instances.push(instance_from_record(record));
            }
        }
        group.last_loaded = Some(Utc::now());
        Ok(())
    }

    /// Looks up the group a service id belongs to and loads it. Used to
    /// resolve a local sidecar's own identity.
    pub async fn find_group(&self, service_id: &str) -> Result<ServiceColorGroup, DiscoveryError> {
        let service =
            with_throttle_retry("get_service", || self.source.get_service(service_id)).await?;
        let mut group = ServiceColorGroup::new(service.namespace_id, service.id, service.name);
        self.load_group(&mut group, true).await?;
        Ok(group)
    }
}

fn apply_settings(group: &mut ServiceColorGroup, attributes: &BTreeMap<String, String>) {
    for (key, value) in attributes {
        match key.as_str() {
            attr::SERVICE_NAME => group.service_name = Some(value.clone()),
            attr::COLOR_NAME => group.color_name = Some(value.clone()),
            attr::USES_HTTP2 => group.uses_http2 = attr::is_affirmative(value),
            key if attr::is_standard(key) => {}
            path => {
                let weight = value.parse().unwrap_or_else(|_| {
                    tracing::warn!(
                        service = %group.service_id,
                        path,
                        value = %value,
                        "malformed path weight, defaulting to 1"
                    );
                    1
                });
                group.path_weights.insert(path.to_string(), weight);
            }
        }
    }
}

fn instance_from_record(record: InstanceRecord) -> Instance {
    let ipv4 = record.attributes.get(attr::INSTANCE_IPV4).cloned();
    let ec2_instance_id = record.attributes.get(attr::EC2_INSTANCE_ID).cloned();
    let port = match record.attributes.get(attr::INSTANCE_PORT) {
        Some(port) => port.clone(),
        None => {
            tracing::warn!(
                instance = %record.id,
                "instance registered without a port, defaulting to {DEFAULT_INSTANCE_PORT}"
            );
            DEFAULT_INSTANCE_PORT.to_string()
        }
    };
    Instance {
        id: record.id,
        ipv4,
        port,
        ec2_instance_id,
        attributes: record.attributes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ServiceRecord;
    use crate::snapshot::{Snapshot, SnapshotSource};
    use async_trait::async_trait;
    use maplit::btreemap;
    use sidecar_config_controller_core::SETTINGS_INSTANCE_ID;
    use std::sync::Mutex;

    fn snapshot() -> Snapshot {
        serde_json::from_value(serde_json::json!({
            "namespaces": [{
                "id": "n1",
                "arn": "arn:n1",
                "name": "mesh.local",
                "kind": "private",
                "listen_port": 100,
                "services": [{
                    "id": "s1",
                    "arn": "arn:s1",
                    "name": "web-blue",
                    "instances": [
                        {
                            "id": SETTINGS_INSTANCE_ID,
                            "attributes": {
                                "SERVICE_NAME": "web",
                                "COLOR_NAME": "blue",
                                "USES_HTTP2": "Yes",
                                "/a": "5",
                                "/b": "not-a-number",
                                "?/internal": "2"
                            }
                        },
                        {
                            "id": "i1",
                            "attributes": {
                                "INSTANCE_IPV4": "10.0.0.1",
                                "INSTANCE_PORT": "9080"
                            }
                        },
                        {
                            "id": "i2",
                            "attributes": {"INSTANCE_IPV4": "10.0.0.2"}
                        }
                    ]
                }]
            }]
        }))
        .unwrap()
    }

    fn aggregator(snapshot: Snapshot) -> Aggregator<SnapshotSource> {
        Aggregator::new(SnapshotSource::fixed(snapshot), DEFAULT_REFRESH_LIMIT)
    }

    #[tokio::test]
    async fn group_reload_parses_settings_record() {
        let agg = aggregator(snapshot());
        let group = agg.find_group("s1").await.unwrap();

        assert_eq!(group.service_name.as_deref(), Some("web"));
        assert_eq!(group.color_name.as_deref(), Some("blue"));
        assert!(group.uses_http2);
        assert_eq!(group.path_weights["/a"], 5);
        assert_eq!(group.path_weights["?/internal"], 2);
        assert_eq!(group.instances.len(), 2);
        assert_eq!(group.instances[0].port, "9080");
        // Registered without a port.
        assert_eq!(group.instances[1].port, "80");
    }

    #[tokio::test]
    async fn malformed_weight_coerces_to_one() {
        let agg = aggregator(snapshot());
        let group = agg.find_group("s1").await.unwrap();
        assert_eq!(group.path_weights["/b"], 1);
    }

    #[tokio::test]
    async fn namespace_reload_replaces_groups_wholesale() {
        let agg = aggregator(snapshot());
        let mut ns = agg.get_namespace("n1").await.unwrap();
        assert_eq!(ns.listen_port, 100);
        assert_eq!(ns.groups.len(), 1);

        // Stale entries do not survive a reload of an emptied namespace.
        ns.groups.push(ServiceColorGroup::new("n1", "ghost", "ghost"));
        agg.load_namespace(&mut ns, true).await.unwrap();
        assert_eq!(ns.groups.len(), 1);
        assert_eq!(ns.groups[0].service_id, "s1");
    }

    #[tokio::test]
    async fn fresh_group_skips_reload() {
        let agg = aggregator(snapshot());
        let mut group = agg.find_group("s1").await.unwrap();

        // Mutate local state; a fresh non-forced load must not touch it.
        group.path_weights.insert("/sentinel".into(), 9);
        agg.load_group(&mut group, false).await.unwrap();
        assert_eq!(group.path_weights["/sentinel"], 9);

        // A forced load goes back to the source.
        agg.load_group(&mut group, true).await.unwrap();
        assert!(!group.path_weights.contains_key("/sentinel"));
    }

    #[tokio::test]
    async fn vanished_group_clears_but_keeps_identity() {
        let agg = aggregator(snapshot());
        let mut group = agg.find_group("s1").await.unwrap();
        assert!(!group.instances.is_empty());

        // The service disappears from the source.
        let agg = aggregator(serde_json::from_value(serde_json::json!({"namespaces": []})).unwrap());
        agg.load_group(&mut group, true).await.unwrap();
        assert!(group.instances.is_empty());
        assert!(group.path_weights.is_empty());
        assert_eq!(group.service_id, "s1");
        assert_eq!(group.discovery_name, "web-blue");
    }

    #[tokio::test]
    async fn never_loaded_group_surfaces_not_found() {
        let agg = aggregator(serde_json::from_value(serde_json::json!({"namespaces": []})).unwrap());
        let mut group = ServiceColorGroup::new("n1", "missing", "missing");
        let result = agg.load_group(&mut group, true).await;
        assert!(matches!(result, Err(DiscoveryError::NotFound)));
    }

    struct ThrottlingSource {
        throttles: Mutex<u32>,
        inner: SnapshotSource,
    }

    #[async_trait]
    impl DiscoverySource for ThrottlingSource {
        async fn list_namespaces(&self) -> Result<Vec<NamespaceRecord>, DiscoveryError> {
            self.inner.list_namespaces().await
        }

        async fn list_services(
            &self,
            namespace_id: &str,
        ) -> Result<Vec<ServiceRecord>, DiscoveryError> {
            self.inner.list_services(namespace_id).await
        }

        async fn list_instances(
            &self,
            service_id: &str,
        ) -> Result<Vec<InstanceRecord>, DiscoveryError> {
            {
                let mut remaining = self.throttles.lock().unwrap();
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(DiscoveryError::Throttled);
                }
            }
            self.inner.list_instances(service_id).await
        }

        async fn get_service(&self, service_id: &str) -> Result<ServiceRecord, DiscoveryError> {
            self.inner.get_service(service_id).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn throttled_reload_retries_then_succeeds() {
        let source = ThrottlingSource {
            throttles: Mutex::new(2),
            inner: SnapshotSource::fixed(snapshot()),
        };
        let agg = Aggregator::new(source, DEFAULT_REFRESH_LIMIT);
        let group = agg.find_group("s1").await.unwrap();
        assert_eq!(group.instances.len(), 2);
    }

    #[test]
    fn settings_http2_flag_defaults_false() {
        let mut group = ServiceColorGroup::new("n1", "s1", "web-blue");
        apply_settings(
            &mut group,
            &btreemap! {
                "USES_HTTP2".to_string() => "nope".to_string(),
            },
        );
        assert!(!group.uses_http2);
    }
}
