use crate::builder::BuildError;
use serde_json::{json, Value};
use sidecar_config_controller_core::{MatchedContext, MatchedTemplate, ProxyConfig};

/// Flattens a proxy config into the render-context tree.
///
/// A config with no listeners cannot mean anything to a proxy, so asking for
/// its context is fatal rather than producing an empty document.
pub fn proxy_context(config: &ProxyConfig) -> Result<Value, BuildError> {
    if config.listeners.is_empty() {
        return Err(BuildError::NoListeners);
    }

    let listeners: Vec<Value> = config
        .listeners
        .iter()
        .map(|listener| {
            let routes: Vec<Value> = listener
                .routes
                .iter()
                .map(|route| {
                    let clusters: Vec<Value> = route
                        .cluster_weights
                        .iter()
                        .map(|(name, weight)| {
                            json!({"name": escaped(name), "weight": weight})
                        })
                        .collect();
                    json!({
                        "path": escaped(&route.path),
                        "private": route.is_private,
                        "total_weight": route.total_weight,
                        "clusters": clusters,
                    })
                })
                .collect();
            json!({
                "namespace": escaped(&listener.namespace_id),
                "port": listener.port,
                "route_count": listener.routes.len(),
                "routes": routes,
            })
        })
        .collect();

    let clusters: Vec<Value> = config
        .clusters
        .iter()
        .map(|cluster| {
            let endpoints: Vec<Value> = cluster
                .endpoints
                .iter()
                .map(|ep| json!({"host": escaped(&ep.host), "port": ep.port}))
                .collect();
            json!({
                "name": escaped(&cluster.name),
                "http2": cluster.uses_http2,
                "endpoints": endpoints,
            })
        })
        .collect();

    Ok(json!({"listeners": listeners, "clusters": clusters}))
}

/// Extends a base context with the identity a matched template was resolved
/// against, so templates can substitute their own scope.
pub fn match_context(base: &Value, matched: &MatchedTemplate) -> Value {
    let mut context = base.clone();
    if let Value::Object(map) = &mut context {
        match &matched.context {
            MatchedContext::Namespace {
                namespace_id,
                protection,
            } => {
                map.insert("namespace".into(), Value::String(escaped(namespace_id)));
                map.insert("protection".into(), Value::String(protection.to_string()));
            }
            MatchedContext::ServiceColor {
                namespace_id,
                service,
                color,
            } => {
                map.insert("namespace".into(), Value::String(escaped(namespace_id)));
                map.insert("service".into(), Value::String(escaped(service)));
                map.insert("color".into(), Value::String(escaped(color)));
            }
        }
        map.insert("purpose".into(), Value::String(escaped(&matched.purpose)));
    }
    context
}

/// Substituted values end up inside quoted strings of the rendered config,
/// so embedded quotes (and the escapes that could smuggle them) are escaped
/// here, once, for every string that enters the context.
fn escaped(s: &str) -> String {
    if !s.contains(['"', '\\']) {
        return s.to_string();
    }
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use sidecar_config_controller_core::{Cluster, Listener, Protection, Route, TemplateEntity};

    #[test]
    fn empty_listener_list_is_fatal() {
        let config = ProxyConfig::default();
        assert!(matches!(
            proxy_context(&config),
            Err(BuildError::NoListeners)
        ));
    }

    #[test]
    fn quotes_in_values_are_escaped() {
        let config = ProxyConfig {
            listeners: vec![Listener {
                namespace_id: "n1".into(),
                port: 100,
                routes: vec![Route::new(
                    "/a\"b",
                    false,
                    [("c".to_string(), 1)].into(),
                )],
            }],
            clusters: vec![Cluster::new("c", false, vec![])],
        };
        let context = proxy_context(&config).unwrap();
        assert_eq!(
            context["listeners"][0]["routes"][0]["path"],
            Value::String("/a\\\"b".into())
        );
    }

    #[test]
    fn match_context_adds_identity() {
        let base = json!({"listeners": []});
        let matched = MatchedTemplate {
            context: MatchedContext::Namespace {
                namespace_id: "n1".into(),
                protection: Protection::Public,
            },
            purpose: "gateway".into(),
            entity: TemplateEntity::Namespace {
                namespace: None,
                protection: None,
                purpose: "gateway".into(),
            },
            text: String::new(),
        };
        let context = match_context(&base, &matched);
        assert_eq!(context["namespace"], "n1");
        assert_eq!(context["protection"], "public");
        assert_eq!(context["purpose"], "gateway");
        assert_eq!(context["listeners"], json!([]));
    }
}
