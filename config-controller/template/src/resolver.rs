//! Specificity-ordered template resolution.
//!
//! For each request and each purpose present in the registry, every
//! registered entity of the matching flavor is evaluated against a strict
//! priority order; the lowest-numbered satisfied tier wins. Among entities
//! in the same tier, the first registered wins.

use crate::registry::{Entry, Registry};
use sidecar_config_controller_core::{MatchedContext, MatchedTemplate, Protection, TemplateEntity};
use thiserror::Error;

/// A concrete service/color runtime context to resolve templates for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceColorRequest {
    pub namespace_id: String,
    pub service_instance_id: String,
    pub service: String,
    pub color: String,
}

/// A concrete namespace runtime context to resolve templates for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NamespaceRequest {
    pub namespace_id: String,
    pub protection: Protection,
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no template matched purpose {purpose:?} for namespace {namespace:?} and no default exists")]
    NoMatch { namespace: String, purpose: String },
}

/// Resolves at most one service/color template per (request, purpose).
///
/// A purpose with no matching entity is silently omitted for that request.
pub fn resolve_service_color_templates(
    requests: &[ServiceColorRequest],
    registry: &Registry,
) -> Vec<MatchedTemplate> {
    let mut matched = Vec::new();
    for request in requests {
        for purpose in registry.service_color_purposes() {
            match best_entry(registry, purpose, |entity| {
                service_color_tier(entity, request)
            }) {
                Some(entry) => matched.push(MatchedTemplate {
                    context: MatchedContext::ServiceColor {
                        namespace_id: request.namespace_id.clone(),
                        service: request.service.clone(),
                        color: request.color.clone(),
                    },
                    purpose: purpose.to_string(),
                    entity: entry.entity.clone(),
                    text: entry.text.clone(),
                }),
                None => tracing::debug!(
                    namespace = %request.namespace_id,
                    service = %request.service,
                    color = %request.color,
                    purpose,
                    "no template matched, omitting purpose"
                ),
            }
        }
    }
    matched
}

/// Resolves exactly one namespace template per (request, purpose).
///
/// Unlike the service/color flavor, a purpose with no match at all is an
/// error: namespace rendering cannot proceed without a template and no
/// default exists to fall back to.
pub fn resolve_namespace_templates(
    requests: &[NamespaceRequest],
    registry: &Registry,
) -> Result<Vec<MatchedTemplate>, ResolveError> {
    let mut matched = Vec::new();
    for request in requests {
        for purpose in registry.namespace_purposes() {
            let entry = best_entry(registry, purpose, |entity| namespace_tier(entity, request))
                .ok_or_else(|| ResolveError::NoMatch {
                    namespace: request.namespace_id.clone(),
                    purpose: purpose.to_string(),
                })?;
            matched.push(MatchedTemplate {
                context: MatchedContext::Namespace {
                    namespace_id: request.namespace_id.clone(),
                    protection: request.protection,
                },
                purpose: purpose.to_string(),
                entity: entry.entity.clone(),
                text: entry.text.clone(),
            });
        }
    }
    Ok(matched)
}

/// Scans registration order; a strictly better tier displaces the current
/// best, so ties keep the first-registered entry.
fn best_entry<'r>(
    registry: &'r Registry,
    purpose: &str,
    tier: impl Fn(&TemplateEntity) -> Option<u8>,
) -> Option<&'r Entry> {
    let mut best: Option<(u8, &Entry)> = None;
    for entry in registry.entries() {
        if entry.entity.purpose() != purpose {
            continue;
        }
        if let Some(t) = tier(&entry.entity) {
            if best.map_or(true, |(b, _)| t < b) {
                best = Some((t, entry));
            }
        }
    }
    best.map(|(_, entry)| entry)
}

enum Selector {
    Exact,
    Wildcard,
}

fn selector<T: PartialEq>(field: &Option<T>, value: &T) -> Option<Selector> {
    match field {
        None => Some(Selector::Wildcard),
        Some(v) if v == value => Some(Selector::Exact),
        Some(_) => None,
    }
}

/// The service/color priority order. Lower is more specific. The
/// (namespace exact, service wildcard, color exact) shape satisfies no tier
/// and can never be selected.
fn service_color_tier(entity: &TemplateEntity, request: &ServiceColorRequest) -> Option<u8> {
    use Selector::{Exact, Wildcard};
    let TemplateEntity::ServiceColor {
        namespace,
        service,
        color,
        ..
    } = entity
    else {
        return None;
    };

    let ns = selector(namespace, &request.namespace_id)?;
    let svc = selector(service, &request.service)?;
    let color = selector(color, &request.color)?;
    match (ns, svc, color) {
        (Exact, Exact, Exact) => Some(1),
        (Exact, Exact, Wildcard) => Some(2),
        (Exact, Wildcard, Wildcard) => Some(3),
        (Wildcard, Exact, Exact) => Some(4),
        (Wildcard, Exact, Wildcard) => Some(5),
        (Wildcard, Wildcard, Exact) => Some(6),
        (Wildcard, Wildcard, Wildcard) => Some(7),
        (Exact, Wildcard, Exact) => None,
    }
}

/// The namespace priority order: exact namespace+protection, then exact
/// namespace, then exact protection, then the full default.
fn namespace_tier(entity: &TemplateEntity, request: &NamespaceRequest) -> Option<u8> {
    use Selector::{Exact, Wildcard};
    let TemplateEntity::Namespace {
        namespace,
        protection,
        ..
    } = entity
    else {
        return None;
    };

    let ns = selector(namespace, &request.namespace_id)?;
    let prot = selector(protection, &request.protection)?;
    match (ns, prot) {
        (Exact, Exact) => Some(1),
        (Exact, Wildcard) => Some(2),
        (Wildcard, Exact) => Some(3),
        (Wildcard, Wildcard) => Some(4),
    }
}
