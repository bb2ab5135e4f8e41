use serde::{Deserialize, Serialize};

/// Whether a namespace template renders the public-facing or mesh-internal
/// flavor of a gateway configuration.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protection {
    Public,
    Private,
}

/// A registered template's selectors. `None` fields are wildcards that match
/// any value; they are never literal sentinel strings.
///
/// Entities are immutable once registered and compare structurally.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TemplateEntity {
    Namespace {
        namespace: Option<String>,
        protection: Option<Protection>,
        purpose: String,
    },
    ServiceColor {
        namespace: Option<String>,
        service: Option<String>,
        color: Option<String>,
        purpose: String,
    },
}

/// The concrete context a template was resolved against.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MatchedContext {
    Namespace {
        namespace_id: String,
        protection: Protection,
    },
    ServiceColor {
        namespace_id: String,
        service: String,
        color: String,
    },
}

/// A resolution result: produced fresh per request, never persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchedTemplate {
    pub context: MatchedContext,
    pub purpose: String,
    pub entity: TemplateEntity,
    pub text: String,
}

// === impl Protection ===

impl std::str::FromStr for Protection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Self::Public),
            "private" => Ok(Self::Private),
            s => Err(format!("invalid protection: {s:?}")),
        }
    }
}

impl std::fmt::Display for Protection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Public => "public".fmt(f),
            Self::Private => "private".fmt(f),
        }
    }
}

// === impl TemplateEntity ===

impl TemplateEntity {
    pub fn purpose(&self) -> &str {
        match self {
            Self::Namespace { purpose, .. } => purpose,
            Self::ServiceColor { purpose, .. } => purpose,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protection_parses_displayed() {
        for protection in [Protection::Public, Protection::Private] {
            assert_eq!(
                protection.to_string().parse::<Protection>().unwrap(),
                protection,
                "failed to parse displayed {protection:?}"
            );
        }
        assert!("internal".parse::<Protection>().is_err());
    }

    #[test]
    fn entities_compare_structurally() {
        let a = TemplateEntity::ServiceColor {
            namespace: Some("n1".into()),
            service: None,
            color: None,
            purpose: "envoy".into(),
        };
        let b = TemplateEntity::ServiceColor {
            namespace: Some("n1".into()),
            service: None,
            color: None,
            purpose: "envoy".into(),
        };
        assert_eq!(a, b);
    }
}
