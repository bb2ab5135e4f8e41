use anyhow::{Context, Result};
use serde::Deserialize;
use sidecar_config_controller_core::{Protection, TemplateEntity};
use std::path::Path;

/// A registered template: its selectors plus the raw text handed to the
/// rendering engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    pub entity: TemplateEntity,
    pub text: String,
}

/// The pool of registered templates.
///
/// Registration order is preserved and is the resolver's tie-break order:
/// among entities of equal specificity, the first registered wins.
/// Re-registering an entity (structural equality) replaces its text
/// wholesale, keeping its original position.
#[derive(Clone, Debug, Default)]
pub struct Registry {
    entries: Vec<Entry>,
}

/// One record of a template description document.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
enum Description {
    Namespace {
        #[serde(default)]
        namespace: Option<String>,
        #[serde(default)]
        protection: Option<Protection>,
        purpose: String,
        template: String,
    },
    ServiceColor {
        #[serde(default)]
        namespace: Option<String>,
        #[serde(default)]
        service: Option<String>,
        #[serde(default)]
        color: Option<String>,
        purpose: String,
        template: String,
    },
}

// === impl Registry ===

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a registry from a JSON description document: an array of
    /// template records, registered in document order.
    pub fn from_description_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading template descriptions from {}", path.display()))?;
        Self::from_description_json(&contents)
            .with_context(|| format!("parsing template descriptions from {}", path.display()))
    }

    pub fn from_description_json(json: &str) -> Result<Self> {
        let descriptions: Vec<Description> = serde_json::from_str(json)?;
        let mut registry = Self::new();
        for description in descriptions {
            let (entity, text) = description.into_parts();
            registry.register(entity, text);
        }
        Ok(registry)
    }

    /// Registers a template, replacing the text of a structurally-equal
    /// entity in place.
    pub fn register(&mut self, entity: TemplateEntity, text: impl Into<String>) {
        let text = text.into();
        match self.entries.iter_mut().find(|e| e.entity == entity) {
            Some(existing) => {
                tracing::debug!(?entity, "replacing registered template");
                existing.text = text;
            }
            None => self.entries.push(Entry { entity, text }),
        }
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Distinct purposes among namespace-flavor entities, in registration
    /// order.
    pub fn namespace_purposes(&self) -> Vec<&str> {
        self.purposes(|entity| matches!(entity, TemplateEntity::Namespace { .. }))
    }

    /// Distinct purposes among service/color-flavor entities, in
    /// registration order.
    pub fn service_color_purposes(&self) -> Vec<&str> {
        self.purposes(|entity| matches!(entity, TemplateEntity::ServiceColor { .. }))
    }

    fn purposes(&self, flavor: impl Fn(&TemplateEntity) -> bool) -> Vec<&str> {
        let mut purposes = Vec::new();
        for entry in &self.entries {
            if flavor(&entry.entity) && !purposes.contains(&entry.entity.purpose()) {
                purposes.push(entry.entity.purpose());
            }
        }
        purposes
    }
}

// === impl Description ===

impl Description {
    fn into_parts(self) -> (TemplateEntity, String) {
        match self {
            Self::Namespace {
                namespace,
                protection,
                purpose,
                template,
            } => (
                TemplateEntity::Namespace {
                    namespace,
                    protection,
                    purpose,
                },
                template,
            ),
            Self::ServiceColor {
                namespace,
                service,
                color,
                purpose,
                template,
            } => (
                TemplateEntity::ServiceColor {
                    namespace,
                    service,
                    color,
                    purpose,
                },
                template,
            ),
        }
    }
}
