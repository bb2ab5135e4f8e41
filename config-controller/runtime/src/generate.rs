//! The generation/commit loop.
//!
//! `IDLE -> GENERATING -> (COMMITTING | SLEEPING) -> IDLE`, with `STOPPING`
//! entered when the stop sentinel is observed at the top of the loop. An
//! in-flight cycle always completes before a stop is honored.

use crate::store::{Committed, DocumentStore, Fetched};
use anyhow::{Context, Result};
use sidecar_config_controller_core::{
    MatchedContext, MatchedTemplate, Namespace, Protection, ServiceColorGroup,
};
use sidecar_config_controller_discovery::{Aggregator, DiscoverySource};
use sidecar_config_controller_render::{build_input, match_context, Renderer};
use sidecar_config_controller_template::{
    resolve_namespace_templates, resolve_service_color_templates, NamespaceRequest, Registry,
    ServiceColorRequest,
};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::sync::watch;
use tokio::time::{self, Duration};
use tracing::{debug, info, info_span, warn, Instrument};

/// Rendered documents by name. One of these is the unit of comparison and
/// commit for a whole cycle.
pub type GeneratedMap = BTreeMap<String, String>;

/// Whether a newly generated map needs committing at all. Byte-for-byte
/// identical output is an idempotent no-op.
pub fn is_generated_map_different(current: &GeneratedMap, last: &GeneratedMap) -> bool {
    current != last
}

#[derive(Clone, Debug)]
pub struct LoopSettings {
    pub refresh_interval: Duration,
    pub failure_interval: Duration,
    pub exit_on_failure: bool,

    /// Presence of this file requests a stop; checked only at loop top.
    pub stop_file: PathBuf,

    /// Namespaces to render; all discovered namespaces when empty.
    pub namespace_names: Vec<String>,

    /// The local sidecar's own service id; gateway mode when unset.
    pub local_service_id: Option<String>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum State {
    Idle,
    Generating,
    Committing,
    Sleeping,
    Stopping,
}

pub struct GenerationLoop<S, R, D> {
    aggregator: Aggregator<S>,
    registry: Registry,
    renderer: R,
    store: D,
    settings: LoopSettings,

    /// The namespace model carried across cycles so the aggregator's
    /// refresh-limit cache has something to be fresh about.
    model: Vec<Namespace>,

    /// Output as of the last successful commit; the comparison baseline.
    last_committed: GeneratedMap,

    ready: watch::Sender<bool>,
}

// === impl GenerationLoop ===

impl<S, R, D> GenerationLoop<S, R, D>
where
    S: DiscoverySource,
    R: Renderer,
    D: DocumentStore,
{
    pub fn new(
        aggregator: Aggregator<S>,
        registry: Registry,
        renderer: R,
        store: D,
        settings: LoopSettings,
    ) -> (Self, watch::Receiver<bool>) {
        let (ready, ready_rx) = watch::channel(false);
        (
            Self {
                aggregator,
                registry,
                renderer,
                store,
                settings,
                model: Vec::new(),
                last_committed: GeneratedMap::new(),
                ready,
            },
            ready_rx,
        )
    }

    pub async fn run(mut self) -> Result<()> {
        loop {
            self.transition(State::Idle);
            if self.stop_requested() {
                self.transition(State::Stopping);
                info!(stop_file = %self.settings.stop_file.display(), "stop requested");
                return Ok(());
            }

            let outcome = self.cycle().instrument(info_span!("cycle")).await;
            match outcome {
                Ok(committed) => {
                    self.ready.send_replace(true);
                    if committed {
                        info!("configuration committed");
                    } else {
                        debug!("configuration unchanged");
                    }
                    self.transition(State::Sleeping);
                    time::sleep(self.settings.refresh_interval).await;
                }
                Err(error) => {
                    if self.settings.exit_on_failure {
                        return Err(error.context("generation cycle failed"));
                    }
                    warn!(error = format_args!("{error:#}"), "generation cycle failed, will retry");
                    self.transition(State::Sleeping);
                    time::sleep(self.settings.failure_interval).await;
                }
            }
        }
    }

    /// One full generation: refresh the model, render every matched
    /// template, and commit whatever changed. Returns whether anything was
    /// committed.
    pub async fn cycle(&mut self) -> Result<bool> {
        self.transition(State::Generating);
        let generated = self.generate().await?;

        if !is_generated_map_different(&generated, &self.last_committed) {
            return Ok(false);
        }

        self.transition(State::Committing);
        for (name, contents) in &generated {
            if self.last_committed.get(name) == Some(contents) {
                continue;
            }
            // With no baseline yet (first cycle after a restart), the store
            // may already hold this exact document.
            if self.last_committed.is_empty() {
                match self.store.fetch_document(name, Some(contents)).await {
                    Ok(Fetched::NotModified) => {
                        debug!(document = %name, "store already current, skipping commit");
                        continue;
                    }
                    Ok(_) => {}
                    Err(error) => {
                        debug!(document = %name, %error, "pre-commit fetch failed, committing anyway");
                    }
                }
            }
            let outcome = self
                .store
                .commit_document(name, contents)
                .await
                .with_context(|| format!("committing {name:?}"))?;
            match outcome {
                Committed::Committed => debug!(document = %name, "committed"),
                Committed::Unchanged => debug!(document = %name, "store already current"),
                Committed::NoDataYet => warn!(document = %name, "store has no data yet"),
            }
        }
        self.last_committed = generated;
        Ok(true)
    }

    async fn generate(&mut self) -> Result<GeneratedMap> {
        self.refresh_model()
            .await
            .context("refreshing namespace model")?;

        let input = build_input(
            &self.aggregator,
            std::mem::take(&mut self.model),
            self.settings.local_service_id.as_deref(),
            false,
        )
        .await
        .context("building proxy input")?;

        let base = input.render_context().context("deriving render context")?;
        let mut generated = GeneratedMap::new();

        let requests: Vec<NamespaceRequest> = input
            .namespaces
            .iter()
            .map(|ns| NamespaceRequest {
                namespace_id: ns.id.clone(),
                // The local namespace renders the mesh-internal flavor;
                // everything else is public-facing.
                protection: if self.is_local_namespace(&input.local, ns) {
                    Protection::Private
                } else {
                    Protection::Public
                },
            })
            .collect();
        let matches = resolve_namespace_templates(&requests, &self.registry)
            .context("resolving namespace templates")?;
        for matched in &matches {
            self.render_into(&mut generated, &base, matched)?;
        }

        if let Some(local) = &input.local {
            let request = ServiceColorRequest {
                namespace_id: local.namespace_id.clone(),
                service_instance_id: local.service_id.clone(),
                service: local.service().to_string(),
                color: local.color().to_string(),
            };
            for matched in resolve_service_color_templates(&[request], &self.registry) {
                self.render_into(&mut generated, &base, &matched)?;
            }
        }

        self.model = input.namespaces;
        Ok(generated)
    }

    fn render_into(
        &self,
        generated: &mut GeneratedMap,
        base: &serde_json::Value,
        matched: &MatchedTemplate,
    ) -> Result<()> {
        let context = match_context(base, matched);
        let rendered = self
            .renderer
            .render(&matched.text, &context)
            .map_err(anyhow::Error::from)
            .with_context(|| format!("rendering {:?}", matched.purpose))?;
        generated.insert(document_name(matched), rendered);
        Ok(())
    }

    async fn refresh_model(&mut self) -> Result<()> {
        let records = self
            .aggregator
            .list_namespace_records(&self.settings.namespace_names)
            .await?;

        self.model.retain(|ns| {
            let keep = records.iter().any(|r| r.id == ns.id);
            if !keep {
                debug!(namespace = %ns.id, "namespace no longer discovered, dropping");
            }
            keep
        });
        for record in records {
            if !self.model.iter().any(|ns| ns.id == record.id) {
                self.model.push(record.into());
            }
        }
        Ok(())
    }

    fn is_local_namespace(&self, local: &Option<ServiceColorGroup>, ns: &Namespace) -> bool {
        local
            .as_ref()
            .map(|l| l.namespace_id == ns.id)
            .unwrap_or(false)
    }

    fn stop_requested(&self) -> bool {
        self.settings.stop_file.exists()
    }

    fn transition(&self, state: State) {
        debug!(?state, "state transition");
    }
}

/// Stable document naming: one document per matched template.
fn document_name(matched: &MatchedTemplate) -> String {
    match &matched.context {
        MatchedContext::Namespace {
            namespace_id,
            protection,
        } => format!("{}-{}-{}", matched.purpose, namespace_id, protection),
        MatchedContext::ServiceColor {
            namespace_id,
            service,
            color,
        } => format!("{}-{}-{}-{}", matched.purpose, namespace_id, service, color),
    }
}
