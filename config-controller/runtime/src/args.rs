use crate::{
    admin,
    generate::{GenerationLoop, LoopSettings},
    store::{DocumentStore, ExecStore, FsStore, StoreError},
};
use anyhow::{Context, Result};
use clap::Parser;
use sidecar_config_controller_discovery::{Aggregator, DiscoverySource, SnapshotSource};
use sidecar_config_controller_render::VarRenderer;
use sidecar_config_controller_template::Registry;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::time::Duration;
use tracing::error;
use tracing_subscriber::{prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[clap(
    name = "sidecar-config-controller",
    about = "Renders sidecar proxy configuration from service-discovery data"
)]
pub struct Args {
    #[clap(
        long,
        default_value = "sidecar_config_controller=info,warn",
        env = "SIDECAR_CONFIG_CONTROLLER_LOG"
    )]
    log_level: String,

    #[clap(
        long,
        default_value = "0.0.0.0:9901",
        env = "SIDECAR_CONFIG_CONTROLLER_ADMIN_ADDR"
    )]
    admin_addr: SocketAddr,

    /// Discovery snapshot document, re-read every cycle.
    #[clap(long, env = "SIDECAR_CONFIG_CONTROLLER_DISCOVERY_SNAPSHOT")]
    discovery_snapshot: PathBuf,

    /// Template description document.
    #[clap(long, env = "SIDECAR_CONFIG_CONTROLLER_TEMPLATES")]
    templates: PathBuf,

    /// Namespaces to render; all discovered namespaces when empty.
    #[clap(
        long = "namespace",
        env = "SIDECAR_CONFIG_CONTROLLER_NAMESPACES",
        value_delimiter = ','
    )]
    namespaces: Vec<String>,

    /// The local sidecar's own service id; gateway mode when unset.
    #[clap(long, env = "SIDECAR_CONFIG_CONTROLLER_LOCAL_SERVICE_ID")]
    local_service_id: Option<String>,

    /// Seconds to sleep after a successful cycle.
    #[clap(long, default_value = "30", env = "SIDECAR_CONFIG_CONTROLLER_REFRESH_INTERVAL")]
    refresh_interval: u64,

    /// Seconds to sleep after a failed cycle before retrying.
    #[clap(long, default_value = "60", env = "SIDECAR_CONFIG_CONTROLLER_FAILURE_INTERVAL")]
    failure_interval: u64,

    /// Seconds a loaded namespace or group is served from cache.
    #[clap(long, default_value = "120", env = "SIDECAR_CONFIG_CONTROLLER_CACHE_LIMIT")]
    cache_limit: u64,

    /// Exit with the failing code instead of sleeping and retrying.
    #[clap(long, env = "SIDECAR_CONFIG_CONTROLLER_EXIT_ON_FAILURE")]
    exit_on_failure: bool,

    /// Directory rendered documents are atomically published into.
    #[clap(long, default_value = "./out", env = "SIDECAR_CONFIG_CONTROLLER_OUTPUT_DIR")]
    output_dir: PathBuf,

    /// Handoff command to commit documents through, instead of the output
    /// directory.
    #[clap(long, env = "SIDECAR_CONFIG_CONTROLLER_HANDOFF_COMMAND")]
    handoff_command: Option<PathBuf>,

    /// Presence of this file requests a stop at the next loop top.
    #[clap(long, default_value = "./stop", env = "SIDECAR_CONFIG_CONTROLLER_STOP_FILE")]
    stop_file: PathBuf,
}

// === impl Args ===

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            admin_addr,
            discovery_snapshot,
            templates,
            namespaces,
            local_service_id,
            refresh_interval,
            failure_interval,
            cache_limit,
            exit_on_failure,
            output_dir,
            handoff_command,
            stop_file,
        } = self;

        tracing_subscriber::registry()
            .with(EnvFilter::try_new(&log_level).context("invalid log level")?)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .context("failed to initialize logging")?;

        let registry = Registry::from_description_file(&templates)?;
        let aggregator = Aggregator::new(
            SnapshotSource::watching(&discovery_snapshot),
            Duration::from_secs(cache_limit),
        );
        let settings = LoopSettings {
            refresh_interval: Duration::from_secs(refresh_interval),
            failure_interval: Duration::from_secs(failure_interval),
            exit_on_failure,
            stop_file,
            namespace_names: namespaces,
            local_service_id,
        };

        let result = match handoff_command {
            Some(command) => {
                serve(aggregator, registry, ExecStore::new(command), settings, admin_addr).await
            }
            None => {
                serve(aggregator, registry, FsStore::new(output_dir), settings, admin_addr).await
            }
        };

        if let Err(error) = result {
            // An exit-on-failure handoff error carries the handoff's own
            // exit code out of the process.
            let code = error
                .chain()
                .find_map(|cause| match cause.downcast_ref::<StoreError>() {
                    Some(StoreError::Failed(code)) => Some(*code),
                    _ => None,
                })
                .unwrap_or(1);
            error!(error = format_args!("{error:#}"), code, "exiting on failure");
            std::process::exit(code);
        }
        Ok(())
    }
}

async fn serve<S, D>(
    aggregator: Aggregator<S>,
    registry: Registry,
    store: D,
    settings: LoopSettings,
    admin_addr: SocketAddr,
) -> Result<()>
where
    S: DiscoverySource,
    D: DocumentStore,
{
    let (generation, ready) =
        GenerationLoop::new(aggregator, registry, VarRenderer, store, settings);

    tokio::spawn(async move {
        if let Err(error) = admin::serve(admin_addr, ready).await {
            error!(%error, "admin server failed");
        }
    });

    generation.run().await
}
