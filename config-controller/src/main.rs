#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    sidecar_config_controller_runtime::Args::parse_and_run().await
}
