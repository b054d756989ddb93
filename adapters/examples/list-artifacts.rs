//! List the artifacts of a remote registry.
//!
//! Reads a registry descriptor as JSON from the file named by the first
//! argument, then treats the remaining arguments as name filters:
//!
//! ```text
//! cargo run -p adapters --example list-artifacts -- registry.json 'library/*'
//! ```

use eyre::{Context, Report};
use registry_adapter::CancellationToken;
use registry_model::{Filter, Registry};
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_error::ErrorLayer::default())
        .init();

    let mut args = std::env::args().skip(1);
    let path = args
        .next()
        .ok_or_else(|| Report::msg("usage: list-artifacts <registry.json> [name filter...]"))?;
    let filters: Vec<Filter> = args.map(Filter::name).collect();

    let descriptor = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("reading {path}"))?;
    let registry: Registry = serde_json::from_str(&descriptor).context("parsing descriptor")?;

    let adapter = adapters::connect(&registry)?;
    let cancel = CancellationToken::new();

    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    println!("{:?}", adapter.health_check(&cancel).await?);

    let resources = adapter.fetch_artifacts(&filters, &cancel).await.map_err(|error| {
        eprintln!("{}", error.span_trace());
        error
    })?;
    println!("{}", serde_json::to_string_pretty(&resources)?);

    Ok(())
}
