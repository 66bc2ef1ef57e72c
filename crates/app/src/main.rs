use anyhow::{Context as _, Result};
use axum::ServiceExt;
use billing::cache::ProductCache;
use billing::client::BillingClient;
use clap::{Parser, Subcommand};
use tower::Layer;
use tower_http::normalize_path::NormalizePathLayer;
use serve::middleware::GateContext;
use serve::remote::BillingBackend;
use serve::resolve::Resolver;
use serve::store::ContentStore;
use serve::templates::Templates;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use sync::product::Synchronizer;
use sync::upload::upload_downloadables;
use tracing_subscriber::EnvFilter;

mod config;
mod router;

/// Tollgate — paywall gate between markdown content and a billing provider.
#[derive(Debug, Parser)]
#[command(name = "tollgate", version)]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, default_value = "tollgate.toml")]
    config: PathBuf,

    /// Project root the content and state paths are relative to.
    #[arg(long, default_value = ".")]
    project_root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create/update remote products and benefits for all payable content.
    Sync,
    /// Upload declared download files, deduplicated by checksum.
    Upload,
    /// Serve the site with the paywall middleware in front.
    Serve {
        #[arg(long, default_value = "127.0.0.1:4321")]
        addr: SocketAddr,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let project_root = cli
        .project_root
        .canonicalize()
        .with_context(|| format!("resolve project root {}", cli.project_root.display()))?;
    let config = Arc::new(config::load_config(&project_root.join(&cli.config))?);

    let client = BillingClient::new(
        config.billing.effective_api_url(),
        &config.billing.access_token,
    )?;
    let cache = Arc::new(ProductCache::new());

    match cli.command {
        Commands::Sync => {
            let synchronizer = Synchronizer::new(&config, &client, cache);
            let outcome = synchronizer.sync_products(&project_root).await?;
            tracing::info!(synced = outcome.synced, "done");
        }
        Commands::Upload => {
            let summary = upload_downloadables(&config, &client, &project_root).await?;
            tracing::info!(
                uploaded = summary.uploaded,
                skipped = summary.skipped,
                reused = summary.reused,
                "done"
            );
        }
        Commands::Serve { addr } => {
            let content_root = project_root.join(&config.content_root);
            let store = Arc::new(ContentStore::scan(&content_root, &config.collections)?);
            let resolver = Arc::new(Resolver::new(config.clone(), store.clone()));
            let backend = Arc::new(BillingBackend::new(
                client,
                cache,
                config.billing.organization_id.clone(),
            ));

            let ctx = Arc::new(GateContext::new(
                config.clone(),
                resolver,
                backend,
                Arc::new(Templates::new()),
                None,
            ));
            let page_state = Arc::new(router::PageState {
                config: config.clone(),
                store,
            });

            let app = router::build(ctx, page_state);
            // trim trailing slashes before routing so `/blogs/post/` and
            // `/blogs/post` resolve identically
            let app = NormalizePathLayer::trim_trailing_slash().layer(app);

            let listener = tokio::net::TcpListener::bind(addr).await?;
            tracing::info!("listening on http://{}", listener.local_addr()?);
            axum::serve(listener, ServiceExt::into_make_service(app)).await?;
        }
    }

    Ok(())
}
