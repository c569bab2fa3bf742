use clap::Parser;
use dotenvy::dotenv;
use shrlink_relay::config::RelayConfig;
use shrlink_relay::infrastructure::storage;
use shrlink_relay::{AppState, create_app};
use std::path::PathBuf;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about = "HTTP fallback relay for ShrLink", long_about = None)]
struct Args {
    /// Directory for uploaded files (overrides UPLOAD_DIR)
    #[arg(short, long)]
    upload_dir: Option<PathBuf>,

    /// Listen host (overrides BIND_HOST)
    #[arg(long)]
    host: Option<String>,

    /// Listen port (overrides BIND_PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Base URL used in download links (overrides PUBLIC_BASE_URL)
    #[arg(long)]
    public_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shrlink_relay=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting ShrLink relay...");

    let mut config = RelayConfig::from_env();
    if let Some(dir) = args.upload_dir {
        config.upload_dir = dir;
    }
    if let Some(host) = args.host {
        config.bind_host = host;
    }
    if let Some(port) = args.port {
        config.bind_port = port;
    }
    if let Some(url) = args.public_url {
        config.public_base_url = Some(url);
    }

    info!(
        "⚙️  Config: Max Size={}MB, Default Cleanup Age={}s, Public URL={}",
        config.max_file_size / 1024 / 1024,
        config.default_cleanup_age_secs,
        config.base_url()
    );

    let storage_service = storage::setup_storage(&config).await?;
    let addr = config.bind_addr()?;
    let state = AppState::new(storage_service, config);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &axum::http::Request<_>| {
            let request_id = request
                .headers()
                .get("x-request-id")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown");
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id,
            )
        })
        .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
            info!("📥 {} {}", request.method(), request.uri());
        })
        .on_response(
            |response: &axum::http::Response<_>,
             latency: std::time::Duration,
             _span: &tracing::Span| {
                info!(
                    "📤 Finished in {:?} with status {}",
                    latency,
                    response.status()
                );
            },
        );

    let app = create_app(state).layer(trace_layer);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("✅ Relay listening on http://{}", listener.local_addr()?);
    info!("📖 Swagger UI: http://{}/swagger-ui", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("🛑 Relay shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, starting graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, starting graceful shutdown...");
        },
    }
}
