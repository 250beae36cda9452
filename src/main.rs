use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use video_upload_service::config::PipelineConfig;
use video_upload_service::infrastructure::{database, storage, tools};
use video_upload_service::services::upload_pipeline::UploadPipeline;
use video_upload_service::services::video_store::SeaOrmVideoStore;
use video_upload_service::{AppState, create_app};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port for the API server
    #[arg(short, long, default_value_t = 3000)]
    port: u16,

    /// Use the in-memory object store and short deadlines
    #[arg(long)]
    dev: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Environment & logging
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "video_upload_service=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting Video Upload Service...");

    let config = if args.dev {
        PipelineConfig::development()
    } else if std::env::var("APP_ENV").is_ok_and(|v| v == "production") {
        PipelineConfig::production()
    } else {
        PipelineConfig::from_env()
    };
    info!(
        "🛡️  Pipeline Config: Max Size={}MB, Types={:?}, Presign={}s, Backend={:?}",
        config.max_upload_size / 1024 / 1024,
        config.allowed_video_types,
        config.presign_expiry_secs,
        config.storage_backend
    );

    tokio::fs::create_dir_all(&config.staging_dir)
        .await
        .with_context(|| format!("creating staging dir {}", config.staging_dir.display()))?;

    // 2. Infrastructure
    let db = database::setup_database().await?;
    let object_store = storage::setup_object_store(&config).await;
    let toolchain = tools::setup_toolchain(&config).await;

    let pipeline = Arc::new(UploadPipeline::new(
        config.clone(),
        toolchain,
        object_store,
        Arc::new(SeaOrmVideoStore::new(db.clone())),
    ));

    let state = AppState {
        db,
        pipeline,
        config,
    };

    // 3. HTTP
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
    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("✅ API Server listening on: http://0.0.0.0:{}", args.port);
    info!("📖 Swagger UI documentation: http://localhost:{}/swagger-ui", args.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("👋 Server exited cleanly.");
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
            Ok(mut sigterm) => {
                sigterm.recv().await;
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
            info!("⌨️  Ctrl+C received, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, initiating graceful shutdown...");
        },
    }
}
