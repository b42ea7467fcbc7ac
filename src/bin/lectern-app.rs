use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use lectern::app::config::Backends;
use lectern::app::server::{AppState, DEFAULT_MAX_BODY_BYTES, RouterOptions, router};
use lectern::assembler::{Assembler, AssemblyOptions, OverviewPointsMode};
use lectern::assets::{AssetUploader, DEFAULT_MAX_CONCURRENT_UPLOADS};
use lectern::catalog::CatalogService;
use lectern::users::UserService;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct AppArgs {
    #[arg(long, default_value = "127.0.0.1:8080")]
    addr: SocketAddr,

    #[arg(long, default_value = "lectern-data")]
    data_dir: PathBuf,

    /// Largest accepted request body (files travel base64-encoded inside JSON).
    #[arg(long, default_value_t = DEFAULT_MAX_BODY_BYTES)]
    max_upload_bytes: usize,

    #[arg(long, default_value_t = DEFAULT_MAX_CONCURRENT_UPLOADS)]
    max_concurrent_uploads: usize,

    #[arg(long, value_enum, default_value_t = OverviewPointsMode::Objects)]
    overview_points: OverviewPointsMode,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return std::process::ExitCode::FAILURE;
    }
    std::process::ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    lectern::logging::init("info")?;

    let args = AppArgs::parse();
    tracing::info!(?args, "starting lectern-app");

    let backends = Backends::from_env(&args.data_dir)?;
    let uploader =
        AssetUploader::with_max_concurrency(backends.objects, args.max_concurrent_uploads);
    let assembler = Assembler::new(
        uploader.clone(),
        AssemblyOptions {
            overview_points: args.overview_points,
        },
    );
    let state = AppState {
        catalog: CatalogService::new(backends.documents.clone(), assembler),
        users: UserService::new(backends.documents, uploader),
    };
    let options = RouterOptions {
        max_body_bytes: args.max_upload_bytes,
        objects_dir: backends.local_objects.map(|store| store.objects_dir()),
    };
    let app = router(state, options);

    let listener = tokio::net::TcpListener::bind(args.addr)
        .await
        .map_err(|err| anyhow::anyhow!("bind {}: {err}", args.addr))?;
    tracing::info!(addr = %args.addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(?err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
