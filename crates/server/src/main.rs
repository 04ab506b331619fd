use clap::Parser;
use fusedb_core::config;
use fusedb_core::engine::EngineHandle;
use fusedb_server::handlers::ServerState;
use fusedb_server::server::serve;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fusedb", about = "Multi-modal analytical database")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = config::DEFAULT_PORT)]
    port: u16,

    /// Data directory for the catalog checkpoint and index files
    #[arg(short, long, default_value = config::DEFAULT_DATA_DIR)]
    data_dir: String,

    /// Directory prefix for uploaded import files
    #[arg(long, default_value = config::DEFAULT_TEMP_DIR)]
    temp_dir: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(
                    "fusedb_server=info"
                        .parse()
                        .expect("valid directive literal"),
                )
                .add_directive(
                    "fusedb_core=info"
                        .parse()
                        .expect("valid directive literal"),
                ),
        )
        .init();

    let args = Args::parse();

    if args.port == 0 {
        eprintln!("Error: port must be > 0");
        std::process::exit(1);
    }
    let data_path = std::path::Path::new(&args.data_dir);
    if data_path.exists() && !data_path.is_dir() {
        eprintln!(
            "Error: data_dir '{}' exists but is not a directory",
            args.data_dir
        );
        std::process::exit(1);
    }

    let engine = EngineHandle::open(&args.data_dir).unwrap_or_else(|e| {
        eprintln!("Error: failed to open engine at '{}': {}", args.data_dir, e);
        std::process::exit(1);
    });

    let state = Arc::new(ServerState::new(engine.clone(), &args.temp_dir));
    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        port = args.port,
        data_dir = %args.data_dir,
        "fusedb ready"
    );

    tokio::select! {
        result = serve(listener, state) => {
            if let Err(e) = result {
                tracing::error!("server loop failed: {e}");
            }
        }
        _ = wait_for_signal() => {}
    }

    // Persist the catalog before exit so replay resumes exactly here.
    if let Err(e) = engine.save_catalog() {
        tracing::error!("catalog checkpoint on shutdown failed: {e}");
    } else {
        tracing::info!("catalog checkpoint written, shutting down");
    }

    Ok(())
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }

    tracing::info!("Shutting down gracefully...");
}
