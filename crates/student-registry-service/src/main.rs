use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use student_registry_api::StudentRegistryApi;
use student_registry_service::{app, ServiceState};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "student-registry-service")]
#[command(about = "HTTP service for the student registry")]
struct Args {
    #[arg(long, env = "STUDENT_REGISTRY_DB", default_value = "./student_registry.sqlite3")]
    db: PathBuf,
    #[arg(long, env = "STUDENT_REGISTRY_BIND", default_value = "127.0.0.1:5000")]
    bind: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let args = Args::parse();
    let api = StudentRegistryApi::new(args.db.clone());

    let report = api
        .store()
        .integrity_check()
        .with_context(|| format!("failed to open student store at {}", args.db.display()))?;
    if !report.quick_check_ok {
        warn!(message = %report.quick_check_message, "sqlite quick_check reported problems");
    }
    info!(
        db = %args.db.display(),
        students = report.student_count,
        schema_version = report.schema_status.current_version,
        "student store ready"
    );

    let listener = TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;
    info!("listening on {}", args.bind);

    axum::serve(listener, app(ServiceState::new(api)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server terminated unexpectedly")?;

    info!("server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("received Ctrl+C, shutting down"),
            Err(err) => {
                warn!("failed to install Ctrl+C handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("received terminate signal, shutting down");
            }
            Err(err) => {
                warn!("failed to install terminate handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
