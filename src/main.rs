use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use gemini_cli_proxy::config::{load_startup_config, AppConfig};
use gemini_cli_proxy::observability::init_tracing;
use gemini_cli_proxy::routing::{dispatch_request, normalize_base_path};
use gemini_cli_proxy::state::AppState;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;

fn main() {
    let config = load_startup_config().unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {e}");
        eprintln!("See 'config.example.yaml' for the supported settings.");
        std::process::exit(1);
    });

    init_tracing(&config.features.log_level);
    let runtime = build_runtime(&config);

    runtime.block_on(async move {
        run(config).await;
    });
}

fn build_runtime(config: &AppConfig) -> tokio::runtime::Runtime {
    let worker_threads = config.server.runtime_worker_threads;
    let max_blocking_threads = config.server.runtime_max_blocking_threads;
    let thread_stack_size_kb = config.server.runtime_thread_stack_size_kb;
    let mut runtime_builder = if worker_threads == Some(1) {
        tokio::runtime::Builder::new_current_thread()
    } else {
        let mut builder = tokio::runtime::Builder::new_multi_thread();
        if let Some(threads) = worker_threads {
            builder.worker_threads(threads);
        }
        builder
    };
    runtime_builder.enable_all();
    if let Some(max_blocking_threads) = max_blocking_threads {
        runtime_builder.max_blocking_threads(max_blocking_threads);
    }
    if worker_threads != Some(1) {
        if let Some(thread_stack_size_kb) = thread_stack_size_kb {
            runtime_builder.thread_stack_size(thread_stack_size_kb * 1024);
        }
    }
    runtime_builder.build().unwrap_or_else(|e| {
        eprintln!("Failed to initialize Tokio runtime: {e}");
        std::process::exit(1);
    })
}

async fn run(config: AppConfig) {
    let host = config.server.host.clone();
    let port = config.server.port;
    let base_path = normalize_base_path(&config.server.base_path);

    tracing::info!(
        host = %host,
        port,
        base_path = %base_path,
        generator = %config.generator.binary,
        scratch_dir = %config.generator.scratch_dir.display(),
        "gemini-cli-proxy starting"
    );

    let state = Arc::new(AppState::new(config));
    let base_path = Arc::<str>::from(base_path);

    let listener = tokio::net::TcpListener::bind(format!("{host}:{port}"))
        .await
        .unwrap_or_else(|err| {
            eprintln!("Failed to bind to {host}:{port}: {err}");
            std::process::exit(1);
        });

    tracing::info!("gemini-cli-proxy is ready to accept connections");
    tokio::select! {
        () = serve_accept_loop(listener, state, base_path) => {}
        () = shutdown_signal() => {}
    }
    tracing::info!("gemini-cli-proxy stopped");
}

async fn serve_accept_loop(
    listener: tokio::net::TcpListener,
    state: Arc<AppState>,
    base_path: Arc<str>,
) {
    let conn_builder = AutoBuilder::new(TokioExecutor::new());
    loop {
        let (stream, remote_addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                tracing::warn!(error = %err, "accept failed");
                continue;
            }
        };
        if let Err(err) = stream.set_nodelay(true) {
            tracing::debug!(%remote_addr, error = %err, "TCP_NODELAY not enabled");
        }

        let conn_builder = conn_builder.clone();
        let state = Arc::clone(&state);
        let base_path = Arc::clone(&base_path);
        let service = service_fn(move |request: Request<Incoming>| {
            dispatch_request(
                Arc::clone(&state),
                Arc::clone(&base_path),
                request.map(Body::new),
            )
        });

        tokio::spawn(async move {
            if let Err(err) = conn_builder
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                tracing::debug!(%remote_addr, error = %err, "connection closed with error");
            }
        });
    }
}

/// Resolves on `SIGINT` or `SIGTERM`.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    tracing::info!("shutdown signal received");
}
