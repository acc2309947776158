//! Auth SSO Server
//!
//! Production server for:
//! - Credential APIs: register, login, authorize
//! - Identity verification APIs: validations, documents, status
//! - Background verification worker (`identity:validate`)
//!
//! ## Configuration
//!
//! A TOML file located by `--config` or `CONFIG_PATH`, with `SSO_*`
//! environment overrides (see `sso-config`). `RUST_LOG` overrides the log level.

use anyhow::{Context, Result};
use clap::Parser;
use mongodb::bson::doc;
use std::sync::Arc;
use tokio::{net::TcpListener, signal, sync::broadcast, task::JoinHandle};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use sso_common::init_tracing;
use sso_config::{AppConfig, QueueBackend};
use sso_platform::api::{platform_router, ApiDoc, AuthState, IdentityState};
use sso_platform::repository::{
    indexes::ensure_indexes, ApplicationRepository, UserRepository, ValidationRepository,
};
use sso_platform::service::{
    Argon2Config, CredentialService, PasswordService, PermissionService, VerificationOrchestrator,
};
use sso_platform::tasks::{IdentityVerificationHandler, VerificationPipeline, TASK_IDENTIFIER};
use sso_queue::{ConsumerConfig, EmbeddedQueue, RedisQueue, TaskMux, TaskPublisher};

const REDIS_NAMESPACE: &str = "sso:tasks";

#[derive(Parser, Debug)]
#[command(name = "sso-server", about = "Auth SSO Server")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(long = "config", env = "CONFIG_PATH")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = AppConfig::load(&args.config)
        .with_context(|| format!("failed to load configuration from {}", args.config))?;

    init_tracing(config.env);
    info!(env = %config.env.as_str(), "Starting Auth SSO Server");

    // Connect to MongoDB
    info!(database = %config.database.database_name, "Connecting to MongoDB");
    let mongo_client = mongodb::Client::with_uri_str(&config.database.uri)
        .await
        .context("failed to create MongoDB client")?;
    let db = mongo_client.database(&config.database.database_name);
    db.run_command(doc! { "ping": 1 })
        .await
        .context("failed to reach MongoDB")?;
    ensure_indexes(&db).await.context("failed to ensure indexes")?;
    info!("Connected to MongoDB");

    // Repositories
    let users = Arc::new(UserRepository::new(&db));
    let apps = Arc::new(ApplicationRepository::new(&db));
    let validations = Arc::new(ValidationRepository::new(&db));

    // Services
    let passwords = PasswordService::new(&Argon2Config {
        memory_kib: config.password.memory_kib,
        iterations: config.password.iterations,
        parallelism: config.password.parallelism,
    })
    .context("invalid password hashing parameters")?;
    let credentials = CredentialService::new(
        users.clone(),
        users.clone(),
        apps,
        PermissionService::new(users.clone()),
        passwords,
        config.token_ttl(),
    );
    let pipeline = Arc::new(
        VerificationPipeline::from_names(config.verification.stages.as_slice())
            .context("invalid verification stages")?,
    );
    info!(stages = ?pipeline.stages(), "Verification pipeline configured");

    let mux = Arc::new(TaskMux::new().handle(
        TASK_IDENTIFIER,
        Arc::new(IdentityVerificationHandler::new(
            validations.clone(),
            validations.clone(),
            pipeline.clone(),
        )),
    ));

    // Work dispatcher
    let consumer_config = ConsumerConfig {
        concurrency: config.queue.concurrency,
        max_attempts: config.queue.max_attempts,
        retry_delay: config.retry_delay(),
        ..ConsumerConfig::default()
    };
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let (publisher, worker): (Arc<dyn TaskPublisher>, Option<JoinHandle<()>>) = match config.queue.backend {
        QueueBackend::Embedded => {
            let (queue, consumer) = EmbeddedQueue::new(consumer_config);
            let worker = if config.queue.run_worker {
                let shutdown = shutdown_tx.subscribe();
                Some(tokio::spawn(consumer.run(mux.clone(), shutdown)))
            } else {
                warn!("Embedded queue without a worker: submitted tasks will not be processed");
                None
            };
            (Arc::new(queue) as Arc<dyn TaskPublisher>, worker)
        }
        QueueBackend::Redis => {
            let queue = RedisQueue::connect(&config.redis.address, REDIS_NAMESPACE)
                .await
                .context("failed to connect to Redis")?;
            let worker = if config.queue.run_worker {
                let consumer = queue
                    .consumer(&config.redis.address, consumer_config)
                    .await
                    .context("failed to create Redis consumer")?;
                let recovered = consumer
                    .recover_in_flight()
                    .await
                    .context("failed to recover in-flight tasks")?;
                let pending = queue.pending_len().await.context("failed to read queue length")?;
                info!(recovered = recovered, pending = pending, "Redis queue ready");
                let shutdown = shutdown_tx.subscribe();
                Some(tokio::spawn(consumer.run(mux.clone(), shutdown)))
            } else {
                None
            };
            (Arc::new(queue) as Arc<dyn TaskPublisher>, worker)
        }
    };
    info!(queue = %publisher.identifier(), worker = worker.is_some(), "Work dispatcher started");

    let orchestrator = VerificationOrchestrator::new(
        users.clone(),
        validations.clone(),
        validations,
        publisher,
        pipeline,
    );

    // Build router
    let app = platform_router(
        AuthState {
            credentials: Arc::new(credentials),
        },
        IdentityState {
            orchestrator: Arc::new(orchestrator),
        },
    )
    .merge(SwaggerUi::new("/swagger-ui").url("/q/openapi", ApiDoc::openapi()))
    .layer(TimeoutLayer::new(config.request_timeout()))
    .layer(TraceLayer::new_for_http())
    .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any));

    // Start API server
    let api_addr = format!("0.0.0.0:{}", config.api.port);
    let listener = TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind {}", api_addr))?;
    info!("API server listening on http://{}", api_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("API server failed")?;
    info!("API server stopped, stopping worker...");

    // The worker finishes in-flight tasks before returning
    let _ = shutdown_tx.send(());
    if let Some(worker) = worker {
        if let Err(e) = worker.await {
            error!(error = %e, "Worker task failed");
        }
    }

    info!("Auth SSO Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
