mod core;
mod features;
mod modules;
mod shared;

use crate::core::config::Config;
use crate::core::openapi::{ApiDoc, SwaggerInfoModifier};
use crate::core::{database, middleware};
use crate::features::activity_logs::{routes as logs_routes, ActivityLogService};
use crate::features::admin_ui::{routes as admin_ui_routes, AdminPageService};
use crate::features::auth;
use crate::features::auth::routes as auth_routes;
use crate::features::cleanup::{routes as cleanup_routes, CleanupService, CleanupWorker};
use crate::features::downloads::routes as downloads_routes;
use crate::features::downloads::{DownloadService, DownloadTokenSigner};
use crate::features::files::{routes as files_routes, FileRepository, FileService, UploadService};
use crate::features::settings::{routes as settings_routes, Settings, SettingsService};
use crate::features::tasks::{routes as tasks_routes, ChunkProcessor, TaskService};
use crate::modules::crypto::{parse_master_key, MetadataCipher};
use crate::modules::resources::ResourceProfile;
use axum::extract::DefaultBodyLimit;
use axum::{middleware::from_fn, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::Modify;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

fn main() -> anyhow::Result<()> {
    // Build Tokio runtime with configurable worker threads
    let worker_threads = std::env::var("TOKIO_WORKER_THREADS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|p| p.get())
                .unwrap_or(4)
        });

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .max_blocking_threads(worker_threads * 4)
        .enable_all()
        .build()?;

    runtime.block_on(async_main(worker_threads))
}

async fn async_main(worker_threads: usize) -> anyhow::Result<()> {
    // Load .env file BEFORE initializing logger so RUST_LOG is available
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env().map_err(|e| anyhow::anyhow!(e))?;

    tracing::info!(
        "System info: tokio_worker_threads={}, pid={}",
        worker_threads,
        std::process::id()
    );
    tracing::info!("Configuration loaded successfully");

    // Create database connection pool
    let pool = database::create_pool(&config.database).await?;
    tracing::info!("Database connection pool created");

    // Run migrations automatically
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;
    tracing::info!("Database migrations completed successfully");

    // Older schemas may lack the submission linkage columns
    let has_submission_columns =
        database::column_exists(&pool, "secure_files", "submission_id").await?;
    if !has_submission_columns {
        tracing::warn!("secure_files has no submission columns; submission lookups are disabled");
    }
    let file_repository = Arc::new(FileRepository::new(pool.clone(), has_submission_columns));

    // Initialize auth
    let jwt_validator = Arc::new(auth::JwtValidator::new(&config.auth));
    tracing::info!("Auth configuration initialized");

    // Settings are cached in memory and refreshed on save
    let default_upload_dir = config.storage.default_upload_dir.display().to_string();
    let settings_service = Arc::new(
        SettingsService::load(
            pool.clone(),
            Settings::defaults(default_upload_dir.clone()),
            Arc::clone(&file_repository),
        )
        .await
        .map_err(|e| anyhow::anyhow!("Failed to load settings: {}", e))?,
    );
    tracing::info!("Settings service initialized");

    // Key material
    let current_key = parse_master_key(&config.security.cipher_key)
        .map_err(|e| anyhow::anyhow!("Invalid CIPHER_KEY: {}", e))?;
    let previous_key = config
        .security
        .cipher_key_previous
        .as_deref()
        .map(parse_master_key)
        .transpose()
        .map_err(|e| anyhow::anyhow!("Invalid CIPHER_KEY_PREVIOUS: {}", e))?;
    if previous_key.is_some() {
        tracing::info!("Previous cipher key configured; old download references stay valid");
    }
    let metadata_cipher = Arc::new(MetadataCipher::new(current_key, previous_key));
    let token_signer = Arc::new(
        DownloadTokenSigner::new(
            config.security.download_token_secret.as_bytes(),
            config.security.download_token_lifetime,
        )
        .map_err(|e| anyhow::anyhow!("Invalid DOWNLOAD_TOKEN_SECRET: {}", e))?,
    );

    let activity_log_service = Arc::new(ActivityLogService::new(pool.clone()));
    let task_service = Arc::new(TaskService::new(pool.clone()));
    let resource_profile = ResourceProfile::detect(&config.processing);

    let download_service = Arc::new(DownloadService::new(
        Arc::clone(&file_repository),
        Arc::clone(&settings_service),
        Arc::clone(&activity_log_service),
        token_signer,
        metadata_cipher,
        config.app.public_base_url.clone(),
    ));
    tracing::info!("Download service initialized");

    let chunk_processor = Arc::new(ChunkProcessor::new(
        Arc::clone(&task_service),
        Arc::clone(&file_repository),
        Arc::clone(&activity_log_service),
        Arc::clone(&download_service),
        resource_profile,
    ));

    let upload_service = Arc::new(UploadService::new(
        Arc::clone(&file_repository),
        Arc::clone(&settings_service),
        Arc::clone(&activity_log_service),
        Arc::clone(&download_service),
        Arc::clone(&chunk_processor),
        config.storage.incoming_dir.clone(),
    ));
    let file_service = Arc::new(FileService::new(
        Arc::clone(&file_repository),
        Arc::clone(&settings_service),
        Arc::clone(&download_service),
    ));
    tracing::info!("Upload and file services initialized");

    let cleanup_service = Arc::new(CleanupService::new(
        Arc::clone(&file_repository),
        Arc::clone(&task_service),
        Arc::clone(&settings_service),
        Arc::clone(&activity_log_service),
        &config.processing,
    ));

    // Spawn background cleanup worker
    let cleanup_worker = CleanupWorker::new(Arc::clone(&cleanup_service));
    tokio::spawn(async move {
        cleanup_worker.run().await;
    });
    tracing::info!("Cleanup worker spawned");

    let admin_page_service = Arc::new(AdminPageService::new(
        Arc::clone(&settings_service),
        Arc::clone(&file_service),
        Arc::clone(&activity_log_service),
        default_upload_dir,
        config.app.public_base_url.clone(),
    ));

    // Build application router with dynamic swagger config
    let swagger_modifier = SwaggerInfoModifier {
        title: config.swagger.title.clone(),
        version: config.swagger.version.clone(),
        description: config.swagger.description.clone(),
    };
    let mut openapi = ApiDoc::openapi();
    swagger_modifier.modify(&mut openapi);

    // Build swagger router
    let swagger = if let Some(credentials) = config.swagger.credentials() {
        tracing::info!("Swagger UI basic auth enabled");
        Router::new()
            .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi))
            .layer(from_fn(middleware::basic_auth_middleware(Arc::new(
                credentials,
            ))))
    } else {
        tracing::info!("Swagger UI basic auth disabled (no credentials configured)");
        Router::new().merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi))
    };

    // Protected routes (require JWT authentication)
    let protected_routes = Router::new()
        .merge(auth_routes::protected_routes(Arc::clone(&settings_service)))
        .merge(files_routes::routes(
            Arc::clone(&upload_service),
            Arc::clone(&file_service),
        ))
        .merge(downloads_routes::protected_routes(Arc::clone(
            &download_service,
        )))
        .merge(tasks_routes::routes(
            Arc::clone(&task_service),
            Arc::clone(&chunk_processor),
        ))
        .merge(settings_routes::routes(
            Arc::clone(&settings_service),
            Arc::clone(&activity_log_service),
        ))
        .merge(cleanup_routes::routes(Arc::clone(&cleanup_service)))
        .merge(logs_routes::routes(Arc::clone(&activity_log_service)))
        .merge(admin_ui_routes::routes(admin_page_service))
        .route_layer(axum::middleware::from_fn_with_state(
            jwt_validator.clone(),
            middleware::auth_middleware,
        ));

    // Download links work for anonymous callers when the configured roles allow it
    let download_routes = downloads_routes::public_routes(download_service).route_layer(
        axum::middleware::from_fn_with_state(
            jwt_validator.clone(),
            middleware::optional_auth_middleware,
        ),
    );

    // Simple health check endpoint (no auth required)
    async fn health_check() -> axum::http::StatusCode {
        axum::http::StatusCode::OK
    }
    let health_route = Router::new().route("/health", axum::routing::get(health_check));

    let app = Router::new()
        .merge(swagger)
        .merge(protected_routes)
        .merge(download_routes)
        .merge(health_route)
        .layer(DefaultBodyLimit::max(config.app.max_request_body_size))
        .layer(middleware::cors_layer(
            config.app.cors_allowed_origins.clone(),
        ))
        // Propagate X-Request-Id to response headers
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(middleware::MakeSpanWithRequestId)
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Generate X-Request-Id using UUID v7 (or use client-provided one)
        .layer(SetRequestIdLayer::x_request_id(middleware::MakeRequestUuid));

    // Start server
    let addr = config.app.server_address();
    let socket_addr: SocketAddr = addr
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid address: {}", e))?;

    // Use socket2 for TCP listener configuration
    let socket = socket2::Socket::new(
        socket2::Domain::for_address(socket_addr),
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.set_nodelay(true)?;

    // Uploads and decrypted downloads move whole files
    socket.set_recv_buffer_size(256 * 1024)?;
    socket.set_send_buffer_size(256 * 1024)?;

    #[cfg(target_os = "linux")]
    {
        let keepalive = socket2::TcpKeepalive::new()
            .with_time(std::time::Duration::from_secs(60))
            .with_interval(std::time::Duration::from_secs(10))
            .with_retries(3);
        socket.set_tcp_keepalive(&keepalive)?;
    }
    #[cfg(not(target_os = "linux"))]
    {
        let keepalive = socket2::TcpKeepalive::new().with_time(std::time::Duration::from_secs(60));
        socket.set_tcp_keepalive(&keepalive)?;
    }

    socket.set_nonblocking(true)?;
    socket.bind(&socket_addr.into())?;
    socket.listen(1024)?;

    let listener = tokio::net::TcpListener::from_std(socket.into())?;
    tracing::info!("Server listening on {}", format!("http://{}", addr));
    tracing::info!(
        "Admin pages available at {}",
        format!("http://{}/admin/settings", addr)
    );
    tracing::info!(
        "Swagger UI available at {}",
        format!("http://{}/swagger-ui/", addr)
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
