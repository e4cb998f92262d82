use std::{process, sync::Arc};

use orderflow::{
    application::{
        error::AppError,
        jobs::{BackgroundTasks, CacheSweepJob},
        orders::OrderService,
        repos::OrdersRepo,
    },
    cache::{CacheConfig, OrderCacheStore},
    config,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, HttpState},
        messaging::{self, OrderConsumer, OrderGenerator},
        telemetry,
    },
};
use tokio_util::sync::CancellationToken;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Migrate(_) => run_migrate(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings.database).await?;
    let orders_repo: Arc<dyn OrdersRepo> = repositories.clone();

    let cache = Arc::new(OrderCacheStore::new(&CacheConfig::from(&settings.cache)));
    let service = Arc::new(OrderService::new(orders_repo.clone(), cache));

    let shutdown = CancellationToken::new();
    spawn_signal_listener(shutdown.clone());

    match service.restore_cache_from_store(&shutdown).await {
        Ok(summary) => info!(
            target = "orderflow::serve",
            restored = summary.restored,
            skipped = summary.skipped,
            "cache warmed from store"
        ),
        Err(err) => warn!(
            target = "orderflow::serve",
            error = %err,
            "cache restore failed, starting with an empty cache"
        ),
    }

    let (publisher, source) = messaging::channel(settings.ingest.channel_capacity);
    let mut tasks = BackgroundTasks::new(shutdown.clone());

    tasks.spawn("order-consumer", {
        let consumer = OrderConsumer::new(source, service.clone(), tasks.shutdown_token());
        async move {
            consumer.run().await;
        }
    });
    tasks.spawn(
        "cache-sweep",
        CacheSweepJob::new(
            service.clone(),
            settings.cache.cleanup_interval,
            tasks.shutdown_token(),
        )
        .run(),
    );
    if settings.ingest.generator_enabled {
        let generator = OrderGenerator::new(
            Arc::new(publisher.clone()),
            settings.ingest.generator_interval,
            tasks.shutdown_token(),
        );
        tasks.spawn("order-generator", async move {
            generator.run().await;
        });
    }
    info!(
        target = "orderflow::serve",
        tasks = tasks.len(),
        "background tasks started"
    );

    let state = HttpState {
        orders: service,
        db: repositories.clone(),
    };
    let result = serve_http(&settings.server, state, shutdown.clone()).await;

    shutdown.cancel();
    drop(publisher);
    tasks.shutdown(settings.server.graceful_shutdown).await;
    orders_repo.close().await;

    result
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings.database).await?;
    info!(target = "orderflow::migrate", "database schema is up to date");
    repositories.close().await;
    Ok(())
}

async fn init_repositories(
    database: &config::DatabaseSettings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(database_url, database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

async fn serve_http(
    server: &config::ServerSettings,
    state: HttpState,
    shutdown: CancellationToken,
) -> Result<(), AppError> {
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(server.addr)
        .await
        .map_err(|source| {
            AppError::from(InfraError::Bind {
                addr: server.addr,
                source,
            })
        })?;
    info!(target = "orderflow::serve", addr = %server.addr, "http listener bound");

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))
}

fn spawn_signal_listener(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!(error = %err, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(err) => {
                    error!(error = %err, "failed to listen for SIGTERM");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!(target = "orderflow::serve", "received ctrl-c, shutting down"),
            _ = terminate => info!(target = "orderflow::serve", "received SIGTERM, shutting down"),
            _ = shutdown.cancelled() => return,
        }
        shutdown.cancel();
    });
}
