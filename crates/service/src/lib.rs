//! Saga participant services.
//!
//! Each binary runs one [`Role`]: it serves `/health` and `/metrics`,
//! connects to the broker (retrying until it is reachable), then runs the
//! role's saga steps until SIGINT or SIGTERM.

pub mod config;
pub mod error;
pub mod routes;
pub mod telemetry;

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use messaging::{AmqpBus, AmqpConfig, EventBus};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::topology::{INVENTORY_RESERVED, ORDER_CREATED, SHIPPING_SCHEDULED};
use saga::{
    InventoryLedger, InventoryStep, OrderInitiator, ProcessorConfig, SagaCompletion,
    ServiceMetrics, ShipmentSchedule, ShippingStep, StepHandler, StepProcessor, Subscription,
};
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tower_http::trace::TraceLayer;

pub use config::{Config, Role};
pub use error::ServiceError;
use routes::health::Readiness;

/// Creates the Axum application router.
pub fn create_app(readiness: Readiness, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .with_state(readiness)
        .merge(metrics_router)
        .layer(TraceLayer::new_for_http())
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for SIGINT");
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
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Spawns the saga participants of `role` on `bus`.
///
/// Processors return once the bus is closed. The order initiator never
/// returns and has to be aborted.
pub fn spawn_participants<B>(
    role: Role,
    bus: Arc<B>,
    config: &Config,
) -> JoinSet<saga::error::Result<()>>
where
    B: EventBus + ?Sized + 'static,
{
    let metrics = ServiceMetrics::new(role.service_name());
    let processor_config = ProcessorConfig {
        step_timeout: config.step_timeout,
        dedupe_capacity: config.dedupe_capacity,
    };
    let mut tasks = JoinSet::new();

    match role {
        Role::Order => {
            let initiator =
                OrderInitiator::new(bus.clone(), metrics.clone(), config.order_interval);
            tasks.spawn(async move {
                initiator.run().await;
                Ok(())
            });
            spawn_step(
                &mut tasks,
                bus,
                SagaCompletion::new(),
                metrics,
                SHIPPING_SCHEDULED,
                processor_config,
            );
        }
        Role::Inventory => spawn_step(
            &mut tasks,
            bus,
            InventoryStep::new(InventoryLedger::new(), config.step_latency),
            metrics,
            ORDER_CREATED,
            processor_config,
        ),
        Role::Shipping => spawn_step(
            &mut tasks,
            bus,
            ShippingStep::new(ShipmentSchedule::new(), config.step_latency),
            metrics,
            INVENTORY_RESERVED,
            processor_config,
        ),
    }

    tasks
}

fn spawn_step<B, H>(
    tasks: &mut JoinSet<saga::error::Result<()>>,
    bus: Arc<B>,
    handler: H,
    metrics: ServiceMetrics,
    topic: &str,
    config: ProcessorConfig,
) where
    B: EventBus + ?Sized + 'static,
    H: StepHandler + 'static,
{
    let subscription = Subscription::new(metrics.service(), topic);
    let processor = StepProcessor::with_config(bus, handler, metrics, subscription, config);
    tasks.spawn(processor.run());
}

/// Runs `role`'s participants on `bus` until `shutdown` resolves or a
/// participant fails, then closes the bus.
pub async fn run_participants<B, F>(
    role: Role,
    bus: Arc<B>,
    config: &Config,
    shutdown: F,
) -> Result<(), ServiceError>
where
    B: EventBus + ?Sized + 'static,
    F: Future<Output = ()>,
{
    let mut tasks = spawn_participants(role, bus.clone(), config);

    let result = tokio::select! {
        () = shutdown => Ok(()),
        Some(finished) = tasks.join_next() => match finished {
            Ok(Ok(())) => {
                tracing::warn!(service = role.service_name(), "participant stopped unexpectedly");
                Ok(())
            }
            Ok(Err(e)) => Err(ServiceError::from(e)),
            Err(e) => Err(ServiceError::from(e)),
        },
    };

    bus.close().await;
    tasks.abort_all();
    while tasks.join_next().await.is_some() {}
    result
}

/// Serves HTTP, connects to the broker and runs the saga participants.
#[tracing::instrument(skip(config), fields(service = config.role.service_name()))]
pub async fn run(config: Config) -> Result<(), ServiceError> {
    let metrics_handle = telemetry::install_metrics_recorder()?;
    let readiness = Readiness::default();
    let app = create_app(readiness.clone(), metrics_handle);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| ServiceError::Bind {
            addr: addr.clone(),
            source,
        })?;
    tracing::info!(%addr, "serving health and metrics");

    let (stop_tx, mut stop_rx) = watch::channel(false);
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop_rx.wait_for(|stop| *stop).await;
            })
            .await
    });

    let signal = shutdown_signal();
    tokio::pin!(signal);

    let amqp_config =
        AmqpConfig::new(config.rabbitmq_url.clone()).with_prefetch(config.prefetch_count);
    let connected = tokio::select! {
        () = &mut signal => None,
        bus = AmqpBus::connect_with_retry(amqp_config, config.connect_backoff) => Some(bus),
    };

    let result = match connected {
        Some(bus) => {
            readiness.mark_ready();
            run_participants(config.role, Arc::new(bus), &config, signal).await
        }
        None => Ok(()),
    };

    let _ = stop_tx.send(true);
    server.await?.map_err(ServiceError::Serve)?;
    tracing::info!("service shut down gracefully");
    result
}

/// Entry point shared by the service binaries.
pub async fn start(role: Role) -> Result<(), ServiceError> {
    let config = Config::from_env(role);
    telemetry::init_tracing(&config);
    run(config).await
}
