//! Integration tests for the service HTTP surface and participant wiring.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use messaging::{EventBus, InMemoryBus};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::topology::{INVENTORY_RESERVED, ORDER_CREATED, SHIPPING_SCHEDULED};
use saga::{SagaCompletion, ServiceMetrics, StepProcessor, Subscription};
use service::routes::health::Readiness;
use service::{Config, Role};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

async fn get(app: axum::Router, uri: &str) -> (StatusCode, String) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

fn fast_config(role: Role) -> Config {
    Config {
        step_latency: Duration::ZERO,
        step_timeout: Duration::from_secs(1),
        order_interval: Duration::from_secs(3600),
        ..Config::new(role)
    }
}

#[tokio::test]
async fn test_health_reports_starting_until_ready() {
    let readiness = Readiness::default();
    let app = service::create_app(readiness.clone(), get_metrics_handle());

    let (status, body) = get(app.clone(), "/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "starting");

    readiness.mark_ready();
    let (status, body) = get(app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_saga_counters() {
    let handle = get_metrics_handle();
    let metrics = ServiceMetrics::new("metrics-probe-service");
    metrics.record_consumed();
    metrics.record_published();
    metrics.record_failed();

    let app = service::create_app(Readiness::default(), handle);
    let (status, body) = get(app, "/metrics").await;

    assert_eq!(status, StatusCode::OK);
    for name in [
        "saga_events_published_total",
        "saga_events_consumed_total",
        "saga_events_failed_total",
    ] {
        assert!(
            body.contains(&format!("{name}{{service=\"metrics-probe-service\"}} 1")),
            "missing {name} in:\n{body}"
        );
    }
}

#[tokio::test]
async fn test_metrics_endpoint_exports_only_service_counters() {
    let handle = get_metrics_handle();
    let service_name = "metrics-scrape-service";
    let bus = Arc::new(InMemoryBus::new());
    let metrics = ServiceMetrics::new(service_name);
    let processor = StepProcessor::new(
        bus.clone(),
        SagaCompletion::new(),
        metrics.clone(),
        Subscription::new(service_name, SHIPPING_SCHEDULED),
    );
    let task = tokio::spawn(processor.run());

    let shipped = messaging::Event::initiate(SHIPPING_SCHEDULED, "shipping-service", [("k", "v")]);
    tokio::time::timeout(Duration::from_secs(1), async {
        while metrics.snapshot().consumed == 0 {
            bus.publish(SHIPPING_SCHEDULED, &shipped).await.unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("completion step never ran");
    bus.close().await;
    task.await.unwrap().unwrap();

    let app = service::create_app(Readiness::default(), handle);
    let (_, body) = get(app, "/metrics").await;

    let saga_families: Vec<&str> = body
        .lines()
        .filter(|line| line.starts_with("saga_"))
        .filter_map(|line| line.split(['{', ' ']).next())
        .collect();
    for family in &saga_families {
        assert!(
            [
                "saga_events_published_total",
                "saga_events_consumed_total",
                "saga_events_failed_total",
            ]
            .contains(family),
            "unexpected metric {family} in:\n{body}"
        );
    }
    assert!(!body.contains("# TYPE saga_step_duration_seconds"));
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let app = service::create_app(Readiness::default(), get_metrics_handle());
    let (status, _) = get(app, "/orders").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_all_roles_complete_a_saga_over_one_bus() {
    let bus = Arc::new(InMemoryBus::new());
    let mut inventory =
        service::spawn_participants(Role::Inventory, bus.clone(), &fast_config(Role::Inventory));
    let mut shipping =
        service::spawn_participants(Role::Shipping, bus.clone(), &fast_config(Role::Shipping));

    tokio::time::timeout(Duration::from_secs(1), async {
        while !(bus.is_bound("inventory-service.order-created", ORDER_CREATED).await
            && bus
                .is_bound("shipping-service.inventory-reserved", INVENTORY_RESERVED)
                .await)
        {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("steps never subscribed");

    // The initiator publishes on its first tick, possibly before the
    // completion queue is bound; the chain still reaches shipping.
    let mut order =
        service::spawn_participants(Role::Order, bus.clone(), &fast_config(Role::Order));

    tokio::time::timeout(Duration::from_secs(5), async {
        while !bus
            .published()
            .await
            .iter()
            .any(|(key, _)| key == SHIPPING_SCHEDULED)
        {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("saga never reached shipping");

    bus.close().await;
    order.abort_all();
    for set in [&mut inventory, &mut shipping] {
        while let Some(result) = set.join_next().await {
            assert!(result.unwrap().is_ok());
        }
    }
    while order.join_next().await.is_some() {}
}

#[tokio::test]
async fn test_run_participants_closes_bus_on_shutdown() {
    let bus = Arc::new(InMemoryBus::new());
    let config = fast_config(Role::Shipping);

    service::run_participants(
        Role::Shipping,
        bus.clone(),
        &config,
        tokio::time::sleep(Duration::from_millis(20)),
    )
    .await
    .unwrap();

    assert!(bus.is_closed());
    let event = messaging::Event::initiate(ORDER_CREATED, "order-service", [("k", "v")]);
    assert!(bus.publish(ORDER_CREATED, &event).await.is_err());
}

#[tokio::test]
async fn test_run_participants_surfaces_consume_errors() {
    let bus = Arc::new(InMemoryBus::new());
    bus.close().await;
    let config = fast_config(Role::Inventory);

    let result = service::run_participants(
        Role::Inventory,
        bus,
        &config,
        std::future::pending::<()>(),
    )
    .await;

    assert!(matches!(result, Err(service::ServiceError::Saga(_))));
}
