//! Integration tests exercising the pipeline ordering and connect/close
//! lifecycle scenarios against an in-memory transport.

use coworkers_app::Application;
use coworkers_config::AppConfig;
use coworkers_core::{CoworkersError, Message, QueueName};
use coworkers_middleware::{FnMiddleware, Middleware};
use coworkers_transport::MockTransport;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

fn single_process_config(queue: &str) -> AppConfig {
    AppConfig {
        cluster: false,
        queue_name: Some(QueueName::new(queue)),
        ..AppConfig::default()
    }
}

fn order_tracking(name: &'static str, order: Arc<StdMutex<Vec<String>>>) -> impl Middleware {
    FnMiddleware::new(name, move |ctx, next| {
        let order = order.clone();
        Box::pin(async move {
            order.lock().unwrap().push(name.to_string());
            next.run(ctx).await?;
            order.lock().unwrap().push(format!("{name}'"));
            Ok(())
        })
    })
}

async fn wait_until<F: Fn() -> bool>(condition: F) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met within the test timeout");
}

#[tokio::test]
async fn s1_global_and_queue_middleware_run_in_two_phase_order() {
    let order = Arc::new(StdMutex::new(Vec::new()));
    let transport = Arc::new(MockTransport::new());
    let (app, _events) = Application::new(single_process_config("q"), transport.clone());

    app.use_middleware(order_tracking("a", order.clone()));
    app.use_middleware(order_tracking("b", order.clone()));
    app.queue(
        "q",
        None,
        None,
        vec![
            Arc::new(order_tracking("c", order.clone())) as Arc<dyn Middleware>,
            Arc::new(order_tracking("d", order.clone())) as Arc<dyn Middleware>,
        ],
    )
    .unwrap();

    app.connect(Some("amqp://local".to_string()), None).await.unwrap();

    transport
        .push_message(&QueueName::new("q"), Message::new("q", bytes::Bytes::new(), 1))
        .unwrap();

    wait_until(|| transport.acked() == vec![1]).await;

    assert_eq!(*order.lock().unwrap(), vec!["a", "b", "c", "d", "d'", "c'", "b'", "a'"]);
}

#[tokio::test]
async fn s2_short_circuit_skips_downstream_but_still_responds() {
    let order = Arc::new(StdMutex::new(Vec::new()));
    let transport = Arc::new(MockTransport::new());
    let (app, _events) = Application::new(single_process_config("q"), transport.clone());

    let b_order = order.clone();
    let short_circuit = FnMiddleware::new("b", move |_ctx, _next| {
        let order = b_order.clone();
        Box::pin(async move {
            order.lock().unwrap().push("b".to_string());
            Ok(())
        })
    });

    app.queue(
        "q",
        None,
        None,
        vec![
            Arc::new(order_tracking("a", order.clone())) as Arc<dyn Middleware>,
            Arc::new(short_circuit) as Arc<dyn Middleware>,
            Arc::new(order_tracking("c", order.clone())) as Arc<dyn Middleware>,
        ],
    )
    .unwrap();

    app.connect(Some("amqp://local".to_string()), None).await.unwrap();
    transport
        .push_message(&QueueName::new("q"), Message::new("q", bytes::Bytes::new(), 1))
        .unwrap();

    wait_until(|| transport.acked() == vec![1]).await;

    assert_eq!(*order.lock().unwrap(), vec!["a", "b", "a'"]);
}

#[tokio::test]
async fn s3_pipeline_error_reports_on_the_sink_and_never_responds() {
    let transport = Arc::new(MockTransport::new());
    let (app, mut events) = Application::new(single_process_config("q"), transport.clone());

    let c_ran = Arc::new(AtomicUsize::new(0));
    let c_ran_clone = c_ran.clone();

    app.queue(
        "q",
        None,
        None,
        vec![
            Arc::new(FnMiddleware::new("a", |ctx, next| Box::pin(async move { next.run(ctx).await }))) as Arc<dyn Middleware>,
            Arc::new(FnMiddleware::new("b", |_ctx, _next| {
                Box::pin(async move { Err(CoworkersError::validation("boom")) })
            })) as Arc<dyn Middleware>,
            Arc::new(FnMiddleware::new("c", move |ctx, next| {
                let c_ran = c_ran_clone.clone();
                Box::pin(async move {
                    c_ran.fetch_add(1, Ordering::SeqCst);
                    next.run(ctx).await
                })
            })) as Arc<dyn Middleware>,
        ],
    )
    .unwrap();

    app.connect(Some("amqp://local".to_string()), None).await.unwrap();
    transport
        .push_message(&QueueName::new("q"), Message::new("q", bytes::Bytes::new(), 1))
        .unwrap();

    let event = tokio::time::timeout(Duration::from_millis(500), events.next())
        .await
        .expect("error event timed out")
        .expect("error sink closed");

    assert_eq!(event.error.kind(), "validation_error");
    assert_eq!(c_ran.load(Ordering::SeqCst), 0);
    assert!(transport.acked().is_empty());
    assert!(transport.nacked().is_empty());
}

#[tokio::test]
async fn s4_close_racing_a_failing_connect_is_cancelled_by_peer() {
    let transport = Arc::new(MockTransport::new());
    transport.fail_connect();
    // Pause `create_connection` so the spawned `connect` task is guaranteed
    // to still hold the `Connecting` slot when `close` races it, rather than
    // relying on incidental task-scheduling order on the test runtime.
    transport.pause_connect();
    let (app, _events) = Application::new(single_process_config("q"), transport.clone());
    app.queue(
        "q",
        None,
        None,
        vec![Arc::new(FnMiddleware::new("noop", |ctx, next| Box::pin(async move { next.run(ctx).await }))) as Arc<dyn Middleware>],
    )
    .unwrap();

    let connect_app = app.clone();
    let connect_handle = tokio::spawn(async move { connect_app.connect(Some("amqp://local".to_string()), None).await });

    // Let the connect task install the `Connecting` slot and block inside
    // the gated `create_connection` call.
    tokio::task::yield_now().await;

    let close_app = app.clone();
    let close_handle = tokio::spawn(async move { close_app.close().await });

    // Let `close` observe `Slot::Connecting` and start awaiting the shared
    // connect future.
    tokio::task::yield_now().await;

    // Release the gate: `create_connection` now fails (per `fail_connect`),
    // `connect` rolls back and resolves with the transport error, and
    // `close` -- still awaiting that same shared future -- resolves with
    // `CancelledByPeer`.
    transport.resume_connect();

    let close_result = close_handle.await.unwrap();
    let connect_result = connect_handle.await.unwrap();

    assert!(connect_result.is_err());
    let close_err = close_result.unwrap_err();
    assert_eq!(close_err.kind(), "cancelled_by_peer");
}

#[tokio::test]
async fn s5_failed_connect_tears_down_whatever_succeeded() {
    let transport = Arc::new(MockTransport::new());
    // The connection and both channels open successfully; only
    // `assert_and_consume` fails, so the rollback has real resources to tear
    // down.
    transport.fail_assert_and_consume();
    let (app, _events) = Application::new(single_process_config("q"), transport.clone());
    app.queue(
        "q",
        None,
        None,
        vec![Arc::new(FnMiddleware::new("noop", |ctx, next| Box::pin(async move { next.run(ctx).await }))) as Arc<dyn Middleware>],
    )
    .unwrap();

    let err = app.connect(Some("amqp://local".to_string()), None).await.unwrap_err();
    assert_eq!(err.kind(), "transport_error");

    assert!(!app.has_connection().await);
    assert!(!app.has_channels().await);
    assert!(!transport.has_open_connection());
}

#[tokio::test]
async fn s6_concurrent_close_calls_return_the_same_outcome() {
    let transport = Arc::new(MockTransport::new());
    let (app, _events) = Application::new(single_process_config("q"), transport.clone());
    app.queue(
        "q",
        None,
        None,
        vec![Arc::new(FnMiddleware::new("noop", |ctx, next| Box::pin(async move { next.run(ctx).await }))) as Arc<dyn Middleware>],
    )
    .unwrap();

    app.connect(Some("amqp://local".to_string()), None).await.unwrap();

    let app_a = app.clone();
    let app_b = app.clone();
    let (a, b) = tokio::join!(
        tokio::spawn(async move { app_a.close().await }),
        tokio::spawn(async move { app_b.close().await })
    );

    assert!(a.unwrap().is_ok());
    assert!(b.unwrap().is_ok());
    assert_eq!(transport.cancelled_consumers().len(), 1);
}
