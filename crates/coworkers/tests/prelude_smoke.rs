//! Exercises the facade crate's `prelude` the way an integrator's own
//! test suite would: build a harness, register a queue via the re-exported
//! types, and observe an ack through `coworkers_test`.

use coworkers::prelude::*;
use coworkers_test::TestHarness;
use std::sync::Arc;

#[tokio::test]
async fn prelude_types_round_trip_through_the_harness() {
    let harness = TestHarness::single_queue("orders.created");

    let middleware: Arc<dyn Middleware> = Arc::new(FnMiddleware::new("ack-everything", |ctx, next| {
        Box::pin(async move { next.run(ctx).await })
    }));
    harness.queue_default(vec![middleware]).unwrap();

    harness.connect().await.unwrap();
    let tag = harness.deliver("orders.created", "{}").await.unwrap();
    harness.await_ack(tag, None).await.unwrap();

    harness.close().await.unwrap();
}
