//! The harness's own error type, distinct from [`coworkers_core::CoworkersError`]
//! -- a `TestError` reports a failure of the *harness* (a bad fixture, a
//! condition that never became true), while a `CoworkersError` it carries is
//! one observed from the application under test.

use coworkers_core::CoworkersError;
use thiserror::Error;

/// Result type alias for harness operations.
pub type TestResult<T> = Result<T, TestError>;

/// Failures raised by [`crate::TestHarness`] itself.
#[derive(Error, Debug)]
pub enum TestError {
    /// Registering a queue or global middleware against the application
    /// under test failed.
    #[error("fixture setup failed: {0}")]
    Fixture(#[source] CoworkersError),

    /// `connect`/`close` against the application under test failed.
    #[error("lifecycle call failed: {0}")]
    Lifecycle(#[source] CoworkersError),

    /// Pushing a delivery into the mock transport failed (most likely: no
    /// consumer is attached to the named queue yet -- call
    /// [`crate::TestHarness::connect`] first).
    #[error("delivery failed: {0}")]
    Delivery(#[source] CoworkersError),

    /// A polled condition (an ack, a nack, an error event) did not become
    /// true within the harness's wait budget.
    #[error("timed out waiting for {0}")]
    Timeout(String),
}
