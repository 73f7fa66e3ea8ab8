//! Units of work run by the leader

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use baton_common::InstanceId;
use rand::Rng;
use tracing::debug;

/// One retryable unit of work.
///
/// The loop may drop the returned future at the deadline or on shutdown, so
/// implementations must tolerate being cancelled at any await point.
#[async_trait]
pub trait WorkUnit: Send {
    async fn perform(&mut self, iteration: u64) -> anyhow::Result<()>;
}

/// Work that sleeps a uniformly random duration in `[0, max_duration)`
pub struct SimulatedWork {
    instance: InstanceId,
    max_duration: Duration,
}

impl SimulatedWork {
    pub fn new(instance: InstanceId, max_duration: Duration) -> Self {
        Self {
            instance,
            max_duration,
        }
    }

    fn next_duration(&self) -> Duration {
        let max_ms = self.max_duration.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..max_ms))
    }
}

#[async_trait]
impl WorkUnit for SimulatedWork {
    async fn perform(&mut self, iteration: u64) -> anyhow::Result<()> {
        let duration = self.next_duration();
        debug!(
            instance = %self.instance,
            iteration,
            duration_ms = duration.as_millis() as u64,
            "Fixed delay task"
        );
        tokio::time::sleep(duration).await;
        Ok(())
    }
}

/// Adapter turning an async closure into a `WorkUnit`
pub struct FnWork<F> {
    f: F,
}

/// Wrap `f` so it can be driven by the work loop
pub fn work_fn<F, Fut>(f: F) -> FnWork<F>
where
    F: FnMut(u64) -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    FnWork { f }
}

#[async_trait]
impl<F, Fut> WorkUnit for FnWork<F>
where
    F: FnMut(u64) -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn perform(&mut self, iteration: u64) -> anyhow::Result<()> {
        (self.f)(iteration).await
    }
}
