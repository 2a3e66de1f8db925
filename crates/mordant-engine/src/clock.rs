use std::time::Duration;

use async_trait::async_trait;

/// Source of delays between fetch attempts.
///
/// Injected so retry behaviour can be tested without sleeping.
#[async_trait]
pub trait Clock: Send + Sync {
  async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
  async fn sleep(&self, duration: Duration) {
    tokio::time::sleep(duration).await;
  }
}
