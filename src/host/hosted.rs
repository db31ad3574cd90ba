//! Background services run by a host.

use async_trait::async_trait;

use crate::error::Result;

/// A background service started and stopped together with the host.
///
/// `start` should return once the service is ready (for a listener: once the
/// socket is bound) and leave long-running work on spawned tasks.
#[async_trait]
pub trait HostedService: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Start the service.
    async fn start(&self) -> Result<()>;

    /// Stop the service, waiting for in-flight work to drain.
    async fn stop(&self) -> Result<()>;
}
