//! Minimal HTTP listener run as a hosted service.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::Router;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::instrument::WithSubscriber;

use crate::config::ConfigHandle;
use crate::error::{Error, Result};
use crate::host::HostedService;
use crate::services::{ServiceCollection, ServiceDescriptor};

/// Key holding the listen address.
pub const ADDRESS_KEY: &str = "server:address";

/// Key holding the response body.
pub const RESPONSE_KEY: &str = "TestString";

/// Address used when [`ADDRESS_KEY`] is not configured.
pub const DEFAULT_ADDRESS: &str = "127.0.0.1:5000";

const SERVICE_NAME: &str = "web-listener";

struct Serving {
    local_addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<std::io::Result<()>>,
}

/// Answers every request with status 200 and the current value of
/// [`RESPONSE_KEY`] as `text/plain`.
///
/// The body is read from the live configuration on each request, so edits to
/// a reloadable settings file show up without restarting the listener.
pub struct WebListener {
    configuration: ConfigHandle,
    serving: Mutex<Option<Serving>>,
}

impl WebListener {
    /// Create a listener reading from `configuration`.
    pub fn new(configuration: ConfigHandle) -> Self {
        Self {
            configuration,
            serving: Mutex::new(None),
        }
    }

    /// Register the listener as a singleton and as a hosted service.
    pub fn register(services: &mut ServiceCollection) -> &mut ServiceCollection {
        services
            .add(
                ServiceDescriptor::singleton(|resolver| {
                    let configuration = resolver.get::<ConfigHandle>()?;
                    Ok(WebListener::new(configuration.as_ref().clone()))
                })
                .depends_on::<ConfigHandle>(),
            )
            .add_hosted_service(|provider| Ok(provider.get::<WebListener>()? as Arc<dyn HostedService>))
    }

    /// Address the listener is bound to while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.serving.lock().as_ref().map(|s| s.local_addr)
    }

    fn address(&self) -> Result<SocketAddr> {
        let raw = self
            .configuration
            .get(ADDRESS_KEY)
            .unwrap_or_else(|| DEFAULT_ADDRESS.to_string());
        raw.trim()
            .parse()
            .map_err(|_| Error::invalid_value(ADDRESS_KEY, raw))
    }

    fn router(&self) -> Router {
        Router::new()
            .fallback(respond)
            .with_state(self.configuration.clone())
    }
}

async fn respond(State(configuration): State<ConfigHandle>) -> impl IntoResponse {
    let body = configuration.get(RESPONSE_KEY).unwrap_or_default();
    ([(header::CONTENT_TYPE, "text/plain")], body)
}

#[async_trait]
impl HostedService for WebListener {
    fn name(&self) -> &str {
        SERVICE_NAME
    }

    async fn start(&self) -> Result<()> {
        if self.serving.lock().is_some() {
            return Err(Error::invalid_state("stopped", "running"));
        }

        let address = self.address()?;
        let listener = TcpListener::bind(address).await?;
        let local_addr = listener.local_addr()?;
        let (shutdown, signal) = oneshot::channel::<()>();
        let router = self.router();

        let task = tokio::spawn(
            async move {
                axum::serve(listener, router)
                    .with_graceful_shutdown(async {
                        let _ = signal.await;
                    })
                    .await
            }
            .with_current_subscriber(),
        );

        tracing::info!(address = %local_addr, "Now listening on: http://{}", local_addr);
        *self.serving.lock() = Some(Serving {
            local_addr,
            shutdown,
            task,
        });
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let Some(serving) = self.serving.lock().take() else {
            return Ok(());
        };

        let _ = serving.shutdown.send(());
        match serving.task.await {
            Ok(Ok(())) => {
                tracing::debug!(address = %serving.local_addr, "Web listener stopped");
                Ok(())
            }
            Ok(Err(e)) => Err(Error::hosted_service(SERVICE_NAME, e.to_string())),
            Err(e) => Err(Error::hosted_service(SERVICE_NAME, e.to_string())),
        }
    }
}

impl std::fmt::Debug for WebListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebListener")
            .field("local_addr", &self.local_addr())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigurationBuilder;

    fn configuration(pairs: &[(&str, &str)]) -> ConfigHandle {
        ConfigurationBuilder::new()
            .add_in_memory(pairs.iter().copied())
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_answers_any_path_with_test_string() {
        let listener = WebListener::new(configuration(&[
            (ADDRESS_KEY, "127.0.0.1:0"),
            (RESPONSE_KEY, "hello"),
        ]));
        listener.start().await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = reqwest::Client::new();
        for path in ["/", "/some/deep/path"] {
            let response = client
                .post(format!("http://{addr}{path}"))
                .send()
                .await
                .unwrap();
            assert_eq!(response.status(), reqwest::StatusCode::OK);
            assert_eq!(
                response.headers()[reqwest::header::CONTENT_TYPE],
                "text/plain"
            );
            assert_eq!(response.text().await.unwrap(), "hello");
        }

        listener.stop().await.unwrap();
        assert!(listener.local_addr().is_none());
    }

    #[tokio::test]
    async fn test_missing_test_string_gives_empty_body() {
        let listener = WebListener::new(configuration(&[(ADDRESS_KEY, "127.0.0.1:0")]));
        listener.start().await.unwrap();
        let addr = listener.local_addr().unwrap();

        let body = reqwest::get(format!("http://{addr}/"))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, "");

        listener.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_address() {
        let listener = WebListener::new(configuration(&[(ADDRESS_KEY, "not an address")]));
        assert!(matches!(
            listener.start().await,
            Err(Error::InvalidConfigValue { .. })
        ));
    }

    #[tokio::test]
    async fn test_stop_when_not_started() {
        let listener = WebListener::new(configuration(&[]));
        listener.stop().await.unwrap();
    }
}
