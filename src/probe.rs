//! Self-test module that boots a host with a web listener and queries it.

use std::marker::PhantomData;
use std::net::SocketAddr;

use tokio::sync::oneshot::{self, error::TryRecvError};
use tracing::{Dispatch, Level};

use crate::bridge::{HookControl, ScriptBridge};
use crate::defaults::create_default_builder;
use crate::error::{Error, Result};
use crate::host::Host;
use crate::lifecycle::{LoadContext, PluginModule};
use crate::marker::{CurrentExecutable, PluginMarker};
use crate::web::WebListener;

type ProbeOutcome = std::result::Result<(u16, String), String>;

/// Module that exercises the whole hosting stack from inside the scripting
/// host.
///
/// On load it bootstraps a host for marker `M`, starts a [`WebListener`],
/// sends one request to it from the host runtime and prints the answer from
/// a frame hook once it arrives. The frame is never blocked on the request.
pub struct HostingProbe<M: PluginMarker = CurrentExecutable> {
    logger: Option<Dispatch>,
    _marker: PhantomData<fn() -> M>,
}

impl<M: PluginMarker> HostingProbe<M> {
    /// Create a probe that logs at DEBUG to stdout.
    pub fn new() -> Self {
        Self {
            logger: None,
            _marker: PhantomData,
        }
    }

    /// Log through `logger` instead.
    pub fn with_logger(mut self, logger: Dispatch) -> Self {
        self.logger = Some(logger);
        self
    }

    fn logger(&self) -> Dispatch {
        self.logger.clone().unwrap_or_else(|| {
            Dispatch::new(
                tracing_subscriber::fmt()
                    .with_max_level(Level::DEBUG)
                    .with_target(false)
                    .finish(),
            )
        })
    }
}

impl<M: PluginMarker> Default for HostingProbe<M> {
    fn default() -> Self {
        Self::new()
    }
}

/// What a loaded probe holds.
#[derive(Debug)]
pub struct ProbeContext {
    host: Host,
    hook_id: String,
    listen_addr: SocketAddr,
}

impl ProbeContext {
    /// The running host.
    pub fn host(&self) -> &Host {
        &self.host
    }

    /// Id of the frame hook polling for the response.
    pub fn hook_id(&self) -> &str {
        &self.hook_id
    }

    /// Address the web listener is bound to.
    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }
}

impl<M: PluginMarker> PluginModule for HostingProbe<M> {
    type Context = ProbeContext;

    fn name(&self) -> &str {
        "hosting-probe"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn load(
        &self,
        bridge: &mut dyn ScriptBridge,
        is_server_side: bool,
        context: &LoadContext,
    ) -> Result<ProbeContext> {
        let logger = self.logger();
        tracing::dispatcher::with_default(&logger, || {
            tracing::debug!(
                module = context.module_name(),
                server_side = is_server_side,
                "Starting hosting probe"
            );
        });

        let mut host = create_default_builder::<M>(logger)?
            .configure_services(|_, services| {
                WebListener::register(services);
            })
            .build()?;
        host.start()?;

        let listen_addr = host
            .services()
            .get::<WebListener>()?
            .local_addr()
            .ok_or_else(|| Error::hosted_service("web-listener", "not listening after start"))?;

        let (sender, mut receiver) = oneshot::channel::<ProbeOutcome>();
        host.spawn(async move {
            let outcome = request(listen_addr).await;
            if let Err(e) = &outcome {
                tracing::warn!(address = %listen_addr, error = %e, "Probe request failed");
            }
            let _ = sender.send(outcome);
        })?;

        let hook_id = format!("{}:probe", context.module_name());
        bridge.add_frame_hook(
            &hook_id,
            Box::new(move |bridge| match receiver.try_recv() {
                Ok(Ok((status, body))) => {
                    bridge.print(&format!("Web listener answered {status}: {body}"));
                    HookControl::Remove
                }
                Ok(Err(e)) => {
                    bridge.print(&format!("Web listener request failed: {e}"));
                    HookControl::Remove
                }
                Err(TryRecvError::Empty) => HookControl::Continue,
                Err(TryRecvError::Closed) => {
                    bridge.print("Web listener request was abandoned");
                    HookControl::Remove
                }
            }),
        );

        Ok(ProbeContext {
            host,
            hook_id,
            listen_addr,
        })
    }

    fn unload(&self, mut context: ProbeContext, bridge: &mut dyn ScriptBridge) -> Result<()> {
        bridge.remove_frame_hook(&context.hook_id);
        context.host.stop()
    }
}

async fn request(addr: SocketAddr) -> ProbeOutcome {
    let response = reqwest::get(format!("http://{addr}/"))
        .await
        .map_err(|e| e.to_string())?;
    let status = response.status().as_u16();
    let body = response.text().await.map_err(|e| e.to_string())?;
    Ok((status, body))
}

impl<M: PluginMarker> std::fmt::Debug for HostingProbe<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostingProbe")
            .field("marker", &std::any::type_name::<M>())
            .field("custom_logger", &self.logger.is_some())
            .finish()
    }
}
