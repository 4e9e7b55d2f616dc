//! Network module with deferred startup lifecycle.
//!
//! Implements the deferred startup pattern: `new()` creates shared state,
//! `start()` binds the TCP listener, and `serve()` starts accepting
//! connections. Binding separately lets the caller map a bind failure to
//! its own exit code before anything is served.

use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context as _;
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::config::NetworkConfig;
use super::handlers::{invoke_handler, AppState};
use super::middleware::build_http_layers;
use super::shutdown::ShutdownController;
use crate::dispatch::Dispatcher;
use crate::function::InitializerGuard;

/// Manages the HTTP server lifecycle.
///
/// 1. `new()` -- allocates shared state (dispatcher, initializer guard,
///    shutdown controller)
/// 2. `start()` -- binds TCP listener to the configured address
/// 3. `serve()` -- accepts connections until shutdown is signalled, then
///    drains in-flight invocations
pub struct NetworkModule {
    config: NetworkConfig,
    listener: Option<TcpListener>,
    dispatcher: Arc<Dispatcher>,
    initializer: Arc<InitializerGuard>,
    shutdown: Arc<ShutdownController>,
}

impl NetworkModule {
    /// Creates a new network module without binding any port.
    #[must_use]
    pub fn new(config: NetworkConfig, dispatcher: Dispatcher, initializer: InitializerGuard) -> Self {
        Self {
            config,
            listener: None,
            dispatcher: Arc::new(dispatcher),
            initializer: Arc::new(initializer),
            shutdown: Arc::new(ShutdownController::new()),
        }
    }

    /// Returns a shared reference to the shutdown controller.
    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    /// Assembles the axum router.
    ///
    /// There are no fixed routes: every path and method reaches
    /// [`invoke_handler`], which splits internal control requests from
    /// invocations.
    pub fn build_router(&self) -> Router {
        let state = AppState {
            dispatcher: Arc::clone(&self.dispatcher),
            initializer: Arc::clone(&self.initializer),
            shutdown: Arc::clone(&self.shutdown),
            config: Arc::new(self.config.clone()),
        };

        Router::new()
            .fallback(invoke_handler)
            .layer(build_http_layers())
            .with_state(state)
    }

    /// Binds the TCP listener to the configured host and port.
    ///
    /// Returns the actual bound port, which may differ from the configured
    /// port when port 0 is used.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound (e.g., port in use).
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to listen on {addr}"))?;
        let port = listener.local_addr()?.port();

        info!("TCP listener bound to {}:{}", self.config.host, port);

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves connections until `shutdown` resolves, then drains.
    ///
    /// After the shutdown signal:
    /// 1. Invocation tokens are cancelled
    /// 2. The listener stops accepting; open connections finish their
    ///    requests, bounded by `drain_timeout`
    /// 3. Invocations still running at the deadline are reported and left
    ///    behind
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called first or the server hits
    /// a fatal I/O error.
    pub async fn serve(
        mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let listener = self
            .listener
            .take()
            .context("start() must be called before serve()")?;
        let router = self.build_router();
        let controller = Arc::clone(&self.shutdown);
        let drain_timeout = self.config.drain_timeout;

        info!(category = %self.dispatcher.category(), "serving function invocations");

        let signal_ctrl = Arc::clone(&controller);
        let server = axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            shutdown.await;
            info!("shutdown signal received, draining");
            signal_ctrl.trigger_shutdown();
        })
        .into_future();

        tokio::select! {
            result = server => result?,
            () = drain_deadline(&controller, drain_timeout) => {
                warn!(
                    in_flight = controller.in_flight_count(),
                    "drain timeout expired with invocations still running"
                );
            }
        }

        if controller.in_flight_count() == 0 {
            info!("all invocations drained");
        }
        Ok(())
    }
}

/// Resolves `timeout` after shutdown is triggered; never before.
async fn drain_deadline(controller: &ShutdownController, timeout: std::time::Duration) {
    controller.cancelled().await;
    tokio::time::sleep(timeout).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use faas_core::EventResponse;

    use crate::function::{validate_handler, FunctionHandler};

    fn module(port: u16) -> NetworkModule {
        let handler = FunctionHandler::http(|_ctx, req: faas_core::HttpRequest| async move {
            Ok(Some(EventResponse::new(200, req.path)))
        });
        let config = NetworkConfig {
            host: "127.0.0.1".to_string(),
            port,
            drain_timeout: Duration::from_secs(1),
            ..NetworkConfig::default()
        };
        NetworkModule::new(
            config,
            Dispatcher::new(validate_handler(Some(handler.into()))),
            InitializerGuard::new(None),
        )
    }

    #[test]
    fn new_creates_module_without_binding() {
        let module = module(0);
        assert!(module.listener.is_none());
    }

    #[test]
    fn shutdown_controller_returns_shared_arc() {
        let module = module(0);
        assert!(Arc::ptr_eq(
            &module.shutdown_controller(),
            &module.shutdown_controller()
        ));
    }

    #[tokio::test]
    async fn start_binds_to_os_assigned_port() {
        let mut module = module(0);
        let port = module.start().await.unwrap();
        assert!(port > 0, "OS-assigned port should be > 0");
        assert!(module.listener.is_some());
    }

    #[tokio::test]
    async fn start_fails_when_port_taken() {
        let mut first = module(0);
        let port = first.start().await.unwrap();

        let mut second = module(port);
        assert!(second.start().await.is_err());
    }

    #[tokio::test]
    async fn serve_without_start_is_an_error() {
        let err = module(0)
            .serve(std::future::ready(()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("start()"));
    }

    #[tokio::test]
    async fn serve_stops_on_shutdown_signal() {
        let mut module = module(0);
        module.start().await.unwrap();
        let controller = module.shutdown_controller();

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(module.serve(async move {
            let _ = rx.await;
        }));

        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(controller.cancellation_token().is_cancelled());
        assert_eq!(controller.in_flight_count(), 0);
    }
}
