//! Runtime entry points: configuration, logging, and the serve loop.

use std::process;

use clap::Parser;
use tracing::{debug, error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::dispatch::Dispatcher;
use crate::function::panic::install_panic_hook;
use crate::function::{
    validate_handler, validate_initializer, HandlerSymbol, InitializerGuard, InitializerSymbol,
};
use crate::network::{
    NetworkConfig, NetworkModule, DEFAULT_FUNCTION_TIMEOUT_SECS, DEFAULT_PORT,
};

/// Process exit code when the runtime cannot start or keep serving.
pub const START_SERVER_EXIT_CODE: i32 = 170;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Runtime settings, provided by the platform through the environment.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "faas-runtime", version)]
pub struct RuntimeArgs {
    /// Address to bind
    #[arg(long, env = "_FAAS_RUNTIME_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "_FAAS_RUNTIME_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Per-invocation timeout in seconds; also bounds the shutdown drain
    #[arg(
        long = "function-timeout",
        env = "_FAAS_FUNC_TIMEOUT",
        default_value_t = DEFAULT_FUNCTION_TIMEOUT_SECS
    )]
    pub function_timeout_secs: u64,

    /// Emit logs as JSON lines
    #[arg(long, env = "_FAAS_LOG_JSON")]
    pub log_json: bool,
}

impl RuntimeArgs {
    /// Reads settings from the environment only.
    ///
    /// Command-line arguments belong to the function binary and are never
    /// interpreted here.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an unparsable value.
    pub fn from_env() -> Result<Self, clap::Error> {
        Self::try_parse_from(["faas-runtime"])
    }

    #[must_use]
    pub fn network_config(&self) -> NetworkConfig {
        let timeout = std::time::Duration::from_secs(self.function_timeout_secs);
        NetworkConfig {
            host: self.host.clone(),
            port: self.port,
            function_timeout: timeout,
            drain_timeout: timeout,
        }
    }
}

impl Default for RuntimeArgs {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            function_timeout_secs: DEFAULT_FUNCTION_TIMEOUT_SECS,
            log_json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Installs the global tracing subscriber.
///
/// The filter comes from `RUST_LOG` and defaults to `info`. Does nothing if
/// a subscriber is already installed.
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    };
    if result.is_err() {
        debug!("tracing subscriber already installed");
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Runs the runtime with `handler` until SIGINT or SIGTERM.
///
/// Blocks the calling thread. Exits the process with
/// [`START_SERVER_EXIT_CODE`] if the runtime cannot start.
pub fn start(handler: impl Into<HandlerSymbol>) {
    block_on_runtime(Some(handler.into()), None);
}

/// Like [`start`], with an initializer run on the platform's
/// `/v1/initialize` request.
pub fn start_with_initializer(
    handler: impl Into<HandlerSymbol>,
    initializer: impl Into<InitializerSymbol>,
) {
    block_on_runtime(Some(handler.into()), Some(initializer.into()));
}

fn block_on_runtime(handler: Option<HandlerSymbol>, initializer: Option<InitializerSymbol>) {
    let args = match RuntimeArgs::from_env() {
        Ok(args) => args,
        Err(err) => {
            init_tracing(false);
            error!(error = %err, "invalid runtime configuration");
            process::exit(START_SERVER_EXIT_CODE);
        }
    };
    init_tracing(args.log_json);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(error = %err, "failed to build async runtime");
            process::exit(START_SERVER_EXIT_CODE);
        }
    };

    if let Err(err) = runtime.block_on(run(handler, initializer, args, shutdown_signal())) {
        error!("runtime stopped with error: {err:#}");
        process::exit(START_SERVER_EXIT_CODE);
    }
}

/// Validates the function, binds the listener and serves until `shutdown`
/// resolves.
///
/// An invalid handler or initializer does not fail startup; it is replaced
/// by one that reports the validation error on every call.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound or the server fails.
pub async fn run(
    handler: Option<HandlerSymbol>,
    initializer: Option<InitializerSymbol>,
    args: RuntimeArgs,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    install_panic_hook();

    let validated = validate_handler(handler);
    let initializer = validate_initializer(initializer);
    info!(
        category = %validated.category,
        initializer = initializer.is_some(),
        version = crate::VERSION,
        "function validated"
    );

    let mut module = NetworkModule::new(
        args.network_config(),
        Dispatcher::new(validated),
        InitializerGuard::new(initializer),
    );
    module.start().await?;
    module.serve(shutdown).await
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
