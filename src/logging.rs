use crate::config::{LogConfig, LogFormat};
use crate::error::LogError;
use crate::suppress::LoggingContext;
use crate::writer::RedactingMakeWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global `tracing` subscriber described by `config`.
///
/// Output goes to stderr through [`RedactingMakeWriter`], so every rendered
/// line has API keys and registered secrets masked whatever the format.
pub fn init_logging(config: &LogConfig) -> Result<(), LogError> {
    let filter =
        EnvFilter::try_new(&config.level).map_err(|e| LogError::InvalidFilter(e.to_string()))?;
    let writer = RedactingMakeWriter::new(std::io::stderr);
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match config.format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(writer))
            .try_init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().pretty().with_writer(writer))
            .try_init(),
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_writer(writer))
            .try_init(),
    };
    installed.map_err(|_| LogError::AlreadyInitialized)?;

    tracing::debug!(format = %config.format, "logging initialized");
    Ok(())
}

/// Initialize logging from the environment through the global hook.
///
/// This should be the **first** call in `main` before anything logs. It reads
/// `RUST_LOG` and `LOG_FORMAT`, then invokes
/// [`LoggingContext::global`]'s hook, which is [`init_logging`] unless a
/// [`SuppressInit`](crate::SuppressInit) guard is active.
pub fn init_module() -> Result<(), LogError> {
    let config = LogConfig::from_env()?;
    LoggingContext::global().initialize(&config)
}
