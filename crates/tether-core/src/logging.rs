use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("A global subscriber is already installed: {reason}")]
    AlreadyInstalled { reason: String },
}

/// Install a formatting subscriber. `RUST_LOG` takes precedence over
/// `default_filter` when set.
pub fn init_tracing(default_filter: &str) -> Result<(), LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_filter)?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|err| LoggingError::AlreadyInstalled {
            reason: err.to_string(),
        })
}
