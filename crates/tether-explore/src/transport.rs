use std::time::Duration;

use tether_ir::{Case, Response};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    #[error("Request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    #[error("Connection to {url} failed: {reason}")]
    Connection { url: String, reason: String },

    #[error("Transport failure: {0}")]
    Other(String),
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout { .. })
    }
}

/// Sends a case to the system under test. The only blocking call the
/// engine makes; request timeouts are the transport's responsibility.
pub trait Transport: Send + Sync {
    fn call(&self, case: &Case) -> Result<Response, TransportError>;
}

impl<F> Transport for F
where
    F: Fn(&Case) -> Result<Response, TransportError> + Send + Sync,
{
    fn call(&self, case: &Case) -> Result<Response, TransportError> {
        self(case)
    }
}
