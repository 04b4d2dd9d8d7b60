use thiserror::Error;

pub type PaymentResult<T> = Result<T, PaymentError>;

/// Failures talking to a push-payment gateway.
#[derive(Debug, Clone, Error)]
pub enum PaymentError {
    /// The request never left this process.
    #[error("Invalid gateway request: {message}")]
    InvalidRequest {
        message: String,
        field: Option<String>,
    },

    #[error("Gateway unreachable: {message}")]
    Unreachable { message: String },

    #[error("Gateway throttled the request")]
    Throttled { retry_after_seconds: Option<u64> },

    #[error("Gateway answered HTTP {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    /// 2xx with a body we could not use.
    #[error("Malformed gateway reply: {message}")]
    MalformedReply { message: String },
}

impl PaymentError {
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        PaymentError::InvalidRequest {
            message: message.into(),
            field: Some(field.to_string()),
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            PaymentError::InvalidRequest { .. } | PaymentError::MalformedReply { .. } => false,
            PaymentError::Unreachable { .. } | PaymentError::Throttled { .. } => true,
            PaymentError::UpstreamStatus { status, .. } => *status >= 500,
        }
    }
}
