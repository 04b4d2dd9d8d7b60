use crate::error::{AppError, AppErrorKind, ExternalError};
use crate::logging::mask_msisdn;
use crate::money::Amount;
use crate::payments::error::PaymentError;
use crate::payments::provider::PushPaymentProvider;
use crate::payments::types::PushRequest;
use crate::payments::utils::normalize_msisdn;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InitiationError {
    /// Network failure, timeout, 5xx or rate limiting. Safe to retry.
    #[error("{gateway} unavailable: {message}")]
    GatewayUnavailable { gateway: String, message: String },

    /// The request itself was refused. Retrying it unchanged will not help.
    #[error("{gateway} rejected the push: {message}")]
    InitiationRejected { gateway: String, message: String },
}

impl InitiationError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, InitiationError::GatewayUnavailable { .. })
    }
}

impl From<InitiationError> for AppError {
    fn from(err: InitiationError) -> Self {
        let external = match err {
            InitiationError::GatewayUnavailable { gateway, message } => {
                ExternalError::GatewayUnavailable { gateway, message }
            }
            InitiationError::InitiationRejected { gateway, message } => {
                ExternalError::InitiationRejected { gateway, message }
            }
        };
        AppError::new(AppErrorKind::External(external))
    }
}

/// A push the gateway accepted and is waiting on the payer for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingReference {
    pub reference: String,
    pub msisdn: String,
}

pub struct PaymentInitiator {
    provider: Arc<dyn PushPaymentProvider>,
}

impl PaymentInitiator {
    pub fn new(provider: Arc<dyn PushPaymentProvider>) -> Self {
        Self { provider }
    }

    pub async fn initiate(
        &self,
        phone: &str,
        amount: Amount,
        payer_ref: &str,
    ) -> Result<PendingReference, InitiationError> {
        let gateway = self.provider.name().as_str().to_string();

        let msisdn = normalize_msisdn(phone).map_err(|e| InitiationError::InitiationRejected {
            gateway: gateway.clone(),
            message: e.to_string(),
        })?;
        if !amount.is_positive() {
            return Err(InitiationError::InitiationRejected {
                gateway,
                message: format!("amount {} must be greater than zero", amount),
            });
        }

        let response = self
            .provider
            .initiate_push(PushRequest {
                msisdn: msisdn.clone(),
                amount,
                payer_ref: payer_ref.to_string(),
            })
            .await
            .map_err(|e| classify(&gateway, e))?;

        info!(
            reference = %response.reference,
            payer_ref = %payer_ref,
            msisdn = %mask_msisdn(&msisdn),
            amount_minor = amount.minor(),
            "Push payment pending"
        );
        Ok(PendingReference {
            reference: response.reference,
            msisdn,
        })
    }
}

fn classify(gateway: &str, err: PaymentError) -> InitiationError {
    if err.is_retryable() {
        warn!(gateway = %gateway, error = %err, "Gateway unavailable during initiation");
        InitiationError::GatewayUnavailable {
            gateway: gateway.to_string(),
            message: err.to_string(),
        }
    } else {
        warn!(gateway = %gateway, error = %err, "Gateway rejected initiation");
        InitiationError::InitiationRejected {
            gateway: gateway.to_string(),
            message: err.to_string(),
        }
    }
}
