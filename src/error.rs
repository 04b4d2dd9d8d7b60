//! Error handling for the rent wallet backend
//!
//! A unified error with HTTP status mapping, user-facing messages and stable
//! error codes, so callers can tell retryable failures from permanent ones.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Machine-readable error codes returned to API clients
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    // Domain errors (4xx)
    #[serde(rename = "INSUFFICIENT_BALANCE")]
    InsufficientBalance,
    #[serde(rename = "WALLET_NOT_FOUND")]
    WalletNotFound,
    #[serde(rename = "TENANT_NOT_FOUND")]
    TenantNotFound,
    #[serde(rename = "LANDLORD_NOT_FOUND")]
    LandlordNotFound,
    #[serde(rename = "SETTLEMENT_NOT_FOUND")]
    SettlementNotFound,
    #[serde(rename = "INVALID_SETTLEMENT_STATE")]
    InvalidSettlementState,
    #[serde(rename = "DUPLICATE_SETTLEMENT")]
    DuplicateSettlement,
    #[serde(rename = "RECONCILIATION_EXHAUSTED")]
    ReconciliationExhausted,

    // Infrastructure errors (5xx)
    #[serde(rename = "DATABASE_ERROR")]
    DatabaseError,
    #[serde(rename = "CONFIGURATION_ERROR")]
    ConfigurationError,

    // External errors
    #[serde(rename = "GATEWAY_UNAVAILABLE")]
    GatewayUnavailable,
    #[serde(rename = "INITIATION_REJECTED")]
    InitiationRejected,

    // Generic
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
    #[serde(rename = "VALIDATION_ERROR")]
    ValidationError,
}

/// Business rule violations
#[derive(Debug, Clone)]
pub enum DomainError {
    /// Wallet balance is lower than the requested debit
    InsufficientBalance {
        owner_id: String,
        available: String,
        required: String,
    },
    WalletNotFound {
        owner_id: String,
    },
    TenantNotFound {
        tenant: String,
    },
    /// Tenant's property has no landlord attached
    LandlordNotFound {
        tenant_id: i64,
    },
    SettlementNotFound {
        reference: String,
    },
    /// Operation is not allowed from the settlement's current state
    InvalidSettlementState {
        reference: String,
        state: String,
    },
    DuplicateSettlement {
        reference: String,
    },
    /// Automatic reconciliation gave up; needs an operator
    ReconciliationExhausted {
        reference: String,
        attempts: u32,
    },
}

#[derive(Debug, Clone)]
pub enum InfrastructureError {
    Database { message: String, is_retryable: bool },
    Configuration { message: String },
    Internal { message: String },
}

/// Push-payment gateway errors
#[derive(Debug, Clone)]
pub enum ExternalError {
    /// Network failure, timeout or 5xx; safe to retry
    GatewayUnavailable { gateway: String, message: String },
    /// Gateway refused the request; retrying the same request will not help
    InitiationRejected { gateway: String, message: String },
}

#[derive(Debug, Clone)]
pub enum ValidationError {
    InvalidAmount { amount: String, reason: String },
    InvalidMonth { value: String },
    MissingField { field: String },
    MalformedBody { reason: String },
    MissingPrincipal,
}

/// Unified application error type
#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub request_id: Option<String>,
    pub context: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AppErrorKind {
    Domain(DomainError),
    Infrastructure(InfrastructureError),
    External(ExternalError),
    Validation(ValidationError),
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            request_id: None,
            context: None,
        }
    }

    pub fn domain(err: DomainError) -> Self {
        Self::new(AppErrorKind::Domain(err))
    }

    /// Swallowed by callers: logged, never returned to a client.
    pub fn duplicate_settlement(reference: &str) -> Self {
        Self::domain(DomainError::DuplicateSettlement {
            reference: reference.to_string(),
        })
    }

    pub fn reconciliation_exhausted(reference: &str, attempts: u32) -> Self {
        Self::domain(DomainError::ReconciliationExhausted {
            reference: reference.to_string(),
            attempts,
        })
    }

    pub fn validation(err: ValidationError) -> Self {
        Self::new(AppErrorKind::Validation(err))
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Infrastructure(InfrastructureError::Internal {
            message: message.into(),
        }))
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Map error to HTTP status code
    pub fn status_code(&self) -> u16 {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::InsufficientBalance { .. } => 400,
                DomainError::WalletNotFound { .. } => 404,
                DomainError::TenantNotFound { .. } => 404,
                DomainError::LandlordNotFound { .. } => 404,
                DomainError::SettlementNotFound { .. } => 404,
                DomainError::InvalidSettlementState { .. } => 409,
                DomainError::DuplicateSettlement { .. } => 409,
                DomainError::ReconciliationExhausted { .. } => 409,
            },
            AppErrorKind::Infrastructure(_) => 500,
            AppErrorKind::External(err) => match err {
                ExternalError::GatewayUnavailable { .. } => 503,
                ExternalError::InitiationRejected { .. } => 422,
            },
            AppErrorKind::Validation(err) => match err {
                ValidationError::MissingPrincipal => 401,
                _ => 400,
            },
        }
    }

    pub fn error_code(&self) -> ErrorCode {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::InsufficientBalance { .. } => ErrorCode::InsufficientBalance,
                DomainError::WalletNotFound { .. } => ErrorCode::WalletNotFound,
                DomainError::TenantNotFound { .. } => ErrorCode::TenantNotFound,
                DomainError::LandlordNotFound { .. } => ErrorCode::LandlordNotFound,
                DomainError::SettlementNotFound { .. } => ErrorCode::SettlementNotFound,
                DomainError::InvalidSettlementState { .. } => ErrorCode::InvalidSettlementState,
                DomainError::DuplicateSettlement { .. } => ErrorCode::DuplicateSettlement,
                DomainError::ReconciliationExhausted { .. } => ErrorCode::ReconciliationExhausted,
            },
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { .. } => ErrorCode::DatabaseError,
                InfrastructureError::Configuration { .. } => ErrorCode::ConfigurationError,
                InfrastructureError::Internal { .. } => ErrorCode::InternalError,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::GatewayUnavailable { .. } => ErrorCode::GatewayUnavailable,
                ExternalError::InitiationRejected { .. } => ErrorCode::InitiationRejected,
            },
            AppErrorKind::Validation(_) => ErrorCode::ValidationError,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::InsufficientBalance {
                    available,
                    required,
                    ..
                } => format!(
                    "Insufficient balance in the wallet. Available: {}, Required: {}",
                    available, required
                ),
                DomainError::WalletNotFound { .. } => "Wallet not found for this user.".to_string(),
                DomainError::TenantNotFound { .. } => "Tenant not found.".to_string(),
                DomainError::LandlordNotFound { .. } => {
                    "Landlord not found for this tenant.".to_string()
                }
                DomainError::SettlementNotFound { reference } => {
                    format!("Settlement '{}' not found", reference)
                }
                DomainError::InvalidSettlementState { reference, state } => format!(
                    "Settlement '{}' cannot be changed while it is {}",
                    reference, state
                ),
                DomainError::DuplicateSettlement { reference } => {
                    format!("Settlement '{}' has already been processed", reference)
                }
                DomainError::ReconciliationExhausted {
                    reference,
                    attempts,
                } => format!(
                    "Payment '{}' could not be confirmed after {} attempts and needs manual review",
                    reference, attempts
                ),
            },
            AppErrorKind::Infrastructure(_) => {
                "Service temporarily unavailable. Please try again later".to_string()
            }
            AppErrorKind::External(err) => match err {
                ExternalError::GatewayUnavailable { gateway, .. } => format!(
                    "Payment gateway ({}) is temporarily unavailable. Please try again",
                    gateway
                ),
                ExternalError::InitiationRejected { message, .. } => {
                    format!("Failed to initiate STK push: {}", message)
                }
            },
            AppErrorKind::Validation(err) => match err {
                ValidationError::InvalidAmount { amount, reason } => {
                    format!("Invalid amount '{}': {}", amount, reason)
                }
                ValidationError::InvalidMonth { value } => {
                    format!("Invalid month '{}', expected YYYY-MM", value)
                }
                ValidationError::MissingField { field } => {
                    format!("Required field '{}' is missing", field)
                }
                ValidationError::MalformedBody { reason } => {
                    format!("Malformed request body: {}", reason)
                }
                ValidationError::MissingPrincipal => "Authentication required".to_string(),
            },
        }
    }

    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::Domain(_) => false,
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { is_retryable, .. } => *is_retryable,
                InfrastructureError::Configuration { .. } => false,
                InfrastructureError::Internal { .. } => false,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::GatewayUnavailable { .. } => true,
                ExternalError::InitiationRejected { .. } => false,
            },
            AppErrorKind::Validation(_) => false,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_message())
    }
}

impl std::error::Error for AppError {}

impl From<crate::money::AmountError> for AppError {
    fn from(err: crate::money::AmountError) -> Self {
        AppError::validation(ValidationError::InvalidAmount {
            amount: match &err {
                crate::money::AmountError::Invalid(v)
                | crate::money::AmountError::TooPrecise(v)
                | crate::money::AmountError::Negative(v)
                | crate::money::AmountError::Overflow(v) => v.clone(),
            },
            reason: err.to_string(),
        })
    }
}

impl From<crate::calendar::InvalidMonth> for AppError {
    fn from(err: crate::calendar::InvalidMonth) -> Self {
        AppError::validation(ValidationError::InvalidMonth { value: err.0 })
    }
}

// From<DatabaseError> lives in database/error.rs, From<LedgerError> in services/ledger.rs

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_balance_is_permanent_client_error() {
        let error = AppError::domain(DomainError::InsufficientBalance {
            owner_id: "TNT-1".to_string(),
            available: "50.00".to_string(),
            required: "100.00".to_string(),
        });

        assert_eq!(error.status_code(), 400);
        assert_eq!(error.error_code(), ErrorCode::InsufficientBalance);
        assert!(error.user_message().contains("Insufficient balance"));
        assert!(!error.is_retryable());
    }

    #[test]
    fn wallet_not_found_maps_to_404() {
        let error = AppError::domain(DomainError::WalletNotFound {
            owner_id: "TNT-1".to_string(),
        });
        assert_eq!(error.status_code(), 404);
        assert_eq!(error.error_code(), ErrorCode::WalletNotFound);
    }

    #[test]
    fn gateway_errors_distinguish_retryability() {
        let unavailable = AppError::new(AppErrorKind::External(ExternalError::GatewayUnavailable {
            gateway: "mpesa".to_string(),
            message: "connect timeout".to_string(),
        }));
        let rejected = AppError::new(AppErrorKind::External(ExternalError::InitiationRejected {
            gateway: "mpesa".to_string(),
            message: "invalid msisdn".to_string(),
        }));

        assert!(unavailable.is_retryable());
        assert_eq!(unavailable.status_code(), 503);
        assert!(!rejected.is_retryable());
        assert_eq!(rejected.error_code(), ErrorCode::InitiationRejected);
    }

    #[test]
    fn settlement_conflicts_are_permanent() {
        let duplicate = AppError::duplicate_settlement("ws_CO_0001");
        assert_eq!(duplicate.status_code(), 409);
        assert_eq!(duplicate.error_code(), ErrorCode::DuplicateSettlement);
        assert!(!duplicate.is_retryable());

        let exhausted = AppError::reconciliation_exhausted("ws_CO_0002", 5);
        assert_eq!(exhausted.status_code(), 409);
        assert_eq!(exhausted.error_code(), ErrorCode::ReconciliationExhausted);
        assert!(exhausted.user_message().contains("after 5 attempts"));
        assert!(!exhausted.is_retryable());
    }

    #[test]
    fn error_codes_serialize_screaming_snake() {
        let json = serde_json::to_value(ErrorCode::ReconciliationExhausted).unwrap();
        assert_eq!(json, serde_json::json!("RECONCILIATION_EXHAUSTED"));
    }

    #[test]
    fn amount_errors_become_validation_errors() {
        let err: AppError = crate::money::AmountError::Negative("-1".to_string()).into();
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.error_code(), ErrorCode::ValidationError);
    }
}
