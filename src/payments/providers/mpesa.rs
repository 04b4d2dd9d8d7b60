//! M-Pesa STK push through the relay service.
//!
//! The relay owns the Daraja credentials; we only see two JSON endpoints:
//! initiate (`msisdn`, `amount`, `userId` -> `account_reference`) and
//! confirm (`transaction_id` -> `status`).

use crate::money::Amount;
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::provider::PushPaymentProvider;
use crate::payments::types::{
    ConfirmationRequest, ConfirmationResponse, GatewayStatus, ProviderName, PushRequest,
    PushResponse,
};
use crate::payments::utils::PaymentHttpClient;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Number, Value as JsonValue};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct MpesaConfig {
    pub stk_initiate_url: String,
    pub confirm_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for MpesaConfig {
    fn default() -> Self {
        Self {
            stk_initiate_url: "http://localhost:8082/api/mpesa/stk/initiate".to_string(),
            confirm_url: "http://localhost:8082/api/mpesa/confirmTransactions".to_string(),
            timeout_secs: 30,
            max_retries: 2,
        }
    }
}

impl MpesaConfig {
    pub fn from_env() -> PaymentResult<Self> {
        let defaults = Self::default();
        let config = Self {
            stk_initiate_url: std::env::var("MPESA_STK_INITIATE_URL")
                .unwrap_or(defaults.stk_initiate_url),
            confirm_url: std::env::var("MPESA_CONFIRM_URL").unwrap_or(defaults.confirm_url),
            timeout_secs: number_var("MPESA_TIMEOUT_SECONDS", defaults.timeout_secs)?,
            max_retries: number_var("MPESA_HTTP_RETRIES", defaults.max_retries)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PaymentResult<()> {
        for (field, url) in [
            ("MPESA_STK_INITIATE_URL", &self.stk_initiate_url),
            ("MPESA_CONFIRM_URL", &self.confirm_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(PaymentError::invalid(
                    field,
                    format!("{} must be an http(s) URL", field),
                ));
            }
        }
        if self.timeout_secs == 0 {
            return Err(PaymentError::invalid(
                "MPESA_TIMEOUT_SECONDS",
                "MPESA_TIMEOUT_SECONDS must be greater than zero",
            ));
        }
        Ok(())
    }
}

fn number_var<T: FromStr>(name: &str, default: T) -> PaymentResult<T> {
    parse_number(name, std::env::var(name).ok(), default)
}

/// Unset falls back to `default`; set but unparsable is an error.
fn parse_number<T: FromStr>(name: &str, raw: Option<String>, default: T) -> PaymentResult<T> {
    match raw {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| {
            PaymentError::invalid(
                name,
                format!("{} must be a non-negative integer, got '{}'", name, raw),
            )
        }),
    }
}

#[derive(Debug, Deserialize)]
struct InitiateReply {
    account_reference: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusReply {
    status: Option<String>,
}

pub struct MpesaProvider {
    config: MpesaConfig,
    http: PaymentHttpClient,
}

impl MpesaProvider {
    pub fn new(config: MpesaConfig) -> PaymentResult<Self> {
        let http = PaymentHttpClient::new(
            ProviderName::Mpesa.as_str(),
            Duration::from_secs(config.timeout_secs),
            config.max_retries,
        )?;
        Ok(Self { config, http })
    }

    pub fn from_env() -> PaymentResult<Self> {
        Self::new(MpesaConfig::from_env()?)
    }
}

/// The relay expects a JSON number, not the decimal string we use elsewhere.
fn amount_json(amount: Amount) -> PaymentResult<JsonValue> {
    Number::from_str(&amount.to_decimal().normalize().to_string())
        .map(JsonValue::Number)
        .map_err(|e| {
            PaymentError::invalid("amount", format!("amount {} cannot be encoded: {}", amount, e))
        })
}

#[async_trait]
impl PushPaymentProvider for MpesaProvider {
    async fn initiate_push(&self, request: PushRequest) -> PaymentResult<PushResponse> {
        if !request.amount.is_positive() {
            return Err(PaymentError::invalid(
                "amount",
                "amount must be greater than zero",
            ));
        }

        let payload = serde_json::json!({
            "msisdn": request.msisdn,
            "amount": amount_json(request.amount)?,
            "userId": request.payer_ref,
        });

        let reply: InitiateReply = self
            .http
            .post_json(&self.config.stk_initiate_url, &payload)
            .await?;

        let reference = reply
            .account_reference
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .ok_or_else(|| PaymentError::MalformedReply {
                message: "gateway accepted the push but returned no account reference".to_string(),
            })?;

        info!(
            reference = %reference,
            amount_minor = request.amount.minor(),
            "📲 STK push initiated"
        );
        Ok(PushResponse { reference })
    }

    async fn confirm(&self, request: ConfirmationRequest) -> PaymentResult<ConfirmationResponse> {
        let payload = serde_json::json!({ "transaction_id": request.reference });
        let reply: StatusReply = self.http.post_json(&self.config.confirm_url, &payload).await?;

        let status = reply
            .status
            .as_deref()
            .map(GatewayStatus::from_wire)
            .unwrap_or_else(|| GatewayStatus::Unknown(String::new()));
        debug!(reference = %request.reference, status = ?status, "gateway status");

        Ok(ConfirmationResponse { status })
    }

    fn name(&self) -> ProviderName {
        ProviderName::Mpesa
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amounts_encode_as_json_numbers() {
        assert_eq!(
            amount_json(Amount::from_major(1000)).unwrap(),
            serde_json::json!(1000)
        );
        assert_eq!(
            amount_json(Amount::from_minor(1050)).unwrap(),
            serde_json::json!(10.5)
        );
    }

    #[test]
    fn numeric_settings_reject_garbage_instead_of_defaulting() {
        assert_eq!(parse_number::<u64>("MPESA_TIMEOUT_SECONDS", None, 30).unwrap(), 30);
        assert_eq!(
            parse_number::<u64>("MPESA_TIMEOUT_SECONDS", Some(" 45 ".to_string()), 30).unwrap(),
            45
        );

        let err = parse_number::<u64>("MPESA_TIMEOUT_SECONDS", Some("30s".to_string()), 30)
            .unwrap_err();
        assert!(matches!(
            err,
            PaymentError::InvalidRequest { field: Some(ref f), .. } if f == "MPESA_TIMEOUT_SECONDS"
        ));
        assert!(parse_number::<u32>("MPESA_HTTP_RETRIES", Some("-1".to_string()), 2).is_err());
    }

    #[test]
    fn config_rejects_non_http_urls() {
        let config = MpesaConfig {
            stk_initiate_url: "ftp://relay".to_string(),
            ..MpesaConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(MpesaConfig::default().validate().is_ok());
    }
}
