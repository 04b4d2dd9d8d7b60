use crate::money::Amount;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderName {
    Mpesa,
}

impl ProviderName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderName::Mpesa => "mpesa",
        }
    }
}

impl fmt::Display for ProviderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// STK push towards a payer's handset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushRequest {
    /// Normalized `254XXXXXXXXX` form.
    pub msisdn: String,
    pub amount: Amount,
    /// Identifier the gateway echoes back in its own records.
    pub payer_ref: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushResponse {
    /// Gateway account reference; the settlement's natural key.
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationRequest {
    pub reference: String,
}

/// What the gateway says about a reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayStatus {
    Success,
    Failed,
    Pending,
    Unknown(String),
}

impl GatewayStatus {
    pub fn from_wire(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "success" => GatewayStatus::Success,
            "failed" => GatewayStatus::Failed,
            "pending" => GatewayStatus::Pending,
            other => GatewayStatus::Unknown(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationResponse {
    pub status: GatewayStatus,
}
