use super::auth::Principal;
use super::{json_body, ApiState};
use crate::database::rent_payment_repository::PaymentChannel;
use crate::error::AppResult;
use crate::money::Amount;
use crate::services::fee_calculation::FeeSplit;
use crate::services::wallet::{PayRentRequest, RentReceipt};
use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct AddFundsBody {
    pub amount: Amount,
    pub phone: String,
}

#[derive(Debug, Deserialize)]
pub struct RemoveFundsBody {
    pub amount: Amount,
}

#[derive(Debug, Deserialize)]
pub struct PayRentBody {
    pub amount: Amount,
    #[serde(alias = "paymentChannel")]
    pub payment_channel: PaymentChannel,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RentDetails {
    pub total_paid: Amount,
    pub service_fee: Amount,
    pub landlord_receives: Amount,
}

impl From<FeeSplit> for RentDetails {
    fn from(split: FeeSplit) -> Self {
        Self {
            total_paid: split.gross,
            service_fee: split.service_fee,
            landlord_receives: split.net,
        }
    }
}

pub async fn add_funds(
    State(state): State<ApiState>,
    principal: Principal,
    payload: Result<Json<AddFundsBody>, JsonRejection>,
) -> AppResult<Json<Value>> {
    let body = json_body(payload)?;
    info!(user_id = %principal.user_id(), amount = %body.amount, "Add funds requested");

    let receipt = state
        .wallet
        .add_funds(principal.user_id(), &body.phone, body.amount)
        .await?;

    Ok(Json(json!({
        "status": "success",
        "message": "STK Push initiated successfully. Transaction status will be updated shortly.",
        "reference": receipt.reference,
        "amount": receipt.amount,
    })))
}

pub async fn remove_funds(
    State(state): State<ApiState>,
    principal: Principal,
    payload: Result<Json<RemoveFundsBody>, JsonRejection>,
) -> AppResult<Json<Value>> {
    let body = json_body(payload)?;
    let wallet = state
        .wallet
        .remove_funds(principal.user_id(), body.amount)
        .await?;

    Ok(Json(json!({
        "status": "success",
        "message": "Funds removed successfully!",
        "balance": wallet.balance,
    })))
}

pub async fn get_balance(
    State(state): State<ApiState>,
    principal: Principal,
) -> AppResult<Json<Value>> {
    let balance = state.wallet.get_balance(principal.user_id()).await?;

    Ok(Json(json!({
        "status": "success",
        "balance": balance,
        "currency": state.currency,
    })))
}

pub async fn pay_rent(
    State(state): State<ApiState>,
    principal: Principal,
    payload: Result<Json<PayRentBody>, JsonRejection>,
) -> AppResult<Json<Value>> {
    let body = json_body(payload)?;
    info!(
        user_id = %principal.user_id(),
        amount = %body.amount,
        channel = body.payment_channel.as_str(),
        "Rent payment requested"
    );

    let receipt = state
        .wallet
        .pay_rent(
            principal.user_id(),
            PayRentRequest {
                amount: body.amount,
                channel: body.payment_channel,
                phone: body.phone,
            },
        )
        .await?;

    let response = match receipt {
        RentReceipt::Paid {
            payment,
            split,
            payer_balance,
        } => json!({
            "status": "success",
            "message": "Rent paid successfully!",
            "month": payment.month,
            "balance": payer_balance,
            "details": RentDetails::from(split),
        }),
        RentReceipt::Pending { reference, split } => json!({
            "status": "success",
            "message": "Rent payment initiated successfully!",
            "reference": reference,
            "details": RentDetails::from(split),
        }),
    };
    Ok(Json(response))
}
