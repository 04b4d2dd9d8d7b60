use crate::payments::error::PaymentResult;
use crate::payments::types::{
    ConfirmationRequest, ConfirmationResponse, ProviderName, PushRequest, PushResponse,
};
use async_trait::async_trait;

/// A mobile-money gateway that pushes a payment prompt to the payer's phone
/// and reports the outcome when asked.
#[async_trait]
pub trait PushPaymentProvider: Send + Sync {
    async fn initiate_push(&self, request: PushRequest) -> PaymentResult<PushResponse>;

    async fn confirm(&self, request: ConfirmationRequest) -> PaymentResult<ConfirmationResponse>;

    fn name(&self) -> ProviderName;
}
