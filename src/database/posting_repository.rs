use crate::database::error::{DatabaseError, DatabaseResult};
use crate::database::rent_payment_repository::{insert_paid_in, NewRentPayment, RentPayment};
use crate::database::repository::PostingRepository;
use crate::database::settlement_repository::{confirm_in, PendingSettlement};
use crate::database::wallet_repository::{credit_in, find_in, try_debit_in, Wallet};
use crate::money::Amount;
use async_trait::async_trait;
use sqlx::PgPool;

/// A rent payment taken from the tenant's wallet.
#[derive(Debug, Clone)]
pub struct RentPosting {
    pub payer_owner_id: String,
    pub landlord_owner_id: String,
    pub gross: Amount,
    pub net: Amount,
    pub payment: NewRentPayment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletRentOutcome {
    Committed {
        payer: Wallet,
        landlord: Wallet,
        payment: RentPayment,
    },
    Insufficient {
        available: Amount,
    },
    NoWallet,
}

/// Everything a gateway confirmation writes.
#[derive(Debug, Clone)]
pub struct Confirmation {
    pub reference: String,
    pub expected_attempt: u32,
    pub attempt: u32,
    pub credit_owner_id: String,
    pub credit_amount: Amount,
    pub rent_payment: Option<NewRentPayment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    Applied {
        settlement: PendingSettlement,
        wallet: Wallet,
        payment: Option<RentPayment>,
    },
    /// The row was no longer live at the expected attempt; nothing written.
    AlreadyResolved,
}

pub struct PgPostingRepository {
    pool: PgPool,
}

impl PgPostingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PostingRepository for PgPostingRepository {
    async fn commit_wallet_rent(&self, posting: RentPosting) -> DatabaseResult<WalletRentOutcome> {
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;

        let payer = match try_debit_in(&mut *tx, &posting.payer_owner_id, posting.gross).await? {
            Some(wallet) => wallet,
            None => {
                let outcome = match find_in(&mut *tx, &posting.payer_owner_id).await? {
                    Some(wallet) => WalletRentOutcome::Insufficient {
                        available: wallet.balance,
                    },
                    None => WalletRentOutcome::NoWallet,
                };
                tx.rollback().await.map_err(DatabaseError::from_sqlx)?;
                return Ok(outcome);
            }
        };

        let landlord = credit_in(&mut *tx, &posting.landlord_owner_id, posting.net).await?;
        let payment = insert_paid_in(&mut *tx, &posting.payment).await?;

        tx.commit().await.map_err(DatabaseError::from_sqlx)?;

        Ok(WalletRentOutcome::Committed {
            payer,
            landlord,
            payment,
        })
    }

    async fn commit_confirmation(
        &self,
        confirmation: Confirmation,
    ) -> DatabaseResult<ConfirmationOutcome> {
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;

        let settlement = match confirm_in(
            &mut *tx,
            &confirmation.reference,
            confirmation.expected_attempt,
            confirmation.attempt,
        )
        .await?
        {
            Some(settlement) => settlement,
            None => {
                tx.rollback().await.map_err(DatabaseError::from_sqlx)?;
                return Ok(ConfirmationOutcome::AlreadyResolved);
            }
        };

        let wallet = credit_in(
            &mut *tx,
            &confirmation.credit_owner_id,
            confirmation.credit_amount,
        )
        .await?;

        let payment = match &confirmation.rent_payment {
            Some(payment) => Some(insert_paid_in(&mut *tx, payment).await?),
            None => None,
        };

        tx.commit().await.map_err(DatabaseError::from_sqlx)?;

        Ok(ConfirmationOutcome::Applied {
            settlement,
            wallet,
            payment,
        })
    }
}
