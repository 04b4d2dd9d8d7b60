//! Business logic: ledger, fee split, rent allocation and settlement flows

pub mod fee_calculation;
pub mod ledger;
pub mod notification;
pub mod payment_initiator;
pub mod rent_allocator;
pub mod settlements;
pub mod wallet;

pub use fee_calculation::{FeeSplit, FeeSplitter};
pub use ledger::{Ledger, LedgerError, OwnerLocks};
pub use payment_initiator::{InitiationError, PaymentInitiator, PendingReference};
pub use rent_allocator::RentAllocator;
pub use settlements::SettlementService;
pub use wallet::{PayRentRequest, RentReceipt, TopUpReceipt, WalletService};
