pub mod reconciliation;
pub mod settlement_queue;
pub mod stuck_settlements;
