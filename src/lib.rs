//! Rent wallet ledger and M-Pesa push-payment reconciliation.

pub mod api;
pub mod app;
pub mod calendar;
pub mod config;
pub mod database;
pub mod error;
pub mod health;
pub mod logging;
pub mod middleware;
pub mod money;
pub mod payments;
pub mod services;
pub mod workers;
