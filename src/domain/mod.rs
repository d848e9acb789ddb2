//! Core domain types and logic.

pub mod account;
pub mod admin;
pub mod alert;
pub mod commodity;
pub mod error;
pub mod execution;
pub mod ledger;
pub mod order;
pub mod portfolio;
pub mod position;
pub mod quote_import;
pub mod user;
pub mod watchlist;
