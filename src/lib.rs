//! The Small POS - back-office core
//!
//! Expense capture, daily cash cuts and their approval workflow, period
//! financial summaries, customer quotations and staff profiles. Records are
//! read from and written to a [`BackOfficeStore`]: the hosted PostgREST
//! backend ([`SupabaseStore`]) in production, or a local SQLite database
//! ([`SqliteStore`]) for offline use and tests.

pub mod accounting;
pub mod cash_cut_print;
pub mod cash_cuts;
pub mod config;
pub mod db;
mod error;
pub mod escpos;
pub mod formatters;
pub mod logging;
pub mod models;
pub mod quotations;
pub mod storage;
pub mod store;
pub mod users;

pub use config::BackendConfig;
pub use error::{Error, Result};
pub use store::{BackOfficeStore, SqliteStore, SupabaseStore};
