pub mod chain;
pub mod cli;
pub mod coin_selection;
pub mod commands;
pub mod config;
pub mod error;
pub mod keys;
pub mod ledger;
pub mod output;
pub mod params;
pub mod sighash;
pub mod transaction;
pub mod types;

pub use error::AppError;
