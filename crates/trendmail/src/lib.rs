#![forbid(unsafe_code)]

pub mod cli;
pub mod config;
pub mod history;
pub mod mail;
pub mod models;
pub mod query;
pub mod reports;
pub mod shape;
pub mod spark;
pub mod store;
pub mod utils;

pub use cli::app::Cli;
