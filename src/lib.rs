//! # covid-bot
//!
//! Discord bot that reports COVID-19 case statistics per country.
//!
//! ## Architecture
//!
//! - **resolve**: canonical field lookup over heterogeneous provider records
//! - **calculate**: timestamp normalization, daily counts and day-over-day diffs
//! - **fetch**: dataset API client and the cached country directory
//! - **storage**: SQLite guild/channel settings
//! - **present**: Discord embed rendering
//! - **bot**: command parsing, handling and scheduled notifications
//! - **api**: HTTP command relay endpoint
//! - **config**: configuration loading and validation

pub mod api;
pub mod bot;
pub mod calculate;
pub mod config;
pub mod fetch;
pub mod models;
pub mod present;
pub mod resolve;
pub mod storage;

pub use models::*;
