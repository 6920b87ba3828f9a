//! SupplySight Library
//!
//! Decision-support engines over supply chain order data: demand
//! forecasting, delivery-risk classification, inventory optimization,
//! supplier scoring, and a tool-calling agent that fronts them all.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod agent;
pub mod config;
pub mod dataset;
pub mod errors;
pub mod logging;
pub mod ml;

pub use config::AppConfig;
pub use errors::ServiceError;
