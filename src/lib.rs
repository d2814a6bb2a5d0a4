//! Stellar transaction submission service.
//!
//! Transactions are picked from a store, paired with a channel account,
//! built by a type-specific handler, wrapped in a fee bump paid by the
//! distribution account and submitted to Horizon. Workers reconcile
//! transactions whose outcome is unknown before resubmitting them.
pub mod bootstrap;
pub mod config;
pub mod constants;
pub mod domain;
pub mod jobs;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod repositories;
pub mod services;
pub mod utils;
