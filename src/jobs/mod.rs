//! Scheduling of transaction jobs.
//!
//! The manager polls the store on a fixed interval, locks a batch of
//! (channel account, transaction) pairs and runs one worker task per pair.
mod manager;
pub use manager::*;
