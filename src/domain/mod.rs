//! # Domain Module
//!
//! Core submission logic:
//!
//! * The submitter engine bundling the network and signing collaborators
//! * Error classification of network responses
//! * Transaction handlers, one per transaction type
//! * The transaction worker driving a job to completion

pub mod transaction;
pub use transaction::*;
