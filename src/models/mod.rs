mod error;
pub use error::*;

mod transaction;
pub use transaction::*;

mod channel_account;
pub use channel_account::*;

mod tx_job;
pub use tx_job::*;

mod distribution_account;
pub use distribution_account::*;

mod event;
pub use event::*;

#[cfg(test)]
pub mod fixtures;
