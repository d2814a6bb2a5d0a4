//! External collaborators of the submission engine and the process-wide
//! services shared by workers.
pub mod provider;
pub use provider::*;

pub mod signer;
pub use signer::*;

mod distribution_account;
pub use distribution_account::*;

mod ledger_number_tracker;
pub use ledger_number_tracker::*;

mod limiter;
pub use limiter::*;

mod events;
pub use events::*;

mod observer;
pub use observer::*;

mod crash_tracker;
pub use crash_tracker::*;
