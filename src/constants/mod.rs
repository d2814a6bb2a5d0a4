//! Constants shared across the submission service.
mod submission;
pub use submission::*;

mod limiter;
pub use limiter::*;

mod network;
pub use network::*;
