mod repository_error;
pub use repository_error::*;

mod signer;
pub use signer::*;

mod transaction;
pub use transaction::*;
