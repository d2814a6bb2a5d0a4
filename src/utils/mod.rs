mod address;
pub use address::*;

mod amount;
pub use amount::*;

mod encryption;
pub use encryption::*;

mod memo;
pub use memo::*;

mod redis;
pub use self::redis::*;

mod xdr;
pub use xdr::*;
