mod errors;
pub use errors::*;

mod engine;
pub use engine::*;

pub mod handlers;
pub use handlers::*;

mod worker;
pub use worker::*;
