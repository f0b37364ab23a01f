pub mod annotate;
pub mod config;
pub mod error;
pub mod hooks;
pub mod host;
pub mod rpc;
pub mod session;
pub mod worker;

pub use error::{Error, Result};
pub use session::Session;
