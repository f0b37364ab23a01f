pub mod callbacks;
mod client;
pub mod protocol;
pub mod transport;

pub use callbacks::Callback;
pub use client::{RpcClient, PAGE_SIZE};
pub use protocol::{ClientMessage, EmulationRequest, RegisterDelta, RegisterDeltas, WorkerMessage};
