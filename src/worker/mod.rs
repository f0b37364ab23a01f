mod channel;
mod launcher;

pub use channel::{WorkerChannel, WorkerListener};
pub use launcher::{CommandSpawner, Spawn, WorkerLauncher};
