use std::net::SocketAddr;
use std::process::{Command, Stdio};
use std::time::Duration;

use crate::config::BridgeSettings;
use crate::rpc::protocol::ClientMessage;
use crate::rpc::transport::{worker_addr, Connection};
use crate::{Error, Result};

/// How long `shutdown` waits for the quit frame to go out before giving up.
const QUIT_TIMEOUT: Duration = Duration::from_secs(1);

/// Starts a worker process. Readiness is the caller's problem.
pub trait Spawn {
    fn spawn(&mut self) -> Result<()>;
}

/// Spawns the configured worker command as a detached process.
pub struct CommandSpawner {
    program: String,
    args: Vec<String>,
}

impl CommandSpawner {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self { program: program.into(), args }
    }
}

impl Spawn for CommandSpawner {
    fn spawn(&mut self) -> Result<()> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            const DETACHED_PROCESS: u32 = 0x0000_0008;
            command.creation_flags(CREATE_NO_WINDOW | DETACHED_PROCESS);
        }

        let child = command
            .spawn()
            .map_err(|e| Error::Launch(format!("{} {:?}: {}", self.program, self.args, e)))?;
        tracing::info!("Launched emulation worker {} (pid {})", self.program, child.id());
        Ok(())
    }
}

/// Tracks whether this session believes a worker is up.
///
/// There is only ever one worker, so a single flag stands in for
/// reference counting.
pub struct WorkerLauncher {
    spawner: Box<dyn Spawn>,
    addr: SocketAddr,
    running: bool,
}

impl WorkerLauncher {
    pub fn new(settings: &BridgeSettings) -> Self {
        Self::with_spawner(
            worker_addr(settings.worker_port),
            CommandSpawner::new(settings.worker_command.clone(), settings.worker_args.clone()),
        )
    }

    pub fn with_spawner(addr: SocketAddr, spawner: impl Spawn + 'static) -> Self {
        Self {
            spawner: Box::new(spawner),
            addr,
            running: false,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn ensure_running(&mut self) -> Result<()> {
        if self.running {
            return Ok(());
        }
        self.spawner.spawn()?;
        self.running = true;
        Ok(())
    }

    /// Force the next `ensure_running` to spawn, e.g. when the worker
    /// refused a connection even though it was believed alive.
    pub fn mark_stopped(&mut self) {
        self.running = false;
    }

    /// Fire-and-forget quit. Never fails; problems are only logged.
    pub async fn shutdown(&mut self) {
        self.running = false;
        if let Err(e) = send_quit(self.addr).await {
            tracing::warn!("Failed to send quit to emulation worker at {}: {}", self.addr, e);
        }
    }
}

async fn send_quit(addr: SocketAddr) -> Result<()> {
    let quit = ClientMessage::Quit.encode()?;
    let send = async {
        let mut conn = Connection::connect(addr, QUIT_TIMEOUT).await?;
        conn.send(&quit).await
    };
    match tokio::time::timeout(QUIT_TIMEOUT, send).await {
        Ok(result) => result,
        Err(_) => Err(Error::WorkerTimeout(QUIT_TIMEOUT)),
    }
}
