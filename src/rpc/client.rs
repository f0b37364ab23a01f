use std::time::Duration;

use super::callbacks;
use super::protocol::{ClientMessage, EmulationRequest, RegisterDeltas, WorkerMessage};
use super::transport::Connection;
use crate::config::BridgeSettings;
use crate::host::{DebugHost, ProcessState};
use crate::worker::WorkerLauncher;
use crate::{Error, Result};

pub const PAGE_SIZE: u64 = 0x1000;

/// Drives one emulation request at a time against the worker.
pub struct RpcClient {
    read_timeout: Duration,
    launch_delay: Duration,
    verbose: bool,
}

impl RpcClient {
    pub fn new(settings: &BridgeSettings) -> Self {
        Self {
            read_timeout: settings.read_timeout(),
            launch_delay: settings.launch_delay(),
            verbose: settings.verbose,
        }
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    /// Emulate from `address` (default: the current instruction pointer)
    /// over `code` (default: the memory page containing `address`).
    ///
    /// Returns the register deltas the worker observed, keyed by
    /// instruction address. Nothing is sent if the debuggee is not paused.
    pub async fn run_emulation(
        &self,
        host: &mut dyn DebugHost,
        launcher: &mut WorkerLauncher,
        address: Option<u64>,
        code: Option<Vec<u8>>,
    ) -> Result<RegisterDeltas> {
        if host.process_state() != ProcessState::Suspended {
            return Err(Error::NotPaused);
        }

        let bitness = host.bitness();
        let address = match address {
            Some(address) => address,
            None => host.read_register(bitness.ip_register())?,
        };
        let code = match code {
            Some(code) => code,
            None => snapshot_page(host, address)?,
        };

        let request = ClientMessage::Emulate(EmulationRequest {
            address,
            code,
            bitness,
            verbose: self.verbose,
        });

        let mut conn = self.open_connection(launcher).await?;
        tracing::debug!("Sending emulation request at {:#x}", address);
        conn.send(&request.encode()?).await?;

        let deltas = dispatch_loop(&mut conn, host).await?;
        tracing::debug!("Emulation at {:#x} returned {} addresses", address, deltas.len());
        Ok(deltas)
    }

    /// Connect, or launch the worker and try exactly once more.
    async fn open_connection(&self, launcher: &mut WorkerLauncher) -> Result<Connection> {
        let addr = launcher.addr();
        match Connection::connect(addr, self.read_timeout).await {
            Ok(conn) => return Ok(conn),
            Err(e) => {
                tracing::info!("Emulation worker not reachable at {} ({}), launching", addr, e);
            }
        }

        launcher.mark_stopped();
        launcher.ensure_running()?;
        tokio::time::sleep(self.launch_delay).await;

        Connection::connect(addr, self.read_timeout)
            .await
            .map_err(|source| Error::ConnectFailure { addr: addr.to_string(), source })
    }
}

/// Answer callbacks until the worker sends a terminal message.
async fn dispatch_loop(conn: &mut Connection, host: &mut dyn DebugHost) -> Result<RegisterDeltas> {
    loop {
        let Some(frame) = conn.recv().await? else {
            tracing::debug!("Worker closed the connection without a result");
            return Ok(RegisterDeltas::new());
        };

        match WorkerMessage::decode(&frame)? {
            WorkerMessage::Call { function, args } => {
                let reply = callbacks::dispatch(host, &function, args)?;
                conn.send(&serde_json::to_vec(&reply)?).await?;
            }
            WorkerMessage::Error(detail) => return Err(Error::Worker(detail)),
            WorkerMessage::Result(deltas) => return Ok(deltas),
        }
    }
}

/// Read the page holding `address` with any breakpoint there switched off,
/// so the breakpoint's patch byte is not captured as code.
fn snapshot_page(host: &mut dyn DebugHost, address: u64) -> Result<Vec<u8>> {
    let base = address & !(PAGE_SIZE - 1);

    let saved = host.breakpoint_at(address).filter(|bpt| bpt.enabled);
    if let Some(bpt) = &saved {
        let mut disabled = bpt.clone();
        disabled.enabled = false;
        host.update_breakpoint(&disabled)?;
    }

    let read = host.read_memory(base, PAGE_SIZE as usize);

    let restored = match &saved {
        Some(bpt) => host.update_breakpoint(bpt),
        None => Ok(()),
    };

    match (read, restored) {
        (Ok(code), Ok(())) => Ok(code),
        (Ok(_), Err(e)) => Err(e.into()),
        (Err(e), restored) => {
            if let Err(re) = restored {
                tracing::warn!("Failed to restore breakpoint at {:#x}: {}", address, re);
            }
            Err(e.into())
        }
    }
}
