use crate::annotate;
use crate::config::BridgeSettings;
use crate::hooks::{DebugEvent, DebugEventRouter, HOOK_CONTINUE};
use crate::host::DebugHost;
use crate::rpc::{RegisterDeltas, RpcClient};
use crate::worker::WorkerLauncher;
use crate::{Error, Result};

/// Everything one emulation window needs, from open to close.
///
/// Emulation blocks the calling (host event) thread; the runtime is
/// current-thread so only one request can ever be in flight.
pub struct Session {
    runtime: tokio::runtime::Runtime,
    launcher: WorkerLauncher,
    client: RpcClient,
    router: DebugEventRouter,
    annotate: bool,
}

impl Session {
    pub fn new(settings: &BridgeSettings) -> Result<Self> {
        Self::with_launcher(settings, WorkerLauncher::new(settings))
    }

    pub fn with_launcher(settings: &BridgeSettings, launcher: WorkerLauncher) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self {
            runtime,
            launcher,
            client: RpcClient::new(settings),
            router: DebugEventRouter::new(),
            annotate: settings.annotate,
        })
    }

    /// Create a session and start the worker right away.
    pub fn open(settings: &BridgeSettings) -> Result<Self> {
        Self::open_with_launcher(settings, WorkerLauncher::new(settings))
    }

    pub fn open_with_launcher(settings: &BridgeSettings, launcher: WorkerLauncher) -> Result<Self> {
        let mut session = Self::with_launcher(settings, launcher)?;
        session.launcher.ensure_running()?;
        Ok(session)
    }

    pub fn launcher(&self) -> &WorkerLauncher {
        &self.launcher
    }

    pub fn annotate(&self) -> bool {
        self.annotate
    }

    pub fn set_annotate(&mut self, annotate: bool) {
        self.annotate = annotate;
    }

    pub fn verbose(&self) -> bool {
        self.client.verbose()
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.client.set_verbose(verbose);
    }

    pub fn is_hooked(&self) -> bool {
        self.router.is_hooked()
    }

    pub fn set_hooking(&mut self, host: &mut dyn DebugHost, enabled: bool) -> Result<()> {
        if enabled {
            self.router.hook(host)
        } else {
            self.router.unhook(host)
        }
    }

    /// Run one emulation and annotate its results. Failures are shown to
    /// the user through the host before being returned.
    pub fn emulate(
        &mut self,
        host: &mut dyn DebugHost,
        address: Option<u64>,
        code: Option<Vec<u8>>,
    ) -> Result<RegisterDeltas> {
        let run = self
            .client
            .run_emulation(host, &mut self.launcher, address, code);
        let deltas = match self.runtime.block_on(run) {
            Ok(deltas) => deltas,
            Err(e) => {
                if e.is_fatal() {
                    tracing::warn!("Emulation failed: {}", e);
                }
                match &e {
                    Error::Worker(detail) => host.warn(detail),
                    other => host.warn(&other.to_string()),
                }
                return Err(e);
            }
        };

        if self.annotate {
            if let Err(e) = self.annotate_results(host, &deltas) {
                tracing::warn!("Annotation failed: {}", e);
                host.warn(&e.to_string());
                return Err(e);
            }
        }
        Ok(deltas)
    }

    /// The instruction at the current IP has not run in the debuggee yet,
    /// so its entry is left unannotated.
    fn annotate_results(&self, host: &mut dyn DebugHost, deltas: &RegisterDeltas) -> Result<usize> {
        let ip_register = host.bitness().ip_register();
        let ip = host.read_register(ip_register)?;
        let mut pending = deltas.clone();
        pending.remove(&ip);
        annotate::apply_deltas(host, &pending)
    }

    pub fn on_debug_event(&mut self, host: &mut dyn DebugHost, event: DebugEvent) -> i32 {
        if !self.router.is_hooked() {
            tracing::trace!("{:?} while not hooked, ignoring", event);
            return HOOK_CONTINUE;
        }
        tracing::debug!("{:?}, emulating at current IP", event);
        // Errors were already reported to the user by `emulate`.
        let _ = self.emulate(host, None, None);
        HOOK_CONTINUE
    }

    /// Window-close teardown: drop hooks and ask the worker to quit.
    pub fn close(&mut self, host: &mut dyn DebugHost) {
        if let Err(e) = self.router.unhook(host) {
            tracing::warn!("Failed to remove debugger hooks: {}", e);
        }
        self.runtime.block_on(self.launcher.shutdown());
    }
}
