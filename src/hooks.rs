//! Debugger event hooks that trigger an emulation at the current IP.

use crate::host::DebugHost;
use crate::session::Session;
use crate::Result;

/// Status returned to the host debugger from every hook.
pub const HOOK_CONTINUE: i32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugEvent {
    Breakpoint { tid: u32, address: u64 },
    StepInto,
    StepOver,
    StepUntilReturn,
}

/// The host debugger's hook callbacks.
pub trait DebugHooks {
    fn dbg_bpt(&mut self, tid: u32, ea: u64) -> i32;
    fn dbg_step_into(&mut self) -> i32;
    fn dbg_step_over(&mut self) -> i32;
    fn dbg_step_until_ret(&mut self) -> i32;
}

/// Whether this session's hooks are installed in the host.
#[derive(Debug, Default)]
pub struct DebugEventRouter {
    hooked: bool,
}

impl DebugEventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_hooked(&self) -> bool {
        self.hooked
    }

    pub fn hook(&mut self, host: &mut dyn DebugHost) -> Result<()> {
        if self.hooked {
            return Ok(());
        }
        host.install_hooks()?;
        self.hooked = true;
        tracing::debug!("Debugger hooks installed");
        Ok(())
    }

    pub fn unhook(&mut self, host: &mut dyn DebugHost) -> Result<()> {
        if !self.hooked {
            tracing::debug!("unhook requested while not hooked, ignoring");
            return Ok(());
        }
        self.hooked = false;
        host.remove_hooks()?;
        tracing::debug!("Debugger hooks removed");
        Ok(())
    }
}

/// Binds a session to the host for the duration of one hook callback.
pub struct EmulationHooks<'a> {
    session: &'a mut Session,
    host: &'a mut dyn DebugHost,
}

impl<'a> EmulationHooks<'a> {
    pub fn new(session: &'a mut Session, host: &'a mut dyn DebugHost) -> Self {
        Self { session, host }
    }
}

impl DebugHooks for EmulationHooks<'_> {
    fn dbg_bpt(&mut self, tid: u32, ea: u64) -> i32 {
        self.session
            .on_debug_event(self.host, DebugEvent::Breakpoint { tid, address: ea })
    }

    fn dbg_step_into(&mut self) -> i32 {
        self.session.on_debug_event(self.host, DebugEvent::StepInto)
    }

    fn dbg_step_over(&mut self) -> i32 {
        self.session.on_debug_event(self.host, DebugEvent::StepOver)
    }

    fn dbg_step_until_ret(&mut self) -> i32 {
        self.session.on_debug_event(self.host, DebugEvent::StepUntilReturn)
    }
}
