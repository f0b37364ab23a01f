//! Host-side primitives.
//!
//! The debugging host owns the live debuggee. Everything the bridge needs
//! from it (registers, memory, breakpoints, comments, user warnings) goes
//! through [`DebugHost`], so the protocol code never touches host APIs
//! directly.

use serde::{Deserialize, Serialize};

/// A failed host primitive, carrying the host's own message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct HostError(pub String);

impl From<HostError> for crate::Error {
    fn from(e: HostError) -> Self {
        crate::Error::Host(e.0)
    }
}

pub type HostResult<T> = std::result::Result<T, HostError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Suspended,
    Running,
    NotAttached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bitness {
    Bits32,
    Bits64,
}

impl Bitness {
    pub fn bits(self) -> u32 {
        match self {
            Self::Bits32 => 32,
            Self::Bits64 => 64,
        }
    }

    pub fn from_bits(bits: u64) -> Option<Self> {
        match bits {
            32 => Some(Self::Bits32),
            64 => Some(Self::Bits64),
            _ => None,
        }
    }

    /// Name of the instruction pointer register for this width.
    pub fn ip_register(self) -> &'static str {
        match self {
            Self::Bits32 => "EIP",
            Self::Bits64 => "RIP",
        }
    }
}

/// A host breakpoint. `flags` are the host's own bits and pass through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breakpoint {
    pub address: u64,
    pub enabled: bool,
    pub flags: u32,
}

pub trait DebugHost {
    fn process_state(&self) -> ProcessState;
    fn bitness(&self) -> Bitness;

    fn read_register(&mut self, name: &str) -> HostResult<u64>;
    fn write_register(&mut self, name: &str, value: u64) -> HostResult<()>;
    fn read_memory(&mut self, address: u64, len: usize) -> HostResult<Vec<u8>>;
    fn write_memory(&mut self, address: u64, bytes: &[u8]) -> HostResult<()>;

    /// Breakpoint located exactly at `address`, if any.
    fn breakpoint_at(&mut self, address: u64) -> Option<Breakpoint>;
    fn update_breakpoint(&mut self, bpt: &Breakpoint) -> HostResult<()>;

    fn comment(&self, address: u64) -> Option<String>;
    fn set_comment(&mut self, address: u64, text: &str) -> HostResult<()>;

    /// Show a warning to the user.
    fn warn(&mut self, message: &str);

    fn install_hooks(&mut self) -> HostResult<()>;
    fn remove_hooks(&mut self) -> HostResult<()>;
}
