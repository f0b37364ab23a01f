#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::future::Future;
use std::net::{SocketAddr, TcpListener};
use std::rc::Rc;
use std::thread::JoinHandle;
use std::time::Duration;

use emubridge::config::BridgeSettings;
use emubridge::host::{Bitness, Breakpoint, DebugHost, HostError, HostResult, ProcessState};
use emubridge::rpc::ClientMessage;
use emubridge::worker::{Spawn, WorkerChannel, WorkerListener};

pub const MEM_BASE: u64 = 0x40_0000;
pub const MEM_LEN: usize = 0x2000;
pub const RIP: u64 = 0x40_0123;
pub const INT3: u8 = 0xcc;
pub const WORKER_TIMEOUT: Duration = Duration::from_secs(5);

/// In-memory debuggee. Enabled breakpoints show up as INT3 in reads,
/// like a real software breakpoint patch.
pub struct MockHost {
    pub state: ProcessState,
    pub bitness: Bitness,
    pub registers: HashMap<String, u64>,
    pub memory: Vec<u8>,
    pub breakpoints: HashMap<u64, Breakpoint>,
    pub breakpoint_updates: Vec<Breakpoint>,
    pub comments: HashMap<u64, String>,
    pub warnings: Vec<String>,
    pub memory_reads: Vec<(u64, usize)>,
    pub hooks_installed: bool,
    pub install_calls: u32,
    /// Refuse to re-enable breakpoints.
    pub fail_breakpoint_restore: bool,
}

impl MockHost {
    pub fn paused() -> Self {
        let mut registers = HashMap::new();
        registers.insert("RIP".to_string(), RIP);
        registers.insert("RAX".to_string(), 0x1111);
        registers.insert("RSP".to_string(), 0x7ffe_0000);
        Self {
            state: ProcessState::Suspended,
            bitness: Bitness::Bits64,
            registers,
            memory: (0..MEM_LEN).map(|i| (i % 251) as u8).collect(),
            breakpoints: HashMap::new(),
            breakpoint_updates: Vec::new(),
            comments: HashMap::new(),
            warnings: Vec::new(),
            memory_reads: Vec::new(),
            hooks_installed: false,
            install_calls: 0,
            fail_breakpoint_restore: false,
        }
    }

    pub fn running() -> Self {
        Self { state: ProcessState::Running, ..Self::paused() }
    }

    pub fn add_breakpoint(&mut self, address: u64, enabled: bool, flags: u32) {
        self.breakpoints.insert(address, Breakpoint { address, enabled, flags });
    }

    pub fn original_byte(&self, address: u64) -> u8 {
        self.memory[(address - MEM_BASE) as usize]
    }

    fn range(&self, address: u64, len: usize) -> HostResult<std::ops::Range<usize>> {
        let start = address
            .checked_sub(MEM_BASE)
            .ok_or_else(|| HostError(format!("unmapped address {:#x}", address)))? as usize;
        let end = start + len;
        if end > self.memory.len() {
            return Err(HostError(format!("unmapped range {:#x}+{:#x}", address, len)));
        }
        Ok(start..end)
    }
}

impl DebugHost for MockHost {
    fn process_state(&self) -> ProcessState {
        self.state
    }

    fn bitness(&self) -> Bitness {
        self.bitness
    }

    fn read_register(&mut self, name: &str) -> HostResult<u64> {
        self.registers
            .get(&name.to_ascii_uppercase())
            .copied()
            .ok_or_else(|| HostError(format!("unknown register {}", name)))
    }

    fn write_register(&mut self, name: &str, value: u64) -> HostResult<()> {
        self.registers.insert(name.to_ascii_uppercase(), value);
        Ok(())
    }

    fn read_memory(&mut self, address: u64, len: usize) -> HostResult<Vec<u8>> {
        self.memory_reads.push((address, len));
        let range = self.range(address, len)?;
        let mut bytes = self.memory[range].to_vec();
        for bpt in self.breakpoints.values().filter(|b| b.enabled) {
            if bpt.address >= address && bpt.address < address + len as u64 {
                bytes[(bpt.address - address) as usize] = INT3;
            }
        }
        Ok(bytes)
    }

    fn write_memory(&mut self, address: u64, bytes: &[u8]) -> HostResult<()> {
        let range = self.range(address, bytes.len())?;
        self.memory[range].copy_from_slice(bytes);
        Ok(())
    }

    fn breakpoint_at(&mut self, address: u64) -> Option<Breakpoint> {
        self.breakpoints.get(&address).cloned()
    }

    fn update_breakpoint(&mut self, bpt: &Breakpoint) -> HostResult<()> {
        self.breakpoint_updates.push(bpt.clone());
        if bpt.enabled && self.fail_breakpoint_restore {
            return Err(HostError(format!("cannot enable breakpoint at {:#x}", bpt.address)));
        }
        self.breakpoints.insert(bpt.address, bpt.clone());
        Ok(())
    }

    fn comment(&self, address: u64) -> Option<String> {
        self.comments.get(&address).cloned()
    }

    fn set_comment(&mut self, address: u64, text: &str) -> HostResult<()> {
        self.comments.insert(address, text.to_string());
        Ok(())
    }

    fn warn(&mut self, message: &str) {
        self.warnings.push(message.to_string());
    }

    fn install_hooks(&mut self) -> HostResult<()> {
        self.install_calls += 1;
        self.hooks_installed = true;
        Ok(())
    }

    fn remove_hooks(&mut self) -> HostResult<()> {
        self.hooks_installed = false;
        Ok(())
    }
}

pub fn bind_local() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// An address nothing is listening on.
pub fn free_addr() -> SocketAddr {
    let (listener, addr) = bind_local();
    drop(listener);
    addr
}

pub fn test_settings(addr: SocketAddr) -> BridgeSettings {
    BridgeSettings {
        worker_port: addr.port(),
        launch_delay_ms: 50,
        read_timeout_ms: 5_000,
        ..BridgeSettings::default()
    }
}

/// Serve exactly one request on `listener` from a background thread.
pub fn serve_once<F, Fut>(listener: TcpListener, script: F) -> JoinHandle<()>
where
    F: FnOnce(WorkerChannel, ClientMessage) -> Fut + Send + 'static,
    Fut: Future<Output = ()>,
{
    std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async move {
            let listener = WorkerListener::from_std(listener, WORKER_TIMEOUT).unwrap();
            let mut channel = listener.accept().await.unwrap();
            let request = channel.next_request().await.unwrap().expect("request frame");
            script(channel, request).await;
        });
    })
}

/// Counts spawns and does nothing else.
pub struct CountingSpawner(pub Rc<Cell<u32>>);

impl Spawn for CountingSpawner {
    fn spawn(&mut self) -> emubridge::Result<()> {
        self.0.set(self.0.get() + 1);
        Ok(())
    }
}

/// Brings a scripted worker up on `addr` the first time it is spawned.
pub struct LaunchingSpawner {
    pub addr: SocketAddr,
    pub spawns: Rc<Cell<u32>>,
    pub start: Option<Box<dyn FnOnce(TcpListener) -> JoinHandle<()>>>,
    pub worker: Rc<RefCell<Option<JoinHandle<()>>>>,
}

impl Spawn for LaunchingSpawner {
    fn spawn(&mut self) -> emubridge::Result<()> {
        self.spawns.set(self.spawns.get() + 1);
        if let Some(start) = self.start.take() {
            let listener = TcpListener::bind(self.addr)?;
            *self.worker.borrow_mut() = Some(start(listener));
        }
        Ok(())
    }
}
