use crate::common::builder::event::{LINE, answer_with_data};
use crate::common::mocks::link::SharedPort;
use dirsim_core::common::Addr;
use dirsim_core::config::{CoherenceProtocol, DirectoryConfig};
use dirsim_core::protocol::{Command, MemEvent, State};
use dirsim_core::{DirectoryController, DirectoryError};

pub const DIR: &str = "directory";
pub const MEM: &str = "memory";

/// Cycles `exchange` runs; long enough for any internal chain to settle at zero latency.
const SETTLE_CYCLES: u64 = 8;

/// Messages the directory emitted during one exchange.
#[derive(Debug, Default)]
pub struct Outbox {
    pub caches: Vec<MemEvent>,
    pub memory: Vec<MemEvent>,
}

impl Outbox {
    pub fn to_caches(&self, cmd: Command) -> Vec<&MemEvent> {
        self.caches.iter().filter(|e| e.cmd == cmd).collect()
    }

    pub fn to_memory(&self, cmd: Command) -> Vec<&MemEvent> {
        self.memory.iter().filter(|e| e.cmd == cmd).collect()
    }

    /// The single event of `cmd` sent to caches.
    pub fn one_to_cache(&self, cmd: Command) -> MemEvent {
        let found = self.to_caches(cmd);
        assert_eq!(found.len(), 1, "expected one {cmd} to caches, got {:#?}", self.caches);
        found[0].clone()
    }

    /// The single event of `cmd` sent to memory.
    pub fn one_to_memory(&self, cmd: Command) -> MemEvent {
        let found = self.to_memory(cmd);
        assert_eq!(found.len(), 1, "expected one {cmd} to memory, got {:#?}", self.memory);
        found[0].clone()
    }

    pub fn is_empty(&self) -> bool {
        self.caches.is_empty() && self.memory.is_empty()
    }
}

/// A directory whose caches and memory are played by the test.
pub struct TestDirectory {
    pub dir: DirectoryController,
    pub caches: SharedPort,
    pub memory: SharedPort,
}

impl Default for TestDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl TestDirectory {
    pub fn new() -> Self {
        Self::with_config(DirectoryConfig::default(), &["c0", "c1", "c2"])
    }

    /// MSI directory, so reads of unshared lines are granted shared.
    pub fn msi() -> Self {
        let config = DirectoryConfig {
            protocol: CoherenceProtocol::Msi,
            ..DirectoryConfig::default()
        };
        Self::with_config(config, &["c0", "c1", "c2"])
    }

    pub fn with_config(config: DirectoryConfig, sources: &[&str]) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();

        let caches = SharedPort::new(MEM, sources);
        let memory = SharedPort::new(MEM, &[]);
        let dir = DirectoryController::new(
            DirectoryConfig {
                name: DIR.to_owned(),
                ..config
            },
            Box::new(caches.clone()),
            Some(Box::new(memory.clone())),
        )
        .unwrap();
        Self { dir, caches, memory }
    }

    pub fn from_cache(&self, event: MemEvent) {
        self.caches.inject(event);
    }

    pub fn from_memory(&self, event: MemEvent) {
        self.memory.inject(event);
    }

    pub fn tick(&mut self) -> Result<bool, DirectoryError> {
        self.dir.tick()
    }

    /// Runs `cycles` ticks, panicking on a directory error.
    pub fn run(&mut self, cycles: u64) {
        for _ in 0..cycles {
            let _ = self.dir.tick().unwrap();
        }
    }

    /// Lets pending work settle and collects everything the directory sent.
    pub fn exchange(&mut self) -> Outbox {
        self.run(SETTLE_CYCLES);
        Outbox {
            caches: self.caches.take_sent(),
            memory: self.memory.take_sent(),
        }
    }

    /// Like `exchange`, but returns the first error instead of panicking.
    pub fn try_exchange(&mut self) -> Result<Outbox, DirectoryError> {
        for _ in 0..SETTLE_CYCLES {
            let _ = self.dir.tick()?;
        }
        Ok(Outbox {
            caches: self.caches.take_sent(),
            memory: self.memory.take_sent(),
        })
    }

    pub fn state(&self, addr: Addr) -> State {
        self.dir.entry(addr).map_or(State::I, |e| e.state())
    }

    pub fn sharers(&self, addr: Addr) -> Vec<String> {
        self.dir
            .entry(addr)
            .map(|e| e.sharers().iter().map(|&n| self.dir.nodes().name(n).to_owned()).collect())
            .unwrap_or_default()
    }

    pub fn owner(&self, addr: Addr) -> Option<String> {
        self.dir
            .entry(addr)
            .and_then(|e| e.owner())
            .map(|n| self.dir.nodes().name(n).to_owned())
    }

    /// Answers a forwarded memory request with a full line of `byte`.
    pub fn memory_data(&mut self, request: &MemEvent, byte: u8) -> Outbox {
        let cmd = if request.cmd == Command::GetS {
            Command::GetSResp
        } else {
            Command::GetXResp
        };
        self.from_memory(answer_with_data(request, cmd, vec![byte; LINE], false));
        self.exchange()
    }

    /// Has each cache in `names` read `addr` in turn, leaving the line shared.
    ///
    /// The directory must be MSI; under MESI the first reader is granted ownership.
    pub fn share(&mut self, addr: Addr, names: &[&str]) {
        for name in names {
            self.from_cache(crate::common::builder::event::get_s(name, addr));
            let out = self.exchange();
            let fetch = out.one_to_memory(Command::GetS);
            let _ = self.memory_data(&fetch, 0x11);
        }
        assert_eq!(self.state(addr), State::S);
    }

    /// Gives `name` ownership of `addr` through a GetX.
    pub fn own(&mut self, addr: Addr, name: &str) {
        self.from_cache(crate::common::builder::event::get_x(name, addr));
        let out = self.exchange();
        let fetch = out.one_to_memory(Command::GetX);
        let _ = self.memory_data(&fetch, 0x22);
        assert_eq!(self.state(addr), State::M);
        assert_eq!(self.owner(addr).as_deref(), Some(name));
    }
}
