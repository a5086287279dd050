//! Configuration for the directory model.
//!
//! This module defines the structures used to parameterize a directory and the
//! memory behind it. It provides:
//! 1. **Defaults:** Baseline constants matching a conventional 64-byte-line directory.
//! 2. **Structures:** `DirectoryConfig` for the controller and `MemoryConfig` for backing memory timing.
//! 3. **Enums:** Coherence protocol and memory controller selection.
//!
//! Configuration is supplied as JSON (`Config::from_json`) or built with `Config::default()`.

use serde::Deserialize;

use crate::common::DirectoryError;

/// Default configuration constants.
mod defaults {
    /// Component name used as `src` on outgoing events.
    pub const NAME: &str = "directory";

    /// Cache line size in bytes.
    pub const LINE_SIZE: u64 = 64;

    /// Number of directory entries kept resident before spilling to memory.
    pub const ENTRY_CACHE_SIZE: usize = 32768;

    /// Size in bytes of one spilled directory entry.
    ///
    /// Determines the size of the synthetic memory read and write used for spill and reload.
    pub const ENTRY_SIZE: u32 = 4;

    /// Cycles added to every message the directory sends to caches.
    pub const ACCESS_LATENCY: u64 = 0;

    /// Cycles added to responses served out of the MSHR and to retried sends.
    pub const MSHR_LATENCY: u64 = 0;

    /// Fixed latency of the simple memory controller.
    pub const MEMORY_LATENCY: u64 = 10;

    /// CAS latency in memory cycles.
    pub const T_CAS: u64 = 14;

    /// RAS latency in memory cycles.
    pub const T_RAS: u64 = 14;

    /// Precharge latency in memory cycles.
    pub const T_PRE: u64 = 14;
}

/// Coherence protocol spoken with the caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CoherenceProtocol {
    /// A read with no other sharers is granted exclusively.
    #[default]
    #[serde(alias = "Mesi", alias = "mesi")]
    Mesi,
    /// Reads are always granted shared.
    #[serde(alias = "Msi", alias = "msi")]
    Msi,
}

/// Memory controller implementation types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum MemoryController {
    /// Fixed latency per access.
    #[default]
    Simple,
    /// Row-buffer aware latency (CAS, RAS, precharge).
    #[serde(alias = "DRAM")]
    Dram,
}

/// Root configuration.
///
/// # Example
///
/// ```
/// use dirsim_core::config::{Config, CoherenceProtocol};
///
/// let json = r#"{
///     "directory": {
///         "line_size": 64,
///         "protocol": "MSI",
///         "entry_cache_size": 1024,
///         "mshr_num_entries": 16,
///         "max_requests_per_cycle": 2
///     },
///     "memory": { "controller": "Dram" }
/// }"#;
///
/// let config = Config::from_json(json)?;
/// assert_eq!(config.directory.protocol, CoherenceProtocol::Msi);
/// assert_eq!(config.directory.mshr_capacity(), 16);
/// # Ok::<(), dirsim_core::DirectoryError>(())
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Directory controller parameters.
    #[serde(default)]
    pub directory: DirectoryConfig,
    /// Backing memory parameters.
    #[serde(default)]
    pub memory: MemoryConfig,
}

impl Config {
    /// Parses and validates a JSON configuration.
    ///
    /// # Errors
    ///
    /// Returns `DirectoryError::Json` for malformed input and
    /// `DirectoryError::InvalidConfig` when validation fails.
    pub fn from_json(json: &str) -> Result<Self, DirectoryError> {
        let config: Self = serde_json::from_str(json)?;
        config.directory.validate()?;
        Ok(config)
    }
}

/// Directory controller parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryConfig {
    /// Name used as the source of outgoing events.
    #[serde(default = "DirectoryConfig::default_name")]
    pub name: String,

    /// Cache line size in bytes (power of two).
    #[serde(default = "DirectoryConfig::default_line_size")]
    pub line_size: u64,

    /// Coherence protocol.
    #[serde(default)]
    pub protocol: CoherenceProtocol,

    /// Resident entry capacity; 0 spills every entry as soon as its request completes.
    #[serde(default = "DirectoryConfig::default_entry_cache_size")]
    pub entry_cache_size: usize,

    /// Bytes per spilled entry.
    #[serde(default = "DirectoryConfig::default_entry_size")]
    pub entry_size: u32,

    /// MSHR capacity in queued events; unbounded when absent.
    #[serde(default)]
    pub mshr_num_entries: Option<usize>,

    /// Latency of messages sent to caches.
    #[serde(default = "DirectoryConfig::default_access_latency")]
    pub access_latency_cycles: u64,

    /// Latency of responses served from the MSHR and of resent events.
    #[serde(default = "DirectoryConfig::default_mshr_latency")]
    pub mshr_latency_cycles: u64,

    /// Events processed per tick; 0 means no limit.
    #[serde(default)]
    pub max_requests_per_cycle: usize,

    /// Block the line after a writeback until memory acknowledges it.
    #[serde(default)]
    pub wait_writeback_ack: bool,

    /// New entries start spilled and are read from memory on first use.
    #[serde(default)]
    pub load_new_entries: bool,

    /// Line addresses to trace; empty traces everything.
    #[serde(default)]
    pub debug_addrs: Vec<u64>,
}

impl DirectoryConfig {
    fn default_name() -> String {
        defaults::NAME.to_owned()
    }

    fn default_line_size() -> u64 {
        defaults::LINE_SIZE
    }

    fn default_entry_cache_size() -> usize {
        defaults::ENTRY_CACHE_SIZE
    }

    fn default_entry_size() -> u32 {
        defaults::ENTRY_SIZE
    }

    fn default_access_latency() -> u64 {
        defaults::ACCESS_LATENCY
    }

    fn default_mshr_latency() -> u64 {
        defaults::MSHR_LATENCY
    }

    /// Returns the MSHR capacity, treating an absent bound as unlimited.
    pub fn mshr_capacity(&self) -> usize {
        self.mshr_num_entries.unwrap_or(usize::MAX)
    }

    /// Checks parameter consistency.
    ///
    /// # Errors
    ///
    /// Returns `DirectoryError::InvalidConfig` for a line size that is not a
    /// power of two, a zero-sized MSHR, or an empty name.
    pub fn validate(&self) -> Result<(), DirectoryError> {
        if !self.line_size.is_power_of_two() {
            return Err(DirectoryError::InvalidConfig(format!(
                "line_size must be a power of two, got {}",
                self.line_size
            )));
        }
        if self.mshr_num_entries == Some(0) {
            return Err(DirectoryError::InvalidConfig(
                "mshr_num_entries must be at least 1".to_owned(),
            ));
        }
        if self.name.is_empty() {
            return Err(DirectoryError::InvalidConfig("name must not be empty".to_owned()));
        }
        Ok(())
    }
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            name: Self::default_name(),
            line_size: defaults::LINE_SIZE,
            protocol: CoherenceProtocol::default(),
            entry_cache_size: defaults::ENTRY_CACHE_SIZE,
            entry_size: defaults::ENTRY_SIZE,
            mshr_num_entries: None,
            access_latency_cycles: defaults::ACCESS_LATENCY,
            mshr_latency_cycles: defaults::MSHR_LATENCY,
            max_requests_per_cycle: 0,
            wait_writeback_ack: false,
            load_new_entries: false,
            debug_addrs: Vec::new(),
        }
    }
}

/// Backing memory timing.
#[derive(Debug, Clone, Deserialize)]
pub struct MemoryConfig {
    /// Memory controller type
    #[serde(default)]
    pub controller: MemoryController,

    /// Fixed latency for the simple controller
    #[serde(default = "MemoryConfig::default_latency")]
    pub latency: u64,

    /// CAS latency (column access strobe)
    #[serde(default = "MemoryConfig::default_t_cas")]
    pub t_cas: u64,

    /// RAS latency (row access strobe)
    #[serde(default = "MemoryConfig::default_t_ras")]
    pub t_ras: u64,

    /// Precharge latency
    #[serde(default = "MemoryConfig::default_t_pre")]
    pub t_pre: u64,
}

impl MemoryConfig {
    fn default_latency() -> u64 {
        defaults::MEMORY_LATENCY
    }

    fn default_t_cas() -> u64 {
        defaults::T_CAS
    }

    fn default_t_ras() -> u64 {
        defaults::T_RAS
    }

    fn default_t_pre() -> u64 {
        defaults::T_PRE
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            controller: MemoryController::default(),
            latency: defaults::MEMORY_LATENCY,
            t_cas: defaults::T_CAS,
            t_ras: defaults::T_RAS,
            t_pre: defaults::T_PRE,
        }
    }
}
