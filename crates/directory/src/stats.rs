//! Directory statistics collection and reporting.
//!
//! This module tracks what the directory saw and did. It provides:
//! 1. **Traffic received:** Requests, replacements, flushes, shootdowns and responses by command.
//! 2. **Traffic sent:** Invalidations, fetches, grants, acknowledgements and NACKs.
//! 3. **Memory traffic:** Data reads and writes, and entry spill/reload accesses.
//! 4. **Structures:** Entry cache hits, MSHR hits, evictions, same-cycle conflicts, stale answers.
//! 5. **Latency:** Mean service latency of requests and replacements.

use crate::protocol::{Command, MemEvent};

/// Counters maintained by the directory.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DirStats {
    /// Ticks executed.
    pub cycles: u64,

    /// `GetS` requests received.
    pub get_s_received: u64,
    /// `GetX` requests received.
    pub get_x_received: u64,
    /// `GetSX` requests received.
    pub get_sx_received: u64,
    /// `Write` requests received.
    pub write_received: u64,
    /// `PutS` replacements received.
    pub put_s_received: u64,
    /// `PutE` replacements received.
    pub put_e_received: u64,
    /// `PutM` replacements received.
    pub put_m_received: u64,
    /// `PutX` downgrades received.
    pub put_x_received: u64,
    /// `FlushLine` requests received.
    pub flush_line_received: u64,
    /// `FlushLineInv` requests received.
    pub flush_line_inv_received: u64,
    /// `FlushAll` requests received.
    pub flush_all_received: u64,
    /// Shootdowns received from memory-side agents.
    pub shootdowns_received: u64,
    /// Non-cacheable requests forwarded to memory.
    pub noncacheable_forwarded: u64,

    /// `FetchResp` answers received.
    pub fetch_resp_received: u64,
    /// `FetchXResp` answers received.
    pub fetch_x_resp_received: u64,
    /// `AckInv` answers received.
    pub ack_inv_received: u64,
    /// NACKs received.
    pub nack_received: u64,

    /// `Inv` messages sent.
    pub inv_sent: u64,
    /// `FetchInv` messages sent.
    pub fetch_inv_sent: u64,
    /// `FetchInvX` messages sent.
    pub fetch_inv_x_sent: u64,
    /// `ForwardFlush` messages sent.
    pub forward_flush_sent: u64,
    /// `GetSResp` grants sent.
    pub get_s_resp_sent: u64,
    /// `GetXResp` grants sent.
    pub get_x_resp_sent: u64,
    /// `AckPut` acknowledgements sent.
    pub ack_put_sent: u64,
    /// NACKs sent.
    pub nack_sent: u64,
    /// Events resent after a NACK.
    pub resent: u64,

    /// Data reads issued to memory.
    pub memory_data_reads: u64,
    /// Data writes (writebacks, write-throughs, flushes) issued to memory.
    pub memory_data_writes: u64,
    /// Entry reloads issued to memory.
    pub memory_entry_reads: u64,
    /// Entry spills issued to memory.
    pub memory_entry_writes: u64,

    /// Requests whose entry was resident.
    pub entry_cache_hits: u64,
    /// Requests that found other work queued for their line.
    pub mshr_hits: u64,
    /// Resident entries evicted.
    pub entry_evictions: u64,
    /// Events deferred because their line was already claimed this tick.
    pub same_cycle_conflicts: u64,
    /// Answers and NACKs dropped because nothing was waiting for them.
    pub stale_dropped: u64,

    /// Sum of request service latencies in cycles.
    pub get_latency_total: u64,
    /// Requests completed.
    pub get_completed: u64,
    /// Sum of replacement service latencies in cycles.
    pub put_latency_total: u64,
    /// Replacements completed.
    pub put_completed: u64,
}

impl DirStats {
    /// Counts an event arriving at the dispatcher for the first time.
    pub const fn record_received(&mut self, event: &MemEvent) {
        match event.cmd {
            Command::GetS => self.get_s_received += 1,
            Command::GetX => self.get_x_received += 1,
            Command::GetSX => self.get_sx_received += 1,
            Command::Write => self.write_received += 1,
            Command::PutS => self.put_s_received += 1,
            Command::PutE => self.put_e_received += 1,
            Command::PutM => self.put_m_received += 1,
            Command::PutX => self.put_x_received += 1,
            Command::FlushLine => self.flush_line_received += 1,
            Command::FlushLineInv => self.flush_line_inv_received += 1,
            Command::FlushAll => self.flush_all_received += 1,
            Command::FetchInv | Command::FetchInvX | Command::ForceInv | Command::Inv => {
                self.shootdowns_received += 1;
            }
            Command::FetchResp => self.fetch_resp_received += 1,
            Command::FetchXResp => self.fetch_x_resp_received += 1,
            Command::AckInv => self.ack_inv_received += 1,
            Command::Nack => self.nack_received += 1,
            _ => {}
        }
    }

    /// Counts an event the directory sends to a cache.
    pub const fn record_sent(&mut self, event: &MemEvent) {
        match event.cmd {
            Command::Inv => self.inv_sent += 1,
            Command::FetchInv => self.fetch_inv_sent += 1,
            Command::FetchInvX => self.fetch_inv_x_sent += 1,
            Command::ForwardFlush => self.forward_flush_sent += 1,
            Command::GetSResp => self.get_s_resp_sent += 1,
            Command::GetXResp => self.get_x_resp_sent += 1,
            Command::AckPut => self.ack_put_sent += 1,
            Command::Nack => self.nack_sent += 1,
            _ => {}
        }
    }

    /// Records the service latency of a completed MSHR head.
    pub const fn record_latency(&mut self, cmd: Command, cycles: u64) {
        if cmd.is_request() {
            self.get_latency_total += cycles;
            self.get_completed += 1;
        } else if matches!(cmd.class(), crate::protocol::CommandClass::Replacement) {
            self.put_latency_total += cycles;
            self.put_completed += 1;
        }
    }

    /// Mean request latency in cycles.
    pub fn mean_get_latency(&self) -> f64 {
        if self.get_completed == 0 {
            0.0
        } else {
            self.get_latency_total as f64 / self.get_completed as f64
        }
    }

    /// Mean replacement latency in cycles.
    pub fn mean_put_latency(&self) -> f64 {
        if self.put_completed == 0 {
            0.0
        } else {
            self.put_latency_total as f64 / self.put_completed as f64
        }
    }

    /// Prints selected sections to stdout.
    ///
    /// `sections` may contain `summary`, `requests`, `responses`, `memory`, and
    /// `structures`; an empty slice prints everything.
    pub fn print_sections(&self, sections: &[String]) {
        let want = |s: &str| sections.is_empty() || sections.iter().any(|x| x == s);

        if want("summary") {
            println!("\n==========================================================");
            println!("DIRECTORY STATISTICS");
            println!("==========================================================");
            println!("sim_cycles               {}", self.cycles);
            println!("get_latency_mean         {:.2}", self.mean_get_latency());
            println!("put_latency_mean         {:.2}", self.mean_put_latency());
            println!("----------------------------------------------------------");
        }
        if want("requests") {
            println!("REQUESTS RECEIVED");
            println!("  GetS                   {}", self.get_s_received);
            println!("  GetX                   {}", self.get_x_received);
            println!("  GetSX                  {}", self.get_sx_received);
            println!("  Write                  {}", self.write_received);
            println!("  PutS                   {}", self.put_s_received);
            println!("  PutE                   {}", self.put_e_received);
            println!("  PutM                   {}", self.put_m_received);
            println!("  PutX                   {}", self.put_x_received);
            println!("  FlushLine              {}", self.flush_line_received);
            println!("  FlushLineInv           {}", self.flush_line_inv_received);
            println!("  FlushAll               {}", self.flush_all_received);
            println!("  shootdowns             {}", self.shootdowns_received);
            println!("  noncacheable           {}", self.noncacheable_forwarded);
            println!("----------------------------------------------------------");
        }
        if want("responses") {
            println!("RESPONSES");
            println!("  FetchResp recv         {}", self.fetch_resp_received);
            println!("  FetchXResp recv        {}", self.fetch_x_resp_received);
            println!("  AckInv recv            {}", self.ack_inv_received);
            println!("  NACK recv              {}", self.nack_received);
            println!("  Inv sent               {}", self.inv_sent);
            println!("  FetchInv sent          {}", self.fetch_inv_sent);
            println!("  FetchInvX sent         {}", self.fetch_inv_x_sent);
            println!("  ForwardFlush sent      {}", self.forward_flush_sent);
            println!("  GetSResp sent          {}", self.get_s_resp_sent);
            println!("  GetXResp sent          {}", self.get_x_resp_sent);
            println!("  AckPut sent            {}", self.ack_put_sent);
            println!("  NACK sent              {}", self.nack_sent);
            println!("  resent                 {}", self.resent);
            println!("----------------------------------------------------------");
        }
        if want("memory") {
            println!("MEMORY");
            println!("  data reads             {}", self.memory_data_reads);
            println!("  data writes            {}", self.memory_data_writes);
            println!("  entry reads            {}", self.memory_entry_reads);
            println!("  entry writes           {}", self.memory_entry_writes);
            println!("----------------------------------------------------------");
        }
        if want("structures") {
            println!("STRUCTURES");
            println!("  entry cache hits       {}", self.entry_cache_hits);
            println!("  entry evictions        {}", self.entry_evictions);
            println!("  mshr hits              {}", self.mshr_hits);
            println!("  same-cycle conflicts   {}", self.same_cycle_conflicts);
            println!("  stale dropped          {}", self.stale_dropped);
            println!("==========================================================");
        }
    }

    /// Prints every section.
    pub fn print(&self) {
        self.print_sections(&[]);
    }
}
