//! Simulation statistics collection and reporting.
//!
//! This module tracks performance metrics for the secure memory model. It provides:
//! 1. **Requests:** Accepted, completed, posted and refused requests per direction.
//! 2. **Latency:** Total and worst-case request latency from acceptance to response.
//! 3. **Ordering:** Hazard stalls, detected write/read hazards and downstream back-pressure.
//! 4. **Metadata:** Cache hits, misses, write-backs, line waits and MSHR stalls.
//! 5. **Memory:** Line traffic per path and bus contention.

use std::time::Instant;

/// Statistics for one secure memory instance.
#[derive(Clone, Debug)]
pub struct SecStats {
    start_time: Instant,
    /// Cycles simulated.
    pub cycles: u64,

    /// Reads accepted by the security controller.
    pub reads_accepted: u64,
    /// Writes accepted by the security controller.
    pub writes_accepted: u64,
    /// Reads answered (including faults).
    pub reads_completed: u64,
    /// Writes retired (including faults and posted writes).
    pub writes_completed: u64,
    /// Writes retired without a response.
    pub posted_writes: u64,
    /// Requests answered with an integrity fault.
    pub integrity_faults: u64,

    /// Upstream requests refused with back-pressure.
    pub rejected_back_pressure: u64,
    /// Upstream requests refused by validation.
    pub rejected_invalid: u64,
    /// Retry notifications raised after back-pressure.
    pub retries_signalled: u64,
    /// Downstream issues refused by the store or a port (retried next cycle).
    pub downstream_stalls: u64,
    /// Requests held in `Received` behind an earlier conflicting request.
    pub hazard_stalls: u64,
    /// Cycles a write's commit waited for an earlier read of its block.
    pub hazards_detected: u64,

    /// Sum of read latencies in cycles.
    pub read_latency_total: u64,
    /// Sum of write latencies in cycles.
    pub write_latency_total: u64,
    /// Worst read latency.
    pub read_latency_max: u64,
    /// Worst write latency.
    pub write_latency_max: u64,

    /// Metadata cache probes that hit.
    pub meta_hits: u64,
    /// Metadata cache probes that missed.
    pub meta_misses: u64,
    /// Dirty metadata lines written back to memory.
    pub meta_writebacks: u64,
    /// Valid metadata lines displaced by fills.
    pub meta_evictions: u64,
    /// Metadata lines read from memory.
    pub meta_mem_reads: u64,
    /// Times a store operation queued behind another owner of a line.
    pub line_waits: u64,
    /// Cycles store operations waited for a free MSHR.
    pub mshr_stalls: u64,
    /// Peak accesses outstanding to any single metadata line.
    pub peak_line_outstanding: usize,
    /// Peak concurrently active store operations.
    pub peak_store_ops: usize,

    /// Data blocks read over the metadata bus.
    pub data_reads: u64,
    /// Data blocks written over the metadata bus.
    pub data_writes: u64,
    /// Data blocks written over the bypass bus (MT only).
    pub bypass_writes: u64,
    /// Transfers carried by the metadata bus.
    pub meta_bus_transfers: u64,
    /// Transfers carried by the memory bus.
    pub mem_bus_transfers: u64,
    /// Cycles transfers waited for a busy bus.
    pub bus_wait_cycles: u64,
    /// DRAM accesses that found their row open.
    pub dram_row_hits: u64,
    /// DRAM accesses that had to open a row.
    pub dram_row_misses: u64,
}

impl Default for SecStats {
    fn default() -> Self {
        Self {
            start_time: Instant::now(),
            cycles: 0,
            reads_accepted: 0,
            writes_accepted: 0,
            reads_completed: 0,
            writes_completed: 0,
            posted_writes: 0,
            integrity_faults: 0,
            rejected_back_pressure: 0,
            rejected_invalid: 0,
            retries_signalled: 0,
            downstream_stalls: 0,
            hazard_stalls: 0,
            hazards_detected: 0,
            read_latency_total: 0,
            write_latency_total: 0,
            read_latency_max: 0,
            write_latency_max: 0,
            meta_hits: 0,
            meta_misses: 0,
            meta_writebacks: 0,
            meta_evictions: 0,
            meta_mem_reads: 0,
            line_waits: 0,
            mshr_stalls: 0,
            peak_line_outstanding: 0,
            peak_store_ops: 0,
            data_reads: 0,
            data_writes: 0,
            bypass_writes: 0,
            meta_bus_transfers: 0,
            mem_bus_transfers: 0,
            bus_wait_cycles: 0,
            dram_row_hits: 0,
            dram_row_misses: 0,
        }
    }
}

/// Section names for selective stats output.
///
/// Valid section identifiers: `"summary"`, `"controller"`, `"metadata"`, `"memory"`.
/// Pass an empty slice to `print_sections` to print all sections.
pub const STATS_SECTIONS: &[&str] = &["summary", "controller", "metadata", "memory"];

impl SecStats {
    /// Records a read answered after `latency` cycles.
    pub fn record_read(&mut self, latency: u64, faulted: bool) {
        self.reads_completed += 1;
        self.read_latency_total += latency;
        self.read_latency_max = self.read_latency_max.max(latency);
        if faulted {
            self.integrity_faults += 1;
        }
    }

    /// Records a write retired after `latency` cycles.
    pub fn record_write(&mut self, latency: u64, faulted: bool) {
        self.writes_completed += 1;
        self.write_latency_total += latency;
        self.write_latency_max = self.write_latency_max.max(latency);
        if faulted {
            self.integrity_faults += 1;
        }
    }

    /// Average read latency in cycles (0 when no reads completed).
    pub fn avg_read_latency(&self) -> f64 {
        if self.reads_completed == 0 {
            0.0
        } else {
            self.read_latency_total as f64 / self.reads_completed as f64
        }
    }

    /// Average write latency in cycles (0 when no writes completed).
    pub fn avg_write_latency(&self) -> f64 {
        if self.writes_completed == 0 {
            0.0
        } else {
            self.write_latency_total as f64 / self.writes_completed as f64
        }
    }

    /// Metadata cache hit rate in percent (0 when nothing was probed).
    pub fn meta_hit_rate(&self) -> f64 {
        let total = self.meta_hits + self.meta_misses;
        if total == 0 {
            0.0
        } else {
            100.0 * self.meta_hits as f64 / total as f64
        }
    }

    /// Prints only the requested statistics sections to stdout.
    ///
    /// Each element of `sections` should be one of `"summary"`, `"controller"`,
    /// `"metadata"` or `"memory"`. Pass an empty slice to print all sections.
    ///
    /// # Arguments
    ///
    /// * `sections` - Slice of section names to print, or empty for all.
    pub fn print_sections(&self, sections: &[String]) {
        let want = |s: &str| sections.is_empty() || sections.iter().any(|x| x == s);
        let seconds = self.start_time.elapsed().as_secs_f64();
        let cyc = self.cycles.max(1);

        if want("summary") {
            let completed = self.reads_completed + self.writes_completed;
            let khz = if seconds > 0.0 {
                (self.cycles as f64 / seconds) / 1000.0
            } else {
                0.0
            };
            println!("\n==========================================================");
            println!("SECURE MEMORY SIMULATION STATISTICS");
            println!("==========================================================");
            println!("host_seconds             {seconds:.4} s");
            println!("sim_cycles               {}", self.cycles);
            println!("sim_freq                 {khz:.2} kHz");
            println!("requests.completed       {completed}");
            println!(
                "requests.per_kcycle      {:.3}",
                completed as f64 * 1000.0 / cyc as f64
            );
            println!("integrity.faults         {}", self.integrity_faults);
            println!("----------------------------------------------------------");
        }
        if want("controller") {
            println!("CONTROLLER");
            println!(
                "  reads                  {} accepted, {} completed, avg {:.1} / max {} cycles",
                self.reads_accepted,
                self.reads_completed,
                self.avg_read_latency(),
                self.read_latency_max
            );
            println!(
                "  writes                 {} accepted, {} completed ({} posted), avg {:.1} / max {} cycles",
                self.writes_accepted,
                self.writes_completed,
                self.posted_writes,
                self.avg_write_latency(),
                self.write_latency_max
            );
            println!("  rejected.backpressure  {}", self.rejected_back_pressure);
            println!("  rejected.invalid       {}", self.rejected_invalid);
            println!("  retries.signalled      {}", self.retries_signalled);
            println!("  stalls.downstream      {}", self.downstream_stalls);
            println!("  stalls.hazard          {}", self.hazard_stalls);
            println!("  hazards.detected       {}", self.hazards_detected);
            println!("----------------------------------------------------------");
        }
        if want("metadata") {
            println!("METADATA");
            println!(
                "  cache                  accesses: {:<10} | hits: {:<10} | hit_rate: {:.2}%",
                self.meta_hits + self.meta_misses,
                self.meta_hits,
                self.meta_hit_rate()
            );
            println!("  mem.reads              {}", self.meta_mem_reads);
            println!("  writebacks             {}", self.meta_writebacks);
            println!("  evictions              {}", self.meta_evictions);
            println!("  line.waits             {}", self.line_waits);
            println!("  line.peak_outstanding  {}", self.peak_line_outstanding);
            println!("  mshr.stall_cycles      {}", self.mshr_stalls);
            println!("  store.peak_ops         {}", self.peak_store_ops);
            println!("----------------------------------------------------------");
        }
        if want("memory") {
            println!("MEMORY");
            println!("  data.reads             {}", self.data_reads);
            println!("  data.writes            {}", self.data_writes);
            println!("  data.bypass_writes     {}", self.bypass_writes);
            println!(
                "  meta_bus.transfers     {} ({:.2}% busy)",
                self.meta_bus_transfers,
                (self.meta_bus_transfers as f64 / cyc as f64) * 100.0
            );
            println!("  mem_bus.transfers      {}", self.mem_bus_transfers);
            println!("  bus.wait_cycles        {}", self.bus_wait_cycles);
            if self.dram_row_hits + self.dram_row_misses > 0 {
                println!(
                    "  dram.row_buffer        hits: {:<10} | misses: {}",
                    self.dram_row_hits, self.dram_row_misses
                );
            }
        }
        println!("==========================================================");
    }

    /// Prints all statistics sections to stdout.
    ///
    /// Equivalent to `print_sections(&[])`.
    pub fn print(&self) {
        self.print_sections(&[]);
    }
}
