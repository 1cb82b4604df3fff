//! Execution statistics kept by the core.

/// Cycle, instruction and decode-cache counters, plus the exclusive-access
/// statistics of the load-linked/store-conditional protocol.
#[derive(Debug, Clone, Default)]
pub struct Counters {
    pub(crate) cycles: u64,
    pub(crate) instructions: u64,
    pub(crate) compiles: u64,
    pub(crate) sleep_cycles: u64,
    pub(crate) exclusive_reads: u64,
    pub(crate) exclusive_writes: u64,
    pub(crate) exclusive_failures: u64,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn instructions(&self) -> u64 {
        self.instructions
    }

    pub fn compiles(&self) -> u64 {
        self.compiles
    }

    pub fn sleep_cycles(&self) -> u64 {
        self.sleep_cycles
    }

    pub fn exclusive_reads(&self) -> u64 {
        self.exclusive_reads
    }

    pub fn exclusive_writes(&self) -> u64 {
        self.exclusive_writes
    }

    pub fn exclusive_failures(&self) -> u64 {
        self.exclusive_failures
    }

    /// Fraction of instructions served from the decode cache.
    pub fn decode_cache_hit_rate(&self) -> f64 {
        if self.instructions == 0 {
            return 0.0;
        }
        let hits = self.instructions.saturating_sub(self.compiles);
        hits as f64 / self.instructions as f64
    }

    pub fn reset_instructions(&mut self) {
        self.instructions = 0;
    }

    pub fn reset_compiles(&mut self) {
        self.compiles = 0;
    }

    pub fn reset_exclusive(&mut self) {
        self.exclusive_reads = 0;
        self.exclusive_writes = 0;
        self.exclusive_failures = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        let mut counters = Counters::new();
        assert_eq!(0.0, counters.decode_cache_hit_rate());
        counters.instructions = 100;
        counters.compiles = 25;
        assert_eq!(0.75, counters.decode_cache_hit_rate());
    }
}
