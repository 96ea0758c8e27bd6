//! Memory circuit breaker.

use std::sync::Arc;

use crate::traits::memory::MemoryProbe;

/// Result of one memory sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryReading {
    /// Breaker disabled or probe unavailable
    Unknown,
    Below { used: u64, threshold: u64 },
    Tripped { used: u64, threshold: u64 },
}

impl MemoryReading {
    pub fn is_tripped(&self) -> bool {
        matches!(self, MemoryReading::Tripped { .. })
    }
}

/// Trips when resident memory reaches `fraction` of the ceiling.
#[derive(Clone)]
pub struct MemoryBreaker {
    probe: Arc<dyn MemoryProbe>,
    ceiling: Option<u64>,
    fraction: f64,
}

impl MemoryBreaker {
    pub fn new(probe: Arc<dyn MemoryProbe>, ceiling: Option<u64>, fraction: f64) -> Self {
        Self {
            probe,
            ceiling,
            fraction: fraction.clamp(0.0, 1.0),
        }
    }

    /// Byte count at which the breaker trips.
    pub fn threshold(&self) -> Option<u64> {
        self.ceiling.map(|c| (c as f64 * self.fraction) as u64)
    }

    pub fn check(&self) -> MemoryReading {
        let Some(threshold) = self.threshold() else {
            return MemoryReading::Unknown;
        };
        match self.probe.resident_bytes() {
            Some(used) if used >= threshold => MemoryReading::Tripped { used, threshold },
            Some(used) => MemoryReading::Below { used, threshold },
            None => MemoryReading::Unknown,
        }
    }
}
