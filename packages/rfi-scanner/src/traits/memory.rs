//! Process memory sampling seam.

/// Reports the process's resident memory.
pub trait MemoryProbe: Send + Sync {
    /// Resident set size in bytes, or `None` when unavailable.
    fn resident_bytes(&self) -> Option<u64>;
}

/// Reads resident memory from the `VmRSS` line of `/proc/self/status`.
///
/// The kernel reports it in kB, so no page size is assumed. Returns `None`
/// on platforms without procfs.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcMemoryProbe;

impl ProcMemoryProbe {
    pub fn new() -> Self {
        Self
    }

    /// Resident bytes from the contents of `/proc/<pid>/status`.
    pub fn parse_status(status: &str) -> Option<u64> {
        let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
        let mut fields = line["VmRSS:".len()..].split_whitespace();
        let value: u64 = fields.next()?.parse().ok()?;
        match fields.next() {
            Some(unit) if unit.eq_ignore_ascii_case("kB") => Some(value * 1024),
            _ => None,
        }
    }
}

impl MemoryProbe for ProcMemoryProbe {
    fn resident_bytes(&self) -> Option<u64> {
        let status = std::fs::read_to_string("/proc/self/status").ok()?;
        Self::parse_status(&status)
    }
}
