use std::time::Duration;

/// Records unused for this many days are removed by the shutdown sweep.
pub const DEFAULT_RETENTION_DAYS: i64 = 183;

/// Longest shutdown waits for the storage lock before skipping the sweep.
pub const DEFAULT_SHUTDOWN_LOCK_TIMEOUT: Duration = Duration::from_secs(15);

/// Tunables for the storage facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VaultSettings {
    pub retention_days: i64,
    pub shutdown_lock_timeout: Duration,
}

impl Default for VaultSettings {
    fn default() -> Self {
        Self {
            retention_days: DEFAULT_RETENTION_DAYS,
            shutdown_lock_timeout: DEFAULT_SHUTDOWN_LOCK_TIMEOUT,
        }
    }
}
