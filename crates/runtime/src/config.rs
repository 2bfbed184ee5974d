//! Collector configuration
//!
//! ## Configuration (Environment Variables)
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `CELLMEM_GC_THRESHOLD` | `100000` | Bytes allocated before a collection while active |
//! | `CELLMEM_IDLE_GC_THRESHOLD` | `20000` | Bytes allocated before a collection while idle |
//! | `CELLMEM_PAIR_BLOCK_SIZE` | `1024` | Pairs per pool block (must be > 0) |
//! | `CELLMEM_MAX_STRING` | `16777215` | Longest string the allocator will create |
//! | `CELLMEM_HEAP_LIMIT` | unset (unlimited) | Ceiling on resident heap bytes |
//! | `CELLMEM_GC_TRACE` | `0` (off) | Size in bytes of the per-heap collection trace ring |
//!
//! Values that fail to parse fall back to the default.
//!
//! ## Example
//!
//! ```bash
//! # Collect every 1 MB of allocation, cap the heap at 256 MB
//! CELLMEM_GC_THRESHOLD=1048576 CELLMEM_HEAP_LIMIT=268435456 ./my-interpreter
//! ```
//!
//! Whether the interpreter is idle is decided by the embedding evaluator.
//! The heap only offers the two thresholds and picks one from the
//! [`Activity`] the caller passes in.

/// Default active-use threshold in bytes
pub const DEFAULT_GC_THRESHOLD: usize = 100_000;

/// Default idle threshold in bytes
pub const DEFAULT_IDLE_GC_THRESHOLD: usize = 20_000;

/// Default number of pairs per block
pub const DEFAULT_PAIR_BLOCK_SIZE: usize = 1024;

/// Default maximum string length (24-bit length field)
pub const DEFAULT_MAX_STRING: usize = (1 << 24) - 1;

/// What the interpreter is doing when it reaches an allocation checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Activity {
    /// Evaluating user code
    #[default]
    Active,
    /// Waiting for input
    Idle,
}

/// Heap configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcConfig {
    /// Bytes allocated since the last collection before collecting (active)
    pub gc_threshold: usize,
    /// Bytes allocated since the last collection before collecting (idle)
    pub idle_gc_threshold: usize,
    /// Pairs per pool block
    pub pair_block_size: usize,
    /// Longest string the allocator will create
    pub max_string: usize,
    /// Ceiling on resident heap bytes (None = limited only by the system)
    pub heap_limit: Option<usize>,
    /// Collection trace ring size in bytes (0 = no trace)
    pub trace_buffer: usize,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            gc_threshold: DEFAULT_GC_THRESHOLD,
            idle_gc_threshold: DEFAULT_IDLE_GC_THRESHOLD,
            pair_block_size: DEFAULT_PAIR_BLOCK_SIZE,
            max_string: DEFAULT_MAX_STRING,
            heap_limit: None,
            trace_buffer: 0,
        }
    }
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

impl GcConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let gc_threshold = env_usize("CELLMEM_GC_THRESHOLD").unwrap_or(defaults.gc_threshold);

        let idle_gc_threshold =
            env_usize("CELLMEM_IDLE_GC_THRESHOLD").unwrap_or(defaults.idle_gc_threshold);

        let pair_block_size = env_usize("CELLMEM_PAIR_BLOCK_SIZE")
            .filter(|&v| v > 0)
            .unwrap_or(defaults.pair_block_size);

        let max_string = env_usize("CELLMEM_MAX_STRING").unwrap_or(defaults.max_string);

        let heap_limit = env_usize("CELLMEM_HEAP_LIMIT");

        let trace_buffer = env_usize("CELLMEM_GC_TRACE").unwrap_or(defaults.trace_buffer);

        Self {
            gc_threshold,
            idle_gc_threshold,
            pair_block_size,
            max_string,
            heap_limit,
            trace_buffer,
        }
    }

    /// Threshold that applies to the given activity
    pub fn threshold(&self, activity: Activity) -> usize {
        match activity {
            Activity::Active => self.gc_threshold,
            Activity::Idle => self.idle_gc_threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const KEYS: [&str; 6] = [
        "CELLMEM_GC_THRESHOLD",
        "CELLMEM_IDLE_GC_THRESHOLD",
        "CELLMEM_PAIR_BLOCK_SIZE",
        "CELLMEM_MAX_STRING",
        "CELLMEM_HEAP_LIMIT",
        "CELLMEM_GC_TRACE",
    ];

    // Helper to set env var (caller is #[serial])
    unsafe fn set_env(key: &str, value: &str) {
        // SAFETY: env tests run serially
        unsafe { std::env::set_var(key, value) };
    }

    // Helper to restore env var (caller is #[serial])
    unsafe fn restore_env(key: &str, orig: Option<String>) {
        // SAFETY: env tests run serially
        unsafe {
            match orig {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
        }
    }

    fn save_all() -> Vec<(&'static str, Option<String>)> {
        KEYS.iter().map(|k| (*k, std::env::var(k).ok())).collect()
    }

    fn restore_all(saved: Vec<(&'static str, Option<String>)>) {
        for (k, v) in saved {
            unsafe { restore_env(k, v) };
        }
    }

    #[test]
    fn test_config_defaults() {
        let config = GcConfig::default();
        assert_eq!(config.gc_threshold, 100_000);
        assert_eq!(config.idle_gc_threshold, 20_000);
        assert_eq!(config.pair_block_size, 1024);
        assert_eq!(config.max_string, 16_777_215);
        assert_eq!(config.heap_limit, None);
        assert_eq!(config.trace_buffer, 0);
    }

    #[test]
    fn test_threshold_by_activity() {
        let config = GcConfig {
            gc_threshold: 500,
            idle_gc_threshold: 50,
            ..Default::default()
        };
        assert_eq!(config.threshold(Activity::Active), 500);
        assert_eq!(config.threshold(Activity::Idle), 50);
    }

    #[test]
    #[serial]
    fn test_from_env_all_values() {
        let saved = save_all();
        unsafe {
            set_env("CELLMEM_GC_THRESHOLD", "4096");
            set_env("CELLMEM_IDLE_GC_THRESHOLD", "512");
            set_env("CELLMEM_PAIR_BLOCK_SIZE", "16");
            set_env("CELLMEM_MAX_STRING", "100");
            set_env("CELLMEM_HEAP_LIMIT", "1000000");
            set_env("CELLMEM_GC_TRACE", "2048");
        }

        let config = GcConfig::from_env();
        restore_all(saved);

        assert_eq!(config.gc_threshold, 4096);
        assert_eq!(config.idle_gc_threshold, 512);
        assert_eq!(config.pair_block_size, 16);
        assert_eq!(config.max_string, 100);
        assert_eq!(config.heap_limit, Some(1_000_000));
        assert_eq!(config.trace_buffer, 2048);
    }

    #[test]
    #[serial]
    fn test_from_env_invalid_falls_back() {
        let saved = save_all();
        unsafe {
            set_env("CELLMEM_GC_THRESHOLD", "lots");
            set_env("CELLMEM_PAIR_BLOCK_SIZE", "0");
            set_env("CELLMEM_HEAP_LIMIT", "-5");
            restore_env("CELLMEM_IDLE_GC_THRESHOLD", None);
            restore_env("CELLMEM_MAX_STRING", None);
            restore_env("CELLMEM_GC_TRACE", None);
        }

        let config = GcConfig::from_env();
        restore_all(saved);

        assert_eq!(config, GcConfig::default());
    }
}
