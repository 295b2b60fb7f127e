//! System-wide default constants.
//!
//! Centralises the values used when a config section or key is omitted.
//! Grouped by subsystem for easy discovery.

// ============================================================================
// Pipeline
// ============================================================================

/// Number of interchangeable workers draining the inbound queue.
pub const DEFAULT_WORKERS: usize = 4;

/// Layout of `observed_at` in inbound messages.
pub const DEFAULT_TIMESTAMP_FORMAT: &str = crate::types::timefmt::WIRE_FORMAT;

/// Emit a progress line every N acknowledged readings (per process).
pub const PROGRESS_LOG_EVERY: u64 = 100;

// ============================================================================
// Breakpoints
// ============================================================================

/// Version label written into persisted rows when none is configured.
pub const DEFAULT_TABLE_VERSION: &str = "epa-2012";

/// Tolerance when checking bracket contiguity (`c_hi[i] == c_lo[i+1]`).
pub const BRACKET_CONTIGUITY_EPSILON: f64 = 1e-9;

// ============================================================================
// Physical envelopes (inbound units, inclusive)
// ============================================================================

pub const PM25_ENVELOPE: [f64; 2] = [0.0, 500.0];
pub const PM10_ENVELOPE: [f64; 2] = [0.0, 600.0];
pub const O3_ENVELOPE: [f64; 2] = [0.0, 0.6];
pub const CO_ENVELOPE: [f64; 2] = [0.0, 100.0];
pub const NO2_ENVELOPE: [f64; 2] = [0.0, 2_100.0];

/// Multiplier converting inbound units to breakpoint-table units.
pub const DEFAULT_UNIT_FACTOR: f64 = 1.0;

/// Sensor calibration multiplier applied after the envelope check.
pub const DEFAULT_CALIBRATION_GAIN: f64 = 1.0;

// ============================================================================
// Retry / Backoff (sink writes)
// ============================================================================

/// Attempts per sink write, including the first.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;

/// Delay before the second attempt (ms).
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 100;

/// Upper bound on any single backoff delay (ms).
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 5_000;

/// Growth factor between consecutive backoff delays.
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Random jitter added to each backoff delay (ms).
pub const DEFAULT_JITTER_MS: u64 = 50;

// ============================================================================
// Timeouts
// ============================================================================

/// Weather side-table lookup budget (ms). Exceeding it degrades enrichment.
pub const DEFAULT_WEATHER_LOOKUP_TIMEOUT_MS: u64 = 500;

/// Budget for a single sink write attempt (ms).
pub const DEFAULT_SINK_WRITE_TIMEOUT_MS: u64 = 2_000;

// ============================================================================
// Queue
// ============================================================================

/// Spool directory for the poll-based inbound queue.
pub const DEFAULT_SPOOL_DIR: &str = "./data/inbound";

/// Interval between spool directory scans when idle (ms).
pub const DEFAULT_SPOOL_POLL_INTERVAL_MS: u64 = 500;

/// Spool directory for weather observations ingested while running.
pub const DEFAULT_WEATHER_SPOOL_DIR: &str = "./data/weather";

/// Interval between weather spool scans when idle (ms).
pub const DEFAULT_WEATHER_POLL_INTERVAL_MS: u64 = 1_000;

/// Pause after a failed queue receive before trying again (ms).
pub const QUEUE_ERROR_BACKOFF_MS: u64 = 1_000;

// ============================================================================
// Storage
// ============================================================================

/// Data directory holding the sled database and the process lock.
pub const DEFAULT_DATA_DIR: &str = "./data";

/// Sled database directory name inside the data directory.
pub const SLED_DB_NAME: &str = "aqi.db";

/// Sled tree names inside the shared database.
pub const CURRENT_TREE: &str = "current";
pub const ANALYTICAL_TREE: &str = "analytical";
pub const WEATHER_TREE: &str = "weather";

/// Observations kept per location in the weather side table; older ones are
/// pruned on write.
pub const WEATHER_HISTORY_PER_LOCATION: usize = 288;

// ============================================================================
// Read API
// ============================================================================

/// Default page size for `/api/v1/aqi/history/:location_id`.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Hard cap on the history page size.
pub const MAX_HISTORY_LIMIT: usize = 1_000;
