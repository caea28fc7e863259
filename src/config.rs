/// Importer tuning knobs, read from the environment with sensible defaults.
#[derive(Debug, Clone)]
pub struct ImporterConfig {
    /// Rows per insert batch.
    pub batch_size: usize,
    /// Parsed batches buffered between the reader task and the writer.
    /// The reader suspends once this many batches are in flight.
    pub channel_capacity: usize,
    /// When a feed contains exactly one agency, resolve blank or unknown
    /// `agency_id` references to that agency. Multi-agency feeds should
    /// disable this so bad references fail loudly.
    pub single_agency_fallback: bool,
}

impl ImporterConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let batch_size = std::env::var("GTFS_IMPORT_BATCH_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|&n| n > 0)
            .unwrap_or(defaults.batch_size);

        let channel_capacity = std::env::var("GTFS_IMPORT_CHANNEL_CAPACITY")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|&n| n > 0)
            .unwrap_or(defaults.channel_capacity);

        let single_agency_fallback = std::env::var("GTFS_SINGLE_AGENCY_FALLBACK")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.single_agency_fallback);

        Self {
            batch_size,
            channel_capacity,
            single_agency_fallback,
        }
    }
}

impl Default for ImporterConfig {
    fn default() -> Self {
        Self {
            batch_size: 200,
            channel_capacity: 2,
            single_agency_fallback: true,
        }
    }
}
