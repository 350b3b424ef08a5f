use serde::Deserialize;

/// Capacity and threshold parameters of the hash tracker
/// Fixed at startup; the record buffer is sized from these once
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Number of record slots in the arena
    /// Once full, the least recently seen digest is evicted to make room
    /// Default: 1024
    #[serde(default = "default_num_records")]
    pub num_records: u32,
    /// Sightings after which a digest is blocked instead of counted
    /// Default: 100
    #[serde(default = "default_max_count")]
    pub max_count: u64,
    /// Records not seen for longer than this are released by the expiry sweep
    /// Together with `tidy_up_interval_secs` must stay below `time_chunk_secs`
    /// Default: 3600 (1 hour)
    #[serde(default = "default_max_age")]
    pub max_age_secs: u64,
    /// Width of the wrap-around clock used for last-seen timestamps
    /// Default: 7200 (2 hours)
    #[serde(default = "default_time_chunk")]
    pub time_chunk_secs: u64,
    /// Period of the expiry sweep
    /// Default: 60
    #[serde(default = "default_tidy_up_interval")]
    pub tidy_up_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            num_records: default_num_records(),
            max_count: default_max_count(),
            max_age_secs: default_max_age(),
            time_chunk_secs: default_time_chunk(),
            tidy_up_interval_secs: default_tidy_up_interval(),
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.num_records == 0 {
            return Err("cache.num_records must be > 0".into());
        }
        if self.max_count == 0 {
            return Err("cache.max_count must be > 0".into());
        }
        if self.time_chunk_secs < 2 {
            return Err("cache.time_chunk_secs must be >= 2".into());
        }
        if self.max_age_secs >= self.time_chunk_secs {
            return Err(format!(
                "cache.max_age_secs ({}) must be smaller than cache.time_chunk_secs ({})",
                self.max_age_secs, self.time_chunk_secs
            ));
        }
        if self.tidy_up_interval_secs == 0 {
            return Err("cache.tidy_up_interval_secs must be > 0".into());
        }
        // a stale record can wait one full sweep period before it is looked at
        let oldest_seen = self.max_age_secs.checked_add(self.tidy_up_interval_secs);
        if oldest_seen.map_or(true, |age| age >= self.time_chunk_secs) {
            return Err(format!(
                "cache.max_age_secs ({}) + cache.tidy_up_interval_secs ({}) must be smaller than cache.time_chunk_secs ({})",
                self.max_age_secs, self.tidy_up_interval_secs, self.time_chunk_secs
            ));
        }
        Ok(())
    }
}

fn default_num_records() -> u32 {
    1024
}

fn default_max_count() -> u64 {
    100
}

fn default_max_age() -> u64 {
    3600
}

fn default_time_chunk() -> u64 {
    7200
}

fn default_tidy_up_interval() -> u64 {
    60
}
