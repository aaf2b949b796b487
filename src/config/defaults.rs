/// Configuration default values
///
/// This module contains all the default values for configuration options,
/// making them easily changeable in one central location.
// Scheduler defaults
pub const DEFAULT_WORKER_POOL_SIZE: usize = 4;
pub const DEFAULT_POLL_INTERVAL: &str = "1s";
pub const DEFAULT_JOB_TIMEOUT: &str = "60m";
pub const DEFAULT_SHUTDOWN_GRACE: &str = "30s";

// Ingestion defaults
pub const DEFAULT_API_BASE_URL: &str = "https://iptv-org.github.io/api";
pub const DEFAULT_REQUEST_TIMEOUT: &str = "30s";
pub const DEFAULT_LANGUAGES_INTERVAL_MINUTES: u32 = 60;
pub const DEFAULT_CATEGORIES_INTERVAL_MINUTES: u32 = 60;
pub const DEFAULT_COUNTRIES_OFFSET_MINUTES: u32 = 2;
pub const DEFAULT_CHANNELS_OFFSET_MINUTES: u32 = 5;

// EPG grabber defaults
pub const DEFAULT_EPG_ENABLED: bool = true;
pub const DEFAULT_GRABBER_COMMAND: &str = "npx";
pub const DEFAULT_GRABBER_ARGS: &[&str] = &["epg-grabber"];
pub const DEFAULT_EPG_WORK_DIR: &str = "./data/epg";
pub const DEFAULT_EPG_TIMEOUT: &str = "60m";
pub const DEFAULT_EPG_OFFSET_MINUTES: u32 = 10;
