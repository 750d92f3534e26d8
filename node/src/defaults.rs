pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_JSON_LOGS: bool = false;
pub const DEFAULT_WORKER_THREADS: usize = 2;
pub const DEFAULT_DIRECTORY: &str = "linkchain-data";
pub const DEFAULT_PARTITION: &str = "linkchain";
pub const DEFAULT_INV_CHECK_PERIOD: u64 = 0;
pub const DEFAULT_ALLOW_SEARCH: bool = false;
pub const DEFAULT_COMPUTE_UNIT: &str = "cpu";
pub const DEFAULT_CHECK_BEFORE_DELIVER: bool = true;
pub const DEFAULT_SEARCH_LIMIT: usize = 10;
