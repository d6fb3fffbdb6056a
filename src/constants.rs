pub mod network {
    pub const TIMEOUT_API_REQUEST_MS: u64 = 30_000;
    pub const TIMEOUT_CONNECTION_MS: u64 = 5_000;
    pub const STAGING: &str = "STAGING";
    pub const PRODUCTION: &str = "PRODUCTION";
    pub const NETWORKS: &[&str] = &[STAGING, PRODUCTION];
}

pub mod retry {
    pub const MAX_ATTEMPTS: usize = 3;
    pub const BASE_DELAY_MS: u64 = 500;
    pub const MAX_DELAY_MS: u64 = 8_000;
    pub const MAX_RETRY_AFTER_MS: u64 = 60_000;
    pub const JITTER: f64 = 0.2;
    pub const STATUS_CODES: &[u16] = &[429, 500, 502, 503, 504];
}

pub mod polling {
    pub const INTERVAL_MS: u64 = 10_000;
    pub const MAX_ATTEMPTS: u32 = 180;
}

pub mod cache {
    use std::time::Duration;

    pub const CONTRACTS_TTL: Duration = Duration::from_secs(600);
    pub const GROUPS_TTL: Duration = Duration::from_secs(600);
    pub const PRODUCTS_TTL: Duration = Duration::from_secs(600);
    pub const PROPERTIES_TTL: Duration = Duration::from_secs(120);
    pub const PROPERTY_TTL: Duration = Duration::from_secs(120);
    pub const RULES_TTL: Duration = Duration::from_secs(60);
    pub const HOSTNAMES_TTL: Duration = Duration::from_secs(120);
    pub const EDGE_HOSTNAMES_TTL: Duration = Duration::from_secs(120);
    pub const INCLUDES_TTL: Duration = Duration::from_secs(120);
    pub const ZONES_TTL: Duration = Duration::from_secs(300);
    pub const ZONE_TTL: Duration = Duration::from_secs(120);
    pub const RECORDSETS_TTL: Duration = Duration::from_secs(60);
    pub const ENROLLMENTS_TTL: Duration = Duration::from_secs(120);
    pub const NETWORK_LISTS_TTL: Duration = Duration::from_secs(120);
    pub const APPSEC_CONFIGS_TTL: Duration = Duration::from_secs(300);
    pub const NAME_CACHE_MAX_ENTRIES: usize = 2_000;
}

pub mod search {
    pub const MAX_GROUPS_PER_CALL: usize = 5;
    pub const MAX_PROPERTIES_PER_GROUP: usize = 50;
    pub const SOFT_DEADLINE_MS: u64 = 12_000;
}

pub mod limits {
    pub const MAX_PURGE_OBJECTS: usize = 500;
    pub const MAX_BULK_RECORDS: usize = 1_000;
    pub const MAX_NETWORK_LIST_ELEMENTS: usize = 10_000;
    pub const MAX_EDGEGRID_BODY_BYTES: usize = 131_072;
    pub const TABLE_ROW_LIMIT: usize = 200;
}

pub mod content_types {
    pub const CPS_ENROLLMENTS: &str = "application/vnd.akamai.cps.enrollments.v11+json";
    pub const CPS_ENROLLMENT: &str = "application/vnd.akamai.cps.enrollment.v11+json";
    pub const CPS_ENROLLMENT_STATUS: &str = "application/vnd.akamai.cps.enrollment-status.v1+json";
    pub const CPS_CHANGE_STATUS: &str = "application/vnd.akamai.cps.change-id.v1+json";
}

pub mod securemobi {
    pub const DEFAULT_API_URL: &str = "https://api.securemobi.net";
    pub const TOKEN_SKEW_SECS: u64 = 30;
}
