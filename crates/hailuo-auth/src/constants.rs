//! Hailuo renewal endpoint and client fingerprint
//!
//! The renewal endpoint only accepts calls that look like they come from the
//! web client, so every request carries the same fixed browser fingerprint.
//! These values are part of the wire contract, not configuration.

/// Renewal endpoint: exchanges a live token for a fresh one.
pub const RENEWAL_ENDPOINT: &str = "https://hailuoai.com/v1/api/user/renewal";

/// Upper bound on a single renewal call, including body download.
pub const RENEWAL_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// Header carrying the token being renewed.
pub const TOKEN_HEADER: &str = "token";

/// Query parameters sent ahead of the per-call identifiers.
pub const FINGERPRINT_HEAD: &[(&str, &str)] = &[("device_platform", "web"), ("app_id", "3001")];

/// Query parameters sent after the per-call identifiers.
pub const FINGERPRINT_TAIL: &[(&str, &str)] = &[
    ("version_code", "22200"),
    ("os_name", "Windows"),
    ("browser_name", "chrome"),
    ("server_version", "101"),
    ("device_memory", "8"),
    ("cpu_core_num", "12"),
    ("browser_language", "en"),
    ("browser_platform", "Win32"),
    ("screen_width", "1536"),
    ("screen_height", "864"),
];

/// Fetch metadata headers sent by the web client on same-origin XHR.
pub const FETCH_HEADERS: &[(&str, &str)] = &[
    ("sec-fetch-site", "same-origin"),
    ("sec-fetch-mode", "cors"),
    ("sec-fetch-dest", "empty"),
];
