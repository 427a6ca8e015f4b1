//! Shared constants and invariants

/// Tokens with more remaining life than this never hit the exchange endpoint.
pub const REFRESH_SAFETY_MARGIN_DAYS: i64 = 3;

pub const DEFAULT_REFRESH_WINDOW_HOURS: u64 = 24;
pub const DEFAULT_CHECK_INTERVAL_HOURS: u64 = 24;

// Tagged ciphertext markers. Every value the store writes carries one of
// these so reads dispatch on an explicit scheme instead of sniffing.
pub const ENC_PREFIX: &str = "ENC:";
pub const B64_PREFIX: &str = "B64:";

// Provider error codes that indicate an expired or otherwise unusable token
pub const TOKEN_EXPIRED_CODES: [i64; 4] = [190, 102, 4, 2500];
pub const TOKEN_EXPIRED_KEYWORDS: [&str; 5] =
    ["expired", "invalid token", "access token", "oauth", "permission"];
