//! Instance attribute keys recognized by the aggregator.

/// Settings record: the service name owning this group.
pub const SERVICE_NAME: &str = "SERVICE_NAME";

/// Settings record: the color (deployment slice) of this group.
pub const COLOR_NAME: &str = "COLOR_NAME";

/// Settings record: whether upstream connections use HTTP/2.
pub const USES_HTTP2: &str = "USES_HTTP2";

/// Instance record: the instance's IPv4 address.
pub const INSTANCE_IPV4: &str = "INSTANCE_IPV4";

/// Instance record: the port the instance serves on.
pub const INSTANCE_PORT: &str = "INSTANCE_PORT";

/// Instance record: the EC2 instance backing this registration, if any.
pub const EC2_INSTANCE_ID: &str = "EC2_INSTANCE_ID";

/// Keys that never name a route path. Any other key on a settings record is
/// treated as a path-weight entry.
pub const STANDARD_KEYS: &[&str] = &[
    SERVICE_NAME,
    COLOR_NAME,
    USES_HTTP2,
    INSTANCE_IPV4,
    INSTANCE_PORT,
    EC2_INSTANCE_ID,
];

/// Values (compared case-insensitively) that enable a boolean flag attribute.
pub const AFFIRMATIVE_VALUES: &[&str] = &["true", "yes", "on", "1"];

pub fn is_standard(key: &str) -> bool {
    STANDARD_KEYS.contains(&key)
}

pub fn is_affirmative(value: &str) -> bool {
    AFFIRMATIVE_VALUES
        .iter()
        .any(|v| v.eq_ignore_ascii_case(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn affirmative_values_are_case_insensitive() {
        for value in ["true", "TRUE", "Yes", "ON", "1"] {
            assert!(is_affirmative(value), "{value} should be affirmative");
        }
        for value in ["false", "no", "0", "", "2", "enabled"] {
            assert!(!is_affirmative(value), "{value} should not be affirmative");
        }
    }
}
