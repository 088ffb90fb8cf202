//! Environment variable helpers for runtime configuration.
//!
//! # Usage
//!
//! ```ignore
//! use evloop_core::env::{env_get, env_get_bool, env_get_millis};
//!
//! let capacity: usize = env_get("EVLOOP_POLL_CAPACITY", 1024);
//! let idle = env_get_millis("EVLOOP_IDLE_TIMEOUT_MS", 0); // Option<Duration>
//! let nodelay = env_get_bool("EVLOOP_NODELAY", true);
//! ```

use std::str::FromStr;
use std::time::Duration;

/// Get environment variable parsed as `T`, or `default` if unset or
/// unparsable.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Get environment variable parsed as `T`, `None` if unset or unparsable.
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Get environment variable as boolean.
///
/// "1", "true", "yes", "on" (case-insensitive) are true; any other set
/// value is false; unset returns `default`.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => matches!(val.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

/// Millisecond duration where `0` means "disabled".
#[inline]
pub fn env_get_millis(key: &str, default_ms: u64) -> Option<Duration> {
    match env_get(key, default_ms) {
        0 => None,
        ms => Some(Duration::from_millis(ms)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_get_default() {
        let val: usize = env_get("__EVLOOP_TEST_UNSET__", 42);
        assert_eq!(val, 42);
        let val: Option<u16> = env_get_opt("__EVLOOP_TEST_UNSET__");
        assert!(val.is_none());
    }

    #[test]
    fn test_env_get_parse() {
        std::env::set_var("__EVLOOP_TEST_NUM__", " 123 ");
        let val: usize = env_get("__EVLOOP_TEST_NUM__", 0);
        assert_eq!(val, 123);
        std::env::remove_var("__EVLOOP_TEST_NUM__");
    }

    #[test]
    fn test_env_get_invalid_parse_falls_back() {
        std::env::set_var("__EVLOOP_TEST_INVALID__", "not_a_number");
        let val: usize = env_get("__EVLOOP_TEST_INVALID__", 99);
        assert_eq!(val, 99);
        std::env::remove_var("__EVLOOP_TEST_INVALID__");
    }

    #[test]
    fn test_env_get_bool_variants() {
        for (raw, expected) in [("1", true), ("TRUE", true), ("on", true), ("0", false), ("garbage", false)] {
            std::env::set_var("__EVLOOP_TEST_BOOL__", raw);
            assert_eq!(env_get_bool("__EVLOOP_TEST_BOOL__", !expected), expected, "{}", raw);
        }
        std::env::remove_var("__EVLOOP_TEST_BOOL__");
        assert!(env_get_bool("__EVLOOP_TEST_BOOL__", true));
    }

    #[test]
    fn test_env_get_millis() {
        assert_eq!(env_get_millis("__EVLOOP_TEST_MS_UNSET__", 0), None);
        assert_eq!(
            env_get_millis("__EVLOOP_TEST_MS_UNSET__", 250),
            Some(Duration::from_millis(250))
        );

        std::env::set_var("__EVLOOP_TEST_MS__", "0");
        assert_eq!(env_get_millis("__EVLOOP_TEST_MS__", 500), None);
        std::env::remove_var("__EVLOOP_TEST_MS__");
    }
}
