//! Scan-engine tuning, resolved from the environment with the same
//! `from_env`-with-defaults shape as [`crate::env::EnvConfig`].

use shadowforge_runtime::ScanConfig;

/// Read scan-engine tuning knobs from the environment and build a
/// [`ScanConfig`], falling back to the engine's own defaults for anything
/// unset or unparsable.
pub fn scan_config_from_env() -> ScanConfig {
    use std::env;

    let mut config = ScanConfig::default();

    if let Ok(v) = env::var("SCAN_TIME_MS") {
        if let Ok(v) = v.parse() {
            config.scan_time_ms = v;
        }
    }
    if let Ok(v) = env::var("WATCHDOG_LIMIT_MS") {
        if let Ok(v) = v.parse() {
            config.watchdog_limit_ms = v;
        }
    }
    if let Ok(v) = env::var("LATENCY_BASE_MS") {
        if let Ok(v) = v.parse() {
            config.latency_base_ms = v;
        }
    }
    if let Ok(v) = env::var("LATENCY_JITTER_MS") {
        if let Ok(v) = v.parse() {
            config.latency_jitter_ms = v;
        }
    }
    if let Ok(v) = env::var("INT_RANGE_MODE") {
        config.dint_range = v.eq_ignore_ascii_case("dint") || v == "32";
    }

    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());
    const KEYS: &[&str] = &[
        "SCAN_TIME_MS",
        "WATCHDOG_LIMIT_MS",
        "LATENCY_BASE_MS",
        "LATENCY_JITTER_MS",
        "INT_RANGE_MODE",
    ];

    #[test]
    fn defaults_match_the_engine_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        for key in KEYS {
            std::env::remove_var(key);
        }
        let config = scan_config_from_env();
        let engine_default = ScanConfig::default();
        assert_eq!(config.scan_time_ms, engine_default.scan_time_ms);
        assert!(!config.dint_range);
    }

    #[test]
    fn int_range_mode_dint_enables_32_bit_wrap() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("INT_RANGE_MODE", "dint");
        let config = scan_config_from_env();
        assert!(config.dint_range);
        std::env::remove_var("INT_RANGE_MODE");
    }

    #[test]
    fn watchdog_limit_is_overridable() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("WATCHDOG_LIMIT_MS", "75");
        let config = scan_config_from_env();
        assert_eq!(config.watchdog_limit_ms, 75);
        std::env::remove_var("WATCHDOG_LIMIT_MS");
    }
}
