//! The process environment surface (spec §6).
//!
//! Recognised variables:
//! - `PORT`: command-API listen port (default: `8080`)
//! - `PANDAURA_HOST`: bind host (default: `127.0.0.1`)
//! - `CSV_OUTPUT_DIR`: directory for exported scan-history CSVs (default: `./csv`)
//! - `LOG_LEVEL`: tracing filter directive (default: `info`)
//! - `SYNC_INTERVAL`: tag-sync publish interval in milliseconds (default: `100`)
//! - `NODE_ENV`: selects the persistence DB profile (default: `development`)
//! - `DB_PATH`: path to the persisted-state database file (default: `./data/shadowforge.db`)
//!
//! Unknown variables are ignored, not rejected; each is logged once at
//! `debug` so a misspelled key is still visible to an operator who turns
//! logging up.

use std::path::PathBuf;

const RECOGNISED_KEYS: &[&str] = &[
    "PORT",
    "PANDAURA_HOST",
    "CSV_OUTPUT_DIR",
    "LOG_LEVEL",
    "SYNC_INTERVAL",
    "NODE_ENV",
    "DB_PATH",
];

/// The persistence profile selected by `NODE_ENV`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeEnv {
    Development,
    Test,
    Production,
}

impl NodeEnv {
    fn parse(raw: &str) -> Self {
        match raw {
            "production" => Self::Production,
            "test" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// The resolved process-level environment surface.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub port: u16,
    pub pandaura_host: String,
    pub csv_output_dir: PathBuf,
    pub log_level: String,
    pub sync_interval_ms: u64,
    pub node_env: NodeEnv,
    pub db_path: PathBuf,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            pandaura_host: "127.0.0.1".to_string(),
            csv_output_dir: PathBuf::from("./csv"),
            log_level: "info".to_string(),
            sync_interval_ms: 100,
            node_env: NodeEnv::Development,
            db_path: PathBuf::from("./data/shadowforge.db"),
        }
    }
}

impl EnvConfig {
    /// Resolve the environment surface from the current process
    /// environment, falling back to documented defaults for anything
    /// unset or unparsable, and logging every unrecognised key it sees.
    pub fn from_env() -> Self {
        use std::env;

        let mut config = Self::default();

        if let Ok(port) = env::var("PORT") {
            match port.parse() {
                Ok(p) => config.port = p,
                Err(_) => tracing::debug!(value = %port, "PORT is not a valid port number, keeping default"),
            }
        }
        if let Ok(host) = env::var("PANDAURA_HOST") {
            config.pandaura_host = host;
        }
        if let Ok(dir) = env::var("CSV_OUTPUT_DIR") {
            config.csv_output_dir = PathBuf::from(dir);
        }
        if let Ok(level) = env::var("LOG_LEVEL") {
            config.log_level = level;
        }
        if let Ok(interval) = env::var("SYNC_INTERVAL") {
            match interval.parse() {
                Ok(ms) => config.sync_interval_ms = ms,
                Err(_) => tracing::debug!(value = %interval, "SYNC_INTERVAL is not a valid integer, keeping default"),
            }
        }
        if let Ok(node_env) = env::var("NODE_ENV") {
            config.node_env = NodeEnv::parse(&node_env);
        }
        if let Ok(path) = env::var("DB_PATH") {
            config.db_path = PathBuf::from(path);
        }

        for (key, _) in env::vars() {
            if key.starts_with("SHADOWFORGE_") && !RECOGNISED_KEYS.contains(&key.as_str()) {
                tracing::debug!(%key, "ignoring unrecognised environment variable");
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn defaults_with_no_environment_set() {
        let _guard = ENV_LOCK.lock().unwrap();
        for key in RECOGNISED_KEYS {
            std::env::remove_var(key);
        }
        let config = EnvConfig::from_env();
        assert_eq!(config.port, 8080);
        assert_eq!(config.pandaura_host, "127.0.0.1");
        assert_eq!(config.node_env, NodeEnv::Development);
    }

    #[test]
    fn recognised_keys_override_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("PORT", "9100");
        std::env::set_var("NODE_ENV", "production");
        let config = EnvConfig::from_env();
        assert_eq!(config.port, 9100);
        assert_eq!(config.node_env, NodeEnv::Production);
        std::env::remove_var("PORT");
        std::env::remove_var("NODE_ENV");
    }

    #[test]
    fn an_unparsable_port_falls_back_to_the_default_instead_of_panicking() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("PORT", "not-a-number");
        let config = EnvConfig::from_env();
        assert_eq!(config.port, 8080);
        std::env::remove_var("PORT");
    }
}
