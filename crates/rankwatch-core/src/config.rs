use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Interpreter names probed for the worker, in platform order.
#[must_use]
pub fn default_interpreter_candidates() -> Vec<String> {
    let names: &[&str] = if cfg!(windows) {
        &["py", "python", "python3"]
    } else {
        &["python3", "python"]
    };
    names.iter().map(|s| (*s).to_string()).collect()
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the real environment so it can be tested with a plain
/// `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let parse_addr = |var: &str, default: &str| -> Result<SocketAddr, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u32>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u64>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<usize>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    };

    let database_url = require("DATABASE_URL")?;

    let env = parse_environment(&or_default("RANKWATCH_ENV", "development"))?;

    let bind_addr = parse_addr("RANKWATCH_BIND_ADDR", "0.0.0.0:3000")?;
    let log_level = or_default("RANKWATCH_LOG_LEVEL", "info");

    let db_max_connections = parse_u32("RANKWATCH_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("RANKWATCH_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("RANKWATCH_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let project_root = PathBuf::from(or_default("RANKWATCH_PROJECT_ROOT", "."));
    let worker_script = PathBuf::from(or_default(
        "RANKWATCH_WORKER_SCRIPT",
        "python/crawl_and_update.py",
    ));
    let interpreter_candidates = match lookup("RANKWATCH_INTERPRETERS") {
        Ok(raw) => parse_candidates(&raw)?,
        Err(_) => default_interpreter_candidates(),
    };
    let worker_max_captured_lines = parse_usize("RANKWATCH_WORKER_MAX_CAPTURED_LINES", "500")?;

    let poll_interval_ms = parse_u64("RANKWATCH_POLL_INTERVAL_MS", "500")?;
    let poll_timeout_secs = parse_u64("RANKWATCH_POLL_TIMEOUT_SECS", "1800")?;
    if poll_interval_ms == 0 {
        return Err(ConfigError::InvalidEnvVar {
            var: "RANKWATCH_POLL_INTERVAL_MS".to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        project_root,
        worker_script,
        interpreter_candidates,
        worker_max_captured_lines,
        poll_interval_ms,
        poll_timeout_secs,
    })
}

/// Parse a string into an `Environment` variant.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "production" => Ok(Environment::Production),
        "test" => Ok(Environment::Test),
        other => Err(ConfigError::InvalidEnvVar {
            var: "RANKWATCH_ENV".to_string(),
            reason: format!("unknown environment \"{other}\""),
        }),
    }
}

/// Split a comma-separated interpreter list, dropping blanks.
fn parse_candidates(raw: &str) -> Result<Vec<String>, ConfigError> {
    let names: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
        .collect();

    if names.is_empty() {
        return Err(ConfigError::InvalidEnvVar {
            var: "RANKWATCH_INTERPRETERS".to_string(),
            reason: "at least one interpreter name is required".to_string(),
        });
    }
    Ok(names)
}
