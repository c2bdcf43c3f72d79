use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use std::fmt;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    pub enable_file_logs: bool,
    pub log_dir: String,
    pub sled_path: String,
    pub cors_origin: String,
    pub llm: LLMConfig,
    pub capture: CaptureEnvConfig,
}

#[derive(Clone)]
pub struct LLMConfig {
    pub enabled: bool,
    pub mock: bool,
    pub api_url: String,
    pub api_key: String,
    pub timeout_secs: u64,
    /// 按顺序尝试的后端模型
    pub models: Vec<String>,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
}

/// Capture overrides read from the environment; everything else keeps
/// `CaptureConfig::default()`.
#[derive(Debug, Clone)]
pub struct CaptureEnvConfig {
    pub countdown_ticks: u32,
    pub pre_analysis_at: u32,
    pub expression_frames: u32,
    pub pulse_duration_ms: u64,
    pub seed: Option<u64>,
}

impl fmt::Debug for LLMConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LLMConfig")
            .field("enabled", &self.enabled)
            .field("mock", &self.mock)
            .field("api_url", &self.api_url)
            .field("api_key", &"***REDACTED***")
            .field("timeout_secs", &self.timeout_secs)
            .field("models", &self.models)
            .field("max_attempts", &self.max_attempts)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .finish()
    }
}

pub const DEFAULT_LLM_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_LLM_MODELS: &str = "gemini-1.5-flash,gemini-2.0-flash-exp";

impl Config {
    pub fn from_env() -> Self {
        Self {
            host: env_or_parse("HOST", IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))),
            port: env_or_parse("PORT", 3000_u16),
            log_level: env_or("RUST_LOG", "info"),
            enable_file_logs: env_or_bool("ENABLE_FILE_LOGS", false),
            log_dir: env_or("LOG_DIR", "./logs"),
            sled_path: env_or("SLED_PATH", "./data/biomirror.sled"),
            cors_origin: env_or("CORS_ORIGIN", "http://localhost:5173"),
            llm: LLMConfig {
                enabled: env_or_bool("LLM_ENABLED", false),
                mock: env_or_bool("LLM_MOCK", true),
                api_url: env_or("LLM_API_URL", DEFAULT_LLM_API_URL),
                api_key: env_or("LLM_API_KEY", ""),
                timeout_secs: env_or_parse("LLM_TIMEOUT_SECS", 30_u64),
                models: env_list("LLM_MODELS", DEFAULT_LLM_MODELS),
                max_attempts: env_or_parse("LLM_MAX_ATTEMPTS", 2_u32),
                retry_delay_ms: env_or_parse("LLM_RETRY_DELAY_MS", 1_500_u64),
            },
            capture: CaptureEnvConfig {
                countdown_ticks: env_or_parse("CAPTURE_COUNTDOWN_TICKS", 15_u32),
                pre_analysis_at: env_or_parse("CAPTURE_PRE_ANALYSIS_AT", 5_u32),
                expression_frames: env_or_parse("CAPTURE_EXPRESSION_FRAMES", 15_u32),
                pulse_duration_ms: env_or_parse("CAPTURE_PULSE_DURATION_MS", 3_500_u64),
                seed: env_opt_parse("CAPTURE_SEED"),
            },
        }
    }
}

pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn env_or_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    env_opt_parse(key).unwrap_or(default)
}

/// `None` when unset or unparsable; a bad value is logged.
pub fn env_opt_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(
                key,
                value = %raw,
                "Failed to parse env var, using default"
            );
            None
        }
    }
}

pub fn env_or_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

/// Comma-separated list; blank entries dropped. Empty result falls back to `default`.
pub fn env_list(key: &str, default: &str) -> Vec<String> {
    let split = |raw: &str| -> Vec<String> {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    };
    let values = env::var(key).map(|raw| split(&raw)).unwrap_or_default();
    if values.is_empty() {
        split(default)
    } else {
        values
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Mutex, OnceLock};

    use super::*;

    fn env_lock() -> &'static Mutex<()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
    }

    fn managed_keys() -> &'static [&'static str] {
        &[
            "HOST",
            "PORT",
            "RUST_LOG",
            "LLM_ENABLED",
            "LLM_TIMEOUT_SECS",
            "LLM_MOCK",
            "LLM_MODELS",
            "LLM_API_KEY",
            "CAPTURE_COUNTDOWN_TICKS",
            "CAPTURE_SEED",
        ]
    }

    fn clear_keys(keys: &[&str]) {
        for key in keys {
            env::remove_var(key);
        }
    }

    #[test]
    fn loads_defaults_when_missing() {
        let _guard = env_lock().lock().expect("env lock");
        clear_keys(managed_keys());

        let cfg = Config::from_env();
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.log_level, "info");
        assert!(!cfg.llm.enabled);
        assert_eq!(cfg.llm.models, vec!["gemini-1.5-flash", "gemini-2.0-flash-exp"]);
        assert_eq!(cfg.llm.max_attempts, 2);
        assert_eq!(cfg.capture.countdown_ticks, 15);
        assert!(cfg.capture.seed.is_none());
    }

    #[test]
    fn parses_numeric_values() {
        let _guard = env_lock().lock().expect("env lock");
        clear_keys(managed_keys());

        env::set_var("PORT", "4000");
        env::set_var("LLM_TIMEOUT_SECS", "42");
        env::set_var("CAPTURE_SEED", "1234");

        let cfg = Config::from_env();
        assert_eq!(cfg.port, 4000);
        assert_eq!(cfg.llm.timeout_secs, 42);
        assert_eq!(cfg.capture.seed, Some(1234));
    }

    #[test]
    fn invalid_values_fall_back() {
        let _guard = env_lock().lock().expect("env lock");
        clear_keys(managed_keys());

        env::set_var("PORT", "bad");
        env::set_var("CAPTURE_COUNTDOWN_TICKS", "x");
        env::set_var("CAPTURE_SEED", "not-a-number");

        let cfg = Config::from_env();
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.capture.countdown_ticks, 15);
        assert!(cfg.capture.seed.is_none());
    }

    #[test]
    fn model_list_is_trimmed() {
        let _guard = env_lock().lock().expect("env lock");
        clear_keys(managed_keys());

        env::set_var("LLM_MODELS", " model-a , ,model-b ");
        assert_eq!(Config::from_env().llm.models, vec!["model-a", "model-b"]);

        env::set_var("LLM_MODELS", " , ");
        assert_eq!(Config::from_env().llm.models.len(), 2);
    }

    #[test]
    fn api_key_is_redacted() {
        let _guard = env_lock().lock().expect("env lock");
        clear_keys(managed_keys());

        env::set_var("LLM_API_KEY", "super-secret");
        let rendered = format!("{:?}", Config::from_env());
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("REDACTED"));
    }
}
