use std::{collections::HashMap, env, net::SocketAddr, time::Duration};

use thiserror::Error;
use tracing::warn;

/// Built-in budgets, in priority order. They sum below the default ceiling.
const BUILTIN_BUDGETS: &[(&str, u64)] = &[
    ("OpenAI", 12_000),
    ("Vapi", 6_000),
    ("Retell", 4_000),
    ("Bland", 3_000),
    ("Free Fallback", 2_000),
];

const DEFAULT_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_CEILING_MS: u64 = 30_000;
const DEFAULT_OPENAI_TIMEOUT_SECS: u64 = 25;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value}")]
    InvalidValue { var: String, value: String },
    #[error("backend name must not be empty")]
    EmptyName,
    #[error("backend name {0} is registered twice")]
    DuplicateName(String),
    #[error("backends {first} and {second} share priority {priority}")]
    DuplicatePriority {
        first: String,
        second: String,
        priority: u32,
    },
    #[error("backend {0} has no explicit timeout budget")]
    MissingTimeout(String),
    #[error("timeout budgets total {total_ms}ms, which reaches the {ceiling_ms}ms request ceiling")]
    BudgetExceedsCeiling { total_ms: u128, ceiling_ms: u128 },
    #[error("{backend} stream timeout {timeout_ms}ms reaches the {ceiling_ms}ms request ceiling")]
    StreamTimeoutExceedsCeiling {
        backend: String,
        timeout_ms: u128,
        ceiling_ms: u128,
    },
    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bind_addr: SocketAddr,
    pub timeouts: TimeoutPolicy,
    pub openai: OpenAiConfig,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let raw_addr = env::var("GATEWAY_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_owned());
        let bind_addr = raw_addr
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidValue {
                var: "GATEWAY_BIND_ADDR".to_owned(),
                value: raw_addr.clone(),
            })?;

        Ok(Self {
            bind_addr,
            timeouts: TimeoutPolicy::from_env(),
            openai: OpenAiConfig::from_env(),
        })
    }
}

/// Per-backend trial budgets, looked up case-insensitively by name.
#[derive(Debug, Clone)]
pub struct TimeoutPolicy {
    budgets: HashMap<String, Duration>,
    default: Duration,
    ceiling: Duration,
    strict: bool,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        let mut policy = Self::new(
            Duration::from_millis(DEFAULT_TIMEOUT_MS),
            Duration::from_millis(DEFAULT_CEILING_MS),
        );
        for (name, millis) in BUILTIN_BUDGETS {
            policy = policy.with_budget(name, Duration::from_millis(*millis));
        }
        policy
    }
}

impl TimeoutPolicy {
    pub fn new(default: Duration, ceiling: Duration) -> Self {
        Self {
            budgets: HashMap::new(),
            default,
            ceiling,
            strict: false,
        }
    }

    pub fn from_env() -> Self {
        let mut policy = Self::default();
        policy.default = Duration::from_millis(read_u64(
            "GATEWAY_DEFAULT_TIMEOUT_MS",
            DEFAULT_TIMEOUT_MS,
        ));
        policy.ceiling = Duration::from_millis(read_u64(
            "GATEWAY_REQUEST_CEILING_MS",
            DEFAULT_CEILING_MS,
        ));
        policy.strict = read_bool("GATEWAY_STRICT_TIMEOUTS", false);
        for (name, millis) in BUILTIN_BUDGETS {
            let budget = read_u64(&budget_var(name), *millis);
            policy = policy.with_budget(name, Duration::from_millis(budget));
        }
        policy
    }

    pub fn with_budget(mut self, name: &str, budget: Duration) -> Self {
        self.budgets.insert(name.to_lowercase(), budget);
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn ceiling(&self) -> Duration {
        self.ceiling
    }

    pub fn for_backend(&self, name: &str) -> Duration {
        self.budgets
            .get(&name.to_lowercase())
            .copied()
            .unwrap_or(self.default)
    }

    /// Checks the budgets of the registered backends. In strict mode every
    /// backend needs an explicit entry; either way the worst-case sum must
    /// stay below the request ceiling.
    pub fn validate<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Result<(), ConfigError> {
        let mut total = Duration::ZERO;
        for name in names {
            let budget = match self.budgets.get(&name.to_lowercase()) {
                Some(budget) => *budget,
                None if self.strict => return Err(ConfigError::MissingTimeout(name.to_owned())),
                None => {
                    warn!(
                        backend = %name,
                        default_ms = self.default.as_millis() as u64,
                        "no explicit timeout budget, using default"
                    );
                    self.default
                }
            };
            total += budget;
        }

        if total >= self.ceiling {
            return Err(ConfigError::BudgetExceedsCeiling {
                total_ms: total.as_millis(),
                ceiling_ms: self.ceiling.as_millis(),
            });
        }
        Ok(())
    }

    /// A streamed body is bounded only by its client timeout once the trial
    /// has returned, so that timeout must also stay below the ceiling.
    pub fn check_stream_timeout(&self, backend: &str, timeout: Duration) -> Result<(), ConfigError> {
        if timeout >= self.ceiling {
            return Err(ConfigError::StreamTimeoutExceedsCeiling {
                backend: backend.to_owned(),
                timeout_ms: timeout.as_millis(),
                ceiling_ms: self.ceiling.as_millis(),
            });
        }
        Ok(())
    }
}

/// An API key read from the environment on every check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Credential {
    pub env_var: &'static str,
    pub placeholder: &'static str,
}

impl Credential {
    pub const fn new(env_var: &'static str, placeholder: &'static str) -> Self {
        Self {
            env_var,
            placeholder,
        }
    }

    pub fn value(&self) -> Option<String> {
        env::var(self.env_var)
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty() && value != self.placeholder)
    }

    pub fn is_present(&self) -> bool {
        self.value().is_some()
    }
}

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub model: String,
    pub request_timeout: Duration,
}

impl OpenAiConfig {
    pub fn from_env() -> Self {
        Self {
            base_url: env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_owned())
                .trim_end_matches('/')
                .to_owned(),
            model: env::var("OPENAI_MODEL")
                .ok()
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| "gpt-3.5-turbo".to_owned()),
            request_timeout: Duration::from_secs(read_u64(
                "OPENAI_TIMEOUT_SECS",
                DEFAULT_OPENAI_TIMEOUT_SECS,
            )),
        }
    }
}

/// `Free Fallback` -> `GATEWAY_TIMEOUT_FREE_FALLBACK_MS`.
pub fn budget_var(name: &str) -> String {
    let key = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect::<String>();
    format!("GATEWAY_TIMEOUT_{key}_MS")
}

fn read_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
}

fn read_bool(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .map(|value| matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}
