//! Configuration loading from the process environment.

use scholarhub_billing::{FeeAmount, FeeSchedule};

/// Runtime configuration for the API process.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Socket address the HTTP server binds to.
    pub bind_addr: String,
    /// Fee applied when acceptance opens an invoice.
    pub fee_schedule: FeeSchedule,
    /// Seconds between overdue-invoice sweeps.
    pub expiry_sweep_interval_secs: u64,
    /// Use the Postgres event store instead of the in-memory one.
    pub use_persistent_stores: bool,
    /// Postgres connection string (required when persistent stores are on).
    pub database_url: Option<String>,
}

impl AppConfig {
    /// Load configuration from environment variables, with dev defaults.
    pub fn from_env() -> Self {
        let defaults = FeeSchedule::default();

        let fee_schedule = FeeSchedule {
            amount: FeeAmount::new(
                env_parse("SUBMISSION_FEE_USD_CENTS", defaults.amount.usd_cents),
                env_parse("SUBMISSION_FEE_MWK", defaults.amount.mwk),
            ),
            days_until_due: env_parse("INVOICE_DAYS_UNTIL_DUE", defaults.days_until_due),
        };

        Self {
            bind_addr: std::env::var("SCHOLARHUB_BIND_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            fee_schedule,
            expiry_sweep_interval_secs: env_parse("EXPIRY_SWEEP_INTERVAL_SECS", 3600),
            use_persistent_stores: env_parse("USE_PERSISTENT_STORES", false),
            database_url: std::env::var("DATABASE_URL").ok(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            fee_schedule: FeeSchedule::default(),
            expiry_sweep_interval_secs: 3600,
            use_persistent_stores: false,
            database_url: None,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(var = name, value = %raw, "unparseable env var; using default");
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_env() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.fee_schedule.amount, FeeAmount::new(199, 2_500));
        assert_eq!(cfg.fee_schedule.days_until_due, 30);
        assert!(!cfg.use_persistent_stores);
    }
}
