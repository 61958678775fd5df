//! Service configuration
//!
//! Values come from an optional `dashboard.toml` next to the binary and from
//! `DASHBOARD_*` environment variables. Nested keys use a double underscore,
//! e.g. `DASHBOARD_THRESHOLDS__AT_RISK=15`.

use anyhow::Context;
use serde::Deserialize;

/// Score thresholds, in points on a fixed scale (not relative to each
/// record's ceiling).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Student mean at or above this passes
    pub pass: f64,
    /// Student mean below this is at risk
    pub at_risk: f64,
    /// Subject mean below this raises a warning
    pub subject_warning: f64,
    /// Scale the thresholds are expressed on, shown in alert messages
    pub scale: f64,
    /// More at-risk students than this raises a critical alert
    pub cohort_critical: usize,
    /// Maximum number of per-student warnings
    pub student_alert_cap: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            pass: 20.0,
            at_risk: 18.0,
            subject_warning: 25.0,
            scale: 50.0,
            cohort_critical: 5,
            student_alert_cap: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DashboardConfig {
    /// Postgres connection string; `DATABASE_URL` is used when unset
    #[serde(default)]
    pub database_url: Option<String>,

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Password given to faculty accounts created without one
    #[serde(default = "default_faculty_password")]
    pub default_faculty_password: String,

    #[serde(default)]
    pub thresholds: Thresholds,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_faculty_password() -> String {
    "password123".to_string()
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            bind_addr: default_bind_addr(),
            max_connections: default_max_connections(),
            default_faculty_password: default_faculty_password(),
            thresholds: Thresholds::default(),
        }
    }
}

impl DashboardConfig {
    /// Load configuration from `dashboard.toml` and the environment
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("dashboard").required(false))
            .add_source(
                config::Environment::with_prefix("DASHBOARD")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .context("failed to read dashboard configuration")?;

        config
            .try_deserialize()
            .context("invalid dashboard configuration")
    }

    pub fn database_url(&self) -> anyhow::Result<String> {
        match &self.database_url {
            Some(url) => Ok(url.clone()),
            None => std::env::var("DATABASE_URL")
                .context("DATABASE_URL or DASHBOARD_DATABASE_URL must point at a Postgres instance"),
        }
    }
}
