use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::reports::ReportStatus;

#[derive(Parser, Debug)]
#[command(name = "safeher", about = "Operator tools for the SafeHer backend")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Path to data directory
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Database file, overriding `[database] path`
    #[arg(long)]
    pub db_path: Option<PathBuf>,

    /// Overrides `[dispatch] location_policy`
    #[arg(long, value_enum)]
    pub location_policy: Option<LocationPolicy>,

    /// Admin account email
    #[arg(long)]
    pub email: Option<String>,

    /// Admin account password
    #[arg(long)]
    pub password: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create or upgrade the database schema
    Migrate,
    /// List non-admin accounts
    Users {
        /// all, active or blocked
        #[arg(long, default_value = "all")]
        status: String,
        /// Case-insensitive match on name or email
        #[arg(long)]
        query: Option<String>,
    },
    /// List the attributed reports of one user
    Reports { email: String },
    /// List every report in the store
    AllReports,
    Block { user_id: String },
    Unblock { user_id: String },
    DeleteUser { email: String },
    DeleteReport { id: String },
    SetStatus { id: String, status: ReportStatus },
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub access: AccessConfig,
    pub identity: IdentityConfig,
    pub dispatch: DispatchConfig,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct AccessConfig {
    /// Emails that receive the admin role at signup.
    pub admin_emails: Vec<String>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct IdentityConfig {
    pub bcrypt_cost: u32,
    pub min_password_len: usize,
    pub reset_token_minutes: i64,
}

/// What to do when the user refuses location access during an SOS.
#[derive(Deserialize, ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LocationPolicy {
    /// Send the alert without coordinates.
    #[default]
    Degrade,
    /// Abort the alert and report the denial.
    Strict,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct DispatchConfig {
    pub preamble: String,
    pub maps_base_url: String,
    pub email_subject: String,
    pub location_timeout_secs: u64,
    pub location_policy: LocationPolicy,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            admin_emails: vec!["admin@app.com".to_string()],
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            bcrypt_cost: bcrypt::DEFAULT_COST,
            min_password_len: 6,
            reset_token_minutes: 60,
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            preamble: "SOS Alert! I need urgent help. Please respond immediately.".to_string(),
            maps_base_url: "https://www.google.com/maps".to_string(),
            email_subject: "SOS Alert".to_string(),
            location_timeout_secs: 10,
            location_policy: LocationPolicy::Degrade,
        }
    }
}

impl DispatchConfig {
    pub fn location_timeout(&self) -> Duration {
        Duration::from_secs(self.location_timeout_secs)
    }
}

impl Config {
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let data_dir = Self::data_dir(cli);
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| data_dir.join("config.toml"));

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Config::default()
        };

        // CLI overrides
        if let Some(ref path) = cli.db_path {
            config.database.path = Some(path.clone());
        }
        if let Some(policy) = cli.location_policy {
            config.dispatch.location_policy = policy;
        }

        if config.database.path.is_none() {
            config.database.path = Some(data_dir.join("safeher.db"));
        }

        Ok(config)
    }

    pub fn data_dir(cli: &Cli) -> PathBuf {
        cli.data_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".safeher")
        })
    }

    /// Database location. Falls back to the working directory when the
    /// config was built by hand rather than through [`Config::load`].
    pub fn db_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .unwrap_or_else(|| PathBuf::from("safeher.db"))
    }
}
