//! Configuration for the onboarding client
//!
//! CLI arguments and environment variable handling using clap. A `.env` file
//! is loaded by the binary before parsing.

use crate::api::ClientConfig;
use crate::flows::FlowKind;
use crate::geo::Language;
use crate::location::Coordinates;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Coconut farmer onboarding client
#[derive(Parser, Debug, Clone)]
#[command(name = "coco-onboard")]
#[command(about = "Guided registration for coconut farmers")]
pub struct Args {
    /// Backend base URL
    #[arg(long, env = "API_BASE_URL", default_value = "http://localhost:3000")]
    pub api_base_url: String,

    /// SQLite file holding the session, payment history and event log
    #[arg(long, env = "DB_PATH", default_value = "coco-onboard.db")]
    pub db_path: PathBuf,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_TIMEOUT_SECS", default_value = "30")]
    pub http_timeout_secs: u64,

    /// Label language for location names (en, local)
    #[arg(long, env = "LANGUAGE", default_value = "en")]
    pub language: Language,

    /// Currency the registration fee is charged in
    #[arg(long, env = "CURRENCY", default_value = "INR")]
    pub currency: String,

    /// Fix used to prefill state, district and pincode, as "lat,lng"
    #[arg(long, env = "POSITION", value_parser = parse_position)]
    pub position: Option<Coordinates>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log file; the terminal UI owns stdout, so logs go here
    #[arg(long, env = "LOG_FILE", default_value = "coco-onboard.log")]
    pub log_file: PathBuf,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run a registration wizard (default)
    Register {
        /// farmer, quick or harvest
        #[arg(long, default_value = "farmer")]
        flow: FlowKind,
    },
    /// List recorded payment attempts for a user
    History {
        /// Defaults to the user of the saved session
        #[arg(long)]
        user_id: Option<String>,
    },
    /// Show the saved session, if any
    Whoami,
    /// Forget the saved session
    Logout,
}

impl Args {
    pub fn validate(&self) -> Result<(), String> {
        if !self.api_base_url.starts_with("http://") && !self.api_base_url.starts_with("https://") {
            return Err(format!("API_BASE_URL must be an http(s) URL, got {}", self.api_base_url));
        }
        if self.http_timeout_secs == 0 {
            return Err("HTTP_TIMEOUT_SECS must be greater than 0".to_string());
        }
        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(format!("CURRENCY must be a 3-letter ISO code, got {}", self.currency));
        }
        Ok(())
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.api_base_url.trim_end_matches('/').to_string(),
            timeout_secs: self.http_timeout_secs,
        }
    }

    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Register {
            flow: FlowKind::FarmerRegistration,
        })
    }
}

fn parse_position(value: &str) -> Result<Coordinates, String> {
    let (lat, lng) = value
        .split_once(',')
        .ok_or_else(|| format!("expected \"lat,lng\", got {}", value))?;
    let latitude: f64 = lat.trim().parse().map_err(|_| format!("bad latitude {}", lat))?;
    let longitude: f64 = lng.trim().parse().map_err(|_| format!("bad longitude {}", lng))?;

    if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
        return Err(format!("{} is not on the globe", value));
    }
    Ok(Coordinates { latitude, longitude })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["coco-onboard"]).unwrap();
        assert!(args.validate().is_ok());
        assert_eq!(args.language, Language::English);
        assert_eq!(args.currency, "INR");
        assert!(args.position.is_none());
        assert!(matches!(
            args.command(),
            Command::Register { flow: FlowKind::FarmerRegistration }
        ));
    }

    #[test]
    fn test_flags_override() {
        let args = Args::try_parse_from([
            "coco-onboard",
            "--api-base-url",
            "https://api.example.org/v1/",
            "--language",
            "local",
            "--position",
            "10.36, 76.31",
            "register",
            "--flow",
            "harvest",
        ])
        .unwrap();

        assert_eq!(args.client_config().base_url, "https://api.example.org/v1");
        assert_eq!(args.language, Language::Local);
        assert_eq!(args.position, Some(Coordinates { latitude: 10.36, longitude: 76.31 }));
        assert!(matches!(args.command(), Command::Register { flow: FlowKind::FarmHarvest }));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut args = Args::try_parse_from(["coco-onboard"]).unwrap();
        args.api_base_url = "ftp://x".into();
        assert!(args.validate().is_err());

        args.api_base_url = "http://localhost:3000".into();
        args.http_timeout_secs = 0;
        assert!(args.validate().is_err());

        args.http_timeout_secs = 30;
        args.currency = "rupees".into();
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_position_parsing() {
        assert!(parse_position("10.36,76.31").is_ok());
        assert!(parse_position("10.36").is_err());
        assert!(parse_position("north,76.31").is_err());
        assert!(parse_position("95,76.31").is_err());
        assert!(parse_position("inf,76.31").is_err());
    }
}
