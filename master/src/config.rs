//! Configuration for the master.
//!
//! Options can be given as individual CLI flags, as `MASTER_*` environment
//! variables, or as the GTP-engine style comma-separated `key=value`
//! string (`slave_port=6000,proxy_port=6001,max_slaves=20,slaves_quit=1`).
//! The option string takes highest priority, then CLI flags, then env.

use anyhow::{anyhow, Result};
use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing::warn;

fn default_max_slaves() -> usize {
    std::env::var("MASTER_MAX_SLAVES")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(100)
}

fn default_log_level() -> String {
    std::env::var("MASTER_LOG_LEVEL").unwrap_or_else(|_| "info".into())
}

fn default_slave_port() -> Option<u16> {
    std::env::var("MASTER_SLAVE_PORT").ok().and_then(|v| v.parse().ok())
}

#[derive(Parser, Debug, Clone)]
#[command(name = "master")]
#[command(about = "Distributed engine master - aggregates MCTS slaves over GTP")]
#[command(
    long_about = "Master process for distributed Monte Carlo tree search. Slaves running
a UCT engine connect to slave_port; the master speaks GTP on stdin/stdout
to the upstream controller, fans commands out to every slave and merges
their search statistics into a single move choice."
)]
pub struct Config {
    /// Comma-separated engine options (slave_port=PORT,proxy_port=PORT,
    /// max_slaves=N,slaves_quit=0|1)
    #[arg(value_name = "KEY=VALUE,...")]
    pub options: Option<String>,

    /// TCP port slaves connect to (required)
    #[arg(long)]
    pub slave_port: Option<u16>,

    /// Optional port collecting slave log streams onto stderr
    #[arg(long)]
    pub proxy_port: Option<u16>,

    /// Maximum number of concurrently connected slaves
    #[arg(long, default_value_t = default_max_slaves())]
    pub max_slaves: usize,

    /// Forward the upstream quit command to slaves
    #[arg(long, default_value_t = false)]
    pub slaves_quit: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value_t = default_log_level())]
    pub log_level: String,

    /// Write per-move search statistics to this JSON file
    #[arg(long)]
    pub stats_file: Option<String>,
}

impl Config {
    /// Fold in the option string (if any) and validate.
    pub fn resolve(mut self) -> Result<Self> {
        if self.slave_port.is_none() {
            self.slave_port = default_slave_port();
        }
        if let Some(options) = self.options.take() {
            self.apply_option_string(&options);
        }
        self.validate()?;
        Ok(self)
    }

    /// Apply a comma-separated `key=value` option string. Unknown keys
    /// are reported and skipped, matching the engine-argument convention.
    fn apply_option_string(&mut self, options: &str) {
        for spec in options.split(',').filter(|s| !s.is_empty()) {
            let (key, value) = match spec.split_once('=') {
                Some((k, v)) => (k, Some(v)),
                None => (spec, None),
            };
            match (key.to_ascii_lowercase().as_str(), value) {
                ("slave_port", Some(v)) => match v.parse() {
                    Ok(port) => self.slave_port = Some(port),
                    Err(_) => warn!(value = v, "invalid slave_port, ignoring"),
                },
                ("proxy_port", Some(v)) => match v.parse() {
                    Ok(port) => self.proxy_port = Some(port),
                    Err(_) => warn!(value = v, "invalid proxy_port, ignoring"),
                },
                ("max_slaves", Some(v)) => match v.parse() {
                    Ok(n) => self.max_slaves = n,
                    Err(_) => warn!(value = v, "invalid max_slaves, ignoring"),
                },
                // Bare "slaves_quit" counts as enabled.
                ("slaves_quit", v) => {
                    self.slaves_quit = v.map(|v| v != "0").unwrap_or(true);
                }
                _ => warn!(option = spec, "invalid engine argument or missing value"),
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.slave_port.is_none() {
            return Err(anyhow!("missing slave_port"));
        }

        if self.max_slaves == 0 {
            return Err(anyhow!("max_slaves must be greater than 0"));
        }

        if self.log_level.parse::<LevelFilter>().is_err() {
            return Err(anyhow!(
                "invalid log level '{}', expected one of trace, debug, info, warn, error",
                self.log_level
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            options: None,
            slave_port: Some(6000),
            proxy_port: None,
            max_slaves: 100,
            slaves_quit: false,
            log_level: "info".into(),
            stats_file: None,
        }
    }

    #[test]
    fn validate_accepts_valid_configuration() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn validate_rejects_missing_slave_port() {
        let mut cfg = base_config();
        cfg.slave_port = None;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("slave_port"));
    }

    #[test]
    fn validate_rejects_zero_max_slaves() {
        let mut cfg = base_config();
        cfg.max_slaves = 0;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("max_slaves"));
    }

    #[test]
    fn validate_rejects_invalid_log_level() {
        let mut cfg = base_config();
        cfg.log_level = "nope".into();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("invalid log level"));
    }

    #[test]
    fn option_string_overrides_flags() {
        let mut cfg = base_config();
        cfg.options = Some("slave_port=1234,proxy_port=1235,max_slaves=20,slaves_quit=1".into());
        let cfg = cfg.resolve().unwrap();
        assert_eq!(cfg.slave_port, Some(1234));
        assert_eq!(cfg.proxy_port, Some(1235));
        assert_eq!(cfg.max_slaves, 20);
        assert!(cfg.slaves_quit);
    }

    #[test]
    fn bare_slaves_quit_enables_forwarding() {
        let mut cfg = base_config();
        cfg.options = Some("slaves_quit".into());
        let cfg = cfg.resolve().unwrap();
        assert!(cfg.slaves_quit);

        let mut cfg = base_config();
        cfg.options = Some("slaves_quit=0".into());
        let cfg = cfg.resolve().unwrap();
        assert!(!cfg.slaves_quit);
    }

    #[test]
    fn unknown_options_are_skipped() {
        let mut cfg = base_config();
        cfg.options = Some("bogus=1,slave_port=4321".into());
        let cfg = cfg.resolve().unwrap();
        assert_eq!(cfg.slave_port, Some(4321));
    }
}
