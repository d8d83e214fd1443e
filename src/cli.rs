//! # Command Line Interface

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "controlplane")]
#[command(about = "Envoy xDS control plane")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// YAML configuration file; defaults and CONTROLPLANE__* variables apply without one
    #[arg(short, long, env = "CONTROLPLANE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the configured log level
    #[arg(long)]
    pub log_level: Option<String>,

    /// Load and validate the configuration, print it and exit
    #[arg(long)]
    pub check: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_path() {
        let cli = Cli::try_parse_from(["controlplane", "--config", "/etc/controlplane.yaml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/controlplane.yaml")));
        assert!(!cli.check);
    }

    #[test]
    fn test_parse_flags() {
        let cli = Cli::try_parse_from(["controlplane", "--check", "--log-level", "debug"]).unwrap();
        assert!(cli.check);
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_unknown_flag_rejected() {
        assert!(Cli::try_parse_from(["controlplane", "--database-url", "x"]).is_err());
    }
}
