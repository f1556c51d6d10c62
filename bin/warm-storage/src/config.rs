//! `config` subcommands

use clap::{Args, Subcommand};
use eyre::WrapErr;
use std::path::{Path, PathBuf};
use tracing::info;
use warm_storage_primitives::{ServiceConfig, ServicePricing};

/// Configuration utilities
#[derive(Debug, Subcommand)]
pub(crate) enum ConfigCommand {
    /// Parse and validate a service configuration file
    Check(CheckArgs),
}

#[derive(Debug, Args)]
pub(crate) struct CheckArgs {
    /// Path to the TOML configuration
    #[arg(long, short = 'c')]
    config: PathBuf,
}

impl ConfigCommand {
    pub(crate) fn run(self) -> eyre::Result<()> {
        match self {
            Self::Check(args) => {
                let config = load_config(&args.config)?;
                let pricing = ServicePricing::new(&config.pricing, config.token);
                info!(
                    target: "warm_storage::cli",
                    path = %args.config.display(),
                    max_proving_period = config.proving.max_proving_period,
                    challenge_window_size = config.proving.challenge_window_size,
                    commission_bps = config.commission_bps,
                    "configuration valid"
                );
                println!("{}", serde_json::to_string_pretty(&pricing)?);
                Ok(())
            }
        }
    }
}

/// Read and validate a TOML service configuration
pub(crate) fn load_config(path: &Path) -> eyre::Result<ServiceConfig> {
    let raw = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read config {}", path.display()))?;
    let config: ServiceConfig =
        toml::from_str(&raw).wrap_err_with(|| format!("failed to parse config {}", path.display()))?;
    config.validate().wrap_err("invalid configuration")?;
    Ok(config)
}

/// Configuration from `path`, or defaults when absent
pub(crate) fn load_or_default(path: Option<&Path>) -> eyre::Result<ServiceConfig> {
    path.map_or_else(|| Ok(ServiceConfig::default()), load_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const VALID: &str = r#"
service_address = "0x5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e"
owner = "0x0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a"
pdp_verifier = "0x0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b"
payments = "0x0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c"
token = "0xeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee"
commission_bps = 50

[proving]
max_proving_period = 240
challenge_window_size = 20
"#;

    fn write(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_valid_config() {
        let file = write(VALID);
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.commission_bps, 50);
        assert_eq!(config.proving.max_proving_period, 240);
    }

    #[test]
    fn test_invalid_window_rejected() {
        let file = write(&VALID.replace("challenge_window_size = 20", "challenge_window_size = 240"));
        let err = load_config(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("invalid configuration"));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(&dir.path().join("absent.toml")).is_err());
        assert_eq!(load_or_default(None).unwrap(), ServiceConfig::default());
    }
}
