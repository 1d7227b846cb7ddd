//! This module contains all CLI-specific code for the host binary.

use crate::{errors::ConfigError, MachineConfig};
use clap::{
    builder::styling::{AnsiColor, Color, Style},
    ArgAction, Parser, Subcommand,
};
use std::path::PathBuf;

mod tracing_util;
pub use tracing_util::init_tracing_subscriber;

const ABOUT: &str = "
tunnel-host services the guest-to-host call tunnel of an emulated AArch64 machine. A guest raises
a trap with either zero, announcing that its MMU is live so that code hooks can be installed, or
the address of a call record, which the host services and writes back in place. In native mode
the host runs scripted guests against the tunnel in-process.
";

/// The host binary CLI application arguments.
#[derive(Parser, Clone, Debug)]
#[command(about = ABOUT, version, styles = cli_styles())]
pub struct HostCli {
    /// Verbosity level (0-4)
    #[arg(long, short, action = ArgAction::Count)]
    pub v: u8,
    /// Path of the machine configuration. Defaults apply when omitted.
    #[clap(long, short, env = "TUNNEL_CONFIG")]
    pub config: Option<PathBuf>,
    /// Host mode
    #[clap(subcommand)]
    pub mode: HostMode,
}

/// Operation modes for the host binary.
#[derive(Subcommand, Clone, Debug, PartialEq, Eq)]
pub enum HostMode {
    /// Run scripted guests against the tunnel, one per vCPU.
    Native {
        /// Number of vCPUs to run.
        #[clap(long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..=64))]
        vcpus: u16,
    },
    /// Validate the machine configuration and print a summary.
    Check,
}

impl HostCli {
    /// Load the machine configuration named by `--config`, or the default configuration.
    pub fn load_config(&self) -> Result<MachineConfig, ConfigError> {
        match &self.config {
            Some(path) => MachineConfig::from_file(path),
            None => Ok(MachineConfig::default()),
        }
    }
}

/// Styles for the CLI application.
pub const fn cli_styles() -> clap::builder::Styles {
    clap::builder::Styles::styled()
        .usage(Style::new().bold().underline().fg_color(Some(Color::Ansi(AnsiColor::Yellow))))
        .header(Style::new().bold().underline().fg_color(Some(Color::Ansi(AnsiColor::Yellow))))
        .literal(Style::new().fg_color(Some(Color::Ansi(AnsiColor::Green))))
        .invalid(Style::new().bold().fg_color(Some(Color::Ansi(AnsiColor::Red))))
        .error(Style::new().bold().fg_color(Some(Color::Ansi(AnsiColor::Red))))
        .valid(Style::new().bold().underline().fg_color(Some(Color::Ansi(AnsiColor::Green))))
        .placeholder(Style::new().fg_color(Some(Color::Ansi(AnsiColor::White))))
}

#[cfg(test)]
mod test {
    use super::{tracing_util::verbosity_level, *};
    use tracing::Level;

    #[test]
    fn test_parse_modes() {
        let cli = HostCli::try_parse_from(["tunnel-host", "native"]).unwrap();
        assert_eq!(cli.mode, HostMode::Native { vcpus: 1 });
        assert_eq!(cli.v, 0);

        let args = ["tunnel-host", "-vvv", "--config", "m.json", "native", "--vcpus", "4"];
        let cli = HostCli::try_parse_from(args).unwrap();
        assert_eq!(cli.mode, HostMode::Native { vcpus: 4 });
        assert_eq!(cli.v, 3);
        assert_eq!(cli.config, Some(PathBuf::from("m.json")));

        let cli = HostCli::try_parse_from(["tunnel-host", "check"]).unwrap();
        assert_eq!(cli.mode, HostMode::Check);
    }

    #[test]
    fn test_invalid_args() {
        for args in [
            vec!["tunnel-host"],
            vec!["tunnel-host", "native", "--vcpus", "0"],
            vec!["tunnel-host", "native", "--vcpus", "65"],
            vec!["tunnel-host", "serve"],
        ] {
            assert!(HostCli::try_parse_from(args).is_err());
        }
    }

    #[test]
    fn test_load_config() {
        let cli = HostCli::try_parse_from(["tunnel-host", "check"]).unwrap();
        assert_eq!(cli.load_config().unwrap(), MachineConfig::default());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("machine.json");
        std::fs::write(&path, r#"{ "unknown_calls": "reject" }"#).unwrap();
        let cli = HostCli::try_parse_from([
            "tunnel-host",
            "--config",
            path.to_str().unwrap(),
            "check",
        ])
        .unwrap();
        assert_eq!(cli.load_config().unwrap().unknown_calls, crate::UnknownCallPolicy::Reject);
    }

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(verbosity_level(0), Level::ERROR);
        assert_eq!(verbosity_level(2), Level::INFO);
        assert_eq!(verbosity_level(4), Level::TRACE);
        assert_eq!(verbosity_level(9), Level::TRACE);
    }
}
