use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "calicoctl",
    about = "Calico control CLI",
    version,
    long_about = None
)]
pub struct Cli {
    /// Output format for machine readability.
    #[arg(long, global = true, default_value_t = OutputFormat::Text, value_enum)]
    pub format: OutputFormat,

    /// Progress display on stderr.
    #[arg(long, global = true, default_value_t = ProgressMode::Auto, value_enum)]
    pub progress: ProgressMode,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum ProgressMode {
    Auto,
    Always,
    Never,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Collect host diagnostics, upload them and print the download URL.
    Diags(DiagsArgs),
}

#[derive(Args, Debug, Default)]
pub struct DiagsArgs {
    /// Directory holding Calico logs to include.
    #[arg(long, env = "CALICOCTL_LOG_DIR", value_name = "DIR")]
    pub log_dir: Option<PathBuf>,
    /// Base URL of the anonymous file-hosting service.
    #[arg(long, env = "CALICOCTL_DIAGS_UPLOAD_URL", value_name = "URL")]
    pub upload_url: Option<String>,
    /// Seconds allowed for each upload attempt.
    #[arg(long, env = "CALICOCTL_DIAGS_TIMEOUT", value_name = "SECS")]
    pub timeout: Option<u64>,
    /// Extra upload attempts after a timeout or network error.
    #[arg(long, env = "CALICOCTL_DIAGS_RETRIES", value_name = "N")]
    pub retries: Option<u32>,
    /// Ask the service to delete the bundle after this many days.
    #[arg(long, value_name = "N")]
    pub max_days: Option<u32>,
    /// Seconds allowed for each diagnostic command (ip, iptables-save, ...).
    #[arg(long, value_name = "SECS")]
    pub command_timeout: Option<u64>,
}

impl From<&DiagsArgs> for crate::config::Overrides {
    fn from(args: &DiagsArgs) -> Self {
        Self {
            upload_url: args.upload_url.clone(),
            log_dir: args.log_dir.clone(),
            timeout_secs: args.timeout,
            retries: args.retries,
            max_days: args.max_days,
            command_timeout_secs: args.command_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diags_needs_no_arguments() {
        let cli = Cli::try_parse_from(["calicoctl", "diags"]).unwrap();
        assert_eq!(cli.format, OutputFormat::Text);
        assert!(matches!(cli.command, Commands::Diags(_)));
    }

    #[test]
    fn diags_flags_become_overrides() {
        let cli = Cli::try_parse_from([
            "calicoctl",
            "--format=json",
            "diags",
            "--upload-url",
            "http://127.0.0.1:8080",
            "--retries",
            "0",
            "--log-dir",
            "/tmp/calico",
        ])
        .unwrap();
        let Commands::Diags(args) = &cli.command;
        let overrides = crate::config::Overrides::from(args);
        assert_eq!(cli.format, OutputFormat::Json);
        assert_eq!(overrides.upload_url.as_deref(), Some("http://127.0.0.1:8080"));
        assert_eq!(overrides.retries, Some(0));
        assert_eq!(overrides.log_dir, Some(PathBuf::from("/tmp/calico")));
    }
}
