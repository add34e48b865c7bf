use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "telemetry-receivers")]
#[command(version)]
#[command(about = "Poll GitHub rate limits and turn webhook bodies into log records")]
pub struct Args {
    /// Path to the TOML config file
    #[arg(long, short)]
    pub config: std::path::PathBuf,

    /// Tracing filter (e.g. "debug", "telemetry_receivers=trace"); overrides the config file
    #[arg(long)]
    pub log_level: Option<String>,

    /// Validate the config and exit without starting any receiver
    #[arg(long)]
    pub check: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse_minimal() {
        let args = Args::parse_from(["tr", "--config", "receivers.toml"]);
        assert_eq!(args.config, std::path::PathBuf::from("receivers.toml"));
        assert!(args.log_level.is_none());
        assert!(!args.check);
    }

    #[test]
    fn test_args_parse_full() {
        let args = Args::parse_from(["tr", "-c", "a.toml", "--log-level", "debug", "--check"]);
        assert_eq!(args.config, std::path::PathBuf::from("a.toml"));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert!(args.check);
    }

    #[test]
    fn test_args_config_is_required() {
        assert!(Args::try_parse_from(["tr"]).is_err());
    }
}
