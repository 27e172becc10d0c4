use crate::utils::logger::LogFormat;
use clap::Parser;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[command(name = "course-enroll")]
#[command(about = "Run enrollment requests against a course catalog")]
pub struct CliConfig {
    /// Path to the TOML catalog
    #[arg(short, long, default_value = "catalog.toml")]
    pub config: String,

    /// Override engine.batch_concurrency from the catalog
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    /// Validate the catalog and list requests without enrolling anyone
    #[arg(long)]
    pub dry_run: bool,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,
}

impl CliConfig {
    pub fn log_format(&self) -> LogFormat {
        LogFormat::from_flag(self.json_logs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_parse() {
        let args = CliConfig::parse_from([
            "course-enroll",
            "--config",
            "demos/catalog.toml",
            "--concurrency",
            "3",
            "--json-logs",
            "-v",
        ]);
        assert_eq!(args.config, "demos/catalog.toml");
        assert_eq!(args.concurrency, Some(3));
        assert_eq!(args.log_format(), LogFormat::Json);
        assert!(args.verbose);
    }

    #[test]
    fn test_defaults() {
        let args = CliConfig::parse_from(["course-enroll"]);
        assert_eq!(args.config, "catalog.toml");
        assert_eq!(args.log_format(), LogFormat::Compact);
        assert!(!args.dry_run);
    }
}
