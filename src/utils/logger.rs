use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, util::TryInitError, EnvFilter, Layer,
};

/// Where log lines are headed: a terminal or a log collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl LogFormat {
    pub fn from_flag(json_logs: bool) -> Self {
        if json_logs {
            LogFormat::Json
        } else {
            LogFormat::Compact
        }
    }
}

/// Directives used when `RUST_LOG` is unset. Verbose turns on the engine's
/// per-step debug lines while keeping dependencies at info.
pub fn default_directives(verbose: bool) -> &'static str {
    if verbose {
        "course_enroll=debug,info"
    } else {
        "course_enroll=info"
    }
}

fn build_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(verbose)))
}

/// Installs the global subscriber, writing to stderr so the report on
/// stdout stays machine-readable.
///
/// Fails if a subscriber is already installed.
pub fn init_logger(format: LogFormat, verbose: bool) -> Result<(), TryInitError> {
    let layer = match format {
        LogFormat::Compact => fmt::layer()
            .with_target(false)
            .with_thread_ids(verbose)
            .with_file(false)
            .with_line_number(false)
            .with_writer(std::io::stderr)
            .compact()
            .boxed(),
        LogFormat::Json => fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .json()
            .with_current_span(false)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(build_filter(verbose))
        .with(layer)
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_flag() {
        assert_eq!(LogFormat::from_flag(true), LogFormat::Json);
        assert_eq!(LogFormat::from_flag(false), LogFormat::Compact);
        assert_eq!(LogFormat::default(), LogFormat::Compact);
    }

    #[test]
    fn test_default_directives_parse() {
        for verbose in [true, false] {
            assert!(EnvFilter::try_new(default_directives(verbose)).is_ok());
        }
        assert!(default_directives(true).contains("course_enroll=debug"));
    }

    #[test]
    fn test_second_init_is_rejected() {
        // 第一次可能因其他測試已安裝而失敗，第二次一定失敗
        init_logger(LogFormat::Compact, false).ok();
        assert!(init_logger(LogFormat::Json, false).is_err());
    }
}
