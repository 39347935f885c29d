//! Logging setup
//!
//! One `EnvFilter` over a rolling file layer (text or JSON) plus a
//! colored stdout layer in text mode. `RUST_LOG` overrides the config.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::AppConfig;

/// Filter directives for `config`.
///
/// sqlx logs every statement at info, so it stays at warn unless a
/// `log_targets` entry says otherwise. Other entries scope a level to
/// one module of this crate, e.g. `ledger: debug` becomes
/// `stelo_ledger::ledger=debug`.
pub fn filter_directives(config: &AppConfig) -> String {
    let mut directives = vec![config.log_level.clone()];
    if !config.log_targets.contains_key("sqlx") {
        directives.push("sqlx=warn".to_string());
    }
    for (module, level) in &config.log_targets {
        let target = match module.as_str() {
            "sqlx" => "sqlx".to_string(),
            module => format!("{}::{}", env!("CARGO_CRATE_NAME"), module),
        };
        directives.push(format!("{}={}", target, level));
    }
    directives.join(",")
}

/// Install the global subscriber. Keep the returned guard alive for the
/// lifetime of the process or buffered file output is lost.
pub fn init_logging(config: &AppConfig) -> WorkerGuard {
    let file_appender = match config.rotation.as_str() {
        "hourly" => tracing_appender::rolling::hourly(&config.log_dir, &config.log_file),
        "daily" => tracing_appender::rolling::daily(&config.log_dir, &config.log_file),
        _ => tracing_appender::rolling::never(&config.log_dir, &config.log_file),
    };
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(config)));
    let registry = tracing_subscriber::registry().with(filter);

    if config.use_json {
        // Targets stay in JSON so per-module queries work
        let file_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_writer(non_blocking)
            .with_ansi(false);
        registry.with(file_layer).init();
    } else {
        let file_layer = fmt::layer()
            .with_target(false)
            .with_writer(non_blocking)
            .with_ansi(false);
        let stdout_layer = fmt::layer().with_target(false).with_ansi(true);
        registry.with(file_layer).with(stdout_layer).init();
    }

    guard
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(targets: &[(&str, &str)]) -> AppConfig {
        let mut config = AppConfig::from_yaml(
            "log_level: info\nlog_dir: ./logs\nlog_file: ledger.log\nuse_json: false\nrotation: never\n",
        )
        .unwrap();
        config.log_targets = targets
            .iter()
            .map(|(m, l)| (m.to_string(), l.to_string()))
            .collect();
        config
    }

    #[test]
    fn test_default_directives_quiet_sqlx() {
        assert_eq!(filter_directives(&config(&[])), "info,sqlx=warn");
    }

    #[test]
    fn test_module_targets() {
        let directives = filter_directives(&config(&[("ledger", "debug"), ("pricing", "trace")]));
        assert_eq!(
            directives,
            "info,sqlx=warn,stelo_ledger::ledger=debug,stelo_ledger::pricing=trace"
        );
        assert!(EnvFilter::try_new(&directives).is_ok());
    }

    #[test]
    fn test_sqlx_override() {
        assert_eq!(filter_directives(&config(&[("sqlx", "info")])), "info,sqlx=info");
    }
}
