//! Tracing subscriber setup for processes embedding the store.

use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// Install a global `tracing` subscriber configured from `cfg`.
///
/// `RUST_LOG` wins over `cfg.log_level`; an unparsable filter falls back to
/// `info`. Fails if a global subscriber is already installed.
pub fn init(cfg: &Config) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter(&cfg.log_level))
        .with_target(true)
        .with_thread_ids(true);

    if cfg.log_json {
        subscriber.json().try_init()
    } else {
        subscriber.try_init()
    }
}

fn env_filter(level: &str) -> EnvFilter {
    match EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => match level.parse::<EnvFilter>() {
            Ok(f) => f,
            Err(e) => {
                eprintln!(
                    "WARN: NERFLINE_LOG='{level}' is not a valid tracing filter ({e}); \
                     falling back to 'info'"
                );
                EnvFilter::new("info")
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_filter_falls_back_to_info() {
        // RUST_LOG is not set by the test harness.
        if std::env::var("RUST_LOG").is_err() {
            let filter = env_filter("nerfline=loud");
            assert_eq!(filter.to_string(), "info");
        }
    }
}
