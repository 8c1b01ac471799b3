//! Logging setup and small display helpers

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global tracing subscriber
///
/// `level` is an env-filter directive (`info`, `minichain=debug`, ...);
/// `format` selects plain or JSON output.
pub fn init_logging(level: &str, format: &str) {
    let env_filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_target(false))
                .init();
        }
    }
}

/// Format a hash rate with a unit suffix
pub fn format_hashrate(rate: f64) -> String {
    if rate >= 1_000_000_000.0 {
        format!("{:.2} GH/s", rate / 1_000_000_000.0)
    } else if rate >= 1_000_000.0 {
        format!("{:.2} MH/s", rate / 1_000_000.0)
    } else if rate >= 1_000.0 {
        format!("{:.2} KH/s", rate / 1_000.0)
    } else {
        format!("{:.2} H/s", rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_hashrate() {
        assert_eq!(format_hashrate(12.5), "12.50 H/s");
        assert_eq!(format_hashrate(1_500.0), "1.50 KH/s");
        assert_eq!(format_hashrate(2_000_000.0), "2.00 MH/s");
        assert_eq!(format_hashrate(3_000_000_000.0), "3.00 GH/s");
    }
}
