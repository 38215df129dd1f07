//! Command-line interface

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::defaults;

/// Regions updater - keeps a ranked list of low-latency VPN regions up to date
#[derive(Parser, Debug, Clone)]
#[command(name = "regions-updater")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Maximum latency tolerated for a server (e.g. 50ms, 1s)
    #[arg(long, value_parser = parse_duration, default_value = "50ms")]
    pub max_latency: Duration,

    /// Number of concurrent probing workers (0 uses the default)
    #[arg(long, default_value_t = defaults::DEFAULT_WORKERS)]
    pub workers: usize,

    /// Maximum number of regions kept after sorting (0 keeps all)
    #[arg(long, default_value_t = defaults::DEFAULT_MAX_REGIONS)]
    pub max_regions: usize,

    /// URL of the regions list
    #[arg(long, default_value = defaults::DEFAULT_SERVERS_LIST_URL)]
    pub servers_list_url: String,

    /// Sort regions by `name` or `latency`
    #[arg(long, default_value = defaults::DEFAULT_ORDER_BY)]
    pub order_by: String,

    /// Sort direction, `asc` or `desc`
    #[arg(long, default_value = defaults::DEFAULT_ORDER_DIRECTION)]
    pub order_direction: String,

    /// Log verbosity: 0 debug, 1 info, 2 error, 3 fatal
    #[arg(long, default_value_t = defaults::DEFAULT_VERBOSITY)]
    pub verbosity: u8,

    /// How often the regions list is refreshed (e.g. 1h, 30m, 1h30m)
    #[arg(long, value_parser = parse_duration, default_value = "1h")]
    pub frequency: Duration,

    /// How often the latest regions are written to the store
    #[arg(long, value_parser = parse_duration, default_value = "5m")]
    pub persist_frequency: Duration,

    /// TCP port probed on every server
    #[arg(long, default_value_t = defaults::DEFAULT_PROBE_PORT)]
    pub probe_port: u16,

    /// Root directory of the object store
    #[arg(long, default_value = defaults::DEFAULT_STORE_DIR)]
    pub store_dir: PathBuf,

    /// Name of the object holding the regions
    #[arg(long, default_value = defaults::DEFAULT_OBJECT_NAME)]
    pub object_name: String,

    /// Stop after this many consecutive fetch or write failures (0 never stops)
    #[arg(long, default_value_t = 0)]
    pub max_consecutive_failures: u32,

    /// Log output format: console, json or compact
    #[arg(long, default_value = "console")]
    pub log_format: String,

    /// Namespace of the regions object
    #[arg(long, env = defaults::NAMESPACE_ENV)]
    pub namespace: Option<String>,
}

/// Parse a duration such as `300ms`, `1.5s` or `1h30m`
///
/// Accepted units are `ns`, `us` (or `µs`), `ms`, `s`, `m` and `h`. A bare
/// `0` is accepted; any other number needs a unit. Negative values are
/// rejected.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    let invalid = || format!("invalid duration '{}'", input);

    if s.is_empty() {
        return Err(invalid());
    }
    if s.starts_with('-') {
        return Err(format!("invalid duration '{}': must not be negative", input));
    }

    let s = s.strip_prefix('+').unwrap_or(s);
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let mut rest = s;
    let mut total: u128 = 0;

    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(number_len);
        if number.is_empty() || number == "." {
            return Err(invalid());
        }

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);

        let unit_nanos: u128 = match unit {
            "ns" => 1,
            "us" | "µs" | "μs" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60 * 1_000_000_000,
            "h" => 3_600 * 1_000_000_000,
            "" => return Err(format!("invalid duration '{}': missing unit", input)),
            other => return Err(format!("invalid duration '{}': unknown unit '{}'", input, other)),
        };

        let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid())?
        };

        let mut nanos = whole.checked_mul(unit_nanos).ok_or_else(invalid)?;

        if !fraction.is_empty() {
            // past 18 digits the fraction is below a nanosecond anyway
            let digits = &fraction[..fraction.len().min(18)];
            if !digits.chars().all(|c| c.is_ascii_digit()) || fraction.contains('.') {
                return Err(invalid());
            }
            let value: u128 = digits.parse().map_err(|_| invalid())?;
            nanos += value * unit_nanos / 10u128.pow(digits.len() as u32);
        }

        total = total.checked_add(nanos).ok_or_else(invalid)?;
        rest = tail;
    }

    u64::try_from(total)
        .map(Duration::from_nanos)
        .map_err(|_| format!("invalid duration '{}': too large", input))
}

/// Render a duration the way `parse_duration` reads it back
pub fn format_duration(duration: Duration) -> String {
    if duration.is_zero() {
        return "0s".to_string();
    }

    let nanos = duration.as_nanos();
    if nanos < 1_000 {
        return format!("{}ns", nanos);
    }
    if nanos < 1_000_000 {
        return format!("{}us", duration.as_micros());
    }
    if duration < Duration::from_secs(1) {
        return format!("{}ms", duration.as_millis());
    }

    let total = duration.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    let millis = duration.subsec_millis();

    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{}h", hours));
    }
    if minutes > 0 {
        out.push_str(&format!("{}m", minutes));
    }
    if seconds > 0 || millis > 0 {
        if millis > 0 {
            out.push_str(&format!("{}.{:03}s", seconds, millis));
        } else {
            out.push_str(&format!("{}s", seconds));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Config;

    #[test]
    fn test_cli_defaults_match_config_defaults() {
        let cli = Cli::parse_from(["regions-updater"]);
        let config = Config::default();

        assert_eq!(cli.max_latency, config.max_latency);
        assert_eq!(cli.workers, config.workers);
        assert_eq!(cli.max_regions, config.max_regions);
        assert_eq!(cli.servers_list_url, config.servers_list_url);
        assert_eq!(cli.order_by, config.order_by);
        assert_eq!(cli.order_direction, config.order_direction);
        assert_eq!(cli.verbosity, config.verbosity);
        assert_eq!(cli.frequency, config.frequency);
        assert_eq!(cli.persist_frequency, config.persist_frequency);
        assert_eq!(cli.probe_port, config.probe_port);
        assert_eq!(cli.store_dir, config.store_dir);
        assert_eq!(cli.object_name, config.object_name);
        assert_eq!(cli.max_consecutive_failures, config.max_consecutive_failures);
    }

    #[test]
    fn test_cli_parsing_all_options() {
        let cli = Cli::parse_from([
            "regions-updater",
            "--max-latency", "100ms",
            "--workers", "10",
            "--max-regions", "0",
            "--servers-list-url", "https://example.com/servers",
            "--order-by", "latency",
            "--order-direction", "desc",
            "--verbosity", "0",
            "--frequency", "1h30m",
            "--persist-frequency", "30s",
            "--probe-port", "1337",
            "--store-dir", "/tmp/store",
            "--object-name", "regions",
            "--max-consecutive-failures", "4",
            "--log-format", "json",
            "--namespace", "vpn",
        ]);

        assert_eq!(cli.max_latency, Duration::from_millis(100));
        assert_eq!(cli.workers, 10);
        assert_eq!(cli.max_regions, 0);
        assert_eq!(cli.servers_list_url, "https://example.com/servers");
        assert_eq!(cli.order_by, "latency");
        assert_eq!(cli.order_direction, "desc");
        assert_eq!(cli.verbosity, 0);
        assert_eq!(cli.frequency, Duration::from_secs(5400));
        assert_eq!(cli.persist_frequency, Duration::from_secs(30));
        assert_eq!(cli.probe_port, 1337);
        assert_eq!(cli.store_dir, PathBuf::from("/tmp/store"));
        assert_eq!(cli.object_name, "regions");
        assert_eq!(cli.max_consecutive_failures, 4);
        assert_eq!(cli.log_format, "json");
        assert_eq!(cli.namespace.as_deref(), Some("vpn"));
    }

    #[test]
    fn test_malformed_duration_flag_is_rejected() {
        assert!(Cli::try_parse_from(["regions-updater", "--max-latency", "fast"]).is_err());
        assert!(Cli::try_parse_from(["regions-updater", "--frequency", "10"]).is_err());
    }

    #[test]
    fn test_duration_parsing() {
        assert_eq!(parse_duration("50ms").unwrap(), Duration::from_millis(50));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("2m3.5s").unwrap(), Duration::from_millis(123_500));
        assert_eq!(parse_duration("1.5h").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("250us").unwrap(), Duration::from_micros(250));
        assert_eq!(parse_duration("250µs").unwrap(), Duration::from_micros(250));
        assert_eq!(parse_duration("42ns").unwrap(), Duration::from_nanos(42));
        assert_eq!(parse_duration(".5s").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("+1s").unwrap(), Duration::from_secs(1));
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
        assert_eq!(parse_duration("0s").unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_duration_parsing_errors() {
        for bad in ["", "10", "abc", "-5s", "5x", "1.2.3s", ".s", "ms", "1h-5m", "99999999999999h"] {
            assert!(parse_duration(bad).is_err(), "{bad:?} accepted");
        }
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::ZERO), "0s");
        assert_eq!(format_duration(Duration::from_nanos(42)), "42ns");
        assert_eq!(format_duration(Duration::from_micros(250)), "250us");
        assert_eq!(format_duration(Duration::from_millis(50)), "50ms");
        assert_eq!(format_duration(Duration::from_secs(3600)), "1h");
        assert_eq!(format_duration(Duration::from_secs(5400)), "1h30m");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.500s");

        for text in ["50ms", "1h30m", "5m", "2h0m5s"] {
            let parsed = parse_duration(text).unwrap();
            assert_eq!(parse_duration(&format_duration(parsed)).unwrap(), parsed);
        }
    }
}
