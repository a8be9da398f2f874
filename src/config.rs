//! Configuration management for the reader server

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value:?} ({reason})")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub library: LibraryConfig,
    pub reader: ReaderConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct LibraryConfig {
    /// Directory holding `{id}.fb2` / `{id}.fb2.zip` files
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Root of the per-book artifact cache
    pub cache_path: PathBuf,
    /// Evict books not accessed for this long; zero disables eviction
    pub cache_ttl: Duration,
    /// Period of the background eviction sweep
    pub sweep_interval: Duration,
    /// Upper bound on a single parse
    pub parse_timeout: Duration,
    /// Parsed books kept in memory; zero disables
    pub memory_books: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        ReaderConfig {
            cache_path: PathBuf::from("./cache/books"),
            cache_ttl: Duration::from_secs(30 * 24 * 3600),
            sweep_interval: Duration::from_secs(3600),
            parse_timeout: Duration::from_secs(30),
            memory_books: 8,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            library: LibraryConfig {
                path: PathBuf::from("./library"),
            },
            reader: ReaderConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Config::default();

        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or(defaults.server.host),
                port: parse_var("SERVER_PORT", defaults.server.port, |v| {
                    v.parse::<u16>().map_err(|e| e.to_string())
                })?,
            },
            library: LibraryConfig {
                path: env::var("LIBRARY_PATH")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.library.path),
            },
            reader: ReaderConfig {
                cache_path: env::var("READER_CACHE_PATH")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.reader.cache_path),
                cache_ttl: parse_var("READER_CACHE_TTL", defaults.reader.cache_ttl, parse_duration)?,
                sweep_interval: parse_var(
                    "READER_SWEEP_INTERVAL",
                    defaults.reader.sweep_interval,
                    parse_duration,
                )?,
                parse_timeout: parse_var(
                    "READER_PARSE_TIMEOUT",
                    defaults.reader.parse_timeout,
                    parse_nonzero_duration,
                )?,
                memory_books: parse_var("READER_MEMORY_BOOKS", defaults.reader.memory_books, |v| {
                    v.parse::<usize>().map_err(|e| e.to_string())
                })?,
            },
        })
    }
}

fn parse_var<T>(
    name: &'static str,
    default: T,
    parse: impl Fn(&str) -> Result<T, String>,
) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => {
            parse(value.trim()).map_err(|reason| ConfigError::InvalidValue {
                name,
                value,
                reason,
            })
        }
        _ => Ok(default),
    }
}

/// Parse a duration such as `90s`, `15m`, `1h30m`, `720h` or `30d`
///
/// A bare `0` means zero. Fractions (`1.5h`) and `ms` are accepted.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input == "0" {
        return Ok(Duration::ZERO);
    }
    if input.is_empty() {
        return Err("empty duration".to_string());
    }

    let mut total = 0f64;
    let mut rest = input;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| format!("missing unit in duration {:?}", input))?;
        if number_len == 0 {
            return Err(format!("invalid duration {:?}", input));
        }
        let value: f64 = rest[..number_len]
            .parse()
            .map_err(|_| format!("invalid number in duration {:?}", input))?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        total += match &rest[..unit_len] {
            "ms" => value / 1000.0,
            "s" => value,
            "m" => value * 60.0,
            "h" => value * 3600.0,
            "d" => value * 86400.0,
            unit => return Err(format!("unknown unit {:?} in duration {:?}", unit, input)),
        };
        rest = &rest[unit_len..];
    }

    Duration::try_from_secs_f64(total).map_err(|e| e.to_string())
}

/// Like [`parse_duration`], for settings where zero makes no sense
pub fn parse_nonzero_duration(input: &str) -> Result<Duration, String> {
    let duration = parse_duration(input)?;
    if duration.is_zero() {
        return Err("duration must be greater than zero".to_string());
    }
    Ok(duration)
}
