//! Command line and environment configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use music_index::BuildOptions;
use subscriptions::RegistryConfig;
use tracing::info;
use zone_discovery::DiscoveryConfig;

use crate::logging::LoggingMode;

pub const DEFAULT_INDEX_FILE: &str = ".musicbox-index.json";

/// Music library browser with live Sonos room events
///
/// Scans a music library into a searchable index, serves it over HTTP, and
/// streams transport and volume changes from the zone players on the LAN.
#[derive(Parser, Debug)]
#[command(name = "musicbox")]
#[command(about = "Music library browser with live Sonos room events")]
#[command(version)]
pub struct Args {
    /// Music library root directory
    #[arg(short, long, env = "MUSICBOX_LIBRARY")]
    pub library: PathBuf,

    /// Persisted index file [default: <library>/.musicbox-index.json]
    #[arg(long, env = "MUSICBOX_INDEX_FILE")]
    pub index_file: Option<PathBuf>,

    /// HTTP API port
    #[arg(short, long, env = "MUSICBOX_PORT", default_value = "3000")]
    pub port: u16,

    /// Port for inbound event notifications
    #[arg(long, env = "MUSICBOX_CALLBACK_PORT", default_value = "3001")]
    pub callback_port: u16,

    /// Address advertised to zone players in callback URLs [default: detected LAN address]
    #[arg(long, env = "MUSICBOX_CALLBACK_HOST")]
    pub callback_host: Option<IpAddr>,

    /// Requested subscription lease in seconds
    #[arg(long, default_value = "20")]
    pub lease_seconds: u64,

    /// Renew this many seconds before a lease expires
    #[arg(long, default_value = "4")]
    pub renewal_margin_seconds: u64,

    /// Rescan the library every N seconds (0 scans once at startup)
    #[arg(long, env = "MUSICBOX_RESCAN_INTERVAL", default_value = "0")]
    pub rescan_interval_seconds: u64,

    /// Do not look for zone players
    #[arg(long)]
    pub no_discovery: bool,

    /// Do not fetch missing album art from MusicBrainz
    #[arg(long)]
    pub no_art_lookup: bool,

    /// Log output format
    #[arg(long, value_enum, env = "MUSICBOX_LOG_FORMAT", default_value = "production")]
    pub log_format: LoggingMode,
}

impl Args {
    /// Validate command line arguments
    pub fn validate(&self) -> Result<()> {
        if !self.library.is_dir() {
            return Err(anyhow::anyhow!(
                "Library '{}' is not a directory",
                self.library.display()
            ));
        }

        if self.port == 0 || self.callback_port == 0 {
            return Err(anyhow::anyhow!("Ports must not be 0"));
        }

        if self.port == self.callback_port {
            return Err(anyhow::anyhow!(
                "API port and callback port must differ (both are {})",
                self.port
            ));
        }

        if self.lease_seconds == 0 {
            return Err(anyhow::anyhow!("Lease must be positive"));
        }

        if self.renewal_margin_seconds >= self.lease_seconds {
            return Err(anyhow::anyhow!(
                "Renewal margin ({}s) must be shorter than the lease ({}s)",
                self.renewal_margin_seconds,
                self.lease_seconds
            ));
        }

        Ok(())
    }
}

/// Configuration derived from command line arguments and environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub library: PathBuf,
    pub index_file: PathBuf,
    pub api_addr: SocketAddr,
    pub callback_port: u16,
    pub callback_host: Option<IpAddr>,
    pub lease_duration: Duration,
    pub renewal_margin: Duration,
    /// `None` scans once at startup.
    pub rescan_interval: Option<Duration>,
    pub discovery: bool,
    pub art_lookup: bool,
    pub log_mode: LoggingMode,
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        let index_file = args
            .index_file
            .unwrap_or_else(|| args.library.join(DEFAULT_INDEX_FILE));

        Self {
            library: args.library,
            index_file,
            api_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), args.port),
            callback_port: args.callback_port,
            callback_host: args.callback_host,
            lease_duration: Duration::from_secs(args.lease_seconds),
            renewal_margin: Duration::from_secs(args.renewal_margin_seconds),
            rescan_interval: (args.rescan_interval_seconds > 0)
                .then(|| Duration::from_secs(args.rescan_interval_seconds)),
            discovery: !args.no_discovery,
            art_lookup: !args.no_art_lookup,
            log_mode: args.log_format,
        }
    }
}

impl Config {
    /// Parse the process arguments (with their environment fallbacks) and
    /// validate them.
    pub fn from_env() -> Result<Self> {
        Self::try_from_args(Args::parse())
    }

    pub fn try_from_args(args: Args) -> Result<Self> {
        args.validate()?;
        Ok(Config::from(args))
    }

    /// Settings for the subscription registry once the callback URL is known.
    pub fn registry_config(&self, callback_url: impl Into<String>) -> RegistryConfig {
        RegistryConfig {
            lease_duration: self.lease_duration,
            renewal_margin: self.renewal_margin,
            ..RegistryConfig::new(callback_url)
        }
    }

    pub fn build_options(&self) -> BuildOptions {
        BuildOptions::default()
    }

    pub fn discovery_config(&self) -> DiscoveryConfig {
        DiscoveryConfig::default()
    }

    /// Log configuration summary
    pub fn log_summary(&self) {
        info!("Configuration:");
        info!("  Library: {}", self.library.display());
        info!("  Index file: {}", self.index_file.display());
        info!("  API address: {}", self.api_addr);
        info!("  Callback port: {}", self.callback_port);
        match self.callback_host {
            Some(host) => info!("  Callback host: {}", host),
            None => info!("  Callback host: auto"),
        }
        info!(
            "  Lease: {}s, renew {}s early",
            self.lease_duration.as_secs(),
            self.renewal_margin.as_secs()
        );
        match self.rescan_interval {
            Some(interval) => info!("  Rescan every {}s", interval.as_secs()),
            None => info!("  Rescan: startup only"),
        }
        info!("  Discovery: {}", self.discovery);
        info!("  Art lookup: {}", self.art_lookup);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Args {
        let dir = std::env::temp_dir();
        let mut argv = vec!["musicbox".to_string(), "--library".to_string(), dir.display().to_string()];
        argv.extend(extra.iter().map(|s| s.to_string()));
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn defaults() {
        let config = Config::try_from_args(parse(&[])).unwrap();
        assert_eq!(config.api_addr.port(), 3000);
        assert_eq!(config.callback_port, 3001);
        assert_eq!(config.lease_duration, Duration::from_secs(20));
        assert_eq!(config.renewal_margin, Duration::from_secs(4));
        assert_eq!(config.rescan_interval, None);
        assert!(config.discovery);
        assert!(config.art_lookup);
        assert_eq!(config.index_file, config.library.join(DEFAULT_INDEX_FILE));
    }

    #[test]
    fn flags_override_defaults() {
        let config = Config::try_from_args(parse(&[
            "--port",
            "8080",
            "--callback-port",
            "8081",
            "--callback-host",
            "192.168.1.5",
            "--rescan-interval-seconds",
            "600",
            "--no-discovery",
            "--no-art-lookup",
            "--log-format",
            "json",
            "--index-file",
            "/var/lib/musicbox/index.json",
        ]))
        .unwrap();
        assert_eq!(config.api_addr.port(), 8080);
        assert_eq!(config.callback_port, 8081);
        assert_eq!(config.callback_host, Some("192.168.1.5".parse().unwrap()));
        assert_eq!(config.rescan_interval, Some(Duration::from_secs(600)));
        assert!(!config.discovery);
        assert!(!config.art_lookup);
        assert_eq!(config.log_mode, LoggingMode::Json);
        assert_eq!(config.index_file, PathBuf::from("/var/lib/musicbox/index.json"));
    }

    #[test]
    fn registry_config_carries_lease_settings() {
        let config = Config::try_from_args(parse(&["--lease-seconds", "60", "--renewal-margin-seconds", "10"])).unwrap();
        let registry = config.registry_config("http://10.0.0.2:3001/notify");
        assert_eq!(registry.callback_url, "http://10.0.0.2:3001/notify");
        assert_eq!(registry.lease_duration, Duration::from_secs(60));
        assert_eq!(registry.renewal_margin, Duration::from_secs(10));
        assert!(registry.retain_previous_sid);
    }

    #[test]
    fn invalid_combinations_are_rejected() {
        assert!(parse(&["--port", "3001"]).validate().is_err());
        assert!(parse(&["--lease-seconds", "0"]).validate().is_err());
        assert!(parse(&["--lease-seconds", "4"]).validate().is_err());
        assert!(parse(&["--port", "0"]).validate().is_err());
    }

    #[test]
    fn missing_library_is_rejected() {
        let args = Args::try_parse_from(["musicbox", "--library", "/definitely/not/here"]).unwrap();
        assert!(args.validate().is_err());
    }
}
