use anyhow::{Context, Result};
use clap::Parser;
use serde_valid::Validate;
use std::{net::Ipv4Addr, path::PathBuf, time::Duration};

const HOSTNAME_FILE: &str = "/proc/sys/kernel/hostname";

/// Command line of the captive portal
#[derive(Parser, Debug, Clone)]
#[command(
    name = "cportal",
    version,
    about = "Captive portal to obtain WiFi credentials and localization from a phone browser"
)]
pub struct Cli {
    /// SSID suffix for the access point, the full SSID is <hostname>-<apssid>
    #[arg(long, default_value = "sdm")]
    pub apssid: String,

    /// IP address of the access point
    #[arg(long, default_value = "10.1.1.1")]
    pub apip: Ipv4Addr,

    /// Port the portal web server listens on
    #[arg(long, default_value_t = 80)]
    pub port: u16,

    /// WiFi country used when the form leaves it blank
    #[arg(long, default_value = "US")]
    pub country: String,

    /// File whose first line provides default settings as a URL query
    #[arg(long)]
    pub defaults: Option<PathBuf>,

    /// Reset networking configuration to the non-portal state and exit
    #[arg(long)]
    pub reset: bool,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Facility name used for interface, connection and file names
    #[arg(long, default_value = "sdm")]
    pub facility: String,

    /// Script called with keymap, locale and timezone once WiFi is configured
    #[arg(long)]
    pub l10nhandler: Option<PathBuf>,

    /// Stop the portal after this many failed result checks
    #[arg(long, default_value_t = 5)]
    pub retries: u32,

    /// Write localization settings to the sdm first boot file
    #[arg(long)]
    pub sdm: bool,

    /// Idle timeout in seconds
    #[arg(long, default_value_t = 900)]
    pub timeout: u64,

    /// Directory with HTML pages replacing the built-in ones
    #[arg(long = "web-msgs")]
    pub web_msgs: Option<PathBuf>,

    /// WiFi device
    #[arg(long, default_value = "wlan0")]
    pub wlan: String,

    /// Brightness file of the status LED
    #[arg(long, default_value = "/sys/class/leds/ACT/brightness")]
    pub led: PathBuf,

    /// Host name shown on the portal pages and used in the AP SSID
    #[arg(long, env = "CPORTAL_HOSTNAME", hide = true)]
    pub hostname: Option<String>,

    /// Root of the system configuration tree
    #[arg(long, env = "CPORTAL_ETC_DIR", default_value = "/etc", hide = true)]
    pub etc_dir: PathBuf,

    /// Root of the shared data tree holding the localization catalogs
    #[arg(long, env = "CPORTAL_SHARE_DIR", default_value = "/usr/share", hide = true)]
    pub share_dir: PathBuf,
}

/// Application configuration derived from the command line
#[derive(Clone, Debug, Validate)]
pub struct AppConfig {
    /// Workflow settings of the portal
    #[validate]
    pub portal: PortalConfig,

    /// Access point and station networking
    #[validate]
    pub network: NetworkConfig,

    /// Localization catalogs and how settings are applied
    pub localization: LocalizationConfig,

    /// Optional defaults file
    pub defaults_file: Option<PathBuf>,

    /// Optional directory with page overrides
    pub pages_dir: Option<PathBuf>,

    /// Brightness file of the status LED
    pub led_path: PathBuf,

    pub reset: bool,
    pub debug: bool,
}

#[derive(Clone, Debug, Validate)]
pub struct PortalConfig {
    #[validate(min_length = 1)]
    pub hostname: String,
    pub apip: Ipv4Addr,
    pub port: u16,
    #[validate(minimum = 1)]
    pub retries: u32,
    #[validate(minimum = 1)]
    pub idle_timeout_secs: u64,
    #[validate(min_length = 2)]
    #[validate(max_length = 2)]
    pub default_country: String,
}

#[derive(Clone, Debug, Validate)]
pub struct NetworkConfig {
    /// WiFi device used as station
    #[validate(min_length = 1)]
    pub wlan: String,
    #[validate(min_length = 1)]
    pub facility: String,
    /// Full SSID of the access point
    #[validate(min_length = 1)]
    pub ap_ssid: String,
    pub apip: Ipv4Addr,
    pub paths: NetworkPaths,
}

#[derive(Clone, Debug)]
pub struct NetworkPaths {
    pub nm_connections_dir: PathBuf,
    pub nm_conf_dir: PathBuf,
    pub nm_dnsmasq_dir: PathBuf,
    pub supplicant_dir: PathBuf,
}

#[derive(Clone, Debug)]
pub struct LocalizationConfig {
    pub catalog: CatalogPaths,
    pub target: LocalizationTarget,
}

#[derive(Clone, Debug)]
pub struct CatalogPaths {
    pub keymaps: PathBuf,
    pub locales: PathBuf,
    pub countries: PathBuf,
    pub zoneinfo_dir: PathBuf,
}

/// Where validated localization settings end up
#[derive(Clone, Debug, PartialEq)]
pub enum LocalizationTarget {
    /// Write `key=value` lines to a first boot configuration file
    FirstBootFile(PathBuf),
    /// Call a handler script with keymap, locale and timezone
    Handler(PathBuf),
    /// Keep the settings in the session only
    Discard,
}

impl NetworkConfig {
    /// Name of the virtual access point interface
    pub fn ap_interface(&self) -> String {
        format!("{}0", self.facility)
    }

    /// NetworkManager connection id of the access point
    pub fn ap_connection_id(&self) -> String {
        format!("{}ap", self.facility)
    }
}

impl NetworkPaths {
    pub fn under(etc_dir: &std::path::Path) -> Self {
        let nm_dir = etc_dir.join("NetworkManager");
        Self {
            nm_connections_dir: nm_dir.join("system-connections"),
            nm_conf_dir: nm_dir.join("conf.d"),
            nm_dnsmasq_dir: nm_dir.join("dnsmasq.d"),
            supplicant_dir: etc_dir.join("wpa_supplicant"),
        }
    }
}

impl CatalogPaths {
    pub fn under(share_dir: &std::path::Path) -> Self {
        Self {
            keymaps: share_dir.join("doc/keyboard-configuration/xorg.lst"),
            locales: share_dir.join("i18n/SUPPORTED"),
            countries: share_dir.join("zoneinfo/iso3166.tab"),
            zoneinfo_dir: share_dir.join("zoneinfo"),
        }
    }
}

impl PortalConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl AppConfig {
    /// Build and validate the configuration from parsed command line arguments
    pub fn from_cli(cli: Cli) -> Result<Self> {
        let hostname = match cli.hostname {
            Some(hostname) => hostname,
            None => read_hostname()?,
        };

        let target = if cli.sdm {
            LocalizationTarget::FirstBootFile(cli.etc_dir.join("sdm/local-1piboot.conf"))
        } else if let Some(handler) = cli.l10nhandler {
            LocalizationTarget::Handler(handler)
        } else {
            LocalizationTarget::Discard
        };

        let config = Self {
            portal: PortalConfig {
                hostname: hostname.clone(),
                apip: cli.apip,
                port: cli.port,
                retries: cli.retries,
                idle_timeout_secs: cli.timeout,
                default_country: cli.country.to_uppercase(),
            },
            network: NetworkConfig {
                wlan: cli.wlan,
                ap_ssid: format!("{hostname}-{}", cli.apssid),
                facility: cli.facility,
                apip: cli.apip,
                paths: NetworkPaths::under(&cli.etc_dir),
            },
            localization: LocalizationConfig {
                catalog: CatalogPaths::under(&cli.share_dir),
                target,
            },
            defaults_file: cli.defaults,
            pages_dir: cli.web_msgs,
            led_path: cli.led,
            reset: cli.reset,
            debug: cli.debug,
        };

        config.validate().context("invalid configuration")?;

        Ok(config)
    }
}

fn read_hostname() -> Result<String> {
    let hostname = std::fs::read_to_string(HOSTNAME_FILE)
        .context(format!("failed to read {HOSTNAME_FILE}"))?;

    Ok(hostname.trim().to_string())
}
