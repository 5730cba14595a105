#![cfg_attr(feature = "mock", allow(dead_code, unused_imports))]

use crate::{
    command,
    config::NetworkConfig,
    services::{network_files, settings::Credentials},
};
use anyhow::Result;
#[cfg(feature = "mock")]
use mockall::automock;
use log::{info, warn};
use std::{net::Ipv4Addr, time::Duration};
use trait_variant::make;

const AP_ONLINE_ATTEMPTS: u32 = 30;
const PING_TIMEOUT_SECS: &str = "2";
const DHCP_CLIENTS: [&str; 2] = ["NetworkManager", "dhcpcd"];

/// OS networking operations the portal depends on
#[make(Send)]
#[cfg_attr(feature = "mock", automock)]
pub trait NetworkBackend {
    /// Write the access point configuration and bring the access point up
    async fn apply_access_point_config(&self) -> Result<()>;
    /// Write the station configuration and activate it
    async fn apply_station_config(&self, credentials: Credentials) -> Result<()>;
    /// Write the station configuration without activating it
    async fn write_station_config(&self, credentials: Credentials) -> Result<()>;
    async fn set_power_management(&self, on: bool) -> Result<()>;
    async fn list_visible_ssids(&self) -> Result<Vec<String>>;
    /// IPv4 address currently assigned to the WiFi device
    async fn query_assigned_ip(&self) -> Result<Option<Ipv4Addr>>;
    /// Send `attempts` pings and report whether any was answered
    async fn probe_reachability(&self, address: Ipv4Addr, attempts: u32) -> Result<bool>;
    /// Remove the access point and return networking to its normal state
    async fn teardown(&self) -> Result<()>;
}

/// NetworkManager backend driving `nmcli`, `iw`, `ip` and `systemctl`
#[derive(Clone, Debug)]
pub struct SystemNetworkBackend {
    config: NetworkConfig,
}

impl SystemNetworkBackend {
    pub fn new(config: NetworkConfig) -> Self {
        Self { config }
    }

    async fn wait_for_access_point(&self) {
        let apip = self.config.apip.to_string();

        for attempt in 0..AP_ONLINE_ATTEMPTS {
            if command::succeeds("ping", &["-c", "1", "-W", PING_TIMEOUT_SECS, &apip]).await {
                info!("access point {apip} is online");
                return;
            }
            if attempt == 0 {
                info!("wait for access point {apip} to come online");
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        warn!("access point {apip} did not come online");
    }

    /// Service that was active or enabled as DHCP client before the portal ran
    async fn dhcp_client() -> Option<&'static str> {
        for client in DHCP_CLIENTS {
            if command::succeeds("systemctl", &["--quiet", "is-active", client]).await
                || command::succeeds("systemctl", &["--quiet", "is-enabled", client]).await
            {
                return Some(client);
            }
        }
        None
    }

    async fn power_management(&self) -> Option<bool> {
        parse_power_management(&command::stdout("iwconfig", &[&self.config.wlan]).await)
    }
}

impl NetworkBackend for SystemNetworkBackend {
    async fn apply_access_point_config(&self) -> Result<()> {
        let ap_interface = self.config.ap_interface();
        let ap_connection = self.config.ap_connection_id();

        network_files::write_access_point_files(&self.config)?;

        command::succeeds("iw", &["dev", &ap_interface, "del"]).await;
        command::report(
            "iw",
            &[
                "dev",
                &self.config.wlan,
                "interface",
                "add",
                &ap_interface,
                "type",
                "__ap",
            ],
        )
        .await;
        command::report("nmcli", &["c", "reload"]).await;
        command::report("nmcli", &["c", "up", &ap_connection]).await;

        self.wait_for_access_point().await;

        Ok(())
    }

    async fn apply_station_config(&self, credentials: Credentials) -> Result<()> {
        self.write_station_config(credentials.clone()).await?;

        command::report("nmcli", &["c", "reload"]).await;
        command::report(
            "nmcli",
            &[
                "c",
                "up",
                &network_files::station_connection_id(&credentials),
            ],
        )
        .await;

        Ok(())
    }

    async fn write_station_config(&self, credentials: Credentials) -> Result<()> {
        info!("write station configuration for ssid {}", credentials.ssid);
        network_files::write_station_files(&self.config, &credentials)
    }

    async fn set_power_management(&self, on: bool) -> Result<()> {
        let wanted = if on { "on" } else { "off" };

        if self.power_management().await == Some(on) {
            info!("{} power management already {wanted}", self.config.wlan);
            return Ok(());
        }

        command::report("iwconfig", &[&self.config.wlan, "power", wanted]).await;

        Ok(())
    }

    async fn list_visible_ssids(&self) -> Result<Vec<String>> {
        info!("collect visible ssid list");

        let output = command::run("iwlist", &[&self.config.wlan, "scan"]).await?;
        let ssids = parse_iwlist_scan(&String::from_utf8_lossy(&output.stdout));

        info!("found {} ssids", ssids.len());

        Ok(ssids)
    }

    async fn query_assigned_ip(&self) -> Result<Option<Ipv4Addr>> {
        let output = command::run(
            "ip",
            &["-br", "-o", "-f", "inet", "addr", "show", "dev", &self.config.wlan],
        )
        .await?;

        Ok(parse_ip_brief(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn probe_reachability(&self, address: Ipv4Addr, attempts: u32) -> Result<bool> {
        info!("check internet accessibility with ping {address}");

        let output = command::run(
            "ping",
            &[
                "-c",
                &attempts.to_string(),
                "-W",
                PING_TIMEOUT_SECS,
                &address.to_string(),
            ],
        )
        .await?;

        Ok(output.status.success())
    }

    async fn teardown(&self) -> Result<()> {
        let ap_interface = self.config.ap_interface();
        let supplicant_unit = format!("wpa_supplicant@{}", self.config.wlan);

        command::succeeds("nmcli", &["c", "down", &self.config.ap_connection_id()]).await;
        command::succeeds("iw", &["dev", &ap_interface, "del"]).await;
        command::report("systemctl", &["stop", &supplicant_unit]).await;

        network_files::remove_access_point_files(&self.config);
        command::report("nmcli", &["c", "reload"]).await;

        match Self::dhcp_client().await {
            Some(client) => {
                command::report("systemctl", &["start", client]).await;
            }
            None => info!("no running or enabled DHCP client found"),
        }

        Ok(())
    }
}

/// Unique non-empty SSIDs from `iwlist <dev> scan` output, in scan order
pub fn parse_iwlist_scan(output: &str) -> Vec<String> {
    let mut ssids: Vec<String> = Vec::new();

    for line in output.lines() {
        let Some((_, value)) = line.trim().split_once("ESSID:") else {
            continue;
        };
        let ssid = value.trim().trim_matches('"');
        if !ssid.is_empty() && !ssids.iter().any(|s| s == ssid) {
            ssids.push(ssid.to_string());
        }
    }

    ssids
}

/// First IPv4 address from `ip -br -o -f inet addr show` output
pub fn parse_ip_brief(output: &str) -> Option<Ipv4Addr> {
    output
        .split_whitespace()
        .nth(2)
        .and_then(|field| field.split('/').next())
        .and_then(|addr| addr.parse().ok())
}

fn parse_power_management(output: &str) -> Option<bool> {
    output
        .split_once("Power Management:")
        .and_then(|(_, rest)| rest.split_whitespace().next())
        .map(|state| state == "on")
}
