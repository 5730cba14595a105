//! Background test of the submitted WiFi configuration.

use crate::{
    network_backend::NetworkBackend,
    portal::session::ConnectivityResult,
    services::{localization::LocalizationService, settings::Credentials},
};
use log::{debug, error, info};
use std::{net::Ipv4Addr, sync::Arc, time::Duration};
use tokio::{sync::oneshot, time::sleep};

pub const PROBE_ADDRESS: Ipv4Addr = Ipv4Addr::new(1, 1, 1, 1);
pub const PROBE_ATTEMPTS: u32 = 5;
const IP_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Test the connection, apply localization and hand the result to the portal
pub async fn run<B>(
    backend: Arc<B>,
    localization: LocalizationService,
    credentials: Credentials,
    tx: oneshot::Sender<ConnectivityResult>,
) where
    B: NetworkBackend + Send + Sync + 'static,
{
    let result = test(backend.as_ref(), &credentials).await;

    if let Err(e) = localization.apply(&credentials.localization).await {
        error!("failed to apply localization settings: {e:#}");
    }

    if tx.send(result).is_err() {
        debug!("connectivity result no longer awaited");
    }
}

pub async fn test<B: NetworkBackend>(backend: &B, credentials: &Credentials) -> ConnectivityResult {
    if let Err(e) = backend.set_power_management(credentials.wifi_power).await {
        error!("failed to set power management: {e:#}");
    }

    if let Err(e) = backend.apply_station_config(credentials.clone()).await {
        error!("failed to apply station configuration: {e:#}");
        return ConnectivityResult::default();
    }

    let Some(ip) = wait_for_ip(backend, credentials.dhcp_wait_secs.max(1)).await else {
        info!("no IP address obtained via ssid {}", credentials.ssid);
        return ConnectivityResult::default();
    };

    info!("obtained IP address {ip} via ssid {}", credentials.ssid);

    let internet_reachable = if credentials.check_internet {
        let reachable = backend
            .probe_reachability(PROBE_ADDRESS, PROBE_ATTEMPTS)
            .await
            .unwrap_or_else(|e| {
                error!("internet probe failed: {e:#}");
                false
            });
        info!(
            "internet is {}accessible",
            if reachable { "" } else { "not " }
        );
        Some(reachable)
    } else {
        None
    };

    ConnectivityResult {
        obtained_ip: Some(ip),
        link_connected: true,
        internet_reachable,
    }
}

/// Poll once per second for a routable address
async fn wait_for_ip<B: NetworkBackend>(backend: &B, attempts: u64) -> Option<Ipv4Addr> {
    info!("wait up to {attempts} seconds for an IP address");

    for attempt in 1..=attempts {
        match backend.query_assigned_ip().await {
            Ok(Some(ip)) if !ip.is_link_local() => return Some(ip),
            Ok(Some(ip)) => debug!("ignore link-local address {ip}"),
            Ok(None) => {}
            Err(e) => error!("failed to query IP address: {e:#}"),
        }

        if attempt < attempts {
            sleep(IP_POLL_INTERVAL).await;
        }
    }

    None
}
