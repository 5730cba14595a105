//! Configuration files consumed by NetworkManager and wpa_supplicant.

use crate::{config::NetworkConfig, services::settings::Credentials};
use anyhow::{Context, Result};
use ini::Ini;
use log::{error, info};
use std::{
    fs,
    io::ErrorKind,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};
use uuid::Uuid;

const SECRET_FILE_MODE: u32 = 0o600;

/// Files that only exist while the access point is up, removed on cleanup
pub fn access_point_files(network: &NetworkConfig) -> Vec<PathBuf> {
    vec![
        access_point_connection_file(network),
        dns_config_file(network),
        dns_redirect_file(network),
    ]
}

fn dns_config_file(network: &NetworkConfig) -> PathBuf {
    network
        .paths
        .nm_conf_dir
        .join(format!("{}-dnsconfig.conf", network.facility))
}

fn dns_redirect_file(network: &NetworkConfig) -> PathBuf {
    network
        .paths
        .nm_dnsmasq_dir
        .join(format!("{}-redirect.conf", network.facility))
}

pub fn access_point_connection_file(network: &NetworkConfig) -> PathBuf {
    network
        .paths
        .nm_connections_dir
        .join(format!("{}.nmconnection", network.ap_connection_id()))
}

/// Keyfile of the station connection, named after a file system safe form of the SSID
pub fn station_connection_file(network: &NetworkConfig, credentials: &Credentials) -> PathBuf {
    network.paths.nm_connections_dir.join(format!(
        "{}-{}.nmconnection",
        network.facility,
        file_name_slug(&credentials.ssid)
    ))
}

/// Keep ASCII alphanumerics, `-` and `_`, replace everything else with `_`
fn file_name_slug(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// SSID as unquoted hex, which wpa_supplicant accepts for any byte sequence
fn hex_ssid(ssid: &str) -> String {
    ssid.bytes().map(|b| format!("{b:02x}")).collect()
}

pub fn supplicant_file(network: &NetworkConfig) -> PathBuf {
    network
        .paths
        .supplicant_dir
        .join(format!("wpa_supplicant-{}.conf", network.wlan))
}

/// NetworkManager connection id of the station, derived from the SSID
pub fn station_connection_id(credentials: &Credentials) -> String {
    credentials.ssid.to_lowercase()
}

/// Open access point with a shared IPv4 network on the AP interface
pub fn access_point_connection(network: &NetworkConfig) -> Ini {
    let mut ini = Ini::new();

    ini.with_section(Some("connection"))
        .set("id", network.ap_connection_id())
        .set("uuid", Uuid::new_v4().to_string())
        .set("type", "wifi")
        .set("autoconnect", "false")
        .set("interface-name", network.ap_interface());

    ini.with_section(Some("wifi"))
        .set("band", "bg")
        .set("mode", "ap")
        .set("ssid", &network.ap_ssid);

    ini.with_section(Some("ipv4"))
        .set("address1", format!("{}/24", network.apip))
        .set("method", "shared");

    ini.with_section(Some("ipv6"))
        .set("addr-gen-mode", "default")
        .set("method", "disabled");

    ini
}

/// WPA-PSK station connection on the WiFi device
pub fn station_connection(network: &NetworkConfig, credentials: &Credentials) -> Ini {
    let mut ini = Ini::new();

    ini.with_section(Some("connection"))
        .set("id", station_connection_id(credentials))
        .set("uuid", Uuid::new_v4().to_string())
        .set("type", "wifi")
        .set("autoconnect", "true")
        .set("interface-name", &network.wlan);

    ini.with_section(Some("wifi"))
        .set("mode", "infrastructure")
        .set("ssid", &credentials.ssid);

    ini.with_section(Some("wifi-security"))
        .set("key-mgmt", "wpa-psk")
        .set("psk", &credentials.password);

    ini.with_section(Some("ipv4")).set("method", "auto");
    ini.with_section(Some("ipv6")).set("method", "ignore");

    ini
}

/// Let NetworkManager run dnsmasq so every name resolves to the portal
pub fn dns_config() -> Ini {
    let mut ini = Ini::new();
    ini.with_section(Some("main")).set("dns", "dnsmasq");
    ini
}

pub fn dns_redirect(network: &NetworkConfig) -> String {
    format!("address=/#/{}\n", network.apip)
}

pub fn supplicant_config(credentials: &Credentials) -> String {
    format!(
        "ctrl_interface=DIR=/var/run/wpa_supplicant GROUP=netdev\n\
         country={}\n\
         update_config=1\n\
         \n\
         network={{\n    \
         ssid={}\n    \
         psk=\"{}\"\n    \
         key_mgmt=WPA-PSK\n\
         }}\n",
        credentials.country,
        hex_ssid(&credentials.ssid),
        credentials.password
    )
}

pub fn write_access_point_files(network: &NetworkConfig) -> Result<()> {
    write_ini(
        &access_point_connection_file(network),
        &access_point_connection(network),
    )?;
    write_ini(&dns_config_file(network), &dns_config())?;
    write_file(&dns_redirect_file(network), &dns_redirect(network))
}

pub fn write_station_files(network: &NetworkConfig, credentials: &Credentials) -> Result<()> {
    write_file(&supplicant_file(network), &supplicant_config(credentials))?;
    set_secret_permissions(&supplicant_file(network))?;

    let connection_file = station_connection_file(network, credentials);
    write_ini(&connection_file, &station_connection(network, credentials))?;
    set_secret_permissions(&connection_file)
}

/// Remove the access point files, log failures and keep going
pub fn remove_access_point_files(network: &NetworkConfig) -> usize {
    let mut removed = 0;

    for path in access_point_files(network) {
        match remove_if_exists(&path) {
            Ok(true) => {
                info!("removed {path:?}");
                removed += 1;
            }
            Ok(false) => {}
            Err(e) => error!("{e:#}"),
        }
    }

    removed
}

/// Delete a file, a missing file is not an error
pub fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).context(format!("failed to remove {path:?}")),
    }
}

fn write_ini(path: &Path, ini: &Ini) -> Result<()> {
    create_parent(path)?;
    info!("write {path:?}");

    ini.write_to_file(path)
        .context(format!("failed to write {path:?}"))?;

    set_secret_permissions(path)
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    create_parent(path)?;
    info!("write {path:?}");

    fs::write(path, contents).context(format!("failed to write {path:?}"))
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context(format!("failed to create directory {parent:?}"))?;
    }
    Ok(())
}

/// NetworkManager ignores keyfiles readable by others
fn set_secret_permissions(path: &Path) -> Result<()> {
    let mut perm = fs::metadata(path)
        .context(format!("failed to get metadata of {path:?}"))?
        .permissions();
    perm.set_mode(SECRET_FILE_MODE);

    fs::set_permissions(path, perm).context(format!("failed to set permissions of {path:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::NetworkPaths, services::localization::Localization};
    use std::net::Ipv4Addr;
    use tempfile::TempDir;

    fn network(dir: &Path) -> NetworkConfig {
        NetworkConfig {
            wlan: "wlan0".to_string(),
            facility: "sdm".to_string(),
            ap_ssid: "pi-sdm".to_string(),
            apip: Ipv4Addr::new(10, 1, 1, 1),
            paths: NetworkPaths::under(dir),
        }
    }

    fn credentials() -> Credentials {
        Credentials {
            ssid: "Home".to_string(),
            password: "longpassword1".to_string(),
            country: "DE".to_string(),
            localization: Localization::default(),
            dhcp_wait_secs: 60,
            validate: true,
            check_internet: true,
            wifi_power: true,
        }
    }

    #[test]
    fn access_point_connection_uses_ap_names() {
        let dir = TempDir::new().expect("failed to create temp directory");
        let ini = access_point_connection(&network(dir.path()));

        let connection = ini.section(Some("connection")).unwrap();
        assert_eq!(connection.get("id"), Some("sdmap"));
        assert_eq!(connection.get("interface-name"), Some("sdm0"));
        assert_eq!(ini.get_from(Some("wifi"), "ssid"), Some("pi-sdm"));
        assert_eq!(ini.get_from(Some("wifi"), "mode"), Some("ap"));
        assert_eq!(ini.get_from(Some("ipv4"), "address1"), Some("10.1.1.1/24"));
        assert!(ini.section(Some("wifi-security")).is_none());
    }

    #[test]
    fn station_connection_carries_credentials() {
        let dir = TempDir::new().expect("failed to create temp directory");
        let ini = station_connection(&network(dir.path()), &credentials());

        assert_eq!(ini.get_from(Some("connection"), "id"), Some("home"));
        assert_eq!(ini.get_from(Some("wifi"), "ssid"), Some("Home"));
        assert_eq!(
            ini.get_from(Some("wifi-security"), "psk"),
            Some("longpassword1")
        );
    }

    #[test]
    fn supplicant_config_contains_network_block() {
        let config = supplicant_config(&credentials());

        assert!(config.contains("country=DE\n"));
        assert!(config.contains("    ssid=486f6d65\n"));
        assert!(config.contains("    psk=\"longpassword1\"\n"));
        assert!(config.contains("    key_mgmt=WPA-PSK\n}\n"));
    }

    #[test]
    fn station_files_are_private() {
        let dir = TempDir::new().expect("failed to create temp directory");
        let network = network(dir.path());
        let credentials = credentials();

        write_station_files(&network, &credentials).expect("write station files");

        for path in [
            supplicant_file(&network),
            station_connection_file(&network, &credentials),
        ] {
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, SECRET_FILE_MODE, "{path:?}");
        }
    }

    #[test]
    fn access_point_files_are_removable() {
        let dir = TempDir::new().expect("failed to create temp directory");
        let network = network(dir.path());

        write_access_point_files(&network).expect("write access point files");

        let removed: Vec<bool> = access_point_files(&network)
            .iter()
            .map(|path| remove_if_exists(path).unwrap())
            .collect();
        assert_eq!(removed, vec![true, true, true]);

        assert!(!remove_if_exists(&supplicant_file(&network)).unwrap());
    }

    #[test]
    fn removal_continues_past_failures() {
        let dir = TempDir::new().expect("failed to create temp directory");
        let network = network(dir.path());

        write_access_point_files(&network).expect("write access point files");
        let connection_file = access_point_connection_file(&network);
        fs::remove_file(&connection_file).unwrap();
        fs::create_dir(&connection_file).unwrap();

        assert_eq!(remove_access_point_files(&network), 2);
        assert!(connection_file.is_dir());
        assert!(!dns_config_file(&network).exists());
        assert!(!dns_redirect_file(&network).exists());
    }

    mod station_file_name {
        use super::*;

        fn file_for(ssid: &str, dir: &Path) -> PathBuf {
            let credentials = Credentials {
                ssid: ssid.to_string(),
                ..super::credentials()
            };
            station_connection_file(&network(dir), &credentials)
        }

        #[test]
        fn stays_inside_connections_dir() {
            let dir = TempDir::new().expect("failed to create temp directory");
            let network = network(dir.path());
            let credentials = Credentials {
                ssid: "../../../x".to_string(),
                ..credentials()
            };

            write_station_files(&network, &credentials).expect("write station files");

            let path = station_connection_file(&network, &credentials);
            assert_eq!(path.parent(), Some(network.paths.nm_connections_dir.as_path()));
            assert!(path.exists());
            assert!(!dir.path().join("x.nmconnection").exists());
            assert_eq!(
                Ini::load_from_file(&path)
                    .unwrap()
                    .get_from(Some("wifi"), "ssid"),
                Some("../../../x")
            );
        }

        #[test]
        fn replaces_separators_and_dots() {
            let dir = TempDir::new().expect("failed to create temp directory");

            assert!(file_for("Cafe/Bar", dir.path()).ends_with("sdm-Cafe_Bar.nmconnection"));
            assert!(file_for(".hidden", dir.path()).ends_with("sdm-_hidden.nmconnection"));
            assert!(file_for("Home", dir.path()).ends_with("sdm-Home.nmconnection"));
        }
    }

    #[test]
    fn supplicant_ssid_cannot_break_out_of_network_block() {
        let credentials = Credentials {
            ssid: "x\"\nkey_mgmt=NONE".to_string(),
            ..credentials()
        };

        let config = supplicant_config(&credentials);

        assert!(!config.lines().any(|line| line.trim() == "key_mgmt=NONE"));
        assert_eq!(config.matches("key_mgmt=").count(), 1);
    }
}
