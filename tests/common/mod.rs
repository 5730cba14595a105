#![allow(dead_code)]

use anyhow::Result;
use cportal::{
    config::{CatalogPaths, LocalizationTarget},
    network_backend::NetworkBackend,
    pages::Pages,
    portal::{Portal, session::WorkflowPhase},
    services::{
        led::StatusLed,
        localization::{LocalizationCatalog, LocalizationService},
        settings::{Credentials, SettingsValidator},
    },
};
use std::{fs, net::Ipv4Addr, sync::Arc, time::Duration};
use tempfile::TempDir;

pub const APIP: Ipv4Addr = Ipv4Addr::new(10, 1, 1, 1);

/// Backend answering from fixed values
#[derive(Default)]
pub struct FakeBackend {
    pub ip: Option<Ipv4Addr>,
    pub reachable: bool,
    pub ssids: Vec<String>,
}

impl FakeBackend {
    pub fn connected(reachable: bool) -> Self {
        Self {
            ip: Some(Ipv4Addr::new(192, 168, 1, 50)),
            reachable,
            ssids: vec!["Home".to_string(), "Cafe".to_string()],
        }
    }
}

impl NetworkBackend for FakeBackend {
    async fn apply_access_point_config(&self) -> Result<()> {
        Ok(())
    }

    async fn apply_station_config(&self, _credentials: Credentials) -> Result<()> {
        Ok(())
    }

    async fn write_station_config(&self, _credentials: Credentials) -> Result<()> {
        Ok(())
    }

    async fn set_power_management(&self, _on: bool) -> Result<()> {
        Ok(())
    }

    async fn list_visible_ssids(&self) -> Result<Vec<String>> {
        Ok(self.ssids.clone())
    }

    async fn query_assigned_ip(&self) -> Result<Option<Ipv4Addr>> {
        Ok(self.ip)
    }

    async fn probe_reachability(&self, _address: Ipv4Addr, _attempts: u32) -> Result<bool> {
        Ok(self.reachable)
    }

    async fn teardown(&self) -> Result<()> {
        Ok(())
    }
}

/// Minimal localization catalogs knowing `us`/`de`, `en_US.UTF-8`, `US`/`DE` and `Europe/Berlin`
pub fn catalog() -> (TempDir, CatalogPaths) {
    let dir = TempDir::new().expect("failed to create temp directory");
    let paths = CatalogPaths::under(dir.path());

    fs::create_dir_all(paths.keymaps.parent().unwrap()).unwrap();
    fs::create_dir_all(paths.locales.parent().unwrap()).unwrap();
    fs::create_dir_all(paths.zoneinfo_dir.join("Europe")).unwrap();

    fs::write(&paths.keymaps, "  us              English (US)\n  de              German\n").unwrap();
    fs::write(&paths.locales, "en_US.UTF-8 UTF-8\n").unwrap();
    fs::write(&paths.countries, "DE\tGermany\nUS\tUnited States\n").unwrap();
    fs::write(paths.zoneinfo_dir.join("Europe/Berlin"), "TZif").unwrap();

    (dir, paths)
}

pub fn portal<B>(backend: B, retries: u32) -> (TempDir, Arc<Portal<B>>)
where
    B: NetworkBackend + Send + Sync + 'static,
{
    let (dir, paths) = catalog();
    let portal = Portal::new(
        Arc::new(backend),
        SettingsValidator::new(LocalizationCatalog::new(paths), None, "US"),
        LocalizationService::new(LocalizationTarget::Discard),
        StatusLed::disabled(),
        retries,
    );

    (dir, Arc::new(portal))
}

pub fn pages() -> Pages {
    Pages::new("pi", APIP)
}

/// Wait until the background connectivity test has been harvested
pub async fn wait_for_result<B>(portal: &Portal<B>)
where
    B: NetworkBackend + Send + Sync + 'static,
{
    for _ in 0..200 {
        portal.poll_test();
        if portal.phase() == WorkflowPhase::ResultReady {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("connectivity test did not finish");
}
