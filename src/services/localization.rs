use crate::{
    command,
    config::{CatalogPaths, LocalizationTarget},
};
use anyhow::{Context, Result};
use log::{debug, info};
use std::{fs, path::Path};

/// Keyboard, language and time zone chosen on the web form
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Localization {
    pub keymap: String,
    pub locale: String,
    pub timezone: String,
}

impl Localization {
    pub fn is_empty(&self) -> bool {
        self.keymap.is_empty() && self.locale.is_empty() && self.timezone.is_empty()
    }

    /// Non-empty settings as `key=value` lines
    fn to_lines(&self) -> String {
        [
            ("keymap", &self.keymap),
            ("locale", &self.locale),
            ("timezone", &self.timezone),
        ]
        .iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| format!("{key}={value}\n"))
        .collect()
    }
}

/// Lookups against the catalogs the system ships for keymaps, locales,
/// WiFi countries and time zones
#[derive(Clone, Debug)]
pub struct LocalizationCatalog {
    paths: CatalogPaths,
}

impl LocalizationCatalog {
    pub fn new(paths: CatalogPaths) -> Self {
        Self { paths }
    }

    /// Keymaps are listed as `  <name> <description>` in xorg.lst
    pub fn has_keymap(&self, keymap: &str) -> bool {
        let prefix = format!("  {keymap} ");
        Self::any_line(&self.paths.keymaps, |line| line.starts_with(&prefix))
    }

    pub fn has_locale(&self, locale: &str) -> bool {
        Self::any_line(&self.paths.locales, |line| line.starts_with(locale))
    }

    pub fn has_country(&self, country: &str) -> bool {
        Self::any_line(&self.paths.countries, |line| line.starts_with(country))
    }

    pub fn has_timezone(&self, timezone: &str) -> bool {
        if timezone.split('/').any(|part| part == ".." || part.is_empty()) {
            return false;
        }

        self.paths.zoneinfo_dir.join(timezone).is_file()
    }

    fn any_line(path: &Path, predicate: impl Fn(&str) -> bool) -> bool {
        match fs::read_to_string(path) {
            Ok(contents) => contents.lines().any(predicate),
            Err(e) => {
                debug!("failed to read catalog {path:?}: {e}");
                false
            }
        }
    }
}

/// Applies localization settings once WiFi configuration is done
#[derive(Clone, Debug)]
pub struct LocalizationService {
    target: LocalizationTarget,
}

impl LocalizationService {
    pub fn new(target: LocalizationTarget) -> Self {
        Self { target }
    }

    pub async fn apply(&self, localization: &Localization) -> Result<()> {
        if localization.is_empty() {
            debug!("no localization settings to apply");
            return Ok(());
        }

        match &self.target {
            LocalizationTarget::FirstBootFile(path) => {
                info!("write localization settings to {path:?}");

                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)
                        .context(format!("failed to create directory {parent:?}"))?;
                }

                fs::write(path, localization.to_lines())
                    .context(format!("failed to write localization settings: {path:?}"))
            }
            LocalizationTarget::Handler(handler) => {
                let handler = handler.to_string_lossy();
                info!("call localization handler {handler}");

                command::report(
                    &handler,
                    &[
                        localization.keymap.as_str(),
                        localization.locale.as_str(),
                        localization.timezone.as_str(),
                    ],
                )
                .await;

                Ok(())
            }
            LocalizationTarget::Discard => {
                debug!("no localization target configured, settings discarded");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::catalog_fixture;
    use tempfile::TempDir;

    mod catalog {
        use super::*;

        #[test]
        fn recognizes_listed_entries() {
            let (_dir, paths) = catalog_fixture();
            let catalog = LocalizationCatalog::new(paths);

            assert!(catalog.has_keymap("de"));
            assert!(catalog.has_locale("en_US.UTF-8"));
            assert!(catalog.has_country("US"));
            assert!(catalog.has_timezone("Europe/Berlin"));
        }

        #[test]
        fn rejects_unknown_entries() {
            let (_dir, paths) = catalog_fixture();
            let catalog = LocalizationCatalog::new(paths);

            assert!(!catalog.has_keymap("layout"));
            assert!(!catalog.has_keymap("fr"));
            assert!(!catalog.has_locale("xx_XX"));
            assert!(!catalog.has_country("ZZ"));
            assert!(!catalog.has_timezone("Mars/Olympus"));
            assert!(!catalog.has_timezone("../zoneinfo/Europe/Berlin"));
            assert!(!catalog.has_timezone("Europe"));
        }

        #[test]
        fn missing_catalog_rejects_everything() {
            let catalog = LocalizationCatalog::new(CatalogPaths::under(Path::new(
                "/nonexistent/cportal",
            )));

            assert!(!catalog.has_keymap("us"));
            assert!(!catalog.has_country("US"));
        }
    }

    mod service {
        use super::*;

        #[tokio::test]
        async fn writes_first_boot_file() {
            let dir = TempDir::new().expect("failed to create temp directory");
            let path = dir.path().join("sdm/local-1piboot.conf");
            let service = LocalizationService::new(LocalizationTarget::FirstBootFile(path.clone()));

            service
                .apply(&Localization {
                    keymap: "de".to_string(),
                    locale: String::new(),
                    timezone: "Europe/Berlin".to_string(),
                })
                .await
                .expect("apply localization");

            assert_eq!(
                fs::read_to_string(path).unwrap(),
                "keymap=de\ntimezone=Europe/Berlin\n"
            );
        }

        #[tokio::test]
        async fn empty_settings_write_nothing() {
            let dir = TempDir::new().expect("failed to create temp directory");
            let path = dir.path().join("local-1piboot.conf");
            let service = LocalizationService::new(LocalizationTarget::FirstBootFile(path.clone()));

            service
                .apply(&Localization::default())
                .await
                .expect("apply localization");

            assert!(!path.exists());
        }
    }
}
