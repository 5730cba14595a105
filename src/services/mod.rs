//! Business logic services
//!
//! This module contains business logic separated from HTTP concerns:
//! form validation, localization and the files handed to the network stack.

pub mod led;
pub mod localization;
pub mod network_files;
pub mod settings;

#[cfg(test)]
pub(crate) fn catalog_fixture() -> (tempfile::TempDir, crate::config::CatalogPaths) {
    use std::fs;

    let dir = tempfile::TempDir::new().expect("failed to create temp directory");
    let paths = crate::config::CatalogPaths::under(dir.path());

    for parent in [&paths.keymaps, &paths.locales] {
        fs::create_dir_all(parent.parent().expect("catalog parent")).unwrap();
    }
    fs::create_dir_all(paths.zoneinfo_dir.join("Europe")).unwrap();

    fs::write(
        &paths.keymaps,
        "! layout\n  us              English (US)\n  de              German\n",
    )
    .unwrap();
    fs::write(&paths.locales, "de_DE.UTF-8 UTF-8\nen_US.UTF-8 UTF-8\n").unwrap();
    fs::write(
        &paths.countries,
        "# ISO 3166 alpha-2\nDE\tGermany\nUS\tUnited States\n",
    )
    .unwrap();
    fs::write(paths.zoneinfo_dir.join("Europe/Berlin"), "TZif").unwrap();

    (dir, paths)
}
