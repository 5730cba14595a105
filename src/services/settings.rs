use crate::services::localization::{Localization, LocalizationCatalog};
use actix_web::web::Query;
use anyhow::{Context, Result, anyhow};
use log::{debug, info};
use std::{collections::HashMap, fmt, fs, path::Path};

const DEFAULT_DHCP_WAIT_SECS: u64 = 60;
const PASSWORD_MIN_LEN: usize = 8;
const PASSWORD_MAX_LEN: usize = 63;
const SSID_MAX_BYTES: usize = 32;
const OVERRIDE_KEY: &str = "override";

/// Query parameter names of the web form
pub mod field {
    pub const SSID: &str = "ssid";
    pub const PASSWORD: &str = "password";
    pub const COUNTRY: &str = "wificountry";
    pub const KEYMAP: &str = "keymap";
    pub const LOCALE: &str = "locale";
    pub const TIMEZONE: &str = "timezone";
    pub const DHCP_WAIT: &str = "dhcpwait";
    pub const VALIDATE: &str = "validate";
    pub const CHECK_INTERNET: &str = "ckinternet";
    pub const WIFI_POWER: &str = "wifipower";
}

/// Settings accepted from the web form
#[derive(Clone, Debug, PartialEq)]
pub struct Credentials {
    pub ssid: String,
    pub password: String,
    pub country: String,
    pub localization: Localization,
    pub dhcp_wait_secs: u64,
    pub validate: bool,
    pub check_internet: bool,
    pub wifi_power: bool,
}

#[cfg(test)]
impl Credentials {
    pub(crate) fn for_test(ssid: &str) -> Self {
        Self {
            ssid: ssid.to_string(),
            password: "longpassword1".to_string(),
            country: "US".to_string(),
            localization: Localization::default(),
            dhcp_wait_secs: 3,
            validate: true,
            check_internet: true,
            wifi_power: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

/// Every problem found in one submission
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValidationErrors {
    errors: Vec<FieldError>,
}

impl ValidationErrors {
    fn add(&mut self, field: &'static str, message: impl Into<String>) {
        let message = message.into();
        info!("validation error: {message}");
        self.errors.push(FieldError { field, message });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    pub fn fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.errors.iter().map(|e| e.field)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<&str> = self.errors.iter().map(|e| e.message.as_str()).collect();
        write!(f, "{}", messages.join("; "))
    }
}

/// Fallback values for fields the user leaves blank
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Defaults {
    values: HashMap<String, String>,
    override_user: bool,
}

impl Defaults {
    /// Load defaults from the first line of a file
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            fs::read_to_string(path).context(format!("failed to read defaults file {path:?}"))?;
        let line = contents.lines().next().unwrap_or_default();

        Self::parse(line).context(format!("failed to parse defaults file {path:?}"))
    }

    /// Parse a URL query line; anything up to a `?` is ignored
    pub fn parse(line: &str) -> Result<Self> {
        let query = line
            .trim()
            .split_once('?')
            .map_or(line.trim(), |(_, query)| query);

        let values = Query::<HashMap<String, String>>::from_query(query)
            .map_err(|e| anyhow!("invalid query: {e}"))?
            .into_inner();

        let override_user = values.contains_key(OVERRIDE_KEY);

        Ok(Self {
            values,
            override_user,
        })
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

/// Turns raw form parameters into validated [`Credentials`]
#[derive(Clone, Debug)]
pub struct SettingsValidator {
    catalog: LocalizationCatalog,
    defaults: Option<Defaults>,
    default_country: String,
}

impl SettingsValidator {
    pub fn new(
        catalog: LocalizationCatalog,
        defaults: Option<Defaults>,
        default_country: &str,
    ) -> Self {
        Self {
            catalog,
            defaults,
            default_country: default_country.to_uppercase(),
        }
    }

    /// Validate all fields and collect every error before returning
    pub fn validate(
        &self,
        params: &HashMap<String, String>,
    ) -> Result<Credentials, ValidationErrors> {
        let mut errors = ValidationErrors::default();

        let ssid = self.value(params, field::SSID);
        if ssid.is_empty() {
            errors.add(field::SSID, "SSID cannot be blank");
        } else if ssid.len() > SSID_MAX_BYTES {
            errors.add(
                field::SSID,
                format!("SSID must not be longer than {SSID_MAX_BYTES} bytes"),
            );
        } else if ssid.chars().any(char::is_control) {
            errors.add(field::SSID, "SSID must not contain control characters");
        }

        let password = self.value(params, field::PASSWORD);
        if password.is_empty() {
            errors.add(field::PASSWORD, "Password cannot be blank");
        } else if !password.bytes().all(|b| (0x20..=0x7e).contains(&b)) {
            errors.add(
                field::PASSWORD,
                "Password may only contain printable ASCII characters",
            );
        } else if !(PASSWORD_MIN_LEN..=PASSWORD_MAX_LEN).contains(&password.len()) {
            errors.add(
                field::PASSWORD,
                format!("Password must be between {PASSWORD_MIN_LEN}-{PASSWORD_MAX_LEN} characters"),
            );
        }

        let keymap = self.value(params, field::KEYMAP).to_lowercase();
        if !keymap.is_empty() && !self.catalog.has_keymap(&keymap) {
            errors.add(field::KEYMAP, format!("Unrecognized keymap '{keymap}'"));
        }

        let locale = self.value(params, field::LOCALE);
        if !locale.is_empty() && !self.catalog.has_locale(&locale) {
            errors.add(field::LOCALE, format!("Unrecognized locale '{locale}'"));
        }

        let mut country = self.value(params, field::COUNTRY).to_uppercase();
        if country.is_empty() {
            country = self.default_country.clone();
        } else if !self.catalog.has_country(&country) {
            errors.add(
                field::COUNTRY,
                format!("Unrecognized WiFi Country '{country}'"),
            );
        }

        let timezone = self.value(params, field::TIMEZONE);
        if !timezone.is_empty() && !self.catalog.has_timezone(&timezone) {
            errors.add(
                field::TIMEZONE,
                format!("Unrecognized Timezone '{timezone}'"),
            );
        }

        let dhcp_wait = self.value(params, field::DHCP_WAIT);
        let dhcp_wait_secs = if dhcp_wait.is_empty() {
            DEFAULT_DHCP_WAIT_SECS
        } else {
            dhcp_wait.parse::<u64>().unwrap_or_else(|_| {
                errors.add(
                    field::DHCP_WAIT,
                    format!("dhcpwait value '{dhcp_wait}' is not a non-negative integer"),
                );
                DEFAULT_DHCP_WAIT_SECS
            })
        };

        if !errors.is_empty() {
            return Err(errors);
        }

        debug!("form input validation complete");

        Ok(Credentials {
            ssid,
            password,
            country,
            localization: Localization {
                keymap,
                locale,
                timezone,
            },
            dhcp_wait_secs,
            validate: self.checked(params, field::VALIDATE),
            check_internet: self.checked(params, field::CHECK_INTERNET),
            wifi_power: self.checked(params, field::WIFI_POWER),
        })
    }

    /// Form value after applying the defaults file
    fn value(&self, params: &HashMap<String, String>, key: &str) -> String {
        let user = params.get(key).map(|v| v.trim()).unwrap_or_default();

        match self.defaults.as_ref() {
            Some(defaults) => match defaults.get(key) {
                Some(default) if user.is_empty() || defaults.override_user => {
                    debug!("use default for {key}");
                    default.to_string()
                }
                _ => user.to_string(),
            },
            None => user.to_string(),
        }
    }

    fn checked(&self, params: &HashMap<String, String>, key: &str) -> bool {
        self.value(params, key) == "on"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::catalog_fixture;
    use tempfile::TempDir;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn validator(defaults: Option<Defaults>) -> (TempDir, SettingsValidator) {
        let (dir, paths) = catalog_fixture();
        let validator = SettingsValidator::new(LocalizationCatalog::new(paths), defaults, "us");
        (dir, validator)
    }

    mod validate {
        use super::*;

        #[test]
        fn accepts_complete_submission() {
            let (_dir, validator) = validator(None);

            let credentials = validator
                .validate(&params(&[
                    ("ssid", " home "),
                    ("password", "longpassword1"),
                    ("wificountry", "de"),
                    ("keymap", "DE"),
                    ("locale", "de_DE.UTF-8"),
                    ("timezone", "Europe/Berlin"),
                    ("dhcpwait", "30"),
                    ("validate", "on"),
                    ("ckinternet", "on"),
                ]))
                .expect("valid submission");

            assert_eq!(credentials.ssid, "home");
            assert_eq!(credentials.country, "DE");
            assert_eq!(credentials.localization.keymap, "de");
            assert_eq!(credentials.dhcp_wait_secs, 30);
            assert!(credentials.validate);
            assert!(credentials.check_internet);
            assert!(!credentials.wifi_power);
        }

        #[test]
        fn reports_every_offending_field() {
            let (_dir, validator) = validator(None);

            let errors = validator
                .validate(&params(&[
                    ("ssid", ""),
                    ("password", "short"),
                    ("wificountry", "ZZ"),
                    ("keymap", "xx"),
                    ("locale", "xx_XX"),
                    ("timezone", "Mars/Olympus"),
                    ("dhcpwait", "-5"),
                ]))
                .expect_err("invalid submission");

            assert_eq!(
                errors.fields().collect::<Vec<_>>(),
                vec![
                    field::SSID,
                    field::PASSWORD,
                    field::KEYMAP,
                    field::LOCALE,
                    field::COUNTRY,
                    field::TIMEZONE,
                    field::DHCP_WAIT,
                ]
            );
        }

        #[test]
        fn short_password_is_the_only_offender() {
            let (_dir, validator) = validator(None);

            let errors = validator
                .validate(&params(&[("ssid", "home"), ("password", "short")]))
                .expect_err("invalid submission");

            assert_eq!(errors.fields().collect::<Vec<_>>(), vec![field::PASSWORD]);
            assert!(errors.to_string().contains("between 8-63"));
        }

        #[test]
        fn enforces_password_length_bounds() {
            let (_dir, validator) = validator(None);
            let check = |password: &str| {
                validator
                    .validate(&params(&[("ssid", "home"), ("password", password)]))
                    .is_ok()
            };

            assert!(!check(&"a".repeat(7)));
            assert!(check(&"a".repeat(8)));
            assert!(check(&"a".repeat(63)));
            assert!(!check(&"a".repeat(64)));
        }

        #[test]
        fn blank_password_has_its_own_message() {
            let (_dir, validator) = validator(None);

            let errors = validator
                .validate(&params(&[("ssid", "home")]))
                .expect_err("invalid submission");

            assert_eq!(errors.errors()[0].message, "Password cannot be blank");
        }

        #[test]
        fn password_must_be_printable_ascii() {
            let (_dir, validator) = validator(None);

            let errors = validator
                .validate(&params(&[
                    ("ssid", "home"),
                    ("password", "ab\"\nkey_mgmt=NONE\n#"),
                ]))
                .expect_err("invalid submission");
            assert_eq!(errors.fields().collect::<Vec<_>>(), vec![field::PASSWORD]);
            assert!(errors.to_string().contains("printable ASCII"));

            assert!(
                validator
                    .validate(&params(&[("ssid", "home"), ("password", &"ä".repeat(40))]))
                    .is_err()
            );
            assert!(
                validator
                    .validate(&params(&[("ssid", "home"), ("password", "pass word\"~1")]))
                    .is_ok()
            );
        }

        #[test]
        fn ssid_is_limited_to_32_bytes_without_control_characters() {
            let (_dir, validator) = validator(None);
            let check = |ssid: &str| {
                validator
                    .validate(&params(&[("ssid", ssid), ("password", "longpassword1")]))
                    .map_err(|errors| errors.fields().collect::<Vec<_>>())
            };

            assert!(check(&"s".repeat(32)).is_ok());
            assert_eq!(check(&"s".repeat(33)).unwrap_err(), vec![field::SSID]);
            assert_eq!(check(&"ü".repeat(17)).unwrap_err(), vec![field::SSID]);
            assert_eq!(check("home\nnet").unwrap_err(), vec![field::SSID]);
            assert!(check("Cafe/Bar \"2\"").is_ok());
        }

        #[test]
        fn blank_optional_fields_fall_back() {
            let (_dir, validator) = validator(None);

            let credentials = validator
                .validate(&params(&[
                    ("ssid", "home"),
                    ("password", "longpassword1"),
                    ("wificountry", ""),
                    ("dhcpwait", ""),
                ]))
                .expect("valid submission");

            assert_eq!(credentials.country, "US");
            assert_eq!(credentials.dhcp_wait_secs, DEFAULT_DHCP_WAIT_SECS);
            assert!(credentials.localization.is_empty());
            assert!(!credentials.validate);
        }
    }

    mod defaults {
        use super::*;

        #[test]
        fn parses_query_with_and_without_prefix() {
            let defaults = Defaults::parse("http://x/?ssid=home&locale=de_DE.UTF-8").unwrap();
            assert_eq!(defaults.get("ssid"), Some("home"));
            assert!(!defaults.override_user);

            let defaults = Defaults::parse("ssid=home&override").unwrap();
            assert_eq!(defaults.get("ssid"), Some("home"));
            assert!(defaults.override_user);
        }

        #[test]
        fn fills_blank_fields_only() {
            let defaults = Defaults::parse("?ssid=office&password=defaultpass&validate=on").unwrap();
            let (_dir, validator) = validator(Some(defaults));

            let credentials = validator
                .validate(&params(&[("ssid", "home"), ("password", "")]))
                .expect("valid submission");

            assert_eq!(credentials.ssid, "home");
            assert_eq!(credentials.password, "defaultpass");
            assert!(credentials.validate);
        }

        #[test]
        fn override_wins_over_user_input() {
            let defaults = Defaults::parse("?ssid=office&override=1").unwrap();
            let (_dir, validator) = validator(Some(defaults));

            let credentials = validator
                .validate(&params(&[("ssid", "home"), ("password", "longpassword1")]))
                .expect("valid submission");

            assert_eq!(credentials.ssid, "office");
        }

        #[test]
        fn loads_first_line_of_file() {
            let dir = TempDir::new().expect("failed to create temp directory");
            let path = dir.path().join("defaults");
            fs::write(&path, "?timezone=Europe/Berlin\nignored=1\n").unwrap();

            let defaults = Defaults::load(&path).expect("load defaults");
            assert_eq!(defaults.get("timezone"), Some("Europe/Berlin"));
            assert_eq!(defaults.get("ignored"), None);
        }

        #[test]
        fn missing_file_is_an_error() {
            assert!(Defaults::load(Path::new("/nonexistent/cportal/defaults")).is_err());
        }
    }
}
