//! INI file configuration adapter.
//!
//! Values can be overridden from the environment with
//! `COMMODITYX_<SECTION>_<KEY>`, e.g. `COMMODITYX_DATABASE_PATH`.

use crate::domain::error::CommodityxError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::collections::HashMap;
use std::path::Path;

pub const ENV_PREFIX: &str = "COMMODITYX_";

#[derive(Debug)]
pub struct FileConfigAdapter {
    config: Ini,
    overrides: HashMap<String, String>,
}

impl FileConfigAdapter {
    /// Load an INI file and apply overrides from the process environment.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CommodityxError> {
        let path = path.as_ref();
        let mut config = Ini::new();
        config
            .load(path)
            .map_err(|reason| CommodityxError::ConfigParse {
                file: path.display().to_string(),
                reason,
            })?;
        Ok(Self {
            config,
            overrides: HashMap::new(),
        }
        .with_overrides(std::env::vars()))
    }

    pub fn from_string(content: &str) -> Result<Self, CommodityxError> {
        let mut config = Ini::new();
        config
            .read(content.to_string())
            .map_err(|reason| CommodityxError::ConfigParse {
                file: "<string>".into(),
                reason,
            })?;
        Ok(Self {
            config,
            overrides: HashMap::new(),
        })
    }

    /// Merge `COMMODITYX_*` variables from `vars`; other names are ignored.
    pub fn with_overrides<I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.overrides.extend(
            vars.into_iter()
                .filter(|(name, _)| name.starts_with(ENV_PREFIX)),
        );
        self
    }

    fn env_key(section: &str, key: &str) -> String {
        format!("{ENV_PREFIX}{section}_{key}").to_uppercase()
    }

    fn lookup(&self, section: &str, key: &str) -> Option<String> {
        self.overrides
            .get(&Self::env_key(section, key))
            .cloned()
            .or_else(|| self.config.get(section, key))
    }

    fn parse_bool(value: &str) -> Option<bool> {
        match value.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" | "on" => Some(true),
            "false" | "no" | "0" | "off" => Some(false),
            _ => None,
        }
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.lookup(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.lookup(section, key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.lookup(section, key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.lookup(section, key)
            .as_deref()
            .and_then(Self::parse_bool)
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    const SAMPLE: &str = r#"
[database]
path = /var/lib/commodityx/app.db
pool_size = 8

[trading]
initial_balance = 250000.5

[auth]
secure_cookies = yes
"#;

    #[test]
    fn from_string_parses_config() {
        let adapter = FileConfigAdapter::from_string(SAMPLE).unwrap();
        assert_eq!(
            adapter.get_string("database", "path"),
            Some("/var/lib/commodityx/app.db".to_string())
        );
        assert_eq!(adapter.get_int("database", "pool_size", 4), 8);
        assert_eq!(
            adapter.get_double("trading", "initial_balance", 0.0),
            250000.5
        );
        assert!(adapter.get_bool("auth", "secure_cookies", false));
    }

    #[test]
    fn missing_values_fall_back_to_defaults() {
        let adapter = FileConfigAdapter::from_string("[database]\n").unwrap();
        assert_eq!(adapter.get_string("database", "path"), None);
        assert_eq!(adapter.get_string("missing_section", "key"), None);
        assert_eq!(adapter.get_int("database", "pool_size", 4), 4);
        assert_eq!(adapter.get_double("trading", "initial_balance", 99.9), 99.9);
        assert!(adapter.get_bool("auth", "secure_cookies", true));
    }

    #[test]
    fn malformed_numbers_fall_back_to_defaults() {
        let adapter =
            FileConfigAdapter::from_string("[database]\npool_size = many\nbusy_timeout_ms = 1.5\n")
                .unwrap();
        assert_eq!(adapter.get_int("database", "pool_size", 4), 4);
        assert_eq!(adapter.get_int("database", "busy_timeout_ms", 5000), 5000);
    }

    #[test]
    fn bool_spellings() {
        let adapter =
            FileConfigAdapter::from_string("[auth]\na = true\nb = off\nc = 1\nd = maybe\n")
                .unwrap();
        assert!(adapter.get_bool("auth", "a", false));
        assert!(!adapter.get_bool("auth", "b", true));
        assert!(adapter.get_bool("auth", "c", false));
        assert!(adapter.get_bool("auth", "d", true));
        assert!(!adapter.get_bool("auth", "d", false));
    }

    #[test]
    fn env_overrides_win_over_file_values() {
        let adapter = FileConfigAdapter::from_string(SAMPLE)
            .unwrap()
            .with_overrides(vec![
                ("COMMODITYX_DATABASE_POOL_SIZE".to_string(), "2".to_string()),
                ("COMMODITYX_WEB_LISTEN".to_string(), "0.0.0.0:9000".to_string()),
                ("HOME".to_string(), "/root".to_string()),
            ]);
        assert_eq!(adapter.get_int("database", "pool_size", 4), 2);
        assert_eq!(
            adapter.get_string("web", "listen"),
            Some("0.0.0.0:9000".to_string())
        );
        assert_eq!(
            adapter.get_string("database", "path"),
            Some("/var/lib/commodityx/app.db".to_string())
        );
    }

    #[test]
    fn require_string_reports_section_and_key() {
        let adapter = FileConfigAdapter::from_string("[auth]\nsession_secret =\n").unwrap();
        let err = adapter.require_string("auth", "session_secret").unwrap_err();
        assert!(matches!(
            err,
            CommodityxError::ConfigMissing { ref section, ref key }
                if section == "auth" && key == "session_secret"
        ));
    }

    #[test]
    fn from_file_reads_config() {
        let file = create_temp_config("[web]\nlisten = 127.0.0.1:3000\n");
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(
            adapter.get_string("web", "listen"),
            Some("127.0.0.1:3000".to_string())
        );
    }

    #[test]
    fn from_file_returns_error_for_missing_file() {
        let result = FileConfigAdapter::from_file("/nonexistent/path/config.ini");
        assert!(matches!(result, Err(CommodityxError::ConfigParse { .. })));
    }
}
