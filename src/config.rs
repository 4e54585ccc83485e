//! Process configuration: credentials and the region table.
//!
//! Both are read once at startup into an [`AppConfig`] that is passed
//! explicitly to whatever needs it.

use anyhow::{Context, Result, bail};
use rand::seq::IndexedRandom;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Default location of the credentials file.
pub const DEFAULT_CREDENTIALS_PATH: &str = "config/credential.json";
/// Default location of the region table.
pub const DEFAULT_REGIONS_PATH: &str = "public/city.json";

/// A logged-in session for the index service.
///
/// Stored as a JSON array on disk:
/// ```json
/// [
///   { "cookie_BDUSS": "xxxx", "cipherText": "yyyy" }
/// ]
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Credential {
    #[serde(rename = "cookie_BDUSS")]
    pub session_cookie: String,
    #[serde(rename = "cipherText")]
    pub cipher_text: String,
}

/// Maps region codes to display names.
///
/// Stored as a plain JSON object on disk:
/// ```json
/// { "0": "全国", "911": "北京" }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct RegionTable {
    entries: BTreeMap<String, String>,
}

impl RegionTable {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read region table {}", path.display()))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Returns the display name for `code`, if one is configured.
    pub fn name(&self, code: &str) -> Option<&str> {
        self.entries.get(code).map(String::as_str)
    }

    /// Iterates over all `(code, name)` pairs in code order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, String)> for RegionTable {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Everything loaded at startup. Immutable afterwards.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub credentials: Vec<Credential>,
    pub regions: RegionTable,
}

impl AppConfig {
    /// Loads credentials and regions from the given files.
    pub fn load(credentials_path: &Path, regions_path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(credentials_path).with_context(|| {
            format!("Failed to read credentials {}", credentials_path.display())
        })?;
        let credentials: Vec<Credential> = serde_json::from_str(&content)?;
        if credentials.is_empty() {
            bail!("{} contains no credentials", credentials_path.display());
        }

        Ok(Self {
            credentials,
            regions: RegionTable::load(regions_path)?,
        })
    }

    /// Loads from `CREDENTIALS_PATH` / `REGIONS_PATH`, falling back to the defaults.
    pub fn from_env() -> Result<Self> {
        let credentials = std::env::var("CREDENTIALS_PATH")
            .unwrap_or_else(|_| DEFAULT_CREDENTIALS_PATH.to_string());
        let regions =
            std::env::var("REGIONS_PATH").unwrap_or_else(|_| DEFAULT_REGIONS_PATH.to_string());
        Self::load(Path::new(&credentials), Path::new(&regions))
    }

    /// Picks one credential at random.
    pub fn pick_credential(&self) -> Option<&Credential> {
        self.credentials.choose(&mut rand::rng())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::fs;

    fn temp_path(name: &str) -> std::path::PathBuf {
        env::temp_dir().join(name)
    }

    #[test]
    fn test_load_config() {
        let creds = temp_path("index_crawler_test_creds.json");
        let regions = temp_path("index_crawler_test_regions.json");
        fs::write(&creds, r#"[{"cookie_BDUSS": "abc", "cipherText": "def"}]"#).unwrap();
        fs::write(&regions, r#"{"0": "全国", "911": "北京"}"#).unwrap();

        let config = AppConfig::load(&creds, &regions).unwrap();

        assert_eq!(config.credentials.len(), 1);
        assert_eq!(config.pick_credential().unwrap().session_cookie, "abc");
        assert_eq!(config.pick_credential().unwrap().cipher_text, "def");
        assert_eq!(config.regions.name("911"), Some("北京"));
        assert_eq!(config.regions.name("1"), None);
        assert_eq!(config.regions.codes().collect::<Vec<_>>(), vec!["0", "911"]);

        fs::remove_file(&creds).unwrap();
        fs::remove_file(&regions).unwrap();
    }

    #[test]
    fn test_empty_credentials_rejected() {
        let creds = temp_path("index_crawler_test_creds_empty.json");
        let regions = temp_path("index_crawler_test_regions_empty.json");
        fs::write(&creds, "[]").unwrap();
        fs::write(&regions, "{}").unwrap();

        assert!(AppConfig::load(&creds, &regions).is_err());

        fs::remove_file(&creds).unwrap();
        fs::remove_file(&regions).unwrap();
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let missing = temp_path("index_crawler_test_does_not_exist.json");
        assert!(RegionTable::load(&missing).is_err());
    }
}
