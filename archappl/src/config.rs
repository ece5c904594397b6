//! Client configuration.
//!
//! Loaded from a JSON file; every key is optional and falls back to the
//! defaults below. Without an explicit path the first of
//! `./archappl.json`, `~/.config/archappl.json`, `/etc/archappl.json`
//! that exists wins.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Appliance host used to build the entry URL.
    pub host: String,
    pub port: u16,
    /// Full appliance-info URL; overrides `host`/`port` when set.
    pub url: Option<String>,
    /// Cap on concurrent HTTP requests.
    pub maxquery: usize,
    /// Default batch size (samples) of streamed queries.
    pub chunksize: usize,
    /// Target sample count of binned plot queries.
    pub defaultcount: usize,
    /// Operation timeout in seconds, applied by the blocking facade and
    /// the CLI.
    pub timeout: f64,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            host: "localhost".to_string(),
            port: 17665,
            url: None,
            maxquery: 30,
            chunksize: 256 * 1024,
            defaultcount: 1000,
            timeout: 30.0,
        }
    }
}

impl Config {
    /// The appliance-info entry point URL.
    pub fn appliance_url(&self) -> String {
        match &self.url {
            Some(url) => url.clone(),
            None => format!("http://{}:{}/mgmt/bpl/getApplianceInfo", self.host, self.port),
        }
    }

    /// Load from `path`, or from the first default location that exists,
    /// or fall back to the built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Config> {
        if let Some(path) = path {
            return Config::from_file(path);
        }
        for candidate in Config::default_paths() {
            if candidate.is_file() {
                log::debug!("loading configuration from {}", candidate.display());
                return Config::from_file(&candidate);
            }
        }
        Ok(Config::default())
    }

    fn from_file(path: &Path) -> Result<Config> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    fn default_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("archappl.json")];
        if let Ok(home) = std::env::var("HOME") {
            paths.push(Path::new(&home).join(".config/archappl.json"));
        }
        paths.push(PathBuf::from("/etc/archappl.json"));
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let conf = Config::default();
        assert_eq!(
            conf.appliance_url(),
            "http://localhost:17665/mgmt/bpl/getApplianceInfo"
        );
        assert_eq!(conf.maxquery, 30);
        assert_eq!(conf.chunksize, 262144);
    }

    #[test]
    fn partial_file_overrides() {
        let conf: Config =
            serde_json::from_str(r#"{"host": "aa.example.net", "maxquery": 4}"#).unwrap();
        assert_eq!(
            conf.appliance_url(),
            "http://aa.example.net:17665/mgmt/bpl/getApplianceInfo"
        );
        assert_eq!(conf.maxquery, 4);
        assert_eq!(conf.defaultcount, 1000);
    }

    #[test]
    fn explicit_url_wins() {
        let conf: Config =
            serde_json::from_str(r#"{"url": "https://aa/info", "host": "ignored"}"#).unwrap();
        assert_eq!(conf.appliance_url(), "https://aa/info");
    }
}
