use crate::params::ALL_PARAMS;
use crate::reporter::DEFAULT_PUBLISH_QUEUE;
use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::collections::{BTreeMap, HashMap};
use std::env;
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "DATACLEAN_";

fn params_file_path() -> Option<PathBuf> {
    env::var("DATACLEAN_PARAMS_PATH")
        .ok()
        .map(|path| path.trim().to_string())
        .filter(|path| !path.is_empty())
        .map(PathBuf::from)
}

/// Reads a JSON object of cleaning parameters. Non-string scalars are
/// accepted and stringified so `"window_size": 32` works as expected.
fn load_params_file(path: &Path) -> Result<BTreeMap<String, String>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read parameter file {}", path.display()))?;
    let mut bytes = contents.into_bytes();
    let raw: HashMap<String, serde_json::Value> = simd_json::serde::from_slice(&mut bytes)
        .with_context(|| format!("failed to parse parameter file {}", path.display()))?;

    let mut params = BTreeMap::new();
    for (key, value) in raw {
        let value = match value {
            serde_json::Value::String(s) => s,
            serde_json::Value::Null => continue,
            other => other.to_string(),
        };
        params.insert(key, value);
    }
    Ok(params)
}

fn env_key(param: &str) -> String {
    format!("{ENV_PREFIX}{}", param.to_ascii_uppercase())
}

/// Overlays `DATACLEAN_<PARAM>` variables on `params`. Empty values are
/// ignored.
fn apply_env_overrides(params: &mut BTreeMap<String, String>, lookup: impl Fn(&str) -> Option<String>) {
    for param in ALL_PARAMS {
        if let Some(value) = lookup(&env_key(param))
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
        {
            params.insert(param.to_string(), value);
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    /// Raw cleaning parameters; validated by `CleaningParams::from_params`.
    pub params: BTreeMap<String, String>,
    pub publish_queue: usize,
    pub otlp_endpoint: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let mut params = match params_file_path() {
            Some(path) if path.exists() => load_params_file(&path)?,
            Some(path) => {
                tracing::warn!(
                    path = %path.display(),
                    "dataclean parameter file not found; using env only"
                );
                BTreeMap::new()
            }
            None => BTreeMap::new(),
        };
        apply_env_overrides(&mut params, |key| env::var(key).ok());

        let publish_queue = env::var("DATACLEAN_PUBLISH_QUEUE")
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|v| *v != 0)
            .unwrap_or(DEFAULT_PUBLISH_QUEUE);
        let otlp_endpoint = env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        Ok(Self {
            params,
            publish_queue,
            otlp_endpoint,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_are_prefixed_and_uppercased() {
        assert_eq!(env_key("window_size"), "DATACLEAN_WINDOW_SIZE");
        assert_eq!(env_key("metadata_server_url"), "DATACLEAN_METADATA_SERVER_URL");
    }

    #[test]
    fn env_overrides_win_and_blanks_are_ignored() {
        let mut params = BTreeMap::from([
            ("model".to_string(), "constant".to_string()),
            ("window_size".to_string(), "8".to_string()),
        ]);
        let env = HashMap::from([
            ("DATACLEAN_MODEL", " linear "),
            ("DATACLEAN_WINDOW_SIZE", "  "),
            ("DATACLEAN_ERROR_BOUND", "0.25"),
        ]);
        apply_env_overrides(&mut params, |key| env.get(key).map(|v| v.to_string()));

        assert_eq!(params.get("model").map(String::as_str), Some("linear"));
        assert_eq!(params.get("window_size").map(String::as_str), Some("8"));
        assert_eq!(params.get("error_bound").map(String::as_str), Some("0.25"));
        assert!(!params.contains_key("station"));
    }

    #[test]
    fn params_file_stringifies_scalars() {
        let path = env::temp_dir().join(format!("dataclean-params-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"{"model": "quadratic", "window_size": 32, "error_bound": 0.5, "station": null}"#,
        )
        .unwrap();
        let params = load_params_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(params.get("model").map(String::as_str), Some("quadratic"));
        assert_eq!(params.get("window_size").map(String::as_str), Some("32"));
        assert_eq!(params.get("error_bound").map(String::as_str), Some("0.5"));
        assert!(!params.contains_key("station"));
    }
}
