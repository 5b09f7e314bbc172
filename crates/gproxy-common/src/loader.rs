//! Configuration file loading (spec.md §1 treats this as an external
//! collaborator; SPEC_FULL.md §10.C gives it a concrete home since the
//! binary has to load something to run).

use std::path::Path;

use crate::config::GatewayConfig;
use crate::error::ConfigError;

/// Loads `providers`/`api_keys` from a JSON or YAML file, format chosen by
/// the file extension (`.yaml`/`.yml` → YAML, anything else → JSON).
pub fn load(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let is_yaml = matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml") | Some("yml")
    );

    let config: GatewayConfig = if is_yaml {
        serde_yaml::from_str(&contents).map_err(|err| ConfigError::Parse {
            path: path.to_path_buf(),
            format: "yaml",
            message: err.to_string(),
        })?
    } else {
        serde_json::from_str(&contents).map_err(|err| ConfigError::Parse {
            path: path.to_path_buf(),
            format: "json",
            message: err.to_string(),
        })?
    };

    if config.providers.is_empty() {
        return Err(ConfigError::NoProviders);
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp(contents: &str, suffix: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join(format!("config{suffix}"));
        std::fs::write(&path, contents).expect("write temp config file");
        (dir, path)
    }

    #[test]
    fn loads_valid_json_config() {
        let json = r#"{"providers":[{"provider":"A","base_url":"https://api.openai.com/v1","api_key":"sk-x","model":{"gpt-4":"gpt-4-0613"}}],"api_keys":[]}"#;
        let (_dir, path) = write_temp(json, ".json");
        let config = load(&path).unwrap();
        assert_eq!(config.providers.len(), 1);
    }

    #[test]
    fn loads_valid_yaml_config() {
        let yaml = "providers:\n  - provider: A\n    base_url: https://api.openai.com/v1\n    api_key: sk-x\n    model:\n      gpt-4: gpt-4-0613\napi_keys: []\n";
        let (_dir, path) = write_temp(yaml, ".yaml");
        let config = load(&path).unwrap();
        assert_eq!(config.providers.len(), 1);
        assert_eq!(config.providers[0].provider, "A");
    }

    #[test]
    fn empty_providers_is_rejected() {
        let json = r#"{"providers":[],"api_keys":[]}"#;
        let (_dir, path) = write_temp(json, ".json");
        assert!(matches!(load(&path), Err(ConfigError::NoProviders)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let path = Path::new("/nonexistent/gproxy-config-does-not-exist.json");
        assert!(matches!(load(path), Err(ConfigError::Io { .. })));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let (_dir, path) = write_temp("{not valid json", ".json");
        assert!(matches!(load(&path), Err(ConfigError::Parse { .. })));
    }
}
