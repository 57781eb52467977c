use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::relocate::CollisionPolicy;

/// Name of the per-directory config file.
pub const LOCAL_CONFIG_FILE: &str = ".retitler.toml";

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    pub service: Option<ServiceConfig>,
    pub paths: Option<PathsConfig>,
    pub processing: Option<ProcessingConfig>,
    pub summary: Option<SummaryConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub url: Option<String>,
    pub timeout_secs: Option<u64>,
    pub disabled: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    pub source_dir: Option<String>,
    pub dest_dir: Option<String>,
    pub log_file: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingConfig {
    pub num_workers: Option<usize>,
    pub collision_policy: Option<CollisionPolicy>,
    pub dry_run: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryConfig {
    pub format: Option<String>,
    pub path: Option<String>,
}

/// Platform config directory path: `<config_dir>/retitler/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("retitler").join("config.toml"))
}

/// Load config by cascading CWD `.retitler.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(Path::new(LOCAL_CONFIG_FILE));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unparseable config file");
            None
        }
    }
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    ConfigFile {
        service: Some(ServiceConfig {
            url: overlay
                .service
                .as_ref()
                .and_then(|s| s.url.clone())
                .or_else(|| base.service.as_ref().and_then(|s| s.url.clone())),
            timeout_secs: overlay
                .service
                .as_ref()
                .and_then(|s| s.timeout_secs)
                .or_else(|| base.service.as_ref().and_then(|s| s.timeout_secs)),
            disabled: overlay
                .service
                .as_ref()
                .and_then(|s| s.disabled)
                .or_else(|| base.service.as_ref().and_then(|s| s.disabled)),
        }),
        paths: Some(PathsConfig {
            source_dir: overlay
                .paths
                .as_ref()
                .and_then(|p| p.source_dir.clone())
                .or_else(|| base.paths.as_ref().and_then(|p| p.source_dir.clone())),
            dest_dir: overlay
                .paths
                .as_ref()
                .and_then(|p| p.dest_dir.clone())
                .or_else(|| base.paths.as_ref().and_then(|p| p.dest_dir.clone())),
            log_file: overlay
                .paths
                .as_ref()
                .and_then(|p| p.log_file.clone())
                .or_else(|| base.paths.as_ref().and_then(|p| p.log_file.clone())),
        }),
        processing: Some(ProcessingConfig {
            num_workers: overlay
                .processing
                .as_ref()
                .and_then(|p| p.num_workers)
                .or_else(|| base.processing.as_ref().and_then(|p| p.num_workers)),
            collision_policy: overlay
                .processing
                .as_ref()
                .and_then(|p| p.collision_policy)
                .or_else(|| base.processing.as_ref().and_then(|p| p.collision_policy)),
            dry_run: overlay
                .processing
                .as_ref()
                .and_then(|p| p.dry_run)
                .or_else(|| base.processing.as_ref().and_then(|p| p.dry_run)),
        }),
        summary: Some(SummaryConfig {
            format: overlay
                .summary
                .as_ref()
                .and_then(|s| s.format.clone())
                .or_else(|| base.summary.as_ref().and_then(|s| s.format.clone())),
            path: overlay
                .summary
                .as_ref()
                .and_then(|s| s.path.clone())
                .or_else(|| base.summary.as_ref().and_then(|s| s.path.clone())),
        }),
    }
}

/// Save the config to the platform config directory.
pub fn save_config(config: &ConfigFile) -> Result<PathBuf, String> {
    let path = config_path().ok_or_else(|| "Could not determine config directory".to_string())?;
    save_to_path(config, &path)?;
    Ok(path)
}

/// Write the config as pretty TOML, creating parent directories.
pub fn save_to_path(config: &ConfigFile, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let content =
        toml::to_string_pretty(config).map_err(|e| format!("Failed to serialize config: {}", e))?;
    std::fs::write(path, content).map_err(|e| format!("Failed to write config: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_file() {
        let toml_str = "[service]\nurl = \"http://grobid:8070/api/processHeaderDocument\"\n\n[processing]\ncollision_policy = \"skip\"\n";
        let parsed: ConfigFile = toml::from_str(toml_str).unwrap();
        assert_eq!(
            parsed.service.unwrap().url.unwrap(),
            "http://grobid:8070/api/processHeaderDocument"
        );
        assert_eq!(
            parsed.processing.unwrap().collision_policy,
            Some(CollisionPolicy::Skip)
        );
        assert!(parsed.paths.is_none());
    }

    #[test]
    fn unknown_policy_is_rejected() {
        let toml_str = "[processing]\ncollision_policy = \"rename\"\n";
        assert!(toml::from_str::<ConfigFile>(toml_str).is_err());
    }

    #[test]
    fn merge_overlay_wins() {
        let base = ConfigFile {
            paths: Some(PathsConfig {
                dest_dir: Some("/base/out".to_string()),
                log_file: Some("/base/retitler.log".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let overlay = ConfigFile {
            paths: Some(PathsConfig {
                dest_dir: Some("/overlay/out".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let merged = merge(base, overlay).paths.unwrap();
        assert_eq!(merged.dest_dir.unwrap(), "/overlay/out");
        assert_eq!(merged.log_file.unwrap(), "/base/retitler.log");
    }

    #[test]
    fn merge_base_preserved_when_overlay_absent() {
        let base = ConfigFile {
            processing: Some(ProcessingConfig {
                num_workers: Some(4),
                ..Default::default()
            }),
            ..Default::default()
        };
        let merged = merge(base, ConfigFile::default());
        assert_eq!(merged.processing.unwrap().num_workers, Some(4));
    }

    #[test]
    fn save_and_load_from_path() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("config.toml");
        let config = ConfigFile {
            service: Some(ServiceConfig {
                timeout_secs: Some(30),
                disabled: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        };
        save_to_path(&config, &path).unwrap();
        assert_eq!(load_from_path(&path), Some(config));
    }

    #[test]
    fn missing_file_loads_as_none() {
        assert!(load_from_path(Path::new("/no/such/retitler.toml")).is_none());
    }
}
