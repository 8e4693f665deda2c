use crate::errors::TapeError;
use crate::memgraph::MAX_ID_BASE;
use crate::recording::DEFAULT_IGNORED_METHODS;
use crate::runtime::FileSystem;
use crate::wire::WireFormat;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_path: Option<PathBuf>,
    pub format: Option<WireFormat>,
    pub continue_on_exception: bool,
    pub verify_results: bool,
    pub log_path: Option<PathBuf>,
    pub id_base: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TapeConfig {
    pub recording: RecordingConfig,
    pub playback: PlaybackConfig,
    pub backend: BackendConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordingConfig {
    /// Format used when writing logs and when an input's extension is ambiguous.
    pub format: WireFormat,
    pub ignored_methods: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlaybackConfig {
    pub halt_on_exception: bool,
    pub verify_results: bool,
    pub log_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackendConfig {
    pub id_base: i64,
}

impl Default for TapeConfig {
    fn default() -> Self {
        Self {
            recording: RecordingConfig {
                format: WireFormat::Json,
                ignored_methods: DEFAULT_IGNORED_METHODS
                    .iter()
                    .map(|method| method.to_string())
                    .collect(),
            },
            playback: PlaybackConfig {
                halt_on_exception: true,
                verify_results: false,
                log_path: None,
            },
            backend: BackendConfig { id_base: 0 },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialTapeConfig {
    recording: Option<PartialRecordingConfig>,
    playback: Option<PartialPlaybackConfig>,
    backend: Option<PartialBackendConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialRecordingConfig {
    format: Option<WireFormat>,
    ignored_methods: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialPlaybackConfig {
    halt_on_exception: Option<bool>,
    verify_results: Option<bool>,
    log_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialBackendConfig {
    id_base: Option<i64>,
}

pub fn load_config(
    overrides: &CliOverrides,
    process_cwd: &Path,
    fs: &dyn FileSystem,
) -> Result<TapeConfig, TapeError> {
    let mut cfg = TapeConfig::default();

    if let Some(path) = &overrides.config_path {
        let file_contents = fs.read_to_string(&absolutize_path(process_cwd, path))?;
        let partial: PartialTapeConfig = toml::from_str(&file_contents)
            .map_err(|e| TapeError::ConfigParse(e.to_string()))?;
        merge_partial_config(&mut cfg, partial);
    }

    apply_cli_overrides(&mut cfg, overrides);
    if let Some(path) = &cfg.playback.log_path {
        cfg.playback.log_path = Some(absolutize_path(process_cwd, path));
    }

    validate_config(&cfg)?;
    Ok(cfg)
}

fn merge_partial_config(cfg: &mut TapeConfig, partial: PartialTapeConfig) {
    if let Some(recording) = partial.recording {
        if let Some(format) = recording.format {
            cfg.recording.format = format;
        }
        if let Some(ignored_methods) = recording.ignored_methods {
            cfg.recording.ignored_methods = ignored_methods;
        }
    }

    if let Some(playback) = partial.playback {
        if let Some(value) = playback.halt_on_exception {
            cfg.playback.halt_on_exception = value;
        }
        if let Some(value) = playback.verify_results {
            cfg.playback.verify_results = value;
        }
        if let Some(log_path) = playback.log_path {
            cfg.playback.log_path = Some(log_path);
        }
    }

    if let Some(backend) = partial.backend {
        if let Some(id_base) = backend.id_base {
            cfg.backend.id_base = id_base;
        }
    }
}

fn apply_cli_overrides(cfg: &mut TapeConfig, overrides: &CliOverrides) {
    if let Some(format) = overrides.format {
        cfg.recording.format = format;
    }
    if overrides.continue_on_exception {
        cfg.playback.halt_on_exception = false;
    }
    if overrides.verify_results {
        cfg.playback.verify_results = true;
    }
    if let Some(log_path) = &overrides.log_path {
        cfg.playback.log_path = Some(log_path.clone());
    }
    if let Some(id_base) = overrides.id_base {
        cfg.backend.id_base = id_base;
    }
}

fn absolutize_path(base: &Path, value: &Path) -> PathBuf {
    if value.is_absolute() {
        value.to_path_buf()
    } else {
        base.join(value)
    }
}

fn validate_config(cfg: &TapeConfig) -> Result<(), TapeError> {
    if cfg.backend.id_base < 0 {
        return Err(TapeError::InvalidConfig(
            "backend.id_base must not be negative".to_string(),
        ));
    }
    if cfg.backend.id_base > MAX_ID_BASE {
        return Err(TapeError::InvalidConfig(format!(
            "backend.id_base must not exceed {MAX_ID_BASE}"
        )));
    }

    for method in &cfg.recording.ignored_methods {
        if method.trim().is_empty() || method.contains(char::is_whitespace) {
            return Err(TapeError::InvalidConfig(format!(
                "recording.ignored_methods contains invalid method name {method:?}"
            )));
        }
    }

    Ok(())
}
