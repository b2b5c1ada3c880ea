//! Simple configuration persistence for Trill Flight
//!
//! Audio, smoothing and mapping parameters in a key=value text file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Application configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Input device name, system default when unset
    pub input_device: Option<String>,
    /// Samples per pitch estimate
    pub buffer_size: usize,
    /// New samples between estimates
    pub hop_size: usize,
    /// Pitch samples averaged by the stabilizer
    pub history_size: usize,
    /// Outlier threshold in semitones
    pub max_deviation: f32,
    /// UDP port for trill state
    pub trill_port: u16,
    /// UDP port for remote pitch; when set the microphone is not opened
    pub pitch_port: Option<u16>,
    /// Added to the MIDI pitch before clamping
    pub pitch_offset: f32,
    pub pitch_min: f32,
    pub pitch_max: f32,
    /// Seconds per beat
    pub time_ratio: f32,
    /// Stop after this many seconds (0 runs until the input fails)
    pub run_seconds: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_device: None,
            buffer_size: 2048,
            hop_size: 1024,
            history_size: 10,
            max_deviation: 10.0,
            trill_port: 5007,
            pitch_port: None,
            pitch_offset: 40.0,
            pitch_min: 0.0,
            pitch_max: 150.0,
            time_ratio: 0.3,
            run_seconds: 0,
        }
    }
}

impl Config {
    /// Load config from the default location
    ///
    /// Returns default config if the file doesn't exist or can't be read.
    pub fn load() -> Self {
        Self::load_or_init(&Self::config_path())
    }

    /// Load config from `path`, writing the defaults there on first run
    pub fn load_or_init(path: &Path) -> Self {
        match Self::load_from(path) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config");
                config
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let config = Self::default();
                // Best effort, defaults still apply if the directory is read-only
                match config.save_to(path) {
                    Ok(()) => tracing::info!(path = %path.display(), "wrote default config"),
                    Err(e) => tracing::debug!(path = %path.display(), "config not written: {}", e),
                }
                config
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), "using default config: {}", e);
                Self::default()
            }
        }
    }

    /// Load config from a specific path
    pub fn load_from(path: &Path) -> io::Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    /// Save config to a specific path
    pub fn save_to(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.serialize())
    }

    /// Get the default config file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("trill-flight")
            .join("config.txt")
    }

    /// Parse config from simple key=value format
    fn parse(content: &str) -> Self {
        let mut config = Self::default();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                tracing::warn!(line, "ignoring malformed config line");
                continue;
            };
            let key = key.trim();
            let value = value.trim();

            match key {
                "input_device" => {
                    config.input_device = (!value.is_empty()).then(|| value.to_string());
                }
                "buffer_size" => set(key, value, &mut config.buffer_size),
                "hop_size" => set(key, value, &mut config.hop_size),
                "history_size" => set(key, value, &mut config.history_size),
                "max_deviation" => set_finite(key, value, &mut config.max_deviation),
                "trill_port" => set(key, value, &mut config.trill_port),
                "pitch_port" => {
                    if value.is_empty() {
                        config.pitch_port = None;
                    } else {
                        let mut port = 0u16;
                        set(key, value, &mut port);
                        config.pitch_port = (port != 0).then_some(port);
                    }
                }
                "pitch_offset" => set_finite(key, value, &mut config.pitch_offset),
                "pitch_min" => set_finite(key, value, &mut config.pitch_min),
                "pitch_max" => set_finite(key, value, &mut config.pitch_max),
                "time_ratio" => set_finite(key, value, &mut config.time_ratio),
                "run_seconds" => set(key, value, &mut config.run_seconds),
                _ => {} // Ignore unknown keys
            }
        }

        config
    }

    /// Serialize config to simple key=value format
    fn serialize(&self) -> String {
        let mut lines = vec!["# Trill Flight Configuration".to_string()];

        if let Some(ref device) = self.input_device {
            lines.push(format!("input_device={}", device));
        }
        lines.push(format!("buffer_size={}", self.buffer_size));
        lines.push(format!("hop_size={}", self.hop_size));
        lines.push(format!("history_size={}", self.history_size));
        lines.push(format!("max_deviation={}", self.max_deviation));
        lines.push(format!("trill_port={}", self.trill_port));
        if let Some(port) = self.pitch_port {
            lines.push(format!("pitch_port={}", port));
        }
        lines.push(format!("pitch_offset={}", self.pitch_offset));
        lines.push(format!("pitch_min={}", self.pitch_min));
        lines.push(format!("pitch_max={}", self.pitch_max));
        lines.push(format!("time_ratio={}", self.time_ratio));
        lines.push(format!("run_seconds={}", self.run_seconds));

        lines.join("\n")
    }
}

/// Parse `value` into `field`, keeping the old value on failure
fn set<T: FromStr>(key: &str, value: &str, field: &mut T) {
    match value.parse() {
        Ok(parsed) => *field = parsed,
        Err(_) => tracing::warn!(key, value, "ignoring invalid config value"),
    }
}

/// Like [`set`], but `nan` and `inf` count as invalid too
fn set_finite(key: &str, value: &str, field: &mut f32) {
    match value.parse::<f32>() {
        Ok(parsed) if parsed.is_finite() => *field = parsed,
        _ => tracing::warn!(key, value, "ignoring invalid config value"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty() {
        assert_eq!(Config::parse(""), Config::default());
    }

    #[test]
    fn test_parse_values() {
        let config = Config::parse(
            "# Comment\ninput_device=USB Mic\nhistory_size=5\nmax_deviation=7.5\npitch_port=5005",
        );
        assert_eq!(config.input_device.as_deref(), Some("USB Mic"));
        assert_eq!(config.history_size, 5);
        assert_eq!(config.max_deviation, 7.5);
        assert_eq!(config.pitch_port, Some(5005));
        assert_eq!(config.trill_port, 5007);
    }

    #[test]
    fn test_bad_values_keep_defaults() {
        let config = Config::parse("buffer_size=lots\ntrill_port=99999\nnonsense\nfoo=bar");
        assert_eq!(config.buffer_size, 2048);
        assert_eq!(config.trill_port, 5007);
    }

    #[test]
    fn test_non_finite_floats_keep_defaults() {
        let config = Config::parse(
            "pitch_min=nan\npitch_max=inf\npitch_offset=-inf\nmax_deviation=NaN\ntime_ratio=infinity",
        );
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_first_run_writes_defaults() {
        let dir = std::env::temp_dir().join(format!("trill-flight-init-{}", std::process::id()));
        let path = dir.join("config.txt");
        let _ = fs::remove_dir_all(&dir);

        assert_eq!(Config::load_or_init(&path), Config::default());
        assert!(path.exists());
        assert_eq!(Config::load_from(&path).unwrap(), Config::default());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = Config {
            input_device: Some("Built-in".to_string()),
            pitch_port: Some(6000),
            time_ratio: 0.25,
            ..Config::default()
        };
        assert_eq!(Config::parse(&config.serialize()), config);
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir()
            .join(format!("trill-flight-test-{}", std::process::id()))
            .join("config.txt");
        let config = Config {
            history_size: 3,
            ..Config::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }
}
