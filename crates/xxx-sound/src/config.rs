use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;
const MIN_CHUNK_SIZE: usize = 64;

/// What to do when a container's leading tag byte is wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MagicPolicy {
    /// Log a warning and keep going.
    #[default]
    Lenient,
    /// Fail with `FormatError::BadMagic`.
    Strict,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    pub magic_policy: MagicPolicy,
    pub max_samples: u32,
    pub chunk_size: usize,
    pub fsb5_fallback_size: u64,
    pub mpeg_min_frames: u32,
    pub short_payload_ratio: [u64; 2],
    pub write_manifest: bool,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            magic_policy: MagicPolicy::Lenient,
            max_samples: 2000,
            chunk_size: DEFAULT_CHUNK_SIZE,
            fsb5_fallback_size: 0x10000,
            mpeg_min_frames: 3,
            short_payload_ratio: [2, 3],
            write_manifest: true,
        }
    }
}

impl ToolConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(Error::Config)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size.max(MIN_CHUNK_SIZE)
    }

    /// True when `payload` is small enough relative to `slot` that playback
    /// metadata is likely stale.
    pub fn is_short_payload(&self, payload: u64, slot: u64) -> bool {
        let [num, den] = self.short_payload_ratio;
        den != 0 && payload.saturating_mul(den) < slot.saturating_mul(num)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: ToolConfig = serde_json::from_str(r#"{"magic_policy":"strict","mpeg_min_frames":5}"#).unwrap();
        assert_eq!(cfg.magic_policy, MagicPolicy::Strict);
        assert_eq!(cfg.mpeg_min_frames, 5);
        assert_eq!(cfg.max_samples, 2000);
        assert_eq!(cfg.chunk_size, DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tool.json");
        fs::write(&path, "{ not json").unwrap();
        let err = ToolConfig::load(&path).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().starts_with("Invalid config"));
    }

    #[test]
    fn chunk_size_is_clamped() {
        let cfg = ToolConfig { chunk_size: 1, ..Default::default() };
        assert_eq!(cfg.chunk_size(), 64);
    }

    #[test]
    fn short_payload_threshold() {
        let cfg = ToolConfig::default();
        assert!(cfg.is_short_payload(600, 1000));
        assert!(!cfg.is_short_payload(700, 1000));
        assert!(!cfg.is_short_payload(0, 0));
    }
}
