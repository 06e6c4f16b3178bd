//! Builder configuration: the options recognized by [`crate::record::RagFile::new`]
//! (spec §6). An explicit, closed configuration value with `deny_unknown_fields`
//! so unrecognized options are rejected rather than silently accepted, mirroring
//! the teacher's `Config` shape in its own `config.rs` (nested `#[serde(default)]`
//! structs with a `Default` impl and a loader that never hard-fails the run).

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct MinhashParams {
    pub ngram_chars: usize,
    pub ngram_words: usize,
    pub ngram_tokens: usize,
    pub permute: u16,
    pub seed: u64,
}

impl Default for MinhashParams {
    fn default() -> Self {
        Self {
            ngram_chars: 3,
            ngram_words: 2,
            ngram_tokens: 2,
            permute: 128,
            seed: 42,
        }
    }
}

/// Whether to materialize a scan vector for coarse Hamming pre-filtering.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScanVectorConfig {
    /// Sign-quantize the dense vector (spec §6 default).
    Auto,
    /// Do not store a scan vector (flag bit 1 unset).
    Disabled,
}

impl ScanVectorConfig {
    pub fn enabled(&self) -> bool {
        matches!(self, ScanVectorConfig::Auto)
    }
}

impl Default for ScanVectorConfig {
    fn default() -> Self {
        ScanVectorConfig::Auto
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct BuilderConfig {
    pub minhash: MinhashParams,
    pub scan_vector: ScanVectorConfig,
    pub store_dense_as_f16: bool,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            minhash: MinhashParams::default(),
            scan_vector: ScanVectorConfig::default(),
            store_dense_as_f16: true,
        }
    }
}

/// Load a `BuilderConfig` from a JSON file, falling back to defaults on any
/// read or parse failure — matches the teacher's `load_config` behavior of
/// never hard-failing the whole run over a malformed/absent config file.
pub fn load_config(path: &Path) -> BuilderConfig {
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(_) => return BuilderConfig::default(),
    };
    serde_json::from_str::<BuilderConfig>(&text).unwrap_or_else(|e| {
        crate::debug_log!("[ragfile] config at {} is invalid ({e}), using defaults", path.display());
        BuilderConfig::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = BuilderConfig::default();
        assert_eq!(cfg.minhash.ngram_chars, 3);
        assert_eq!(cfg.minhash.ngram_words, 2);
        assert_eq!(cfg.minhash.ngram_tokens, 2);
        assert_eq!(cfg.minhash.permute, 128);
        assert_eq!(cfg.minhash.seed, 42);
        assert!(cfg.store_dense_as_f16);
        assert_eq!(cfg.scan_vector, ScanVectorConfig::Auto);
    }

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        let cfg = load_config(Path::new("/does/not/exist/ragfile.json"));
        assert_eq!(cfg, BuilderConfig::default());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let bad = r#"{"minhash": {"permute": 128}, "bogus_option": true}"#;
        let result: Result<BuilderConfig, _> = serde_json::from_str(bad);
        assert!(result.is_err());
    }
}
