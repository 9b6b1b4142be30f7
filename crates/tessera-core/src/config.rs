//! Engine configuration.

use std::path::PathBuf;

use crate::model::RngType;
use crate::translate::OutputType;

/// Environment variable pinning the random seed used by every run.
pub const ENV_RNG_SEED: &str = "TESSERA_RNG_SEED";

/// Environment variable selecting the random-number generator.
pub const ENV_RNG_TYPE: &str = "TESSERA_RNG";

/// Environment variable forcing all compiled modules into one directory.
pub const ENV_BUILD_DIR: &str = "TESSERA_BUILD_DIR";

/// Configuration for the build/execute engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Generator the model seeds for every parallel lane.
    pub rng_type: RngType,

    /// Pinned seed. When `None`, seeds are drawn from the OS entropy source.
    pub rng_seed: Option<u64>,

    /// Directory receiving every compiled module, overriding the
    /// document-relative location.
    pub build_dir: Option<PathBuf>,

    /// Directory used for documents that have never been saved.
    pub temp_dir: PathBuf,

    /// Artifact kind requested from the translator.
    pub output_type: OutputType,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rng_type: RngType::default(),
            rng_seed: None,
            build_dir: None,
            temp_dir: std::env::temp_dir(),
            output_type: OutputType::DynamicLibrary,
        }
    }
}

impl EngineConfig {
    /// Create a config from defaults overridden by `TESSERA_*` environment
    /// variables. Malformed values are ignored with a warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(seed) = std::env::var(ENV_RNG_SEED) {
            match seed.trim().parse::<u64>() {
                Ok(seed) => config.rng_seed = Some(seed),
                Err(e) => tracing::warn!("Ignoring {}={:?}: {}", ENV_RNG_SEED, seed, e),
            }
        }

        if let Ok(name) = std::env::var(ENV_RNG_TYPE) {
            match name.parse::<RngType>() {
                Ok(rng_type) => config.rng_type = rng_type,
                Err(e) => tracing::warn!("Ignoring {}: {}", ENV_RNG_TYPE, e),
            }
        }

        if let Ok(dir) = std::env::var(ENV_BUILD_DIR) {
            if !dir.is_empty() {
                config.build_dir = Some(PathBuf::from(dir));
            }
        }

        config
    }

    /// Pin the random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    pub fn with_rng_type(mut self, rng_type: RngType) -> Self {
        self.rng_type = rng_type;
        self
    }

    /// Place every compiled module in `dir`.
    pub fn with_build_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.build_dir = Some(dir.into());
        self
    }

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }
}
