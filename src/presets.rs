use once_cell::sync::Lazy;
use serde::Deserialize;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::chain::VocalChain;
use crate::params::{ParamError, ParamRegistry};

// =============================================================================
// FACTORY PRESETS
// =============================================================================

#[derive(Debug, Error)]
pub enum PresetError {
    #[error("no preset named '{0}'")]
    NotFound(String),
    #[error("preset '{preset}': {source}")]
    Param {
        preset: String,
        #[source]
        source: ParamError,
    },
    #[error("malformed preset table: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A named set of parameter keys and physical values.
/// Keys left out keep their defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct FactoryPreset {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub values: BTreeMap<String, f32>,
}

#[derive(Debug, Default)]
pub struct PresetManager {
    presets: Vec<FactoryPreset>,
}

static FACTORY: Lazy<PresetManager> = Lazy::new(PresetManager::new);

impl PresetManager {
    /// Load the baked-in presets. This is fallible but non-fatal: a malformed
    /// table leaves an empty manager.
    pub fn new() -> Self {
        match Self::from_json(include_str!("../presets.json")) {
            Ok(manager) => {
                log::debug!("loaded {} factory presets", manager.presets.len());
                manager
            }
            Err(e) => {
                log::warn!("factory presets unavailable: {e}");
                Self::default()
            }
        }
    }

    /// Parse a preset table and check every key against the registry.
    pub fn from_json(json: &str) -> Result<Self, PresetError> {
        let presets: Vec<FactoryPreset> = serde_json::from_str(json)?;
        let registry = ParamRegistry::global();
        for preset in &presets {
            for key in preset.values.keys() {
                registry.by_key(key).map_err(|source| PresetError::Param {
                    preset: preset.name.clone(),
                    source,
                })?;
            }
        }
        Ok(Self { presets })
    }

    pub fn factory() -> &'static PresetManager {
        &FACTORY
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.presets.iter().map(|p| p.name.as_str())
    }

    pub fn get(&self, name: &str) -> Result<&FactoryPreset, PresetError> {
        self.presets
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| PresetError::NotFound(name.to_string()))
    }
}

impl VocalChain {
    /// Reset to defaults, then apply the preset's values.
    /// An unknown key fails before anything changes.
    pub fn apply_preset(&mut self, preset: &FactoryPreset) -> Result<(), PresetError> {
        let registry = ParamRegistry::global();
        let mut specs = Vec::with_capacity(preset.values.len());
        for (key, &value) in &preset.values {
            let spec = registry.by_key(key).map_err(|source| PresetError::Param {
                preset: preset.name.clone(),
                source,
            })?;
            specs.push((*spec, value));
        }

        self.load_defaults();
        for (spec, value) in &specs {
            self.write_value(spec, *value);
        }
        log::info!("applied preset '{}'", preset.name);
        Ok(())
    }

    /// Apply a factory preset by name (case-insensitive).
    pub fn apply_factory_preset(&mut self, name: &str) -> Result<(), PresetError> {
        let preset = PresetManager::factory().get(name)?;
        self.apply_preset(preset)
    }
}
