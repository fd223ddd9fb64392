//! Optional TOML settings file for the CLI.
//!
//! Persistence of configuration is the caller's concern, not the core's;
//! this is the CLI's rendering of it. Values here are defaults and CLI
//! flags override them.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::config::ConfigUpdate;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Pipeline defaults, merged onto the built-in configuration.
    pub denoise: ConfigUpdate,
    pub input_device: Option<String>,
    pub output_device: Option<String>,
    pub block_frames: Option<usize>,
}

impl Settings {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading settings file {}", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("parsing settings file {}", path.display()))
    }
}
