//! Bake session options.
//!
//! Built by the embedding command layer (or loaded from JSON) before a
//! bake starts and immutable for the whole frame loop.

use crate::error::{BakeError, Result};
use crate::resolver::CycleMode;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BakeMode {
    /// One transformed snapshot duplicate per particle per output frame;
    /// no keyframes, no life tracking.
    Static,
    /// One keyframed duplicate per particle, alive/dead tracked across
    /// the frame range.
    Animated,
}

impl BakeMode {
    pub fn label(self) -> &'static str {
        match self {
            BakeMode::Static => "static",
            BakeMode::Animated => "animated",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BakeConfig {
    pub start_frame: i32,
    pub end_frame: i32,
    #[serde(default = "BakeConfig::default_frame_step")]
    pub frame_step: i32,
    #[serde(default = "BakeConfig::default_mode")]
    pub mode: BakeMode,
    /// Share shape data between the duplicates and the templates instead
    /// of copying it. Incompatible with per-particle blend conversion;
    /// see the rotation scheme in [`crate::template::TemplateSet`].
    #[serde(default)]
    pub copy_as_instance: bool,
    #[serde(default)]
    pub cycling: CycleMode,
    /// Scene frame rate, used to convert frame-denominated cycle steps
    /// to seconds.
    #[serde(default = "BakeConfig::default_fps")]
    pub fps: f64,
    /// Which instancer of the particle system is being uninstanced.
    #[serde(default)]
    pub instancer_slot: usize,
    /// Particle ids to bake; empty bakes every particle.
    #[serde(default)]
    pub target_ids: Vec<i64>,
}

impl BakeConfig {
    pub fn new(start_frame: i32, end_frame: i32) -> BakeConfig {
        BakeConfig {
            start_frame,
            end_frame,
            frame_step: Self::default_frame_step(),
            mode: Self::default_mode(),
            copy_as_instance: false,
            cycling: CycleMode::default(),
            fps: Self::default_fps(),
            instancer_slot: 0,
            target_ids: Vec::new(),
        }
    }

    fn default_frame_step() -> i32 {
        1
    }

    fn default_mode() -> BakeMode {
        BakeMode::Static
    }

    fn default_fps() -> f64 {
        24.0
    }

    pub fn validate(&self) -> Result<()> {
        if self.end_frame < self.start_frame {
            return Err(BakeError::Configuration(format!(
                "end frame {} precedes start frame {}",
                self.end_frame, self.start_frame
            )));
        }
        if self.frame_step < 1 {
            return Err(BakeError::Configuration(format!(
                "frame step must be at least 1, got {}",
                self.frame_step
            )));
        }
        if self.fps <= 0.0 {
            return Err(BakeError::Configuration(format!(
                "frame rate must be positive, got {}",
                self.fps
            )));
        }
        if let CycleMode::Sequential { step, .. } = self.cycling {
            if step <= 0.0 {
                return Err(BakeError::Configuration(format!(
                    "sequential cycle step must be positive, got {step}"
                )));
            }
        }
        Ok(())
    }

    pub fn load_from_path(path: &Path) -> anyhow::Result<BakeConfig> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read bake config {}", path.display()))?;
        let config: BakeConfig = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse bake config {}", path.display()))?;
        config.validate().with_context(|| format!("Invalid bake config {}", path.display()))?;
        Ok(config)
    }
}
