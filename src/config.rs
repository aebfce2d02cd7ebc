//! Tunables for a level load.
//!
//! Every field has a default, so an empty TOML document is a valid config.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Health an entity starts with until a script sets it.
pub const HEALTH_DEFAULT: u16 = 100;
/// The other default health seen in older decoder revisions.
pub const HEALTH_DEFAULT_ALT: u16 = 1;

/// Distance at which a door starts opening, until a script sets it.
pub const DOOR_OPEN_DISTANCE_DEFAULT: f32 = 200.0;
/// The other default open distance seen in older decoder revisions.
pub const DOOR_OPEN_DISTANCE_ALT: f32 = 0.0;

/// Door flag bits that describe the current open/close state.
pub const DOOR_STATE_MASK: u32 = 0xF;

/// How a set-door-flags instruction combines with the existing flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoorFlagPolicy {
	/// Overwrite every bit.
	Replace,
	/// Keep the open/opening/closing/closed bits and replace the rest.
	#[default]
	PreserveState,
}

impl DoorFlagPolicy {
	pub fn apply(self, current: u32, new: u32) -> u32 {
		match self {
			DoorFlagPolicy::Replace => new,
			DoorFlagPolicy::PreserveState => (current & DOOR_STATE_MASK) | (new & !DOOR_STATE_MASK),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoadConfig {
	/// Rounds of delay countdown and re-invocation after the four load passes.
	pub tick_iterations: usize,
	/// Amount subtracted from every pending delay per round.
	pub tick_delta: f32,
	/// Instructions a single script invocation may execute.
	pub max_instructions: usize,
	/// Nesting depth of setup scripts run from spawn instructions.
	pub max_call_depth: usize,
	pub default_health: u16,
	pub door_open_distance: f32,
	pub door_flag_policy: DoorFlagPolicy,
}

impl Default for LoadConfig {
	fn default() -> Self {
		LoadConfig {
			tick_iterations: 4,
			tick_delta: 1.0,
			max_instructions: 10_000,
			max_call_depth: 16,
			default_health: HEALTH_DEFAULT,
			door_open_distance: DOOR_OPEN_DISTANCE_DEFAULT,
			door_flag_policy: DoorFlagPolicy::default(),
		}
	}
}

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("failed to read config: {0}")]
	Io(#[from] std::io::Error),
	#[error("failed to parse config: {0}")]
	Parse(#[from] toml::de::Error),
}

impl LoadConfig {
	pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
		Ok(toml::from_str(text)?)
	}

	pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let text = std::fs::read_to_string(path)?;
		Self::from_toml(&text)
	}
}
