use std::borrow::Cow;
use std::fmt::Write;

use serde::Serialize;

use crate::config::LoadConfig;
use crate::data_formats::variables::Vars;
use crate::error::ScriptError;
use crate::Vec3;

/// Index of an arena within its level.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ArenaId(pub usize);

pub mod door_flags {
	pub const OPEN: u32 = 0x1;
	pub const OPENING: u32 = 0x2;
	pub const CLOSING: u32 = 0x4;
	pub const CLOSED: u32 = 0x8;
	pub const HIDE_WHEN_OPEN: u32 = 0x10;
	pub const STAY_OPEN: u32 = 0x20;
	pub const LOCKED: u32 = 0x40;
	pub const JUST_NUKED: u32 = 0x80;
	pub const HIDE_LOCK: u32 = 0x100;

	pub(super) static NAMES: &[(u32, &str)] = &[
		(OPEN, "OPEN"),
		(OPENING, "OPENING"),
		(CLOSING, "CLOSING"),
		(CLOSED, "CLOSED"),
		(HIDE_WHEN_OPEN, "HIDE_WHEN_OPEN"),
		(STAY_OPEN, "STAY_OPEN"),
		(LOCKED, "LOCKED"),
		(JUST_NUKED, "JUST_NUKED"),
		(HIDE_LOCK, "HIDE_LOCK"),
	];
}

/// Door flag word, displayed as `NAME|NAME (0xN)`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DoorFlags(pub u32);

impl std::fmt::Display for DoorFlags {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let mut first = true;
		let mut rest = self.0;
		for &(mask, name) in door_flags::NAMES {
			if self.0 & mask == mask {
				if first {
					first = false;
				} else {
					f.write_char('|')?;
				}
				f.write_str(name)?;
				rest &= !mask;
			}
		}
		if rest != 0 {
			if !first {
				f.write_char('|')?;
			}
			write!(f, "0x{rest:X}")?;
		}
		write!(f, " (0x{:X})", self.0)
	}
}

/// An animation reference: either named in place or an offset to animation data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum AnimRef<'a> {
	Named(&'a str),
	Offset(u32),
}

impl std::fmt::Display for AnimRef<'_> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			AnimRef::Named(name) => f.write_str(name),
			AnimRef::Offset(offset) => write!(f, "{offset:06X}"),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Door<'a> {
	pub target_arena: ArenaId,
	/// Flattened into the entity, so kept apart from the entity's own flags.
	#[serde(rename = "door_flags")]
	pub flags: DoorFlags,
	pub open_distance: f32,
	/// Open and close animations.
	pub anims: Option<[AnimRef<'a>; 2]>,
	/// Open, close, open finished and close finished sounds.
	pub sounds: Option<[&'a str; 4]>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
#[serde(tag = "kind")]
pub enum EntityKind<'a> {
	#[default]
	Plain,
	Door(Door<'a>),
	Pickup,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScriptState {
	/// No active cursor.
	#[default]
	Idle,
	/// Has a cursor and will run on its next invocation.
	Running,
	/// Waiting for its delay to count down.
	Blocked,
	Terminated,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Termination {
	EndOfScript,
	Cleared,
	Destroyed,
	Unmodeled { opcode: u8, offset: usize },
	Error(ScriptError),
}

impl std::fmt::Display for Termination {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Termination::EndOfScript => f.write_str("finished script"),
			Termination::Cleared => f.write_str("script cleared"),
			Termination::Destroyed => f.write_str("destroyed"),
			Termination::Unmodeled { opcode, offset } => {
				write!(f, "stopped at unmodeled opcode {opcode:02X} ({offset:06X})")
			}
			Termination::Error(err) => write!(f, "error: {err}"),
		}
	}
}

impl Serialize for Termination {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: serde::Serializer,
	{
		serializer.collect_str(self)
	}
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct Entity<'a> {
	pub name: Cow<'a, str>,
	pub id: i32,
	pub arena: ArenaId,
	/// Set on the implicit entity every arena carries for its own script.
	pub is_arena: bool,
	#[serde(flatten)]
	pub kind: EntityKind<'a>,
	pub position: Vec3,
	pub angle: f32,
	pub health: u16,
	pub vars: Vars,
	pub flags: u32,
	pub min_order_range: u8,
	pub max_order_range: u8,
	pub animation: Option<AnimRef<'a>>,

	/// Where the next invocation starts. Zero means no script.
	pub script_offset: usize,
	/// Anchor a return instruction jumps back to.
	pub anchor_offset: usize,
	/// Where a delayed script continues once its delay runs out.
	pub resume_offset: usize,
	pub delay: f32,
	pub state: ScriptState,
	pub termination: Option<Termination>,

	#[serde(skip)]
	pub log: Vec<String>,
}

impl<'a> Entity<'a> {
	pub fn new(
		name: impl Into<Cow<'a, str>>, id: i32, arena: ArenaId, kind: EntityKind<'a>,
		config: &LoadConfig,
	) -> Self {
		Entity {
			name: name.into(),
			id,
			arena,
			kind,
			health: config.default_health,
			..Default::default()
		}
	}

	pub fn new_door(
		name: impl Into<Cow<'a, str>>, id: i32, arena: ArenaId, target_arena: ArenaId,
		config: &LoadConfig,
	) -> Self {
		let door = Door {
			target_arena,
			flags: DoorFlags(door_flags::CLOSED),
			open_distance: config.door_open_distance,
			anims: None,
			sounds: None,
		};
		Entity::new(name, id, arena, EntityKind::Door(door), config)
	}

	pub fn as_door_mut(&mut self) -> Option<&mut Door<'a>> {
		match &mut self.kind {
			EntityKind::Door(door) => Some(door),
			_ => None,
		}
	}

	/// Points the entity at a fresh script, or leaves it idle for offset zero.
	pub fn begin(&mut self, offset: u32) {
		self.script_offset = offset as usize;
		self.anchor_offset = 0;
		self.resume_offset = 0;
		self.delay = 0.0;
		self.termination = None;
		self.state = if offset == 0 {
			ScriptState::Idle
		} else {
			ScriptState::Running
		};
	}

	pub fn terminate(&mut self, reason: Termination) {
		self.log.push(reason.to_string());
		self.state = ScriptState::Terminated;
		self.script_offset = 0;
		self.termination = Some(reason);
	}

	/// Whether the entity is gone for good rather than just finished.
	pub fn is_destroyed_or_failed(&self) -> bool {
		matches!(
			self.termination,
			Some(
				Termination::Destroyed
					| Termination::Error(_)
					| Termination::Cleared
					| Termination::Unmodeled { .. }
			)
		)
	}

	pub fn is_runnable(&self) -> bool {
		self.state == ScriptState::Running && self.script_offset != 0
	}

	/// Name used for trace output: `NAME_ID`, or just the arena name.
	pub fn display_name(&self) -> String {
		if self.is_arena {
			self.name.to_string()
		} else {
			format!("{}_{}", self.name, self.id)
		}
	}

	pub fn trace(&self) -> String {
		let mut text = String::new();
		for line in &self.log {
			text.push_str(line);
			text.push('\n');
		}
		text
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_door_flag_names() {
		assert_eq!(DoorFlags(0x8).to_string(), "CLOSED (0x8)");
		assert_eq!(
			DoorFlags(door_flags::LOCKED | door_flags::OPEN).to_string(),
			"OPEN|LOCKED (0x41)"
		);
		assert_eq!(DoorFlags(0x1200).to_string(), "0x1200 (0x1200)");
		assert_eq!(DoorFlags(0x201).to_string(), "OPEN|0x200 (0x201)");
	}

	#[test]
	fn test_new_entities() {
		let config = LoadConfig::default();
		let plain = Entity::new("GUARD", 2, ArenaId(1), EntityKind::Plain, &config);
		assert_eq!(plain.health, config.default_health);
		assert_eq!(plain.state, ScriptState::Idle);
		assert_eq!(plain.display_name(), "GUARD_2");

		let mut door = Entity::new_door("DOOR", 1, ArenaId(0), ArenaId(1), &config);
		let Some(fields) = door.as_door_mut() else {
			panic!("not a door");
		};
		assert_eq!(fields.flags, DoorFlags(door_flags::CLOSED));
		assert_eq!(fields.open_distance, config.door_open_distance);
		assert_eq!(fields.target_arena, ArenaId(1));
	}

	#[test]
	fn test_lifecycle() {
		let config = LoadConfig::default();
		let mut entity = Entity::new("GUARD", 0, ArenaId(0), EntityKind::Pickup, &config);
		entity.begin(0x400);
		assert!(entity.is_runnable());
		entity.terminate(Termination::EndOfScript);
		assert_eq!(entity.state, ScriptState::Terminated);
		assert!(!entity.is_destroyed_or_failed());
		assert_eq!(entity.trace(), "finished script\n");

		entity.begin(0);
		assert_eq!(entity.state, ScriptState::Idle);
		assert_eq!(entity.termination, None);
		entity.terminate(Termination::Destroyed);
		assert!(entity.is_destroyed_or_failed());
	}

	#[test]
	fn test_serialize() {
		let config = LoadConfig::default();
		let door = Entity::new_door("DOOR", 1, ArenaId(0), ArenaId(2), &config);
		let json = serde_json::to_value(&door).unwrap();
		assert_eq!(json["kind"], "Door");
		assert_eq!(json["target_arena"], 2);
		assert_eq!(json["door_flags"], 8);
		assert_eq!(json["flags"], 0);
		assert_eq!(json["name"], "DOOR");

		let text = serde_json::to_string(&door).unwrap();
		assert_eq!(text.matches("\"flags\":").count(), 1);
		assert_eq!(text.matches("\"door_flags\":").count(), 1);
	}
}
