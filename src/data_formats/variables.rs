//! Script variable references.
//!
//! Level, arena and entity each own four float slots. An operand names one of
//! them with a scope byte and an index byte, or carries an immediate float.

use crate::error::ScriptError;
use crate::reader::Reader;

pub const VAR_SLOTS: usize = 4;

pub type Vars = [f32; VAR_SLOTS];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarScope {
	Level,
	Arena,
	Entity,
	Immediate,
	Dynamic,
	Door,
}

pub fn scope_name(tag: u8) -> &'static str {
	match VarScope::from_tag(tag) {
		Ok(scope) => scope.name(),
		Err(_) => "Unknown",
	}
}

impl VarScope {
	pub fn from_tag(tag: u8) -> Result<Self, ScriptError> {
		Ok(match tag {
			0 => VarScope::Level,
			1 => VarScope::Arena,
			2 => VarScope::Entity,
			3 => VarScope::Immediate,
			4 => VarScope::Dynamic,
			5 => VarScope::Door,
			tag => return Err(ScriptError::UnknownScope { tag }),
		})
	}

	pub fn name(self) -> &'static str {
		match self {
			VarScope::Level => "Level",
			VarScope::Arena => "Arena",
			VarScope::Entity => "Entity",
			VarScope::Immediate => "Immediate",
			VarScope::Dynamic => "Dynamic",
			VarScope::Door => "Door",
		}
	}

	fn check_supported(self) -> Result<(), ScriptError> {
		match self {
			VarScope::Dynamic | VarScope::Door => Err(ScriptError::UnsupportedScope {
				scope: self.name(),
			}),
			_ => Ok(()),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VarRef {
	Slot { scope: VarScope, index: u8 },
	Immediate(f32),
}

impl std::fmt::Display for VarRef {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			VarRef::Slot { scope, index } => write!(f, "{}_vars[{index}]", scope.name()),
			VarRef::Immediate(value) => write!(f, "{value}"),
		}
	}
}

fn read_index(reader: &mut Reader) -> Result<u8, ScriptError> {
	let index = reader.u8()?;
	if (index as usize) < VAR_SLOTS {
		Ok(index)
	} else {
		Err(ScriptError::VarIndex { index })
	}
}

/// Reads a value operand: scope byte, then an index or an immediate float.
pub fn read_var_or_value(reader: &mut Reader) -> Result<VarRef, ScriptError> {
	let scope = VarScope::from_tag(reader.u8()?)?;
	scope.check_supported()?;
	if scope == VarScope::Immediate {
		Ok(VarRef::Immediate(reader.f32()?))
	} else {
		Ok(VarRef::Slot {
			scope,
			index: read_index(reader)?,
		})
	}
}

/// Reads the scope and index of a variable that is about to be written.
pub fn read_var_target(reader: &mut Reader, opcode: u8) -> Result<(VarScope, u8), ScriptError> {
	let scope = VarScope::from_tag(reader.u8()?)?;
	scope.check_supported()?;
	if scope == VarScope::Immediate {
		return Err(ScriptError::ImmediateTarget { opcode });
	}
	Ok((scope, read_index(reader)?))
}

/// Mutable view of the three slot arrays visible to one entity.
pub struct VarEnv<'v> {
	pub level: &'v mut Vars,
	pub arena: &'v mut Vars,
	pub entity: &'v mut Vars,
}

impl VarEnv<'_> {
	pub fn slot_mut(&mut self, scope: VarScope, index: u8) -> Result<&mut f32, ScriptError> {
		scope.check_supported()?;
		let vars = match scope {
			VarScope::Level => &mut *self.level,
			VarScope::Arena => &mut *self.arena,
			VarScope::Entity => &mut *self.entity,
			_ => return Err(ScriptError::UnsupportedScope { scope: scope.name() }),
		};
		vars.get_mut(index as usize)
			.ok_or(ScriptError::VarIndex { index })
	}

	pub fn resolve(&mut self, var: VarRef) -> Result<f32, ScriptError> {
		match var {
			VarRef::Immediate(value) => Ok(value),
			VarRef::Slot { scope, index } => self.slot_mut(scope, index).map(|slot| *slot),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn env_with<'v>(level: &'v mut Vars, arena: &'v mut Vars, entity: &'v mut Vars) -> VarEnv<'v> {
		VarEnv {
			level,
			arena,
			entity,
		}
	}

	#[test]
	fn test_resolve_scopes() {
		let (mut level, mut arena, mut entity) = ([1.0, 2.0, 3.0, 4.0], [10.0; 4], [0.0, 0.0, 0.0, 7.5]);
		let mut env = env_with(&mut level, &mut arena, &mut entity);

		let data = [0, 2, 1, 0, 2, 3];
		let mut reader = Reader::new(&data);
		let level_var = read_var_or_value(&mut reader).unwrap();
		let arena_var = read_var_or_value(&mut reader).unwrap();
		let entity_var = read_var_or_value(&mut reader).unwrap();
		assert_eq!(env.resolve(level_var), Ok(3.0));
		assert_eq!(env.resolve(arena_var), Ok(10.0));
		assert_eq!(env.resolve(entity_var), Ok(7.5));
		assert_eq!(entity_var.to_string(), "Entity_vars[3]");
	}

	#[test]
	fn test_immediate() {
		let mut data = vec![3];
		data.extend_from_slice(&2.5f32.to_le_bytes());
		data.push(0xAA);
		let mut reader = Reader::new(&data);
		let var = read_var_or_value(&mut reader).unwrap();
		assert_eq!(var, VarRef::Immediate(2.5));
		assert_eq!(reader.position(), 5);
	}

	#[test]
	fn test_rejects_bad_references() {
		let mut reader = Reader::new(&[4, 0]);
		assert_eq!(
			read_var_or_value(&mut reader),
			Err(ScriptError::UnsupportedScope { scope: "Dynamic" })
		);
		let mut reader = Reader::new(&[5, 0]);
		assert_eq!(
			read_var_or_value(&mut reader),
			Err(ScriptError::UnsupportedScope { scope: "Door" })
		);
		let mut reader = Reader::new(&[9, 0]);
		assert_eq!(
			read_var_or_value(&mut reader),
			Err(ScriptError::UnknownScope { tag: 9 })
		);
		let mut reader = Reader::new(&[1, 4]);
		assert_eq!(
			read_var_or_value(&mut reader),
			Err(ScriptError::VarIndex { index: 4 })
		);
		let mut reader = Reader::new(&[3, 0, 0]);
		assert!(matches!(
			read_var_or_value(&mut reader),
			Err(ScriptError::Format(_))
		));
	}

	#[test]
	fn test_write_target() {
		let mut reader = Reader::new(&[2, 1]);
		assert_eq!(read_var_target(&mut reader, 0x41), Ok((VarScope::Entity, 1)));
		let mut reader = Reader::new(&[3, 1]);
		assert_eq!(
			read_var_target(&mut reader, 0x41),
			Err(ScriptError::ImmediateTarget { opcode: 0x41 })
		);

		let (mut level, mut arena, mut entity) = ([0.0; 4], [0.0; 4], [0.0; 4]);
		let mut env = env_with(&mut level, &mut arena, &mut entity);
		*env.slot_mut(VarScope::Arena, 2).unwrap() += 4.0;
		assert_eq!(arena, [0.0, 0.0, 4.0, 0.0]);
	}

	#[test]
	fn test_scope_names() {
		assert_eq!(scope_name(0), "Level");
		assert_eq!(scope_name(5), "Door");
		assert_eq!(scope_name(42), "Unknown");
	}
}
