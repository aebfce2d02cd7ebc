//! Script execution.
//!
//! A script is a stream of one-byte opcodes, each followed by its operands.
//! Invoking an entity runs its script from the cursor until the script
//! blocks on a delay, returns, ends or fails. Instructions with no engine
//! behavior are decoded and traced so the cursor stays in step.

use std::fmt::Write;

use crate::config::LoadConfig;
use crate::data_formats::entity::{
	AnimRef, ArenaId, DoorFlags, Entity, EntityKind, ScriptState, Termination,
};
use crate::data_formats::disassembly::{Target, branch_targets};
use crate::data_formats::level::{BspEntity, Level};
use crate::data_formats::opcodes::{OpcodeShape, Operand, OperandValue, opcode_info};
use crate::data_formats::variables::{VarEnv, VarRef, read_var_or_value, read_var_target, scope_name};
use crate::error::{FormatError, ScriptError};
use crate::reader::{ReadResult, Reader};
use crate::Vec3;

type ScriptResult<T> = Result<T, ScriptError>;

/// Where an entity lives within its arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
	/// The arena's own script entity.
	Arena,
	Live(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityRef {
	pub arena: ArenaId,
	pub slot: Slot,
}

enum Flow {
	Continue,
	/// Stop for this invocation; the entity state says what happens next.
	Yield,
	Stop(Termination),
}

pub struct Interpreter<'l, 'a> {
	level: &'l mut Level<'a>,
	config: &'l LoadConfig,
	/// Set while setup templates run on scratch entities.
	dry_run: bool,
}

impl<'l, 'a> Interpreter<'l, 'a> {
	pub fn new(level: &'l mut Level<'a>, config: &'l LoadConfig) -> Self {
		Interpreter {
			level,
			config,
			dry_run: false,
		}
	}

	fn slot(&mut self, target: EntityRef) -> &mut Entity<'a> {
		let arena = &mut self.level.arenas[target.arena.0];
		match target.slot {
			Slot::Arena => &mut arena.entity,
			Slot::Live(index) => &mut arena.entities[index],
		}
	}

	/// Takes the entity out of its slot for the duration of `run`.
	///
	/// Entity lists only ever grow, so the slot is still valid afterwards
	/// even if `run` spawned more entities.
	fn with_entity<R>(
		&mut self, target: EntityRef, run: impl FnOnce(&mut Self, &mut Entity<'a>) -> R,
	) -> R {
		let mut entity = std::mem::take(self.slot(target));
		let result = run(self, &mut entity);
		*self.slot(target) = entity;
		result
	}

	/// Seeds one entity per placement record, running setup templates as they spawn.
	pub fn seed(&mut self, placements: &[BspEntity]) -> Result<(), FormatError> {
		for record in placements {
			let arena = self.level.require_arena(&record.arena)?;
			let key = format!("{}_{}", record.name, record.id);
			let init = match self.level.arenas[arena.0].init_offsets.get(&key) {
				Some(&offset) => offset,
				None => {
					log::debug!("no init script for {}", record.init_key());
					0
				}
			};
			let mut entity = Entity::new(
				record.name.clone(),
				record.id,
				arena,
				EntityKind::Plain,
				self.config,
			);
			entity.position = record.position;
			entity
				.log
				.push(format!("placed at {} (value {})", record.position, record.value));
			self.add_entity(entity, init, 1)?;
		}
		Ok(())
	}

	/// The four load passes, arena by arena.
	pub fn run_load_passes(&mut self) -> Result<(), FormatError> {
		for index in 0..self.level.arenas.len() {
			let arena = ArenaId(index);
			log::debug!("running arena {}", self.level.arenas[index].name);
			self.run_pass(arena)?;
			self.dry_run = true;
			let result = self.run_setup_templates(arena);
			self.dry_run = false;
			result?;
			self.invoke(EntityRef {
				arena,
				slot: Slot::Arena,
			})?;
			self.run_pass(arena)?;
		}
		Ok(())
	}

	/// Invokes every live entity of an arena once.
	///
	/// Entities spawned during the pass are left for the next one.
	pub fn run_pass(&mut self, arena: ArenaId) -> Result<(), FormatError> {
		let count = self.level.arenas[arena.0].entities.len();
		for index in 0..count {
			self.invoke(EntityRef {
				arena,
				slot: Slot::Live(index),
			})?;
		}
		Ok(())
	}

	fn run_setup_templates(&mut self, arena: ArenaId) -> Result<(), FormatError> {
		let templates = self.level.arenas[arena.0].setup_offsets.values.clone();
		for (name, offset) in templates {
			// door setups need a door to act on
			let kind = self.level.arenas[arena.0]
				.entities_named(&name)
				.next()
				.map(|entity| entity.kind.clone())
				.unwrap_or_default();
			let mut scratch = Entity::new(name.clone(), 0, arena, kind, self.config);
			scratch.begin(offset);
			self.run_entity(&mut scratch, 1)?;
			self.level.arenas[arena.0].setup_logs.insert(name, scratch.log);
		}
		Ok(())
	}

	pub fn run_ticks(&mut self) -> Result<(), FormatError> {
		for round in 0..self.config.tick_iterations {
			log::trace!("tick {round}");
			for index in 0..self.level.arenas.len() {
				let arena = ArenaId(index);
				self.tick(EntityRef {
					arena,
					slot: Slot::Arena,
				})?;
				let count = self.level.arenas[index].entities.len();
				for entity in 0..count {
					self.tick(EntityRef {
						arena,
						slot: Slot::Live(entity),
					})?;
				}
			}
		}
		Ok(())
	}

	/// Counts down a pending delay and invokes the entity if it can run.
	pub fn tick(&mut self, target: EntityRef) -> Result<(), FormatError> {
		let delta = self.config.tick_delta;
		self.with_entity(target, |this, entity| {
			if entity.state == ScriptState::Blocked {
				entity.delay -= delta;
				if entity.delay > 0.0 {
					return Ok(());
				}
				entity.delay = 0.0;
				entity.script_offset = entity.resume_offset;
				entity.resume_offset = 0;
				entity.state = ScriptState::Running;
				entity.log.push(format!("resume {:06X}", entity.script_offset));
			}
			this.run_entity(entity, 0)
		})
	}

	pub fn invoke(&mut self, target: EntityRef) -> Result<(), FormatError> {
		self.with_entity(target, |this, entity| this.run_entity(entity, 0))
	}

	/// Runs one invocation. Script errors stay with the entity unless they
	/// invalidate the whole level.
	fn run_entity(&mut self, entity: &mut Entity<'a>, depth: usize) -> Result<(), FormatError> {
		if !entity.is_runnable() {
			return Ok(());
		}
		let Err(err) = self.execute(entity, depth) else {
			return Ok(());
		};
		match err.into_fatal() {
			Ok(fatal) => {
				entity.terminate(Termination::Error(fatal.clone().into()));
				Err(fatal)
			}
			Err(err) => {
				log::warn!("{}: {err}", entity.display_name());
				entity.terminate(Termination::Error(err));
				Ok(())
			}
		}
	}

	fn execute(&mut self, entity: &mut Entity<'a>, depth: usize) -> ScriptResult<()> {
		let mut reader = Reader::new(self.level.bytecode);
		reader.set_position(entity.script_offset);

		let limit = self.config.max_instructions;
		for _ in 0..limit {
			let offset = reader.position();
			let opcode = reader.u8()?;
			if opcode == 0xFF {
				entity.terminate(Termination::EndOfScript);
				return Ok(());
			}

			let mut line = format!("[{offset:06X}: {opcode:02X} {}]", opcode_info(opcode).name);
			let flow = self.step(opcode, offset, entity, &mut reader, &mut line, depth);
			log::trace!("{}: {line}", entity.display_name());
			entity.log.push(line);

			match flow? {
				Flow::Continue => {}
				Flow::Yield => return Ok(()),
				Flow::Stop(reason) => {
					if let Termination::Unmodeled { .. } = reason {
						log::info!("{}: {reason}", entity.display_name());
					}
					entity.terminate(reason);
					return Ok(());
				}
			}
		}
		Err(ScriptError::InstructionLimit { limit })
	}

	fn step(
		&mut self, opcode: u8, offset: usize, entity: &mut Entity<'a>, reader: &mut Reader<'a>,
		line: &mut String, depth: usize,
	) -> ScriptResult<Flow> {
		let flow = match opcode {
			0x01 => {
				entity.anchor_offset = reader.position();
				let _ = write!(line, " anchor {:06X}", entity.anchor_offset);
				Flow::Continue
			}
			0x03 | 0x3B => {
				let anim = read_anim_ref(reader)?;
				let _ = write!(line, " {anim}");
				entity.animation = Some(anim);
				Flow::Continue
			}
			0x08 => {
				let yaw = reader.i16()?.rem_euclid(360);
				entity.angle = yaw as f32;
				let _ = write!(line, " yaw: {yaw}");
				Flow::Continue
			}
			0x09 | 0x7D => Flow::Stop(Termination::Cleared),
			0x0B | 0x49 => {
				let range = reader.u8()?;
				if opcode == 0x0B {
					entity.min_order_range = range;
				} else {
					entity.max_order_range = range;
				}
				let _ = write!(line, " {range}");
				Flow::Continue
			}
			0x10 => {
				entity.health = reader.u16()?;
				let _ = write!(line, " health: {}", entity.health);
				if entity.health == 0 {
					Flow::Stop(Termination::Destroyed)
				} else {
					Flow::Continue
				}
			}
			0x40 => self.delay(entity, reader, line)?,
			0x41 | 0x42 => {
				let (scope, index) = read_var_target(reader, opcode)?;
				let value = reader.f32()?;
				let mut env = self.var_env(entity);
				let slot = env.slot_mut(scope, index)?;
				if opcode == 0x41 {
					*slot = value;
				} else {
					*slot += value;
				}
				let _ = write!(line, " {}_vars[{index}] = {slot}", scope.name());
				Flow::Continue
			}
			0x4F => {
				entity.position = reader.vec3()?.into();
				let _ = write!(line, " {}", entity.position);
				Flow::Continue
			}
			0x74 | 0x75 => {
				let bits = reader.u32()?;
				if opcode == 0x74 {
					entity.flags |= bits;
				} else {
					entity.flags &= !bits;
				}
				let _ = write!(line, " {bits:#X} -> {:#X}", entity.flags);
				Flow::Continue
			}
			0x56 | 0x71 | 0xA1 | 0xE6 => {
				let position = Vec3::from(reader.vec3()?);
				let (angle, id) = if opcode == 0xE6 {
					(reader.f32()?, reader.i32()?)
				} else {
					(0.0, 0)
				};
				let name = reader.pascal_str()?;
				let init = reader.u32()?;
				let kind = if opcode == 0xA1 {
					EntityKind::Pickup
				} else {
					EntityKind::Plain
				};
				let mut child = Entity::new(name, id, entity.arena, kind, self.config);
				child.position = position;
				child.angle = angle;
				self.spawn(child, init, depth, line)?;
				Flow::Continue
			}
			0x95 => {
				let position = Vec3::from(reader.vec3()?);
				let angle = reader.f32()?;
				let id = reader.i32()?;
				let name = reader.pascal_str()?;
				let target = reader.pascal_str()?;
				let init = reader.u32()?;
				let target = self.level.require_arena(target)?;
				let mut child = Entity::new_door(name, id, entity.arena, target, self.config);
				child.position = position;
				child.angle = angle;
				let _ = write!(line, " to {}", self.level.arenas[target.0].name);
				self.spawn(child, init, depth, line)?;
				Flow::Continue
			}
			0x96..=0x99 => self.door_op(opcode, entity, reader, line)?,
			0xFD => {
				if entity.anchor_offset != 0 {
					entity.script_offset = entity.anchor_offset;
					let _ = write!(line, " to {:06X}", entity.script_offset);
				} else {
					entity.script_offset = 0;
					entity.state = ScriptState::Idle;
				}
				Flow::Yield
			}
			_ => match decode_irregular(opcode, offset, reader, &mut Vec::new())? {
				Some(text) => {
					line.push_str(&text);
					Flow::Continue
				}
				None => trace_operands(opcode, offset, reader, line)?,
			},
		};
		Ok(flow)
	}

	fn var_env<'s>(&'s mut self, entity: &'s mut Entity<'a>) -> VarEnv<'s> {
		let level = &mut *self.level;
		VarEnv {
			level: &mut level.vars,
			arena: &mut level.arenas[entity.arena.0].vars,
			entity: &mut entity.vars,
		}
	}

	fn delay(
		&mut self, entity: &mut Entity<'a>, reader: &mut Reader<'a>, line: &mut String,
	) -> ScriptResult<Flow> {
		let var = read_var_or_value(reader)?;
		let value = self.var_env(entity).resolve(var)?;
		let _ = write!(line, " {var}");
		if let VarRef::Slot { .. } = var {
			let _ = write!(line, " ({value})");
		}
		if value <= 0.0 {
			return Ok(Flow::Continue);
		}
		entity.delay = value;
		entity.resume_offset = reader.position();
		entity.script_offset = 0;
		entity.state = ScriptState::Blocked;
		Ok(Flow::Yield)
	}

	fn door_op(
		&mut self, opcode: u8, entity: &mut Entity<'a>, reader: &mut Reader<'a>, line: &mut String,
	) -> ScriptResult<Flow> {
		let policy = self.config.door_flag_policy;
		let Some(door) = entity.as_door_mut() else {
			return Err(ScriptError::NotADoor {
				opcode,
				entity: entity.display_name(),
			});
		};
		match opcode {
			0x96 => {
				let open = read_anim_ref(reader)?;
				let close = read_anim_ref(reader)?;
				let _ = write!(line, " open: {open}, close: {close}");
				door.anims = Some([open, close]);
			}
			0x97 => {
				let sounds = [
					reader.pascal_str()?,
					reader.pascal_str()?,
					reader.pascal_str()?,
					reader.pascal_str()?,
				];
				let _ = write!(line, " {sounds:?}");
				door.sounds = Some(sounds);
			}
			0x98 => {
				let flags = reader.u32()?;
				door.flags = DoorFlags(policy.apply(door.flags.0, flags));
				let _ = write!(line, " {}", door.flags);
			}
			_ => {
				door.open_distance = reader.f32()?;
				let _ = write!(line, " {}", door.open_distance);
			}
		}
		Ok(Flow::Continue)
	}

	fn spawn(
		&mut self, child: Entity<'a>, init: u32, depth: usize, line: &mut String,
	) -> Result<(), FormatError> {
		let _ = write!(line, " {} at {}, init {init:06X}", child.display_name(), child.position);
		if self.dry_run {
			line.push_str(" (spawn suppressed)");
			return Ok(());
		}
		self.add_entity(child, init, depth + 1)
	}

	/// Appends an entity to its arena, runs its setup template at `depth`, and
	/// points it at its init script.
	fn add_entity(&mut self, entity: Entity<'a>, init: u32, depth: usize) -> Result<(), FormatError> {
		let arena = &mut self.level.arenas[entity.arena.0];
		let setup = arena.setup_offsets.get(&entity.name).copied();
		let target = EntityRef {
			arena: entity.arena,
			slot: Slot::Live(arena.entities.len()),
		};
		arena.entities.push(entity);
		self.with_entity(target, |this, entity| this.prepare(entity, setup, init, depth))
	}

	fn prepare(
		&mut self, entity: &mut Entity<'a>, setup: Option<u32>, init: u32, depth: usize,
	) -> Result<(), FormatError> {
		if let Some(setup) = setup.filter(|&offset| offset != 0) {
			let limit = self.config.max_call_depth;
			if depth > limit {
				log::warn!("{}: setup nested too deep", entity.display_name());
				entity.terminate(Termination::Error(ScriptError::DepthLimit { limit }));
				return Ok(());
			}
			entity.log.push(format!("setup {setup:06X}"));
			entity.begin(setup);
			self.run_entity(entity, depth)?;
			if entity.is_destroyed_or_failed() {
				return Ok(());
			}
		}
		if init != 0 {
			entity.log.push(format!("init {init:06X}"));
		}
		entity.begin(init);
		Ok(())
	}
}

/// Reads an animation operand: an offset to animation data, which either
/// starts with a zero word and an inline name or is the animation itself.
pub(crate) fn read_anim_ref<'a>(reader: &mut Reader<'a>) -> ReadResult<AnimRef<'a>> {
	let offset = reader.u32()?;
	let resume = reader.position();
	reader.set_position(offset as usize);
	let anim = match reader.u32() {
		Ok(0) => Ok(reader.str(8).map_or(AnimRef::Offset(offset), AnimRef::Named)),
		Ok(_) => Ok(AnimRef::Offset(offset)),
		Err(err) => Err(err),
	};
	reader.set_position(resume);
	anim
}

/// Schema-only instructions: decode the operands for the trace and move on.
fn trace_operands(
	opcode: u8, offset: usize, reader: &mut Reader, line: &mut String,
) -> ScriptResult<Flow> {
	let shape = opcode_info(opcode).shape;
	match shape.read_operands(reader)? {
		Some(operands) => {
			write_operands(line, &operands);
			Ok(Flow::Continue)
		}
		None if shape == OpcodeShape::Invalid => Err(ScriptError::UnknownOpcode { opcode, offset }),
		None => Ok(Flow::Stop(Termination::Unmodeled { opcode, offset })),
	}
}

pub(crate) fn write_operands(line: &mut String, operands: &[OperandValue]) {
	for (index, operand) in operands.iter().enumerate() {
		line.push_str(if index == 0 { " " } else { ", " });
		let _ = write!(line, "{operand}");
	}
}

fn read_names<'a>(reader: &mut Reader<'a>, count: u8) -> ReadResult<Vec<&'a str>> {
	(0..count).map(|_| reader.pascal_str()).collect()
}

fn read_targets(reader: &mut Reader, count: u8, targets: &mut Vec<Target>) -> ReadResult<String> {
	let mut text = String::from("[");
	for index in 0..count {
		if index != 0 {
			text.push_str(", ");
		}
		let target = reader.u32()?;
		targets.push(Target::Block(target));
		let _ = write!(text, "{target:06X}");
	}
	text.push(']');
	Ok(text)
}

fn order_target_name(target: u8) -> &'static str {
	match target {
		2 => "Normal",
		3 => "Everyone",
		4 => "Single",
		5 => "Id",
		6 => "Visible",
		7 => "Children",
		9 => "Buddy",
		10 => "Height",
		_ => "Unknown",
	}
}

/// Decodes instructions whose operand layout depends on their own operand
/// values. Returns `None` for opcodes it does not handle.
///
/// Blocks, scripts and paths the instruction refers to are added to `targets`.
pub(crate) fn decode_irregular<'a>(
	opcode: u8, offset: usize, reader: &mut Reader<'a>, targets: &mut Vec<Target<'a>>,
) -> ScriptResult<Option<String>> {
	let bad = |value: u32| ScriptError::BadOperand {
		opcode,
		offset,
		value,
	};
	let mut text = String::new();
	macro_rules! w {
		($($arg:tt)*) => {{
			let _ = write!(text, $($arg)*);
		}};
	}

	match opcode {
		0x02 => {
			let path = reader.u32()?;
			targets.push(Target::Path(path));
			let (a, b, c) = (reader.u8()?, reader.u8()?, reader.u16()?);
			w!(" path: {path:06X}, values: {a}, {b}, {c}");
			match reader.u8()? {
				0 => w!(", point: {}", Vec3::from(reader.vec3()?)),
				1 => {}
				tag => return Err(bad(tag as u32)),
			}
		}
		0x04 => {
			let mut run_script = None;
			match reader.u8()? {
				7 => {
					let code = reader.u8()?;
					if code != 0xFC && code != 0x0C {
						return Err(bad(code as u32));
					}
					let script = reader.u32()?;
					w!(" run script {script:06X}");
					run_script = Some(script);
				}
				0x2B => {
					let [x, y] = reader.vec2()?;
					w!(" set home {x}, {y}");
				}
				1 => w!(" set home state"),
				order => w!(" order {order}"),
			}
			let target = reader.u8()?;
			w!(", target: {}", order_target_name(target));
			if target == 6 || target == 10 {
				w!(" {}", reader.f32()?);
			}
			let mut name = None;
			if matches!(target, 2 | 4 | 5 | 6 | 7 | 10) {
				let order_name = reader.pascal_str()?;
				w!(" \"{order_name}\"");
				name = Some(order_name);
			}
			if target == 5 {
				w!(" id {}", reader.u32()?);
			}
			if let Some(offset) = run_script {
				targets.push(Target::Script {
					name: name.unwrap_or("Unknown"),
					offset,
					reason: "Order",
				});
			}
		}
		0x0C | 0xFC => {
			let count = reader.u8()?;
			w!(" {}", read_targets(reader, count, targets)?);
		}
		0x1F | 0x20 => {
			let count = reader.u8()?;
			w!(" {:?}", read_names(reader, count)?);
		}
		0x2A => {
			let mut name = reader.pascal_str()?;
			if name.is_empty() {
				name = reader.pascal_str()?;
			}
			let branch = Operand::Branch.read(reader)?;
			branch_targets(&branch, targets);
			w!(" \"{name}\" {branch}");
		}
		0x3D => {
			if reader.u8()? == 0 {
				w!(" point {}", reader.u8()?);
			} else {
				w!(" \"{}\"", reader.pascal_str()?);
			}
			let name = reader.pascal_str()?;
			let init = reader.u32()?;
			w!(", \"{name}\", init {init:06X}");
			targets.push(Target::Script {
				name,
				offset: init,
				reason: opcode_info(opcode).name,
			});
		}
		0x53 => {
			if reader.peek::<u8>()? != 0xFF {
				w!(" {}", Operand::VarOrValue.read(reader)?);
			} else {
				reader.skip(1)?;
				let [target, speed] = reader.vec2()?;
				w!(" {target} at speed {speed}");
			}
		}
		0x59 => {
			let kind = reader.u8()?;
			if kind & 0x10 != 0 {
				w!(" at {}", Vec3::from(reader.vec3()?));
			} else if kind & 0x20 != 0 {
				w!(" at point {}", reader.u8()?);
			} else if kind & 0x40 != 0 {
				w!(" offset {}", Vec3::from(reader.vec3()?));
			}
			w!(" \"{}\"", reader.pascal_str()?);
		}
		0x5E | 0x5F => {
			let count = reader.u8()?;
			for index in 0..count {
				let weight = reader.u8()?;
				let target = reader.u32()?;
				targets.push(Target::Block(target));
				w!("{}{weight}: {target:06X}", if index == 0 { " " } else { ", " });
			}
		}
		0x81 => {
			let kind = reader.u8()?;
			let count = reader.u8()?;
			w!(" {kind} {:?}", read_names(reader, count)?);
		}
		0x84 => {
			let chance = reader.u8()?;
			let point = reader.u8()?;
			w!(" {chance}");
			if point == 0xFF {
				w!(" at {}", Vec3::from(reader.vec3()?));
			} else {
				w!(" at point {point}");
			}
		}
		0x9E => {
			let kind = reader.u8()?;
			let damage = reader.u16()?;
			let flags = reader.u8()?;
			let rest = reader.slice(3)?;
			w!(" {kind}, damage {damage}, flags {flags:#X}, {rest:02X?}");
			if flags & 2 != 0 {
				let target = reader.u32()?;
				targets.push(Target::Block(target));
				w!(", target {target:06X}");
			}
		}
		0x9F => {
			match reader.u8()? {
				0 => {}
				1 | 2 => w!(" from {}", Vec3::from(reader.vec3()?)),
				kind => return Err(bad(kind as u32)),
			}
			let velocity = Vec3::from(reader.vec3()?);
			let name = reader.pascal_str()?;
			let init = reader.u32()?;
			w!(" velocity {velocity}, \"{name}\", init {init:06X}");
			targets.push(Target::Script {
				name,
				offset: init,
				reason: opcode_info(opcode).name,
			});
		}
		0xA4 => {
			let code = reader.u8()?;
			w!(" {code}");
			if code != 0 {
				w!(" {:?}", reader.vec4()?);
			}
		}
		0xAC => {
			if reader.u8()? == 3 {
				w!(" at point {}", reader.u8()?);
			} else {
				w!(" at {}", Vec3::from(reader.vec3()?));
			}
			w!(", size {}", reader.f32()?);
		}
		0xAD => {
			let name = reader.pascal_str()?;
			if name.is_empty() {
				let name = reader.pascal_str()?;
				let delta = Vec3::from(reader.vec3()?);
				w!(" \"{name}\" offset {delta}, angle {}", reader.f32()?);
			} else {
				w!(" \"{name}\"");
			}
		}
		0xB2 => {
			if reader.u8()? == 3 {
				w!(" at point {}", reader.u8()?);
			} else {
				w!(" at {}", Vec3::from(reader.vec3()?));
			}
			let [radius, damage, force] = reader.vec3()?;
			w!(", radius {radius}, damage {damage}, force {force}, {}", reader.u8()?);
		}
		0xB4 => {
			if reader.u8()? != 0 {
				w!(" offset {}", Vec3::from(reader.vec3()?));
			}
		}
		0xB5 => match reader.u8()? {
			1 => {
				let index = reader.u8()?;
				let [a, b] = reader.vec2()?;
				w!(" {index}: {a}, {b}, {}", reader.i32()?);
			}
			0 => {
				let index = reader.u8()?;
				w!(" {index}: {:06X}", reader.u32()?);
			}
			kind => w!(" kind {kind}"),
		},
		0xB7 => {
			let scope = reader.u8()?;
			let index = reader.u8()?;
			let count = reader.u8()?;
			w!(
				" {}_vars[{index}] {}",
				scope_name(scope),
				read_targets(reader, count, targets)?
			);
		}
		0xBD => {
			let kind = reader.u8()?;
			if kind <= 1 {
				w!(" speed {}", reader.f32()?);
			}
			if kind == 0 {
				w!(", cap {}", reader.f32()?);
			}
		}
		0xC1 => {
			let code = reader.u8()?;
			w!(" {code}");
			if code == 3 {
				w!(" \"{}\"", reader.pascal_str()?);
			}
		}
		0xCB => {
			if reader.u8()? == 1 {
				w!(" {}", reader.f32()?);
			}
		}
		0xE0 => {
			if reader.u8()? != 0 {
				w!(" {:?}", reader.vec2()?);
			}
		}
		0xF2 => {
			if reader.u8()? != 0 {
				let mut matrix = [0.0f32; 12];
				for value in &mut matrix {
					*value = reader.f32()?;
				}
				w!(" {matrix:?}");
			}
		}
		0xF5 => {
			let mut len = reader.u8()?;
			if len == 0 {
				w!(" index {}", reader.u8()?);
				len = reader.u8()?;
			}
			w!(" \"{}\"", reader.str(len as usize)?);
		}
		0xF8 => {
			let kind = reader.u8()?;
			let [a, b] = reader.vec2()?;
			w!(" {kind}: {a}, {b}");
			if kind == 0 {
				w!(", {}", reader.f32()?);
			}
		}
		0xF9 => {
			let named = reader.u8()?;
			let branch = Operand::Branch.read(reader)?;
			branch_targets(&branch, targets);
			if named == 1 {
				w!(" \"{}\"", reader.pascal_str()?);
			}
			w!(" {branch}");
		}
		0xFA => {
			let index = reader.u8()?;
			if index == 0xFF {
				w!(" \"{}\"", reader.pascal_str()?);
			} else {
				w!(" part {index}");
			}
			if reader.u8()? == 2 {
				w!(" {:?}", reader.vec4()?);
			} else {
				let mut bounds = [0.0f32; 6];
				for value in &mut bounds {
					*value = reader.f32()?;
				}
				w!(" {bounds:?}");
			}
			let branch = Operand::Branch.read(reader)?;
			branch_targets(&branch, targets);
			w!(" {branch}");
		}
		_ => return Ok(None),
	}
	Ok(Some(text))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::data_formats::entity::door_flags;
	use crate::data_formats::level::{load, load_with_config};
	use crate::test_util::{CmiBuilder, Script};

	/// A level with one arena whose script spawns a `GUARD` running `init`.
	fn guard_level(init: &[u8]) -> (CmiBuilder, u32) {
		let mut cmi = CmiBuilder::new("LEVEL1");
		let init = cmi.blob(init);
		let arena = cmi.blob(&Script::new().spawn_entity([1.0, 2.0, 3.0], 90.0, 1, "GUARD", init).end());
		cmi.arena("ARENA1", arena);
		(cmi, init)
	}

	fn find_guard<'l, 'a>(level: &'l Level<'a>) -> &'l Entity<'a> {
		level.arenas[0].entities_named("GUARD").next().unwrap()
	}

	#[test_log::test]
	fn test_end_only_arena() {
		let mut cmi = CmiBuilder::new("LEVEL1");
		let script = cmi.blob(&Script::new().end());
		cmi.arena("ARENA1", script);
		let bytes = cmi.build();

		let level = load(&bytes, &[]).unwrap();
		let arena = &level.arenas[0];
		assert!(arena.entities.is_empty());
		assert_eq!(arena.entity.log, ["finished script"]);
		assert_eq!(arena.entity.termination, Some(Termination::EndOfScript));
	}

	#[test_log::test]
	fn test_spawn_door() {
		let mut cmi = CmiBuilder::new("LEVEL1");
		let init = cmi.blob(&Script::new().end());
		let script = cmi.blob(
			&Script::new()
				.spawn_door([0.0, 0.0, 64.0], 0.0, 1, "DOOR", "ARENA2", init)
				.end(),
		);
		cmi.arena("ARENA1", script);
		cmi.arena("ARENA2", 0);
		let bytes = cmi.build();

		let level = load(&bytes, &[]).unwrap();
		let arena = &level.arenas[0];
		assert_eq!(arena.entities.len(), 1);
		let door = &arena.entities[0];
		assert_eq!(door.name, "DOOR");
		assert_eq!(door.position, Vec3::new(0.0, 0.0, 64.0));
		let EntityKind::Door(fields) = &door.kind else {
			panic!("expected a door, got {:?}", door.kind);
		};
		assert_eq!(fields.target_arena, ArenaId(1));
		assert_eq!(fields.flags, DoorFlags(door_flags::CLOSED));
		assert_eq!(fields.open_distance, LoadConfig::default().door_open_distance);
		assert_eq!(door.termination, Some(Termination::EndOfScript));

		for arena in &level.arenas {
			assert!(arena.entities.iter().all(|entity| entity.arena == arena.id));
		}
		assert!(level.arenas[1].entities.is_empty());
	}

	#[test_log::test]
	fn test_unknown_door_arena_is_fatal() {
		let mut cmi = CmiBuilder::new("LEVEL1");
		let script = cmi.blob(
			&Script::new()
				.spawn_door([0.0; 3], 0.0, 1, "DOOR", "ARENA9", 0)
				.end(),
		);
		cmi.arena("ARENA1", script);
		let bytes = cmi.build();

		assert_eq!(
			load(&bytes, &[]).unwrap_err(),
			FormatError::UnknownArena {
				name: "ARENA9".into()
			}
		);
	}

	#[test_log::test]
	fn test_zero_health_stops_script() {
		let (mut cmi, _) = guard_level(&Script::new().set_health(0).op(0x74).u32(1).end());
		cmi.setup("ARENA1$GUARD", 0);
		let bytes = cmi.build();

		let level = load(&bytes, &[]).unwrap();
		let guard = find_guard(&level);
		assert_eq!(guard.health, 0);
		assert_eq!(guard.flags, 0);
		assert_eq!(guard.termination, Some(Termination::Destroyed));
		assert_eq!(guard.state, ScriptState::Terminated);
		assert_eq!(guard.log.last().map(String::as_str), Some("destroyed"));
	}

	#[test_log::test]
	fn test_delay_resumes_after_operand() {
		let script = Script::new().delay(2.0).op(0x74).u32(4).end();
		let (cmi, init) = guard_level(&script);
		let bytes = cmi.build();
		let resume = init as usize + 6;

		let config = LoadConfig {
			tick_iterations: 1,
			..Default::default()
		};
		let level = load_with_config(&bytes, &[], &config).unwrap();
		let guard = find_guard(&level);
		assert_eq!(guard.state, ScriptState::Blocked);
		assert_eq!(guard.resume_offset, resume);
		assert_eq!(guard.delay, 1.0);
		assert_eq!(guard.flags, 0);

		let level = load(&bytes, &[]).unwrap();
		let guard = find_guard(&level);
		assert_eq!(guard.flags, 4);
		assert_eq!(guard.termination, Some(Termination::EndOfScript));
		assert!(guard.log.contains(&format!("resume {resume:06X}")));
	}

	#[test_log::test]
	fn test_load_is_deterministic() {
		let script = Script::new()
			.op(0x42)
			.u8(1)
			.u8(0)
			.f32(1.5)
			.delay(1.0)
			.set_health(3)
			.spawn_pickup([4.0, 5.0, 6.0], "AMMO", 0)
			.end();
		let (cmi, _) = guard_level(&script);
		let bytes = cmi.build();

		let first = load(&bytes, &[]).unwrap();
		let second = load(&bytes, &[]).unwrap();
		assert_eq!(
			serde_json::to_value(&first).unwrap(),
			serde_json::to_value(&second).unwrap()
		);
		let traces = |level: &Level| -> Vec<Vec<String>> {
			level.arenas[0].entities.iter().map(|entity| entity.log.clone()).collect()
		};
		assert_eq!(traces(&first), traces(&second));
		assert_eq!(first.arenas[0].entities.len(), 2);
	}

	#[test_log::test]
	fn test_spawned_entities_wait_for_next_pass() {
		let mut cmi = CmiBuilder::new("LEVEL1");
		let child_init = cmi.blob(&Script::new().op(0x74).u32(1).end());
		let parent_init = cmi.blob(
			&Script::new()
				.spawn_entity([0.0; 3], 0.0, 2, "CHILD", child_init)
				.end(),
		);
		cmi.init("ARENA1$PARENT_1", parent_init);
		cmi.arena("ARENA1", 0);
		let bytes = cmi.build();

		let config = LoadConfig::default();
		let file = crate::file_formats::cmi::CmiFile::parse(&bytes).unwrap();
		let mut level = Level::from_cmi(file, &bytes, &config).unwrap();
		let placement = BspEntity {
			arena: "ARENA1".into(),
			name: "PARENT".into(),
			id: 1,
			position: Vec3::new(8.0, 0.0, 0.0),
			value: 0,
		};
		let mut interpreter = Interpreter::new(&mut level, &config);
		interpreter.seed(&[placement]).unwrap();
		interpreter.run_pass(ArenaId(0)).unwrap();
		drop(interpreter);

		let entities = &level.arenas[0].entities;
		assert_eq!(entities.len(), 2);
		assert_eq!(entities[0].position, Vec3::new(8.0, 0.0, 0.0));
		assert_eq!(entities[0].termination, Some(Termination::EndOfScript));
		assert_eq!(entities[1].state, ScriptState::Running);
		assert_eq!(entities[1].flags, 0);

		let mut interpreter = Interpreter::new(&mut level, &config);
		interpreter.run_pass(ArenaId(0)).unwrap();
		drop(interpreter);
		assert_eq!(level.arenas[0].entities[1].flags, 1);
	}

	#[test_log::test]
	fn test_unknown_placement_arena_is_fatal() {
		let mut cmi = CmiBuilder::new("LEVEL1");
		cmi.arena("ARENA1", 0);
		let bytes = cmi.build();
		let placement = BspEntity {
			arena: "ARENA7".into(),
			name: "HOTGEN".into(),
			id: 1,
			position: Vec3::default(),
			value: 0,
		};
		assert!(matches!(
			load(&bytes, &[placement]),
			Err(FormatError::UnknownArena { .. })
		));
	}

	#[test_log::test]
	fn test_unmodeled_and_unknown_opcodes() {
		let mut cmi = CmiBuilder::new("LEVEL1");
		let unmodeled = cmi.blob(&Script::new().op(0xB6).u8(0).end());
		let unknown = cmi.blob(&Script::new().op(0x07).end());
		let script = cmi.blob(
			&Script::new()
				.spawn_entity([0.0; 3], 0.0, 1, "A", unmodeled)
				.spawn_entity([0.0; 3], 0.0, 1, "B", unknown)
				.end(),
		);
		cmi.arena("ARENA1", script);
		let bytes = cmi.build();

		let level = load(&bytes, &[]).unwrap();
		let entities = &level.arenas[0].entities;
		assert_eq!(
			entities[0].termination,
			Some(Termination::Unmodeled {
				opcode: 0xB6,
				offset: unmodeled as usize
			})
		);
		assert_eq!(
			entities[1].termination,
			Some(Termination::Error(ScriptError::UnknownOpcode {
				opcode: 0x07,
				offset: unknown as usize
			}))
		);
		assert_eq!(entities[1].log[1], format!("[{unknown:06X}: 07 Invalid]"));
	}

	#[test_log::test]
	fn test_door_opcodes_need_a_door() {
		let (cmi, _) = guard_level(&Script::new().op(0x99).f32(50.0).end());
		let bytes = cmi.build();
		let level = load(&bytes, &[]).unwrap();
		assert_eq!(
			find_guard(&level).termination,
			Some(Termination::Error(ScriptError::NotADoor {
				opcode: 0x99,
				entity: "GUARD_1".into()
			}))
		);
	}

	#[test_log::test]
	fn test_door_setup() {
		let mut cmi = CmiBuilder::new("LEVEL1");
		let anim = cmi.blob(&Script::new().u32(0).bytes(b"DOORANIM").0);
		let setup = cmi.blob(
			&Script::new()
				.op(0x96)
				.u32(anim)
				.u32(0x0C)
				.op(0x97)
				.pstr("OPEN")
				.pstr("CLOSE")
				.pstr("")
				.pstr("")
				.op(0x98)
				.u32(door_flags::LOCKED | door_flags::OPEN)
				.op(0x99)
				.f32(50.0)
				.end(),
		);
		let switch = cmi.blob(
			&Script::new()
				.spawn_door([0.0; 3], 0.0, 1, "DOOR", "ARENA1", 0)
				.end(),
		);
		cmi.setup("ARENA1$DOOR", setup);
		cmi.init("ARENA1$SWITCH_1", switch);
		cmi.arena("ARENA1", 0);
		let bytes = cmi.build();
		let placement = BspEntity {
			arena: "ARENA1".into(),
			name: "SWITCH".into(),
			id: 1,
			position: Vec3::default(),
			value: 0,
		};

		let level = load(&bytes, &[placement]).unwrap();
		let door = &level.arenas[0].entities[1];
		let EntityKind::Door(fields) = &door.kind else {
			panic!("expected a door");
		};
		assert_eq!(
			fields.anims,
			Some([AnimRef::Named("DOORANIM"), AnimRef::Offset(0x0C)])
		);
		assert_eq!(fields.sounds, Some(["OPEN", "CLOSE", "", ""]));
		assert_eq!(fields.flags, DoorFlags(door_flags::CLOSED | door_flags::LOCKED));
		assert_eq!(fields.open_distance, 50.0);
		assert_eq!(door.state, ScriptState::Idle);

		// the door spawned in the first pass, so its template runs on a door
		let dry_run = level.arenas[0].setup_logs.get("DOOR").unwrap();
		assert_eq!(dry_run.last().map(String::as_str), Some("finished script"));
	}

	#[test_log::test]
	fn test_setup_templates_dry_run() {
		let mut cmi = CmiBuilder::new("LEVEL1");
		let setup = cmi.blob(
			&Script::new()
				.set_health(50)
				.spawn_entity([0.0; 3], 0.0, 7, "MINION", 0)
				.end(),
		);
		cmi.setup("ARENA1$GUARD", setup);
		cmi.arena("ARENA1", 0);
		let bytes = cmi.build();

		let level = load(&bytes, &[]).unwrap();
		let arena = &level.arenas[0];
		assert!(arena.entities.is_empty());
		let log = arena.setup_logs.get("GUARD").unwrap();
		assert!(log[1].ends_with("(spawn suppressed)"), "{log:?}");
		assert_eq!(log.last().map(String::as_str), Some("finished script"));
	}

	#[test_log::test]
	fn test_setup_runs_at_spawn() {
		let mut cmi = CmiBuilder::new("LEVEL1");
		let setup = cmi.blob(&Script::new().set_health(50).end());
		let init = cmi.blob(&Script::new().op(0x08).i16(-90).end());
		cmi.setup("ARENA1$HOTGEN", setup);
		cmi.init("ARENA1$HOTGEN_2", init);
		cmi.arena("ARENA1", 0);
		let bytes = cmi.build();
		let placement = BspEntity {
			arena: "ARENA1".into(),
			name: "HOTGEN".into(),
			id: 2,
			position: Vec3::default(),
			value: 5,
		};

		let level = load(&bytes, &[placement]).unwrap();
		let entity = &level.arenas[0].entities[0];
		assert_eq!(entity.health, 50);
		assert_eq!(entity.angle, 270.0);
		assert_eq!(entity.termination, Some(Termination::EndOfScript));
		assert!(entity.log.contains(&format!("setup {setup:06X}")));
		assert!(entity.log.contains(&format!("init {init:06X}")));
	}

	#[test_log::test]
	fn test_instruction_limit() {
		let mut script = Script::new();
		for _ in 0..5 {
			script = script.op(0x74).u32(1);
		}
		let (cmi, _) = guard_level(&script.end());
		let bytes = cmi.build();
		let config = LoadConfig {
			max_instructions: 3,
			..Default::default()
		};
		let level = load_with_config(&bytes, &[], &config).unwrap();
		assert_eq!(
			find_guard(&level).termination,
			Some(Termination::Error(ScriptError::InstructionLimit { limit: 3 }))
		);
	}

	#[test_log::test]
	fn test_setup_depth_limit() {
		let mut cmi = CmiBuilder::new("LEVEL1");
		let setup = cmi.blob(
			&Script::new()
				.spawn_entity([0.0; 3], 0.0, 1, "GUARD", 0)
				.end(),
		);
		let script = cmi.blob(
			&Script::new()
				.spawn_entity([0.0; 3], 0.0, 1, "GUARD", 0)
				.end(),
		);
		cmi.setup("ARENA1$GUARD", setup);
		cmi.arena("ARENA1", script);
		let bytes = cmi.build();

		let config = LoadConfig {
			max_call_depth: 2,
			..Default::default()
		};
		let level = load_with_config(&bytes, &[], &config).unwrap();
		let entities = &level.arenas[0].entities;
		assert_eq!(entities.len(), 3);
		assert_eq!(
			entities[2].termination,
			Some(Termination::Error(ScriptError::DepthLimit { limit: 2 }))
		);
		assert_eq!(entities[0].state, ScriptState::Idle);
	}

	#[test_log::test]
	fn test_variables() {
		let script = Script::new()
			.op(0x41)
			.u8(1)
			.u8(2)
			.f32(3.0)
			.op(0x42)
			.u8(1)
			.u8(2)
			.f32(1.5)
			.op(0x42)
			.u8(0)
			.u8(0)
			.f32(2.0)
			.op(0x40)
			.u8(1)
			.u8(2)
			.end();
		let (cmi, _) = guard_level(&script);
		let bytes = cmi.build();
		let config = LoadConfig {
			tick_iterations: 0,
			..Default::default()
		};
		let level = load_with_config(&bytes, &[], &config).unwrap();
		assert_eq!(level.arenas[0].vars, [0.0, 0.0, 4.5, 0.0]);
		assert_eq!(level.vars, [2.0, 0.0, 0.0, 0.0]);
		let guard = find_guard(&level);
		assert_eq!(guard.state, ScriptState::Blocked);
		assert_eq!(guard.delay, 4.5);

		let (cmi, _) = guard_level(&Script::new().op(0x41).u8(3).u8(0).f32(1.0).end());
		let bytes = cmi.build();
		let level = load(&bytes, &[]).unwrap();
		assert_eq!(
			find_guard(&level).termination,
			Some(Termination::Error(ScriptError::ImmediateTarget { opcode: 0x41 }))
		);
	}

	#[test_log::test]
	fn test_return_to_anchor() {
		let script = Script::new()
			.op(0x01)
			.op(0x42)
			.u8(2)
			.u8(0)
			.f32(1.0)
			.op(0xFD)
			.end();
		let (cmi, _) = guard_level(&script);
		let bytes = cmi.build();

		let level = load(&bytes, &[]).unwrap();
		let guard = find_guard(&level);
		// once in the last load pass, then once per tick
		assert_eq!(guard.vars[0], 5.0);
		assert_eq!(guard.state, ScriptState::Running);
		assert_eq!(guard.script_offset, guard.anchor_offset);
	}

	#[test_log::test]
	fn test_irregular_operands() {
		let script = Script::new()
			.op(0x0C)
			.u8(2)
			.u32(0x500)
			.u32(0x600)
			.op(0xF5)
			.u8(0)
			.u8(3)
			.u8(4)
			.bytes(b"NAME")
			.op(0x2A)
			.pstr("")
			.pstr("ARM")
			.u8(0xFC)
			.u32(0x700)
			.op(0x02)
			.u32(0x800)
			.u8(0)
			.u8(0)
			.u16(0)
			.u8(9)
			.end();
		let (cmi, init) = guard_level(&script);
		let bytes = cmi.build();

		let level = load(&bytes, &[]).unwrap();
		let guard = find_guard(&level);
		let lines: Vec<_> = guard.log.iter().filter(|line| line.starts_with('[')).collect();
		assert_eq!(*lines[0], format!("[{init:06X}: 0C Random jump] [000500, 000600]"));
		assert!(lines[1].ends_with("index 3 \"NAME\""), "{}", lines[1]);
		assert!(lines[2].ends_with("\"ARM\" { call 000700 }"), "{}", lines[2]);
		assert!(matches!(
			guard.termination,
			Some(Termination::Error(ScriptError::BadOperand {
				opcode: 0x02,
				value: 9,
				..
			}))
		));
	}

	#[test_log::test]
	fn test_schema_trace() {
		let script = Script::new()
			.op(0x64)
			.pstr("ARENA2")
			.op(0x87)
			.u32(0xAABBCCDD)
			.op(0x65)
			.end();
		let (cmi, init) = guard_level(&script);
		let bytes = cmi.build();
		let level = load(&bytes, &[]).unwrap();
		let log = &find_guard(&level).log;
		let start = log.iter().position(|line| line.starts_with('[')).unwrap();
		assert_eq!(
			log[start..],
			[
				format!("[{init:06X}: 64 Show arena] \"ARENA2\""),
				format!("[{:06X}: 87 Screenshake] [DD CC BB AA]", init + 8),
				format!("[{:06X}: 65 Face player]", init + 13),
				"finished script".to_owned(),
			]
		);
	}
}
