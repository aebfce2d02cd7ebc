//! Operand layout for every script opcode.
//!
//! Most instructions can be stepped over with a fixed width or a short list
//! of typed operands. Instructions whose layout depends on earlier operand
//! values are marked [`OpcodeShape::Unmodeled`]; the engine either has a
//! dedicated decoder for them or stops the script.

use crate::reader::{ReadResult, Reader};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
	/// Raw operand bytes with no further meaning at this level.
	Bytes(u8),
	/// One length byte followed by the string.
	PascalStr,
	/// Comparison: kind byte, then one value, or two for range kinds 7 and 8.
	Compare,
	/// Branch: code byte, then zero, one or two block offsets.
	Branch,
	/// Scope byte, then either an immediate float (scope 3) or a slot index.
	VarOrValue,
}

impl Operand {
	pub fn read<'a>(self, reader: &mut Reader<'a>) -> ReadResult<OperandValue<'a>> {
		Ok(match self {
			Operand::Bytes(count) => OperandValue::Bytes(reader.slice(count as usize)?),
			Operand::PascalStr => OperandValue::Str(reader.pascal_str()?),
			Operand::Compare => {
				let kind = reader.u8()?;
				let low = reader.f32_unvalidated()?;
				let high = if kind == 7 || kind == 8 {
					reader.f32_unvalidated()?
				} else {
					0.0
				};
				OperandValue::Compare { kind, low, high }
			}
			Operand::Branch => {
				let code = reader.u8()?;
				let mut targets = [0; 2];
				let count = match code {
					0xFE => 2,
					0xFC | 0x0C => 1,
					_ => 0,
				};
				for target in &mut targets[..count] {
					*target = reader.u32()?;
				}
				OperandValue::Branch { code, targets }
			}
			Operand::VarOrValue => {
				let scope = reader.u8()?;
				if scope == 3 {
					OperandValue::Immediate(reader.f32_unvalidated()?)
				} else {
					OperandValue::Var {
						scope,
						index: reader.u8()?,
					}
				}
			}
		})
	}
}

/// A decoded operand, kept for trace output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OperandValue<'a> {
	Bytes(&'a [u8]),
	Str(&'a str),
	Compare { kind: u8, low: f32, high: f32 },
	Branch { code: u8, targets: [u32; 2] },
	Var { scope: u8, index: u8 },
	Immediate(f32),
}

impl std::fmt::Display for OperandValue<'_> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match *self {
			OperandValue::Bytes(bytes) => {
				f.write_str("[")?;
				for (index, byte) in bytes.iter().enumerate() {
					if index != 0 {
						f.write_str(" ")?;
					}
					write!(f, "{byte:02X}")?;
				}
				f.write_str("]")
			}
			OperandValue::Str(text) => write!(f, "\"{text}\""),
			OperandValue::Compare { kind, low, high } => match kind {
				1 | 3 => write!(f, "(value < {low})"),
				2 | 4 => write!(f, "({low} < value)"),
				5 | 6 => write!(f, "(value == {low})"),
				7 => write!(f, "({low} <= value <= {high})"),
				8 => write!(f, "({low} </= value </= {high})"),
				n => write!(f, "(unknown comparison {n}, {low})"),
			},
			OperandValue::Branch { code, targets: [first, second] } => match code {
				0 => f.write_str("(none)"),
				0xFE => write!(f, "{{ call {first:06X} }} else {{ call {second:06X} }}"),
				0xFC => write!(f, "{{ call {first:06X} }}"),
				0xFD => f.write_str("{ return }"),
				0x0C => write!(f, "{{ goto {first:06X} }}"),
				code => write!(f, "{{ unknown (code: {code:02X}) }}"),
			},
			OperandValue::Var { scope, index } => {
				write!(f, "{}_vars[{index}]", super::variables::scope_name(scope))
			}
			OperandValue::Immediate(value) => write!(f, "{value}"),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpcodeShape {
	Skip(u8),
	Sequence(&'static [Operand]),
	EndOfScript,
	Unmodeled,
	Invalid,
}

impl OpcodeShape {
	/// Operand width when it does not depend on the operand data.
	pub fn fixed_width(&self) -> Option<usize> {
		match *self {
			OpcodeShape::Skip(width) => Some(width as usize),
			OpcodeShape::Sequence(operands) => operands.iter().try_fold(0, |sum, op| match op {
				Operand::Bytes(count) => Some(sum + *count as usize),
				_ => None,
			}),
			OpcodeShape::EndOfScript => Some(0),
			OpcodeShape::Unmodeled | OpcodeShape::Invalid => None,
		}
	}

	/// Decodes the operands, or returns `None` when the shape gives no way to.
	pub fn read_operands<'a>(
		&self, reader: &mut Reader<'a>,
	) -> ReadResult<Option<Vec<OperandValue<'a>>>> {
		match *self {
			OpcodeShape::Skip(0) | OpcodeShape::EndOfScript => Ok(Some(Vec::new())),
			OpcodeShape::Skip(width) => {
				Ok(Some(vec![OperandValue::Bytes(reader.slice(width as usize)?)]))
			}
			OpcodeShape::Sequence(operands) => operands
				.iter()
				.map(|operand| operand.read(reader))
				.collect::<ReadResult<Vec<_>>>()
				.map(Some),
			OpcodeShape::Unmodeled | OpcodeShape::Invalid => Ok(None),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeInfo {
	pub name: &'static str,
	pub shape: OpcodeShape,
}

pub static OPCODES: [OpcodeInfo; 256] = build_table();

pub fn opcode_info(opcode: u8) -> &'static OpcodeInfo {
	&OPCODES[opcode as usize]
}

const fn build_table() -> [OpcodeInfo; 256] {
	let mut table = [OpcodeInfo {
		name: "Invalid",
		shape: OpcodeShape::Invalid,
	}; 256];
	let mut index = 0;
	while index < 256 {
		table[index] = describe(index as u8);
		index += 1;
	}
	table
}

const fn describe(opcode: u8) -> OpcodeInfo {
	use Operand::{Branch as Br, Bytes as B, Compare as Cmp, PascalStr as Str, VarOrValue as Var};
	use OpcodeShape::{EndOfScript, Invalid, Sequence as Seq, Skip, Unmodeled};

	let (name, shape) = match opcode {
		0x00 | 0x07 | 0x1E | 0xFE => ("Invalid", Invalid),
		0x01 => ("Set resume point", Skip(0)),
		0x02 => ("Set path", Unmodeled),
		0x03 => ("Set animation", Skip(4)),
		0x04 => ("Give order", Unmodeled),
		0x05 => ("Set camera zoom", Skip(4)),
		0x06 => ("Set script mode 6", Skip(0)),
		0x08 => ("Set yaw", Skip(2)),
		0x09 => ("Clear function stack", Skip(0)),
		0x0A => ("Branch on named alien at index", Seq(&[Str, B(1), Br])),
		0x0B => ("Set min order range", Skip(1)),
		0x0C => ("Random jump", Unmodeled),
		0x0D => ("Branch on global field 3", Seq(&[Br])),
		0x0E => ("Branch on visible", Seq(&[B(3), Br])),
		0x0F => ("Set script field", Skip(0)),
		0x10 => ("Set health", Skip(2)),
		0x11 => ("Branch on anim field", Seq(&[Br])),
		0x12 => ("Branch with value", Seq(&[B(4), Br])),
		0x13 => ("Clear anim field 3", Skip(0)),
		0x14 => ("Clear path", Skip(0)),
		0x15 => ("Set index", Skip(4)),
		0x16 => ("Branch on has parts", Seq(&[Br])),
		0x17 => ("Set flag 1 and data", Skip(1)),
		0x18 => ("Set name 4", Seq(&[B(1), Str])),
		0x19 => ("Set name", Seq(&[Str])),
		0x1A => ("Set name 3", Seq(&[Str])),
		0x1B => ("Branch on global var", Seq(&[Br])),
		0x1C => ("Mortar path", Skip(4)),
		0x1D => ("Create chain", Seq(&[B(1), Str, B(4)])),
		0x1F => ("Hide parts", Unmodeled),
		0x20 => ("Show parts", Unmodeled),
		0x21 => ("Branch on path value", Seq(&[B(4), Br])),
		0x22 => ("Branch on has alien", Seq(&[Br])),
		0x23 => ("Set entity flag 4", Skip(1)),
		0x24 => ("Set entity flag 2", Skip(1)),
		0x25 => ("Branch on something", Seq(&[Br])),
		0x26 => ("Branch on vertical velocity", Seq(&[Cmp, Br])),
		0x27 => ("Set anim facing value", Seq(&[Var])),
		0x28 => ("Set anim facing yaw", Seq(&[Var])),
		0x29 => ("Sniper index", Skip(1)),
		0x2A => ("Branch if part exists", Unmodeled),
		0x2B => ("Move home", Skip(8)),
		0x2C => ("Branch on script field", Seq(&[Br])),
		0x2D => ("Branch on distance to player", Seq(&[Cmp, Br])),
		0x2E => ("Branch on hiding spot", Seq(&[Br])),
		0x2F => ("Weighted random call", Seq(&[B(4), Br])),
		0x30 => ("Weighted random call (framerate adjusted)", Seq(&[B(4), Br])),
		0x31 => ("Branch on alien data", Seq(&[B(1), Br])),
		0x32..=0x35 => ("Set data value", Seq(&[Var])),
		0x36 => ("Branch on distance to something", Seq(&[Cmp, Br])),
		0x37 => ("Set data value 5", Seq(&[Var])),
		0x38 => ("Add to script field 10", Skip(2)),
		0x39 => ("Branch if visible", Seq(&[B(3), Br])),
		0x3A => ("Set anim framerate", Seq(&[Var])),
		0x3B => ("Set anim", Skip(4)),
		0x3C => ("Face player 2", Skip(0)),
		0x3D => ("Spawn badguy", Unmodeled),
		0x3E => ("Branch on angle to player", Seq(&[Cmp, Br])),
		0x3F => ("Set flag 0x10", Skip(1)),
		0x40 => ("Delay", Seq(&[Var])),
		0x41 => ("Set variable", Skip(6)),
		0x42 => ("Add to variable", Skip(6)),
		0x43 => ("Branch on variable compare", Seq(&[B(2), Cmp, Br])),
		0x44 => ("Set flag var", Skip(2)),
		0x45 => ("Clear flag var", Skip(2)),
		0x46 => ("Toggle flag var", Skip(2)),
		0x47 => ("Branch on flag var set", Seq(&[B(2), Br])),
		0x48 => ("Branch on flag var clear", Seq(&[B(2), Br])),
		0x49 => ("Set max order range", Skip(1)),
		0x4A => ("Set alien", Seq(&[B(2), Str])),
		0x4B => ("Clear script field", Skip(0)),
		0x4C => ("Set on killed function", Skip(4)),
		0x4D => ("Assert", Seq(&[B(1), Str])),
		0x4E => ("Set home", Skip(12)),
		0x4F => ("Set position", Skip(12)),
		0x50 => ("Add velocity in facing direction", Skip(12)),
		0x51 => ("Move in facing direction", Seq(&[B(1), Var])),
		0x52 => ("Set data 2", Seq(&[Var])),
		0x53 => ("Set radius", Unmodeled),
		0x54 => ("Set script field 11", Seq(&[Var])),
		0x55 => ("Set data flag 7", Skip(1)),
		0x56 => ("Spawn entity 3", Seq(&[B(12), Str, B(4)])),
		0x57 => ("Branch if visible in range", Seq(&[B(5), Br])),
		0x58 => ("Set script fields", Skip(1)),
		0x59 => ("Play sound", Unmodeled),
		0x5A => ("Named value", Seq(&[Str, B(4)])),
		0x5B => ("Set script field 4", Seq(&[Var])),
		0x5C => ("Branch on anim field value", Seq(&[B(2), Br])),
		0x5D => ("Move towards point", Skip(16)),
		0x5E => ("Weighted random jump", Unmodeled),
		0x5F => ("Weighted random call list", Unmodeled),
		0x60 => ("Branch on player in square", Seq(&[B(16), Br])),
		0x61 => ("Set entity flag 0x80", Skip(1)),
		0x62 => ("Set triangle visibility", Skip(2)),
		0x63 => ("Set triangle damage trigger", Skip(6)),
		0x64 => ("Show arena", Seq(&[Str])),
		0x65 => ("Face player", Skip(0)),
		0x66 => ("Call if path exists", Seq(&[Br])),
		0x67 => ("Branch on bounding box", Seq(&[B(24), Br])),
		0x68 => ("Look at target", Skip(4)),
		0x69 => ("Turn to face", Skip(20)),
		0x6A => ("Set arena float value", Skip(4)),
		0x6B => ("Start sound", Seq(&[Str])),
		0x6C => ("Branch on hit bounding box", Seq(&[Br])),
		0x6D => ("Hurt entity", Skip(1)),
		0x6E => ("Destroy entity quietly", Skip(0)),
		0x6F => ("Set entity id", Skip(4)),
		0x70 => ("Teleport", Seq(&[Str, B(16)])),
		0x71 => ("Spawn alien", Seq(&[B(12), Str, B(4)])),
		0x72 => ("Branch on alien", Seq(&[Br])),
		0x73 => ("Branch on wall proximity", Seq(&[B(8), Br])),
		0x74 => ("Set flags", Skip(4)),
		0x75 => ("Clear flags", Skip(4)),
		0x76 => ("Set anim fields", Skip(4)),
		0x77 => ("Find entity and branch on comparison", Seq(&[Str, Cmp, Br])),
		0x78 => ("Set pitch", Skip(4)),
		0x79 => ("Branch on distance from floor", Seq(&[B(4), Br])),
		0x7A => ("Turn pitch", Skip(8)),
		0x7B => ("Branch on arena", Seq(&[Br])),
		0x7C => ("Set angle", Skip(4)),
		0x7D => ("Clear function stack 2", Skip(0)),
		0x7E => ("Look at player pitch", Skip(0)),
		0x7F => ("Branch on script field 10", Seq(&[Cmp, Br])),
		0x80 => ("Set thing", Seq(&[Str, B(2)])),
		0x81 => ("Blow off parts", Unmodeled),
		0x82 => ("Create dent", Skip(0)),
		0x83 => ("Run music command", Skip(1)),
		0x84 => ("Create bubble", Unmodeled),
		0x85 => ("Set material effect", Seq(&[Str, B(5)])),
		0x86 => ("Add angle", Seq(&[Var])),
		0x87 => ("Screenshake", Skip(4)),
		0x88 => ("Create slimes", Skip(34)),
		0x89 => ("Shatter triangle 1", Skip(13)),
		0x8A => ("Shatter triangle 2", Skip(37)),
		0x8B => ("Shatter triangle 3", Skip(25)),
		0x8C => ("Set triangle colour", Skip(3)),
		0x8D => ("Transparency fade", Skip(9)),
		0x8E => ("Activate fan", Seq(&[B(1), Str, B(6)])),
		0x8F => ("Deactivate fan", Seq(&[Str])),
		0x90 => ("Create fan", Seq(&[Str, B(30)])),
		0x91 => ("Set fan speed", Seq(&[Str, B(8)])),
		0x92 => ("Activate conveyor", Seq(&[B(1), Str, B(24)])),
		0x93 => ("Deactivate conveyor", Seq(&[Str])),
		0x94 => ("Set conveyor speed", Seq(&[Str, B(8)])),
		0x95 => ("Spawn door", Seq(&[B(20), Str, Str, B(4)])),
		0x96 => ("Set door animations", Skip(8)),
		0x97 => ("Set door sounds", Seq(&[Str, Str, Str, Str])),
		0x98 => ("Set door flags", Skip(4)),
		0x99 => ("Set door open distance", Skip(4)),
		0x9A => ("Wait for anim progress", Skip(2)),
		0x9B => ("Branch on stack value", Seq(&[Var, Br])),
		0x9C => ("Spawn alien at point", Seq(&[B(1), Str, B(4)])),
		0x9D => ("Move to data point", Seq(&[Str, B(8)])),
		0x9E => ("Check touch damage", Unmodeled),
		0x9F => ("Spawn blit alien", Unmodeled),
		0xA0 => ("Branch on yaw", Seq(&[Cmp, Br])),
		0xA1 => ("Spawn pickup", Seq(&[B(12), Str, B(4)])),
		0xA2 => ("Write arena thing index", Skip(3)),
		0xA3 => ("Branch on arena thing index", Seq(&[B(1), Cmp, Br])),
		0xA4 => ("Set entity data fields", Unmodeled),
		0xA5 => ("Branch on has target position", Seq(&[Br])),
		0xA6 => ("Branch on can see target", Seq(&[Br])),
		0xA7 => ("Move towards target", Skip(4)),
		0xA8 => ("Set triangle visibility 2", Skip(2)),
		0xA9 => ("Set data 3", Seq(&[Var])),
		0xAA => ("Move towards player", Skip(4)),
		0xAB => ("Branch on alien 2", Seq(&[Br])),
		0xAC => ("Explosion", Unmodeled),
		0xAD => ("Set arena teleport", Unmodeled),
		0xAE => ("Branch on pickup index", Seq(&[B(1), Cmp, Br])),
		0xAF => ("Branch on pickup type", Seq(&[B(1), Cmp, Br])),
		0xB0 => ("Branch on flags 0x40000", Seq(&[Br])),
		0xB1 => ("Set damage radius", Seq(&[Var])),
		0xB2 => ("Explosion with radius", Unmodeled),
		0xB3 => ("Spawn alien by name", Seq(&[Str, B(4)])),
		0xB4 => ("Teleport to dynamic target", Unmodeled),
		0xB5 => ("Set arena state", Unmodeled),
		0xB6 => ("Unfinished B6", Unmodeled),
		0xB7 => ("Call by variable index", Unmodeled),
		0xB8 => ("Destroy alien and damage area", Skip(12)),
		0xB9 => ("Branch on data value 0", Seq(&[Cmp, Br])),
		0xBA => ("Set script field 3", Skip(5)),
		0xBB => ("Add random velocity", Skip(8)),
		0xBC => ("Branch on distance to player 2", Seq(&[Cmp, Br])),
		0xBD => ("Move towards player capped", Unmodeled),
		0xBE => ("Set fan affects damp", Seq(&[B(1), Str])),
		0xBF => ("Branch on axis distance to player", Seq(&[B(1), Cmp, Br])),
		0xC0 => ("Branch on can move to", Seq(&[B(16), Br])),
		0xC1 => ("Face", Unmodeled),
		0xC2 => ("Set bsp visibility", Skip(5)),
		0xC3 => ("Branch on alien value", Seq(&[B(1), Br])),
		0xC4 => ("Set dti arena number", Unmodeled),
		0xC5 => ("Branch on hide", Seq(&[Br])),
		0xC6 => ("Set data", Seq(&[Str, B(9)])),
		0xC7 => ("Set script data", Seq(&[Var])),
		0xC8 => ("Set anim vector, branch if done", Seq(&[B(16), Br])),
		0xC9 => ("Add anim facing", Skip(8)),
		0xCA => ("Set background visibility", Skip(1)),
		0xCB => ("Angle camera to alien", Unmodeled),
		0xCC => ("Bounce", Skip(0)),
		0xCD => ("Set script field 12", Skip(1)),
		0xCE => ("Spawn aliens on path", Seq(&[B(8), Str, B(4)])),
		0xCF => ("Turn to angle", Seq(&[B(8), Br])),
		0xD0 => ("Branch on has part", Seq(&[Str, Br])),
		0xD1 => ("Branch on alien state", Seq(&[Br])),
		0xD2 => ("Set scale", Seq(&[Var])),
		0xD3 => ("Zero velocity", Skip(0)),
		0xD4 => ("Branch on field", Seq(&[Br])),
		0xD5 => ("Branch on distance to thing", Seq(&[Cmp, Br])),
		0xD6 => ("Branch on angle to thing", Seq(&[Cmp, Br])),
		0xD7 => ("Increase global field", Seq(&[Var])),
		0xD8 => ("Add to variable over time", Skip(6)),
		0xD9 => ("Set travel offset", Skip(5)),
		0xDA => ("Set pitch 2", Skip(4)),
		0xDB => ("Target fire", Seq(&[B(8), Br])),
		0xDC => ("Set target", Skip(12)),
		0xDD => ("Try jumping", Seq(&[B(1), Br])),
		0xDE => ("Branch on instruction count", Seq(&[Cmp, Br])),
		0xDF => ("Load arena", Seq(&[Str])),
		0xE0 => ("Update sliding", Unmodeled),
		0xE1 => ("Branch on pointer", Seq(&[Br])),
		0xE2 => ("Set position and values", Skip(20)),
		0xE3 => ("Unfinished E3", Unmodeled),
		0xE4 => ("Set dynamic target", Seq(&[Str])),
		0xE5 => ("Turn towards home", Seq(&[B(4), Br])),
		0xE6 => ("Spawn entity", Seq(&[B(20), Str, B(4)])),
		0xE7 => ("Branch on script field and state", Seq(&[Br])),
		0xE8 => ("Fixed branch", Seq(&[B(1), Br])),
		0xE9 => ("Branch on sound playing", Seq(&[Str, Br])),
		0xEA => ("Branch on angle to player 2", Seq(&[Cmp, Br])),
		0xEB => ("Turn params", Skip(16)),
		0xEC => ("Branch on floor", Seq(&[B(12), Br])),
		0xED => ("Branch on inside box", Seq(&[B(24), Br])),
		0xEE => ("Branch on position component", Seq(&[B(1), Cmp, Br])),
		0xEF => ("Set bounding box", Skip(24)),
		0xF0 => ("Set global script field", Skip(1)),
		0xF1 => ("Branch on global pickup data", Seq(&[Cmp, Br])),
		0xF2 => ("Set transform matrix", Unmodeled),
		0xF3 => ("Branch on point visible", Seq(&[B(3), Br])),
		0xF4 => ("Set global field 1", Skip(5)),
		0xF5 => ("Get buddy", Unmodeled),
		0xF6 => ("Turn to thing", Skip(5)),
		0xF7 => ("Display message", Seq(&[B(1), Str, B(4)])),
		0xF8 => ("Set sliding vars", Unmodeled),
		0xF9 => ("Branch on sound", Unmodeled),
		0xFA => ("Branch on part in box", Unmodeled),
		0xFB => ("Set player position flag", Skip(1)),
		0xFC => ("Random call", Unmodeled),
		0xFD => ("Return", Skip(0)),
		0xFF => ("End of script", EndOfScript),
	};
	OpcodeInfo { name, shape }
}
