//! Static script listings.
//!
//! Execution only visits the path a script takes at load time. This walks
//! every block a script can branch to instead, and follows spawn and order
//! instructions into the scripts they start on other entities, so each script
//! is listed once along with everything that calls it.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;

use crate::data_formats::cmi_bytecode::{decode_irregular, read_anim_ref, write_operands};
use crate::data_formats::entity::AnimRef;
use crate::data_formats::opcodes::{OpcodeShape, OperandValue, opcode_info};
use crate::error::ScriptError;
use crate::file_formats::cmi::{CmiFile, split_composite_key};
use crate::reader::{ReadResult, Reader};

/// Something an instruction refers to outside its own operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target<'a> {
	/// Another block of the same script.
	Block(u32),
	/// A script started on another entity.
	Script {
		name: &'a str,
		offset: u32,
		reason: &'static str,
	},
	Animation(AnimRef<'a>),
	Path(u32),
}

/// Adds the blocks a branch operand can continue at.
pub fn branch_targets(operand: &OperandValue, targets: &mut Vec<Target>) {
	if let OperandValue::Branch {
		code,
		targets: [first, second],
	} = *operand
	{
		match code {
			0xFE => targets.extend([Target::Block(first), Target::Block(second)]),
			0xFC | 0x0C => targets.push(Target::Block(first)),
			_ => {}
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ScriptCall<'a> {
	pub offset: u32,
	/// Entity the called script runs on.
	pub name: &'a str,
	pub reason: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CallOrigin<'a> {
	pub arena: &'a str,
	/// Entity whose script made the call. Table entries are their own source.
	pub source: &'a str,
	/// Zero for table entries.
	pub source_offset: u32,
	/// Entity the script runs on.
	pub target: &'a str,
	pub reason: String,
}

impl<'a> CallOrigin<'a> {
	fn table(arena: &'a str, name: &'a str, reason: String) -> Self {
		CallOrigin {
			arena,
			source: name,
			source_offset: 0,
			target: name,
			reason,
		}
	}
}

/// One script with every block reachable from its entry point.
#[derive(Debug, Default)]
pub struct ScriptListing<'a> {
	pub offset: u32,
	pub text: String,
	/// Entry point first, then blocks in discovery order.
	pub blocks: Vec<u32>,
	pub calls: Vec<ScriptCall<'a>>,
	pub anims: Vec<AnimRef<'a>>,
	pub paths: Vec<u32>,
	pub origins: Vec<CallOrigin<'a>>,
}

impl<'a> ScriptListing<'a> {
	pub fn parse(bytecode: &'a [u8], offset: u32) -> Self {
		let mut listing = ScriptListing {
			offset,
			blocks: vec![offset],
			..Default::default()
		};
		let mut reader = Reader::new(bytecode);
		let mut targets = Vec::new();

		let mut block_index = 0;
		while block_index < listing.blocks.len() {
			let block_offset = listing.blocks[block_index];
			if block_index == 0 {
				let _ = writeln!(listing.text, "main (offset {block_offset:06X})");
			} else {
				let _ = writeln!(listing.text, "block_{block_index} (offset {block_offset:06X})");
			}

			reader.set_position(block_offset as usize);
			loop {
				let offset = reader.position();
				let opcode = match reader.u8() {
					Ok(0xFF) => break,
					Ok(opcode) => opcode,
					Err(err) => {
						let _ = writeln!(listing.text, "{err}");
						break;
					}
				};
				let _ = write!(listing.text, "[{offset:06X}: {opcode:02X} {}]", opcode_info(opcode).name);
				let result = list_instruction(opcode, offset, &mut reader, &mut targets);
				for target in targets.drain(..) {
					listing.add_target(target);
				}
				match result {
					Ok(Some(text)) => {
						listing.text.push_str(&text);
						listing.text.push('\n');
					}
					Ok(None) => {
						listing.text.push_str(" not modeled, listing stops here\n");
						break;
					}
					Err(err) => {
						let _ = writeln!(listing.text, " {err}");
						break;
					}
				}
			}
			let _ = writeln!(listing.text, "(end offset {:06X})\n", reader.position());
			block_index += 1;
		}

		listing.calls.sort_unstable();
		listing.calls.dedup();
		listing.anims.sort_unstable();
		listing.anims.dedup();
		listing.paths.sort_unstable();
		listing.paths.dedup();
		listing
	}

	fn add_target(&mut self, target: Target<'a>) {
		match target {
			Target::Block(0) | Target::Script { offset: 0, .. } => {}
			Target::Block(offset) => {
				if !self.blocks.contains(&offset) {
					self.blocks.push(offset);
				}
			}
			Target::Script {
				name,
				offset,
				reason,
			} => self.calls.push(ScriptCall {
				offset,
				name,
				reason,
			}),
			Target::Animation(anim) => self.anims.push(anim),
			Target::Path(offset) => self.paths.push(offset),
		}
	}

	/// `OFFSET REASON...`, using the reasons this script is run for `entity`.
	pub fn file_name(&self, entity: &str) -> String {
		let reasons: BTreeSet<&str> = self
			.origins
			.iter()
			.filter(|origin| origin.target == entity)
			.map(|origin| origin.reason.as_str())
			.collect();
		let mut name = format!("{:06X}", self.offset);
		for reason in reasons {
			name.push(' ');
			name.push_str(reason);
		}
		name
	}

	/// The listing headed by who calls it for `entity` and who else shares it.
	pub fn describe(&self, entity: &str) -> String {
		let mut text = String::from("Called by:\n");
		let (own, shared): (Vec<_>, Vec<_>) =
			self.origins.iter().partition(|origin| origin.target == entity);
		for origin in own {
			let _ = writeln!(
				text,
				"\t[{}] from {} ({:06X}): {}",
				origin.arena, origin.source, origin.source_offset, origin.reason
			);
		}
		if !shared.is_empty() {
			text.push_str("\nShared by:\n");
			for origin in shared {
				let _ = writeln!(
					text,
					"\t[{}] {} from {} ({:06X}): {}",
					origin.arena, origin.target, origin.source, origin.source_offset, origin.reason
				);
			}
		}
		text.push('\n');
		text.push_str(&self.text);
		text
	}
}

/// Lists one instruction. `None` means its operands cannot be stepped over.
fn list_instruction<'a>(
	opcode: u8, offset: usize, reader: &mut Reader<'a>, targets: &mut Vec<Target<'a>>,
) -> Result<Option<String>, ScriptError> {
	let mut text = String::new();
	match opcode {
		0x03 | 0x3B => {
			let anim = read_anim_ref(reader)?;
			targets.push(Target::Animation(anim));
			let _ = write!(text, " {anim}");
		}
		0x96 => {
			let open = read_anim_ref(reader)?;
			let close = read_anim_ref(reader)?;
			targets.extend([Target::Animation(open), Target::Animation(close)]);
			let _ = write!(text, " open: {open}, close: {close}");
		}
		_ => {
			if let Some(irregular) = decode_irregular(opcode, offset, reader, targets)? {
				return Ok(Some(irregular));
			}
			let shape = opcode_info(opcode).shape;
			let Some(operands) = shape.read_operands(reader)? else {
				return match shape {
					OpcodeShape::Invalid => Err(ScriptError::UnknownOpcode { opcode, offset }),
					_ => Ok(None),
				};
			};
			operand_targets(opcode, &operands, targets);
			write_operands(&mut text, &operands);
		}
	}
	Ok(Some(text))
}

fn word_at(bytes: &[u8], at: usize) -> Option<u32> {
	let word = bytes.get(at..at + 4)?;
	Some(u32::from_le_bytes(word.try_into().ok()?))
}

/// Targets carried by fixed-shape instructions.
fn operand_targets<'a>(opcode: u8, operands: &[OperandValue<'a>], targets: &mut Vec<Target<'a>>) {
	for operand in operands {
		branch_targets(operand, targets);
	}
	let first_bytes = operands.iter().find_map(|operand| match operand {
		OperandValue::Bytes(bytes) => Some(*bytes),
		_ => None,
	});
	match opcode {
		// mortar path, spawn on path
		0x1C | 0xCE => targets.extend(first_bytes.and_then(|bytes| word_at(bytes, 0)).map(Target::Path)),
		// on killed
		0x4C => targets.extend(first_bytes.and_then(|bytes| word_at(bytes, 0)).map(Target::Block)),
		// trigger index and id come first
		0x63 => targets.extend(first_bytes.and_then(|bytes| word_at(bytes, 2)).map(Target::Block)),
		_ => {}
	}

	// spawns: the first string names the new entity, the last word is its init script
	if matches!(opcode, 0x1D | 0x56 | 0x71 | 0x95 | 0x9C | 0xA1 | 0xB3 | 0xCE | 0xE6) {
		let name = operands.iter().find_map(|operand| match operand {
			OperandValue::Str(name) => Some(*name),
			_ => None,
		});
		let init = match operands.last() {
			Some(OperandValue::Bytes(bytes)) => word_at(bytes, 0),
			_ => None,
		};
		if let (Some(name), Some(offset)) = (name, init) {
			targets.push(Target::Script {
				name,
				offset,
				reason: opcode_info(opcode).name,
			});
		}
	}
}

/// What a named entity runs across the level.
#[derive(Debug, Default)]
pub struct EntityScripts<'a> {
	pub arenas: BTreeSet<&'a str>,
	pub scripts: BTreeSet<u32>,
	pub anims: BTreeSet<AnimRef<'a>>,
	pub paths: BTreeSet<u32>,
}

/// Every script reachable from a CMI file's tables, with its callers.
#[derive(Debug, Default)]
pub struct Disassembly<'a> {
	/// Keyed by entry offset.
	pub scripts: BTreeMap<u32, ScriptListing<'a>>,
	/// Keyed by entity name. Arena scripts are listed under the arena name.
	pub entities: BTreeMap<&'a str, EntityScripts<'a>>,
}

impl<'a> Disassembly<'a> {
	/// Lists the init, setup and arena scripts, then every script they start.
	pub fn parse(file: &CmiFile<'a>, bytecode: &'a [u8]) -> ReadResult<Self> {
		let mut pending = Vec::new();
		for &(key, offset) in &file.init_offsets {
			let (arena, name) = split_composite_key(key)?;
			let (name, id) = name.rsplit_once('_').unwrap_or((name, "None"));
			pending.push((offset, CallOrigin::table(arena, name, format!("Init (id {id})"))));
		}
		for &(key, offset) in &file.setup_offsets {
			let (arena, name) = split_composite_key(key)?;
			pending.push((offset, CallOrigin::table(arena, name, "Setup".to_owned())));
		}
		for arena in &file.arenas {
			let origin = CallOrigin::table(arena.name, arena.name, "Arena".to_owned());
			pending.push((arena.script_offset, origin));
		}

		let mut result = Disassembly::default();
		while let Some((offset, origin)) = pending.pop() {
			if offset == 0 {
				continue;
			}
			let script = match result.scripts.entry(offset) {
				Entry::Occupied(entry) => entry.into_mut(),
				Entry::Vacant(entry) => {
					let script = ScriptListing::parse(bytecode, offset);
					pending.extend(script.calls.iter().map(|call| {
						let origin = CallOrigin {
							arena: origin.arena,
							source: origin.target,
							source_offset: offset,
							target: call.name,
							reason: call.reason.to_owned(),
						};
						(call.offset, origin)
					}));
					entry.insert(script)
				}
			};

			let entity = result.entities.entry(origin.target).or_default();
			entity.arenas.insert(origin.arena);
			entity.scripts.insert(offset);
			entity.anims.extend(script.anims.iter().copied());
			entity.paths.extend(script.paths.iter().copied());
			script.origins.push(origin);
		}

		for script in result.scripts.values_mut() {
			script.origins.sort_unstable();
			script.origins.dedup();
		}
		log::debug!(
			"listed {} scripts for {} entities",
			result.scripts.len(),
			result.entities.len()
		);
		Ok(result)
	}
}
