//! The decoded level: arenas, their entities, and the tables scripts look up.

use std::collections::HashSet;

use serde::Serialize;

use crate::config::LoadConfig;
use crate::data_formats::cmi_bytecode::Interpreter;
use crate::data_formats::disassembly::Disassembly;
use crate::data_formats::entity::{ArenaId, Entity, EntityKind};
use crate::data_formats::variables::Vars;
use crate::error::FormatError;
use crate::file_formats::cmi::{CmiFile, split_composite_key};
use crate::named_vec::NamedVec;
use crate::reader::ReadResult;
use crate::Vec3;

/// A placement record from the level's world data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BspEntity {
	pub arena: String,
	pub name: String,
	pub id: i32,
	pub position: Vec3,
	pub value: i32,
}

impl BspEntity {
	/// Key of this entity's init script in the init table.
	pub fn init_key(&self) -> String {
		format!("{}${}_{}", self.arena, self.name, self.id)
	}
}

#[derive(Debug, Serialize)]
pub struct Arena<'a> {
	pub id: ArenaId,
	pub name: &'a str,
	pub music: [&'a str; 2],
	/// The arena's own script runs on this entity.
	pub entity: Entity<'a>,
	/// Keyed by entity name, with the arena prefix removed.
	pub setup_offsets: NamedVec<'a, u32>,
	/// Keyed `NAME_ID`, with the arena prefix removed.
	pub init_offsets: NamedVec<'a, u32>,
	pub vars: Vars,
	pub entities: Vec<Entity<'a>>,
	/// Trace of each setup template's dry run.
	#[serde(skip)]
	pub setup_logs: NamedVec<'a, Vec<String>>,
}

impl<'a> Arena<'a> {
	fn new(id: ArenaId, name: &'a str, music: [&'a str; 2], script_offset: u32, config: &LoadConfig) -> Self {
		let mut entity = Entity::new(name, 0, id, EntityKind::Plain, config);
		entity.is_arena = true;
		entity.begin(script_offset);
		Arena {
			id,
			name,
			music,
			entity,
			setup_offsets: NamedVec::new(),
			init_offsets: NamedVec::new(),
			vars: Vars::default(),
			entities: Vec::new(),
			setup_logs: NamedVec::new(),
		}
	}

	/// One trace file name per live entity, in list order.
	///
	/// Repeated display names get `_2`, `_3` and so on, skipping any suffixed
	/// name another entity already has.
	pub fn trace_file_names(&self) -> Vec<String> {
		// the arena's own trace shares the directory
		let mut used = HashSet::from([self.name.to_owned()]);
		self.entities
			.iter()
			.map(|entity| {
				let base = entity.display_name();
				let mut name = base.clone();
				let mut count = 1;
				while !used.insert(name.clone()) {
					count += 1;
					name = format!("{base}_{count}");
				}
				name
			})
			.collect()
	}

	pub fn entities_named<'s>(&'s self, name: &'s str) -> impl Iterator<Item = &'s Entity<'a>> {
		self.entities.iter().filter(move |entity| entity.name == name)
	}
}

#[derive(Debug, Serialize)]
pub struct Level<'a> {
	pub name: &'a str,
	pub file_size: u32,
	/// The buffer every script offset points into.
	#[serde(skip)]
	pub bytecode: &'a [u8],
	pub vars: Vars,
	pub mesh_offsets: NamedVec<'a, u32>,
	pub arenas: Vec<Arena<'a>>,
	/// Static listing of every script the tables reach.
	#[serde(skip)]
	pub scripts: Disassembly<'a>,
}

impl<'a> Level<'a> {
	/// Builds the arenas and routes the composite-keyed tables to them.
	pub fn from_cmi(mut file: CmiFile<'a>, bytecode: &'a [u8], config: &LoadConfig) -> ReadResult<Self> {
		let arenas = file
			.arenas
			.iter()
			.enumerate()
			.map(|(index, entry)| {
				Arena::new(ArenaId(index), entry.name, entry.music, entry.script_offset, config)
			})
			.collect();
		let mut level = Level {
			name: file.name,
			file_size: file.file_size,
			bytecode,
			vars: Vars::default(),
			mesh_offsets: std::mem::take(&mut file.mesh_offsets),
			arenas,
			scripts: Disassembly::default(),
		};

		for &(key, offset) in &file.setup_offsets {
			let (arena, name) = level.split_key(key)?;
			level.arenas[arena.0].setup_offsets.insert(name, offset);
		}
		for &(key, offset) in &file.init_offsets {
			let (arena, name) = level.split_key(key)?;
			level.arenas[arena.0].init_offsets.insert(name, offset);
		}
		level.scripts = Disassembly::parse(&file, bytecode)?;
		Ok(level)
	}

	/// Resolves the arena half of an `ARENA$NAME` key and returns the name half.
	fn split_key(&self, key: &'a str) -> ReadResult<(ArenaId, &'a str)> {
		let (arena, name) = split_composite_key(key)?;
		Ok((self.require_arena(arena)?, name))
	}

	pub fn arena_id(&self, name: &str) -> Option<ArenaId> {
		self.arenas
			.iter()
			.position(|arena| arena.name == name)
			.map(ArenaId)
	}

	pub fn require_arena(&self, name: &str) -> ReadResult<ArenaId> {
		self.arena_id(name).ok_or_else(|| FormatError::UnknownArena {
			name: name.to_owned(),
		})
	}

	pub fn arena_by_name(&self, name: &str) -> Option<&Arena<'a>> {
		self.arena_id(name).map(|id| &self.arenas[id.0])
	}
}

pub fn load<'a>(cmi_bytes: &'a [u8], placements: &[BspEntity]) -> Result<Level<'a>, FormatError> {
	load_with_config(cmi_bytes, placements, &LoadConfig::default())
}

/// Parses a CMI buffer and runs the level's scripts to a steady state.
///
/// Errors inside a script stop only that entity and end up in its trace. The
/// load itself fails on a malformed container, a malformed table key, or a
/// reference to an arena that does not exist.
pub fn load_with_config<'a>(
	cmi_bytes: &'a [u8], placements: &[BspEntity], config: &LoadConfig,
) -> Result<Level<'a>, FormatError> {
	let file = CmiFile::parse(cmi_bytes)?;
	let mut level = Level::from_cmi(file, cmi_bytes, config)?;

	let mut interpreter = Interpreter::new(&mut level, config);
	interpreter.seed(placements)?;
	interpreter.run_load_passes()?;
	interpreter.run_ticks()?;

	log::info!(
		"loaded {}: {} arenas, {} entities",
		level.name,
		level.arenas.len(),
		level.arenas.iter().map(|arena| arena.entities.len()).sum::<usize>()
	);
	Ok(level)
}
