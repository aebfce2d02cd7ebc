//! Level placement data: player start, arenas, teleports and zone/entity records.

use std::fmt::Write;

use crate::data_formats::level::BspEntity;
use crate::error::FormatError;
use crate::reader::{ReadResult, Reader};
use crate::Vec3;

#[derive(Default, Debug)]
pub struct Dti<'a> {
	pub filename: &'a str,
	pub player_start_pos: Vec3,
	pub player_start_angle: f32,
	pub arenas: Vec<DtiArena<'a>>,
}

#[derive(Debug)]
pub struct DtiArena<'a> {
	pub name: &'a str,
	pub num: f32, // todo what is this
	pub entities: Vec<DtiEntity<'a>>,
	pub teleports: Vec<Teleport>,
}

#[derive(Debug)]
pub struct DtiEntity<'a> {
	pub id: i32,
	pub bbox: [Vec3; 2],
	pub data: DtiEntityData<'a>,
}

#[derive(Debug, PartialEq)]
pub enum DtiEntityData<'a> {
	ArenaShowZone,
	Hotgen { name: &'a str, value: i32 },
	ArenaActivateZone,
	Hotpick(&'a str),
	HidingSpot,
	ArenaConnectZone(i32),
	Fan,
	JumpPoint,
	Slidething,
}

#[derive(Debug)]
pub struct Teleport {
	pub index: i32,
	pub pos: Vec3,
	pub angle: f32,
}

fn check(condition: bool, offset: usize, value: impl std::fmt::Display) -> ReadResult<()> {
	if condition {
		Ok(())
	} else {
		Err(FormatError::InvalidValue {
			offset,
			value: value.to_string(),
		})
	}
}

impl<'a> Dti<'a> {
	pub fn parse(buf: &'a [u8]) -> ReadResult<Self> {
		// offsets are relative to the end of the outer size field
		let body = buf.get(4..).ok_or(FormatError::OutOfBounds {
			offset: 0,
			len: 4,
			buf_len: buf.len(),
		})?;
		let mut data = Reader::new(body);

		let filename = data.str(12)?;
		let file_size = data.u32()?;
		check(file_size as usize + 12 == buf.len(), 12, file_size)?;

		let player_offset = data.u32()? as usize;
		let teleports_offset = data.u32()? as usize;
		let entities_offset = data.u32()? as usize;

		data.set_position(player_offset);
		let arena_index = data.u32()?;
		check(arena_index == 0, player_offset, arena_index)?;
		let player_start_pos = data.vec3()?.into();
		let player_start_angle = data.f32()?;

		data.set_position(entities_offset);
		let num_arenas = data.u32()? as usize;
		let mut arenas = Vec::with_capacity(num_arenas.min(data.remaining_len() / 16));
		for _ in 0..num_arenas {
			let name = data.str(8)?;
			let arena_offset = data.u32()? as usize;
			let num = data.f32()?;
			let entities = read_entities(&mut data.clone_at(arena_offset))?;
			arenas.push(DtiArena {
				name,
				num,
				entities,
				teleports: Vec::new(),
			});
		}

		data.set_position(teleports_offset);
		let count = data.u32()?;
		for _ in 0..count {
			let index = data.i32()?;
			let offset = data.position();
			let arena_index = data.i32()?;
			let pos = data.vec3()?.into();
			let angle = data.f32()?;
			let arena = usize::try_from(arena_index)
				.ok()
				.and_then(|arena_index| arenas.get_mut(arena_index))
				.ok_or_else(|| FormatError::InvalidValue {
					offset,
					value: arena_index.to_string(),
				})?;
			arena.teleports.push(Teleport { index, pos, angle });
		}

		log::debug!("parsed dti {filename}: {} arenas", arenas.len());

		Ok(Dti {
			filename,
			player_start_pos,
			player_start_angle,
			arenas,
		})
	}

	/// Entities that get scripts: generators and pickups, positioned at their
	/// bounding box minimum.
	pub fn placements(&self) -> Vec<BspEntity> {
		let mut result = Vec::new();
		for arena in &self.arenas {
			for entity in &arena.entities {
				let (name, value) = match entity.data {
					DtiEntityData::Hotgen { name, value } => (name, value),
					DtiEntityData::Hotpick(name) => (name, 0),
					_ => continue,
				};
				result.push(BspEntity {
					arena: arena.name.to_owned(),
					name: name.to_owned(),
					id: entity.id,
					position: entity.bbox[0],
					value,
				});
			}
		}
		result
	}

	pub fn info(&self) -> String {
		let mut info = format!(
			"name: {}\nplayer start pos: {}, angle: {}\n\narenas ({}):\n",
			self.filename,
			self.player_start_pos,
			self.player_start_angle,
			self.arenas.len()
		);
		for (arena_index, arena) in self.arenas.iter().enumerate() {
			let _ = writeln!(info, "\t[{arena_index}] {}\n\t\tnum: {}", arena.name, arena.num);
			for tele in &arena.teleports {
				let _ = writeln!(info, "\t\t{tele:?}");
			}
			let _ = writeln!(info, "\t\tentities ({}):", arena.entities.len());
			for (entity_index, entity) in arena.entities.iter().enumerate() {
				if entity.bbox[0] == entity.bbox[1] {
					let _ = writeln!(
						info,
						"\t\t\t[{entity_index:3}] id: {:4}, kind: {:?}, position: {}",
						entity.id, entity.data, entity.bbox[0]
					);
				} else {
					let _ = writeln!(
						info,
						"\t\t\t[{entity_index:3}] id: {:4}, kind: {:?}, bbox: [{}, {}]",
						entity.id, entity.data, entity.bbox[0], entity.bbox[1]
					);
				}
			}
		}
		info
	}
}

fn read_entities<'a>(data: &mut Reader<'a>) -> ReadResult<Vec<DtiEntity<'a>>> {
	let num_entities = data.u32()? as usize;
	let mut entities = Vec::with_capacity(num_entities.min(data.remaining_len() / 24));
	for _ in 0..num_entities {
		let kind_offset = data.position();
		let kind = data.i32()?;
		let id = data.i32()?;
		let value = data.i32()?;
		let pos_min: Vec3 = data.vec3()?.into();
		let mut pos_max = pos_min;

		let data_kind = match kind {
			2 => DtiEntityData::Hotgen {
				name: data.str(12)?,
				value,
			},
			4 => DtiEntityData::Hotpick(data.str(12)?),
			kind => {
				pos_max = data.vec3()?.into();
				if pos_max.is_zero() {
					pos_max = pos_min;
				}
				match kind {
					1 => DtiEntityData::ArenaShowZone,
					3 => DtiEntityData::ArenaActivateZone,
					5 => DtiEntityData::HidingSpot,
					6 => DtiEntityData::ArenaConnectZone(value),
					7 => DtiEntityData::Fan,
					8 => DtiEntityData::JumpPoint,
					9 => DtiEntityData::Slidething,
					kind => return Err(FormatError::InvalidValue {
						offset: kind_offset,
						value: kind.to_string(),
					}),
				}
			}
		};

		entities.push(DtiEntity {
			id,
			bbox: [pos_min, pos_max],
			data: data_kind,
		});
	}
	Ok(entities)
}
