use crate::error::FormatError;
use crate::named_vec::NamedVec;
use crate::reader::{ReadResult, Reader};

/// The header and offset tables of a CMI file.
///
/// Every offset is absolute within the buffer the file was parsed from.
#[derive(Debug, Default)]
pub struct CmiFile<'a> {
	pub name: &'a str,
	pub file_size: u32,
	/// Keyed `ARENA$NAME_ID`.
	pub init_offsets: Vec<(&'a str, u32)>,
	pub mesh_offsets: NamedVec<'a, u32>,
	/// Keyed `ARENA$NAME`.
	pub setup_offsets: Vec<(&'a str, u32)>,
	pub arenas: Vec<CmiArenaEntry<'a>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CmiArenaEntry<'a> {
	pub name: &'a str,
	pub music: [&'a str; 2],
	pub script_offset: u32,
}

impl<'a> CmiFile<'a> {
	pub fn parse(buf: &'a [u8]) -> ReadResult<Self> {
		let mut reader = Reader::new(buf);

		let name = reader.str(12)?;
		let file_size = reader.u32()?;

		let init_offsets = read_offset_table(&mut reader)?;
		let mesh_offsets: NamedVec<u32> = read_offset_table(&mut reader)?.into_iter().collect();
		let setup_offsets = read_offset_table(&mut reader)?;

		let arena_table = read_offset_table(&mut reader)?;
		let mut arenas = Vec::with_capacity(arena_table.len());
		for (name, record_offset) in arena_table {
			let mut arena_reader = reader.clone_at(record_offset as usize);
			let music1 = arena_reader.pascal_str()?;
			let music2 = arena_reader.pascal_str()?;
			let script_offset = arena_reader.u32()?;
			log::trace!("arena {name}: record {record_offset:06X}, script {script_offset:06X}");
			arenas.push(CmiArenaEntry {
				name,
				music: [music1, music2],
				script_offset,
			});
		}

		log::debug!(
			"parsed cmi {name}: {} init, {} mesh, {} setup, {} arenas",
			init_offsets.len(),
			mesh_offsets.len(),
			setup_offsets.len(),
			arenas.len()
		);

		Ok(CmiFile {
			name,
			file_size,
			init_offsets,
			mesh_offsets,
			setup_offsets,
			arenas,
		})
	}
}

/// Reads a count followed by that many (name, offset) pairs.
pub fn read_offset_table<'a>(reader: &mut Reader<'a>) -> ReadResult<Vec<(&'a str, u32)>> {
	let count = reader.u32()? as usize;
	// each entry is at least a length byte and an offset
	let mut table = Vec::with_capacity(count.min(reader.remaining_len() / 5));
	for _ in 0..count {
		let name = reader.pascal_str()?;
		let offset = reader.u32()?;
		table.push((name, offset));
	}
	Ok(table)
}

/// Splits an `ARENA$NAME` table key into its arena and local parts.
pub fn split_composite_key(key: &str) -> ReadResult<(&str, &str)> {
	key.split_once('$').ok_or_else(|| FormatError::MalformedKey {
		key: key.to_owned(),
	})
}

/// Drops the outer length field game files carry ahead of the CMI body.
pub fn strip_size_prefix(bytes: &[u8]) -> &[u8] {
	match bytes.first_chunk::<4>() {
		Some(&prefix) if u32::from_le_bytes(prefix) as usize == bytes.len() - 4 => &bytes[4..],
		_ => bytes,
	}
}
