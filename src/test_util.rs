//! Hand-assembled CMI buffers for tests.

/// Where the first blob lands, leaving room for the header and tables.
pub const BLOB_BASE: usize = 0x400;

#[derive(Default)]
pub struct CmiBuilder {
	name: String,
	init: Vec<(String, u32)>,
	mesh: Vec<(String, u32)>,
	setup: Vec<(String, u32)>,
	arenas: Vec<(String, u32)>,
	blobs: Vec<u8>,
}

impl CmiBuilder {
	pub fn new(name: &str) -> Self {
		CmiBuilder {
			name: name.to_owned(),
			..Default::default()
		}
	}

	/// Offset the next blob will be placed at.
	pub fn next_offset(&self) -> u32 {
		(BLOB_BASE + self.blobs.len()) as u32
	}

	pub fn blob(&mut self, bytes: &[u8]) -> u32 {
		let offset = self.next_offset();
		self.blobs.extend_from_slice(bytes);
		offset
	}

	pub fn init(&mut self, key: &str, offset: u32) {
		self.init.push((key.to_owned(), offset));
	}
	pub fn mesh(&mut self, key: &str, offset: u32) {
		self.mesh.push((key.to_owned(), offset));
	}
	pub fn setup(&mut self, key: &str, offset: u32) {
		self.setup.push((key.to_owned(), offset));
	}

	/// Adds an arena record pointing at `script_offset`.
	pub fn arena(&mut self, name: &str, script_offset: u32) {
		let song = format!("SONG{}", self.arenas.len() + 1);
		let record = Script::new().pstr("NONE").pstr(&song).u32(script_offset);
		let record = self.blob(&record.0);
		self.arenas.push((name.to_owned(), record));
	}

	pub fn build(&self) -> Vec<u8> {
		let mut out = Vec::new();
		let mut name = self.name.as_bytes().to_vec();
		name.resize(12, 0);
		out.extend_from_slice(&name);
		out.extend_from_slice(&((BLOB_BASE + self.blobs.len()) as u32).to_le_bytes());
		for table in [&self.init, &self.mesh, &self.setup, &self.arenas] {
			out.extend_from_slice(&(table.len() as u32).to_le_bytes());
			for (key, offset) in table {
				out.push(key.len() as u8);
				out.extend_from_slice(key.as_bytes());
				out.extend_from_slice(&offset.to_le_bytes());
			}
		}
		assert!(out.len() <= BLOB_BASE, "tables overflow the blob base");
		out.resize(BLOB_BASE, 0);
		out.extend_from_slice(&self.blobs);
		out
	}
}

/// Little-endian byte assembler for script blobs.
#[derive(Default, Clone)]
pub struct Script(pub Vec<u8>);

impl Script {
	pub fn new() -> Self {
		Script::default()
	}
	pub fn op(mut self, opcode: u8) -> Self {
		self.0.push(opcode);
		self
	}
	pub fn u8(mut self, value: u8) -> Self {
		self.0.push(value);
		self
	}
	pub fn u16(mut self, value: u16) -> Self {
		self.0.extend_from_slice(&value.to_le_bytes());
		self
	}
	pub fn i16(mut self, value: i16) -> Self {
		self.0.extend_from_slice(&value.to_le_bytes());
		self
	}
	pub fn u32(mut self, value: u32) -> Self {
		self.0.extend_from_slice(&value.to_le_bytes());
		self
	}
	pub fn i32(mut self, value: i32) -> Self {
		self.0.extend_from_slice(&value.to_le_bytes());
		self
	}
	pub fn f32(mut self, value: f32) -> Self {
		self.0.extend_from_slice(&value.to_le_bytes());
		self
	}
	pub fn vec3(self, [x, y, z]: [f32; 3]) -> Self {
		self.f32(x).f32(y).f32(z)
	}
	pub fn pstr(mut self, text: &str) -> Self {
		self.0.push(text.len() as u8);
		self.0.extend_from_slice(text.as_bytes());
		self
	}
	pub fn bytes(mut self, bytes: &[u8]) -> Self {
		self.0.extend_from_slice(bytes);
		self
	}

	pub fn delay(self, value: f32) -> Self {
		self.op(0x40).u8(3).f32(value)
	}
	pub fn set_health(self, value: u16) -> Self {
		self.op(0x10).u16(value)
	}
	pub fn spawn_door(
		self, pos: [f32; 3], angle: f32, id: i32, name: &str, arena: &str, init: u32,
	) -> Self {
		self.op(0x95)
			.vec3(pos)
			.f32(angle)
			.i32(id)
			.pstr(name)
			.pstr(arena)
			.u32(init)
	}
	pub fn spawn_pickup(self, pos: [f32; 3], name: &str, init: u32) -> Self {
		self.op(0xA1).vec3(pos).pstr(name).u32(init)
	}
	pub fn spawn_entity(self, pos: [f32; 3], angle: f32, id: i32, name: &str, init: u32) -> Self {
		self.op(0xE6).vec3(pos).f32(angle).i32(id).pstr(name).u32(init)
	}
	pub fn end(self) -> Vec<u8> {
		self.op(0xFF).0
	}
}
