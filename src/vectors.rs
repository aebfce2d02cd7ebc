#[derive(Default, Copy, Clone, PartialEq, PartialOrd)]
#[repr(C)]
pub struct Vec3 {
	pub x: f32,
	pub y: f32,
	pub z: f32,
}

impl Vec3 {
	pub const fn new(x: f32, y: f32, z: f32) -> Self {
		Vec3 { x, y, z }
	}
	pub const fn to_array(self) -> [f32; 3] {
		[self.x, self.y, self.z]
	}
	pub const fn from_array([x, y, z]: [f32; 3]) -> Self {
		Vec3 { x, y, z }
	}
	pub fn is_zero(&self) -> bool {
		*self == Vec3::default()
	}
}

impl From<[f32; 3]> for Vec3 {
	fn from(array: [f32; 3]) -> Self {
		Vec3::from_array(array)
	}
}
impl From<Vec3> for [f32; 3] {
	fn from(value: Vec3) -> Self {
		value.to_array()
	}
}

impl std::fmt::Display for Vec3 {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "({}, {}, {})", self.x, self.y, self.z)
	}
}
impl std::fmt::Debug for Vec3 {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		std::fmt::Display::fmt(self, f)
	}
}

impl serde::Serialize for Vec3 {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: serde::Serializer,
	{
		self.to_array().serialize(serializer)
	}
}
