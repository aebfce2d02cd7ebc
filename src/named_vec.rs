use std::borrow::Cow;
use std::ops::Deref;

pub type NamedValue<'a, T> = (Cow<'a, str>, T);

/// An insertion-ordered list of named values with lookup by name.
///
/// Duplicate names are kept; lookups return the first match.
#[derive(Default, Clone, PartialEq)]
pub struct NamedVec<'a, T> {
	pub values: Vec<NamedValue<'a, T>>,
}

impl<T: std::fmt::Debug> std::fmt::Debug for NamedVec<'_, T> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_map().entries(self.iter()).finish()
	}
}

impl<'a, T> NamedVec<'a, T> {
	pub fn new() -> Self {
		Self { values: Vec::new() }
	}
	pub fn with_capacity(capacity: usize) -> Self {
		Self {
			values: Vec::with_capacity(capacity),
		}
	}
	pub fn position(&self, name: &str) -> Option<usize> {
		self.values.iter().position(|entry| entry.0 == name)
	}
	pub fn get(&self, name: &str) -> Option<&T> {
		self.values
			.iter()
			.find(|entry| entry.0 == name)
			.map(|entry| &entry.1)
	}
	pub fn get_mut(&mut self, name: &str) -> Option<&mut T> {
		self.values
			.iter_mut()
			.find(|entry| entry.0 == name)
			.map(|entry| &mut entry.1)
	}
	pub fn insert<S: Into<Cow<'a, str>>>(&mut self, name: S, value: T) {
		self.values.push((name.into(), value));
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
		self.values
			.iter()
			.map(|(name, value)| (name.deref(), value))
	}
}

impl<'a, T, S: Into<Cow<'a, str>>> FromIterator<(S, T)> for NamedVec<'a, T> {
	fn from_iter<Iter: IntoIterator<Item = (S, T)>>(iter: Iter) -> Self {
		Self {
			values: iter
				.into_iter()
				.map(|(name, value)| (name.into(), value))
				.collect(),
		}
	}
}

impl<'a, T> Deref for NamedVec<'a, T> {
	type Target = Vec<NamedValue<'a, T>>;
	fn deref(&self) -> &Self::Target {
		&self.values
	}
}

impl<T: serde::Serialize> serde::Serialize for NamedVec<'_, T> {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: serde::Serializer,
	{
		serializer.collect_map(self.iter())
	}
}
