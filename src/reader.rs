use std::io;

use crate::error::FormatError;

pub type ReadResult<T> = Result<T, FormatError>;

#[cfg(feature = "readranges")]
thread_local! {
	pub static READ_RANGE : std::rc::Rc<std::cell::RefCell<ranges::Ranges<usize>>> = Default::default();
}

/// Little-endian cursor over a borrowed buffer.
///
/// Clones share the underlying bytes, so `clone_at` is the way to follow an
/// offset into another table without disturbing the current position.
#[derive(Clone)]
pub struct Reader<'buf> {
	reader: io::Cursor<&'buf [u8]>,
}

pub trait Readable: Sized + std::fmt::Debug {
	type Buffer: Default + AsMut<[u8]>;

	fn convert_little(buf: Self::Buffer) -> Self;
	#[must_use]
	fn validate(&self) -> bool;
}

impl<'buf> Reader<'buf> {
	pub fn new(buf: &'buf [u8]) -> Reader<'buf> {
		Reader {
			reader: io::Cursor::new(buf),
		}
	}

	fn mark_read(&self, range: std::ops::Range<usize>) {
		#[cfg(feature = "readranges")]
		{
			let origin = self.buf().as_ptr() as usize;
			let range = range.start + origin..range.end + origin;
			READ_RANGE.with(|ranges| ranges.borrow_mut().insert(range));
		}
		#[cfg(not(feature = "readranges"))]
		let _ = range;
	}

	#[must_use]
	pub fn clone_at(&self, new_pos: usize) -> Self {
		let mut result = self.clone();
		result.set_position(new_pos);
		result
	}

	pub fn buf(&self) -> &'buf [u8] {
		self.reader.get_ref()
	}
	pub fn len(&self) -> usize {
		self.buf().len()
	}
	pub fn remaining_len(&self) -> usize {
		self.len().saturating_sub(self.position())
	}
	pub fn is_empty(&self) -> bool {
		self.remaining_len() == 0
	}

	pub fn position(&self) -> usize {
		self.reader.position() as usize
	}
	pub fn set_position(&mut self, pos: usize) {
		self.reader.set_position(pos as u64)
	}

	fn out_of_bounds(&self, len: usize) -> FormatError {
		FormatError::OutOfBounds {
			offset: self.position(),
			len,
			buf_len: self.len(),
		}
	}

	pub fn get<T: Readable>(&mut self) -> ReadResult<T> {
		let start = self.position();
		let result = self.get_unvalidated::<T>()?;
		if result.validate() {
			Ok(result)
		} else {
			Err(FormatError::InvalidValue {
				offset: start,
				value: format!("{result:?}"),
			})
		}
	}
	pub fn get_unvalidated<T: Readable>(&mut self) -> ReadResult<T> {
		let mut buffer = T::Buffer::default();
		let bytes = self.slice(buffer.as_mut().len())?;
		buffer.as_mut().copy_from_slice(bytes);
		Ok(T::convert_little(buffer))
	}

	pub fn skip(&mut self, len: usize) -> ReadResult<()> {
		self.slice(len).map(drop)
	}

	pub fn slice(&mut self, size: usize) -> ReadResult<&'buf [u8]> {
		let pos = self.position();
		let end = pos
			.checked_add(size)
			.filter(|&end| end <= self.len())
			.ok_or_else(|| self.out_of_bounds(size))?;
		self.set_position(end);
		self.mark_read(pos..end);
		Ok(&self.buf()[pos..end])
	}

	/// Reads a one-byte length followed by that many string bytes.
	pub fn pascal_str(&mut self) -> ReadResult<&'buf str> {
		let length = self.u8()?;
		self.str(length as usize)
	}

	/// Reads a fixed-size, NUL-padded, printable ASCII string.
	pub fn str(&mut self, size: usize) -> ReadResult<&'buf str> {
		let offset = self.position();
		let invalid = FormatError::InvalidString { offset };
		if size > 100 {
			return Err(invalid);
		}

		let buf = self.slice(size)?;

		let buf = if let Some(local_end_pos) = buf.iter().position(|c| *c == 0) {
			if buf[local_end_pos..].iter().any(|&c| c != 0) {
				return Err(invalid);
			}
			&buf[..local_end_pos]
		} else {
			buf
		};

		if !buf.iter().all(|&c| matches!(c, b' '..=b'~')) {
			return Err(invalid);
		}

		std::str::from_utf8(buf).map_err(|_| invalid)
	}

	pub fn u8(&mut self) -> ReadResult<u8> {
		self.get()
	}
	pub fn i8(&mut self) -> ReadResult<i8> {
		self.get()
	}
	pub fn u16(&mut self) -> ReadResult<u16> {
		self.get()
	}
	pub fn i16(&mut self) -> ReadResult<i16> {
		self.get()
	}
	pub fn u32(&mut self) -> ReadResult<u32> {
		self.get()
	}
	pub fn i32(&mut self) -> ReadResult<i32> {
		self.get()
	}
	pub fn f32(&mut self) -> ReadResult<f32> {
		self.get()
	}
	/// Reads a float without range checks, for fields that hold raw bits.
	pub fn f32_unvalidated(&mut self) -> ReadResult<f32> {
		self.get_unvalidated()
	}

	pub fn vec2(&mut self) -> ReadResult<[f32; 2]> {
		Ok([self.f32()?, self.f32()?])
	}
	pub fn vec3(&mut self) -> ReadResult<[f32; 3]> {
		Ok([self.f32()?, self.f32()?, self.f32()?])
	}
	pub fn vec4(&mut self) -> ReadResult<[f32; 4]> {
		Ok([self.f32()?, self.f32()?, self.f32()?, self.f32()?])
	}

	/// Reads a value without moving the cursor.
	pub fn peek<T: Readable>(&self) -> ReadResult<T> {
		self.clone().get_unvalidated()
	}
}

macro_rules! make_readable {
	($name:ident, $size:expr, $validate_func:tt) => {
		impl Readable for $name {
			type Buffer = [u8; $size];
			fn convert_little(bytes: Self::Buffer) -> Self {
				$name::from_le_bytes(bytes)
			}
			fn validate(&self) -> bool {
				($validate_func)(*self)
			}
		}
	};
}

fn validate_int<T>(_: T) -> bool {
	true
}
fn validate_float32(f: f32) -> bool {
	f.is_finite() && (-10000000.0..=10000000.0).contains(&f)
}

macro_rules! allNums {
	($func:ident) => {
		$func!(i8, 1, validate_int);
		$func!(u8, 1, validate_int);
		$func!(i16, 2, validate_int);
		$func!(u16, 2, validate_int);
		$func!(i32, 4, validate_int);
		$func!(u32, 4, validate_int);
		$func!(f32, 4, validate_float32);
	};
}
allNums!(make_readable);

/// Spans of `buf` that no reader has touched since the buffer was registered.
#[cfg(feature = "readranges")]
pub fn unread_spans(buf: &[u8]) -> Vec<std::ops::Range<usize>> {
	use std::ops::Bound as B;
	use std::ops::RangeBounds;

	let buf_range = buf.as_ptr_range();
	let buf_range = buf_range.start as usize..buf_range.end as usize;
	let unread = READ_RANGE
		.with(|read_range| read_range.borrow().clone())
		.invert()
		.intersect(buf_range.clone());

	unread
		.as_slice()
		.iter()
		.map(|span| {
			let start = match span.start_bound() {
				B::Included(start) => start - buf_range.start,
				B::Excluded(start) => start - buf_range.start + 1,
				B::Unbounded => 0,
			};
			let end = match span.end_bound() {
				B::Included(end) => end - buf_range.start + 1,
				B::Excluded(end) => end - buf_range.start,
				B::Unbounded => buf_range.len(),
			};
			start..end
		})
		.collect()
}
