//! Error types shared by the container decoder and the script engine.

use thiserror::Error;

/// A decode failure in the CMI container or in bytecode operand data.
///
/// These indicate a corrupt file or an unrecognised format variant. Raised
/// while building the level they abort the whole load; raised inside a script
/// they terminate only the entity that was running.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormatError {
	#[error("read of {len} bytes at {offset:06X} is out of bounds (buffer size {buf_len})")]
	OutOfBounds {
		offset: usize,
		len: usize,
		buf_len: usize,
	},
	#[error("invalid string at {offset:06X}")]
	InvalidString { offset: usize },
	#[error("invalid value '{value}' at {offset:06X}")]
	InvalidValue { offset: usize, value: String },
	#[error("malformed table key \"{key}\"")]
	MalformedKey { key: String },
	#[error("no arena named \"{name}\"")]
	UnknownArena { name: String },
}

impl FormatError {
	pub fn is_load_fatal(&self) -> bool {
		matches!(self, FormatError::UnknownArena { .. })
	}
}

/// Why a single entity's script stopped abnormally.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScriptError {
	#[error(transparent)]
	Format(#[from] FormatError),
	#[error("unknown opcode {opcode:02X} at {offset:06X}")]
	UnknownOpcode { opcode: u8, offset: usize },
	#[error("opcode {opcode:02X} at {offset:06X} has unexpected operand value {value}")]
	BadOperand { opcode: u8, offset: usize, value: u32 },
	#[error("opcode {opcode:02X} needs a door but \"{entity}\" is not one")]
	NotADoor { opcode: u8, entity: String },
	#[error("unknown variable scope {tag}")]
	UnknownScope { tag: u8 },
	#[error("variable scope {scope} cannot be resolved")]
	UnsupportedScope { scope: &'static str },
	#[error("variable index {index} out of range")]
	VarIndex { index: u8 },
	#[error("opcode {opcode:02X} cannot write to an immediate value")]
	ImmediateTarget { opcode: u8 },
	#[error("instruction limit of {limit} reached")]
	InstructionLimit { limit: usize },
	#[error("setup nesting limit of {limit} reached")]
	DepthLimit { limit: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
	Format,
	UnknownOpcode,
	InvariantViolation,
	ResourceExhausted,
}

impl ScriptError {
	pub fn kind(&self) -> ErrorKind {
		match self {
			ScriptError::Format(_) | ScriptError::BadOperand { .. } => ErrorKind::Format,
			ScriptError::UnknownOpcode { .. } => ErrorKind::UnknownOpcode,
			ScriptError::NotADoor { .. }
			| ScriptError::UnknownScope { .. }
			| ScriptError::UnsupportedScope { .. }
			| ScriptError::VarIndex { .. }
			| ScriptError::ImmediateTarget { .. } => ErrorKind::InvariantViolation,
			ScriptError::InstructionLimit { .. } | ScriptError::DepthLimit { .. } => {
				ErrorKind::ResourceExhausted
			}
		}
	}

	/// Errors that must abort the whole load rather than just the entity.
	pub fn is_load_fatal(&self) -> bool {
		matches!(self, ScriptError::Format(err) if err.is_load_fatal())
	}

	/// Splits a load-fatal error off as the [`FormatError`] the load returns.
	pub fn into_fatal(self) -> Result<FormatError, ScriptError> {
		match self {
			ScriptError::Format(err) if err.is_load_fatal() => Ok(err),
			err => Err(err),
		}
	}
}
