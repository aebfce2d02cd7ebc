pub mod cmi_bytecode;
pub mod disassembly;
pub mod entity;
pub mod level;
pub mod opcodes;
pub mod variables;

pub use cmi_bytecode::Interpreter;
pub use disassembly::Disassembly;
pub use entity::{ArenaId, Entity, EntityKind, Termination};
pub use level::{Arena, BspEntity, Level, load, load_with_config};
