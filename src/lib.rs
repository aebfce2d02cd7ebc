pub mod config;
pub mod data_formats;
pub mod error;
pub mod file_formats;
pub mod named_vec;
pub mod output_writer;
pub mod reader;
#[cfg(test)]
mod test_util;
pub mod vectors;

pub use config::LoadConfig;
pub use data_formats::{BspEntity, Level, load, load_with_config};
pub use error::{FormatError, ScriptError};
pub use output_writer::OutputWriter;
pub use vectors::Vec3;
