use std::{
	fs, io,
	path::{Path, PathBuf},
};

use std::fmt::Write;

use crate::data_formats::{Disassembly, Level};

/// Writes files into one output directory, creating subdirectories on demand.
#[derive(Clone, Debug)]
pub struct OutputWriter {
	/// Always ends in a placeholder file name that writes replace.
	path: PathBuf,
}

impl OutputWriter {
	pub fn new(path: impl AsRef<Path>, create_output_dir: bool) -> io::Result<Self> {
		let mut output_path = path.as_ref().to_path_buf();
		if create_output_dir {
			fs::create_dir_all(&output_path)?;
		}
		output_path.push("_");
		Ok(OutputWriter { path: output_path })
	}

	pub fn push_dir(&self, dir: &str) -> io::Result<Self> {
		let mut result = self.clone();
		result.path.set_file_name(file_name(dir));
		fs::create_dir_all(&result.path)?;
		result.path.push("_");
		Ok(result)
	}

	pub fn dir(&self) -> &Path {
		self.path.parent().unwrap_or(Path::new(""))
	}

	fn set_output_path(&mut self, asset_name: &str, ext: &str) -> &Path {
		let ext = ext.trim_start_matches('.');
		let mut name = file_name(asset_name);
		// set_extension would eat any dot already in the name
		if !ext.is_empty() {
			name.push('.');
			name.push_str(ext);
		}
		self.path.set_file_name(name);
		&self.path
	}

	pub fn write(&mut self, asset_name: &str, ext: &str, data: impl AsRef<[u8]>) -> io::Result<()> {
		fs::write(self.set_output_path(asset_name, ext), data)
	}

	/// Writes every trace of a loaded level:
	///
	/// ```text
	/// <LEVEL>/summary.json
	/// <LEVEL>/<ARENA>/<ARENA>.txt
	/// <LEVEL>/<ARENA>/<NAME>_<ID>.txt
	/// <LEVEL>/<ARENA>/Setup/<NAME>.txt
	/// <LEVEL>/Scripts/...
	/// ```
	pub fn write_level(&self, level: &Level, write_json: bool) -> io::Result<()> {
		let mut level_dir = self.push_dir(level.name)?;
		if write_json {
			let summary = serde_json::to_vec_pretty(level)?;
			level_dir.write("summary", "json", summary)?;
		}

		for arena in &level.arenas {
			let mut arena_dir = level_dir.push_dir(arena.name)?;
			arena_dir.write(arena.name, "txt", arena.entity.trace())?;
			for (entity, name) in arena.entities.iter().zip(arena.trace_file_names()) {
				arena_dir.write(&name, "txt", entity.trace())?;
			}

			if !arena.setup_logs.is_empty() {
				let mut setup_dir = arena_dir.push_dir("Setup")?;
				for (name, log) in arena.setup_logs.iter() {
					setup_dir.write(name, "txt", log.join("\n") + "\n")?;
				}
			}
		}
		level_dir.push_dir("Scripts")?.write_scripts(&level.scripts)?;
		log::info!("wrote traces for {} to {}", level.name, level_dir.dir().display());
		Ok(())
	}

	/// One directory per entity:
	///
	/// ```text
	/// <NAME>/<OFFSET> <REASONS>.txt
	/// <NAME>/Animations.txt
	/// <NAME>/Paths.txt
	/// ```
	pub fn write_scripts(&self, scripts: &Disassembly) -> io::Result<()> {
		for (&name, entity) in &scripts.entities {
			let mut entity_dir = self.push_dir(name)?;
			for offset in &entity.scripts {
				let Some(script) = scripts.scripts.get(offset) else {
					continue;
				};
				entity_dir.write(&script.file_name(name), "txt", script.describe(name))?;
			}
			if !entity.anims.is_empty() {
				let mut text = String::new();
				for anim in &entity.anims {
					let _ = writeln!(text, "{anim}");
				}
				entity_dir.write("Animations", "txt", text)?;
			}
			if !entity.paths.is_empty() {
				let mut text = String::new();
				for path in &entity.paths {
					let _ = writeln!(text, "{path:06X}");
				}
				entity_dir.write("Paths", "txt", text)?;
			}
		}
		Ok(())
	}
}

/// Keeps names from escaping their directory.
fn file_name(name: &str) -> String {
	let name: String = name
		.chars()
		.map(|c| match c {
			'/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
			c => c,
		})
		.collect();
	match name.as_str() {
		"" | "." | ".." => format!("_{name}"),
		_ => name,
	}
}
