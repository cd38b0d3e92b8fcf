//! Backup descriptor list persistence: a compact binary file with a
//! human-readable JSON mirror kept in sync on every write.

mod descriptor;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub use descriptor::BackupDescriptor;

use crate::error::{BackupError, BackupResult, ChainError};

const DAT_NAME: &str = "backups.dat";
const JSON_NAME: &str = "backups.json";

/// Ordered list of backup descriptors, newest first (index 0), persisted
/// alongside the archive files it describes.
pub struct BackupChain {
	dir: PathBuf,
	descriptors: Vec<BackupDescriptor>,
}

impl BackupChain {
	pub fn dat_path(dir: &Path) -> PathBuf {
		dir.join(DAT_NAME)
	}

	pub fn json_path(dir: &Path) -> PathBuf {
		dir.join(JSON_NAME)
	}

	/// Load the chain from `dir`: the binary file wins if present, else
	/// the JSON mirror. A directory that has never held a chain (no
	/// metadata and no archives) loads as empty; a directory that holds
	/// archives but neither metadata file is corrupt and fails with
	/// [`ChainError::MetadataMissing`].
	pub fn load(dir: &Path) -> BackupResult<Self> {
		let dat = Self::dat_path(dir);
		let json = Self::json_path(dir);

		let descriptors = if dat.exists() {
			let bytes = fs::read(&dat)?;
			rmp_serde::from_slice(&bytes).map_err(|e| BackupError::Metadata(e.to_string()))?
		} else if json.exists() {
			let text = fs::read_to_string(&json)?;
			serde_json::from_str(&text).map_err(|e| BackupError::Metadata(e.to_string()))?
		} else if has_any_archive(dir)? {
			return Err(ChainError::MetadataMissing { dat, json }.into());
		} else {
			Vec::new()
		};

		Ok(Self { dir: dir.to_path_buf(), descriptors })
	}

	pub fn descriptors(&self) -> &[BackupDescriptor] {
		&self.descriptors
	}

	pub fn descriptors_mut(&mut self) -> &mut Vec<BackupDescriptor> {
		&mut self.descriptors
	}

	pub fn get(&self, idx: usize) -> BackupResult<&BackupDescriptor> {
		self.descriptors.get(idx).ok_or_else(|| ChainError::IndexOutOfRange(idx).into())
	}

	pub fn len(&self) -> usize {
		self.descriptors.len()
	}

	pub fn is_empty(&self) -> bool {
		self.descriptors.is_empty()
	}

	pub fn dir(&self) -> &Path {
		&self.dir
	}

	/// Write the binary metadata file, then its JSON mirror, each via an
	/// atomic rename from a sibling temp file.
	pub fn persist(&self) -> BackupResult<()> {
		let bytes = rmp_serde::to_vec_named(&self.descriptors).map_err(|e| BackupError::Metadata(e.to_string()))?;
		write_atomic(&Self::dat_path(&self.dir), &bytes)?;
		self.write_json_mirror()
	}

	/// Re-encode the descriptor list as the human-readable JSON sidecar.
	/// Always called right after the binary write in [`Self::persist`];
	/// exposed separately so it can be re-run as a maintenance step.
	pub fn write_json_mirror(&self) -> BackupResult<()> {
		let text =
			serde_json::to_string_pretty(&self.descriptors).map_err(|e| BackupError::Metadata(e.to_string()))?;
		write_atomic(&Self::json_path(&self.dir), text.as_bytes())
	}
}

fn has_any_archive(dir: &Path) -> BackupResult<bool> {
	if !dir.exists() {
		return Ok(false);
	}
	for entry in fs::read_dir(dir)? {
		let entry = entry?;
		if entry.path().extension().and_then(|e| e.to_str()) == Some("gz") {
			return Ok(true);
		}
	}
	Ok(false)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> BackupResult<()> {
	let dir = path.parent().unwrap_or_else(|| Path::new("."));
	let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
	tmp.write_all(bytes)?;
	tmp.persist(path).map_err(|e| BackupError::Metadata(e.to_string()))?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Utc;
	use uuid::Uuid;

	#[test]
	fn round_trips_through_persist_and_load() {
		let dir = tempfile::tempdir().unwrap();
		let mut chain = BackupChain { dir: dir.path().to_path_buf(), descriptors: Vec::new() };
		chain.descriptors_mut().push(BackupDescriptor::new(Uuid::new_v4(), Utc::now(), Some("first".into())));
		chain.persist().unwrap();

		let reloaded = BackupChain::load(dir.path()).unwrap();
		assert_eq!(reloaded.len(), 1);
		assert_eq!(reloaded.get(0).unwrap().desc.as_deref(), Some("first"));
	}

	#[test]
	fn empty_directory_loads_as_empty_chain() {
		let dir = tempfile::tempdir().unwrap();
		let chain = BackupChain::load(dir.path()).unwrap();
		assert!(chain.is_empty());
	}
}
