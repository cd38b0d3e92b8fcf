//! The manager contract shared by every backup backend, and the one
//! concrete implementation (the diff backend) this crate ships.

mod diff;

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};

pub use diff::DiffBackupManager;

use crate::error::{BackupResult, RegionError};
use crate::ignore::is_ignored;

/// A no-op progress sink, usable anywhere a `&mut dyn FnMut(&str)` is
/// required but the caller has nothing to report to.
pub fn no_progress(_: &str) {}

/// Summary of one backup, as returned from `create_backup` and
/// `list_backups`. `id` is always the display (string) form; the diff
/// backend additionally uses position in `list_backups`'s result as its
/// restore/delete index.
#[derive(Debug, Clone)]
pub struct BackupInfo {
	pub timestamp: DateTime<Utc>,
	pub id: String,
	pub desc: Option<String>,
}

/// Capability set shared by every backend: the diff backend below, and
/// (unimplemented, out of scope) the whole-copy hardlink and
/// version-control-backed backends.
pub trait BackupManager {
	fn backup_dir(&self) -> &Path;

	/// Idempotently ensure the backup directory exists.
	fn prepare(&self) -> BackupResult<()> {
		fs::create_dir_all(self.backup_dir()).map_err(RegionError::Io)?;
		Ok(())
	}

	/// Remove everything under `world` except ignore-set basenames (at any
	/// depth), then prune directories left empty by that removal.
	fn clear_world(&self, world: &Path) -> BackupResult<()> {
		if !world.exists() {
			return Ok(());
		}
		remove_contents_except_ignored(world)
	}

	fn create_backup(&self, desc: Option<String>, progress: &mut dyn FnMut(&str)) -> BackupResult<BackupInfo>;
	fn restore_backup(&self, idx: usize, progress: &mut dyn FnMut(&str)) -> BackupResult<()>;
	fn delete_backup(&self, idx: usize, progress: &mut dyn FnMut(&str)) -> BackupResult<()>;
	fn list_backups(&self) -> BackupResult<Vec<BackupInfo>>;
}

fn remove_contents_except_ignored(dir: &Path) -> BackupResult<()> {
	for entry in fs::read_dir(dir).map_err(RegionError::Io)? {
		let entry = entry.map_err(RegionError::Io)?;
		let path = entry.path();
		if is_ignored(&path) {
			continue;
		}
		let file_type = entry.file_type().map_err(RegionError::Io)?;
		if file_type.is_dir() {
			remove_contents_except_ignored(&path)?;
			if fs::read_dir(&path).map_err(RegionError::Io)?.next().is_none() {
				fs::remove_dir(&path).map_err(RegionError::Io)?;
			}
		} else {
			fs::remove_file(&path).map_err(RegionError::Io)?;
		}
	}
	Ok(())
}
