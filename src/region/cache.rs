//! Keeps region files mapped across a sequence of calls instead of
//! reopening them per chunk. Restoring a backup chain applies one diff
//! region at a time onto the same destination region, so the destination
//! stays resident for the whole chain walk instead of being remapped on
//! every layer.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::BackupResult;
use crate::region::file::RegionFile;

/// Single-threaded, open-once region file cache.
///
/// Not `Send`/`Sync`: the worker pool opens one cache per thread rather
/// than sharing one across threads.
#[derive(Default)]
pub struct RegionFileCache {
	open: HashMap<PathBuf, RegionFile>,
}

impl RegionFileCache {
	pub fn new() -> Self {
		Self::default()
	}

	/// Get the already-open region at `path`, opening and caching it first
	/// if necessary.
	pub fn get_mut(&mut self, path: &Path) -> BackupResult<&mut RegionFile> {
		if !self.open.contains_key(path) {
			let region = RegionFile::open(path)?;
			self.open.insert(path.to_path_buf(), region);
		}
		Ok(self.open.get_mut(path).expect("just inserted"))
	}

	/// Flush and drop every cached region, surfacing the first error (if
	/// any) encountered while flushing.
	pub fn close_all(&mut self) -> BackupResult<()> {
		let mut first_err = None;
		for (_, region) in self.open.drain() {
			if let Err(e) = region.close() {
				if first_err.is_none() {
					first_err = Some(e);
				}
			}
		}
		match first_err {
			Some(e) => Err(e),
			None => Ok(()),
		}
	}
}
