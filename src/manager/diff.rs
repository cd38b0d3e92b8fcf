//! The diff backend: a forward chain of tar-gz archives where the newest
//! is a full snapshot and every older one is a reverse-diff against the
//! snapshot immediately newer than it.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;
use walkdir::WalkDir;

use crate::archive::{create_archive, extract_archive, extract_archive_partial};
use crate::chain::{BackupChain, BackupDescriptor};
use crate::error::{BackupError, BackupResult, ChainError, RegionError};
use crate::ignore::is_ignored;
use crate::manager::{BackupInfo, BackupManager};
use crate::pool::{AnyPool, WorkerPool};
use crate::region::{RegionFile, RegionFileCache};

/// A backup backend storing each snapshot as a reverse-diff tar-gz
/// archive, chained against the next-newer snapshot.
pub struct DiffBackupManager {
	world: PathBuf,
	backup_dir: PathBuf,
	pool: AnyPool,
}

impl DiffBackupManager {
	/// `workers` overrides the worker pool size; `None` auto-detects
	/// available parallelism, `Some(0)` and `Some(1)` both force the
	/// single-threaded inline pool.
	pub fn new(world: PathBuf, backup_dir: PathBuf, workers: Option<usize>) -> BackupResult<Self> {
		let pool = match workers {
			Some(0) | Some(1) => AnyPool::Inline(crate::pool::Inline),
			Some(n) => AnyPool::Pooled(crate::pool::Pooled::new(n)?),
			None => AnyPool::auto()?,
		};
		Ok(Self { world, backup_dir, pool })
	}
}

impl BackupManager for DiffBackupManager {
	fn backup_dir(&self) -> &Path {
		&self.backup_dir
	}

	fn create_backup(&self, desc: Option<String>, progress: &mut dyn FnMut(&str)) -> BackupResult<BackupInfo> {
		self.prepare()?;
		let mut chain = BackupChain::load(&self.backup_dir)?;
		let id = Uuid::new_v4();
		let timestamp = Utc::now();
		let previous = chain.descriptors().first().cloned();
		debug!(%id, previous = ?previous.as_ref().map(|p| p.id), "creating backup");

		let temp = tempfile::tempdir_in(&self.backup_dir).map_err(RegionError::Io)?;
		let new_archive_tmp = temp.path().join(format!("{id}.tar.gz"));

		progress("compressing world");
		let world = &self.world;
		let pool = &self.pool;
		let backup_dir = &self.backup_dir;
		let temp_path = temp.path();

		let (create_res, diff_res): (BackupResult<()>, BackupResult<Option<(HashSet<String>, PathBuf)>>) =
			rayon::join(
				|| create_archive(world, &new_archive_tmp),
				|| match &previous {
					None => Ok(None),
					Some(prev) => {
						let prev_archive = backup_dir.join(prev.archive_name());
						let prev_dir = temp_path.join("previous");
						fs::create_dir_all(&prev_dir).map_err(RegionError::Io)?;
						extract_archive(&prev_archive, &prev_dir)?;
						let not_present = filter_diff(world, &prev_dir, pool)?;
						let new_prev_archive = temp_path.join(format!("new_{}", prev.archive_name()));
						create_archive(&prev_dir, &new_prev_archive)?;
						Ok(Some((not_present, new_prev_archive)))
					}
				},
			);
		create_res?;
		let diff_res = diff_res?;

		progress("replacing archives");
		let final_new_archive = self.backup_dir.join(format!("{id}.tar.gz"));
		fs::rename(&new_archive_tmp, &final_new_archive).map_err(RegionError::Io)?;

		if let (Some(prev), Some((not_present, new_prev_archive))) = (previous.as_ref(), diff_res) {
			let final_prev_archive = self.backup_dir.join(prev.archive_name());
			fs::rename(&new_prev_archive, &final_prev_archive).map_err(RegionError::Io)?;
			if let Some(first) = chain.descriptors_mut().first_mut() {
				first.not_present = not_present;
			}
		}

		let descriptor = BackupDescriptor::new(id, timestamp, desc.clone());
		chain.descriptors_mut().insert(0, descriptor);
		chain.persist()?;
		progress("backup complete");

		Ok(BackupInfo { timestamp, id: id.to_string(), desc })
	}

	fn restore_backup(&self, idx: usize, progress: &mut dyn FnMut(&str)) -> BackupResult<()> {
		let chain = BackupChain::load(&self.backup_dir)?;
		let descriptors = chain.descriptors();
		if idx >= descriptors.len() {
			return Err(ChainError::IndexOutOfRange(idx).into());
		}
		debug!(idx, "restoring backup");

		let temp = tempfile::tempdir_in(&self.backup_dir).map_err(RegionError::Io)?;
		let working = temp.path().join("working");
		fs::create_dir_all(&working).map_err(RegionError::Io)?;

		let mut skip: HashSet<String> = HashSet::new();
		for d in &descriptors[1..=idx] {
			skip.extend(d.not_present.iter().cloned());
		}

		progress("extracting newest snapshot");
		let newest_archive = self.backup_dir.join(descriptors[0].archive_name());
		extract_archive_partial(&newest_archive, &working, &skip)?;

		let mut cache = RegionFileCache::new();
		for layer in 1..=idx {
			progress(&format!("[{layer}/{idx}] applying \"{}\"", descriptors[layer].id));
			let mut layer_skip = HashSet::new();
			for d in &descriptors[(layer + 1)..=idx] {
				layer_skip.extend(d.not_present.iter().cloned());
			}
			let layer_dir = temp.path().join(format!("layer_{layer}"));
			fs::create_dir_all(&layer_dir).map_err(RegionError::Io)?;
			let layer_archive = self.backup_dir.join(descriptors[layer].archive_name());
			extract_archive_partial(&layer_archive, &layer_dir, &layer_skip)?;

			apply_tree_diff(&layer_dir, &working, &mut cache)?;
		}
		cache.close_all()?;

		progress("clearing world");
		self.clear_world(&self.world)?;
		progress("copying restored tree");
		copy_tree(&working, &self.world)?;
		progress("restore complete");
		Ok(())
	}

	fn delete_backup(&self, idx: usize, progress: &mut dyn FnMut(&str)) -> BackupResult<()> {
		let mut chain = BackupChain::load(&self.backup_dir)?;
		let len = chain.len();
		if idx >= len {
			return Err(ChainError::IndexOutOfRange(idx).into());
		}
		debug!(idx, len, "deleting backup");

		if idx == len - 1 {
			progress("deleting oldest backup");
			let removed = chain.descriptors_mut().remove(idx);
			let archive = self.backup_dir.join(removed.archive_name());
			if archive.exists() {
				fs::remove_file(&archive).map_err(RegionError::Io)?;
			}
			chain.persist()?;
			progress("delete complete");
			return Ok(());
		}

		progress("merging into older snapshot");
		let temp = tempfile::tempdir_in(&self.backup_dir).map_err(RegionError::Io)?;
		let older_dir = temp.path().join("older");
		let chosen_dir = temp.path().join("chosen");
		fs::create_dir_all(&older_dir).map_err(RegionError::Io)?;
		fs::create_dir_all(&chosen_dir).map_err(RegionError::Io)?;

		let older = chain.get(idx + 1)?.clone();
		let chosen = chain.get(idx)?.clone();

		let older_archive = self.backup_dir.join(older.archive_name());
		extract_archive(&older_archive, &older_dir)?;

		let chosen_archive = self.backup_dir.join(chosen.archive_name());
		extract_archive_partial(&chosen_archive, &chosen_dir, &older.not_present)?;

		let mut merge_cache = RegionFileCache::new();
		apply_tree_diff(&older_dir, &chosen_dir, &mut merge_cache)?;
		merge_cache.close_all()?;

		let merged_archive_tmp = temp.path().join("merged.tar.gz");
		create_archive(&chosen_dir, &merged_archive_tmp)?;

		let mut merged_not_present: HashSet<String> = HashSet::new();
		for path in &chosen.not_present {
			if !older_dir.join(path).exists() {
				merged_not_present.insert(path.clone());
			}
		}
		if idx > 0 {
			merged_not_present.extend(older.not_present.iter().cloned());
		}

		// The merged archive keeps chosen's archive identity (file on disk
		// named after chosen's id) but inherits older's timestamp/desc,
		// and lands at what was the older descriptor's chain position.
		let final_merged_archive = self.backup_dir.join(chosen.archive_name());
		fs::rename(&merged_archive_tmp, &final_merged_archive).map_err(RegionError::Io)?;
		fs::remove_file(self.backup_dir.join(older.archive_name())).map_err(RegionError::Io)?;

		{
			let descriptors = chain.descriptors_mut();
			descriptors[idx + 1] = BackupDescriptor {
				timestamp: older.timestamp,
				id: chosen.id,
				not_present: merged_not_present,
				desc: older.desc.clone(),
			};
			descriptors.remove(idx);
		}
		chain.persist()?;
		progress("delete complete");
		Ok(())
	}

	fn list_backups(&self) -> BackupResult<Vec<BackupInfo>> {
		let chain = BackupChain::load(&self.backup_dir)?;
		Ok(chain
			.descriptors()
			.iter()
			.map(|d| BackupInfo { timestamp: d.timestamp, id: d.id.to_string(), desc: d.desc.clone() })
			.collect())
	}
}

/// Walk `world` against `prev_dir` (a fully extracted previous snapshot),
/// turning `prev_dir` into a reverse-diff in place and returning the set
/// of paths present in `world` but absent from `prev_dir`.
fn filter_diff(world: &Path, prev_dir: &Path, pool: &AnyPool) -> BackupResult<HashSet<String>> {
	let mut not_present = HashSet::new();
	let mut region_tasks: Vec<(PathBuf, PathBuf, bool)> = Vec::new();

	for entry in WalkDir::new(world).into_iter().filter_entry(|e| !is_ignored(e.path())) {
		let entry = entry.map_err(|e| BackupError::Metadata(e.to_string()))?;
		if !entry.file_type().is_file() {
			continue;
		}
		let src_path = entry.path();
		let relative = src_path.strip_prefix(world).expect("under world root").to_path_buf();
		let dest_path = prev_dir.join(&relative);
		let rel_str = relative.to_string_lossy().replace('\\', "/");

		if !dest_path.exists() {
			not_present.insert(rel_str);
			continue;
		}

		let dest_len = fs::metadata(&dest_path).map_err(RegionError::Io)?.len();
		if dest_len == 0 {
			fs::remove_file(&dest_path).map_err(RegionError::Io)?;
			not_present.insert(rel_str);
			continue;
		}
		let src_len = fs::metadata(src_path).map_err(RegionError::Io)?.len();
		if src_len == 0 {
			continue;
		}

		if files_identical(src_path, &dest_path)? {
			fs::remove_file(&dest_path).map_err(RegionError::Io)?;
			continue;
		}

		let parent_name = relative.parent().and_then(|p| p.file_name()).and_then(|n| n.to_str());
		let is_mca = src_path.extension().and_then(|e| e.to_str()) == Some("mca");
		let is_chunk = parent_name == Some("region");
		let in_region_tree = matches!(parent_name, Some("region") | Some("entities") | Some("poi"));

		if is_mca && in_region_tree {
			region_tasks.push((dest_path, src_path.to_path_buf(), is_chunk));
		}
		// Other differing files are left unchanged; they become diff payload.
	}

	let tasks: Vec<_> = region_tasks
		.into_iter()
		.map(|(dest, src, is_chunk)| {
			move || -> BackupResult<(PathBuf, bool)> {
				let mut dest_region = RegionFile::open(&dest)?;
				let src_region = RegionFile::open(&src)?;
				let identical = dest_region.filter_diff_defragment(&src_region, is_chunk)?;
				Ok((dest, identical))
			}
		})
		.collect();
	let results = pool.run_all(tasks)?;
	for (path, identical) in results {
		if identical {
			fs::remove_file(&path).map_err(RegionError::Io)?;
		}
	}

	Ok(not_present)
}

fn files_identical(a: &Path, b: &Path) -> BackupResult<bool> {
	let len_a = fs::metadata(a).map_err(RegionError::Io)?.len();
	let len_b = fs::metadata(b).map_err(RegionError::Io)?.len();
	if len_a != len_b {
		return Ok(false);
	}
	Ok(fs::read(a).map_err(RegionError::Io)? == fs::read(b).map_err(RegionError::Io)?)
}

/// Apply every file under `diff_dir` onto `dest_root`: `.mca` files with a
/// non-empty counterpart at the destination are layered with
/// `RegionFile::apply_diff`; everything else is copied verbatim,
/// overwriting the destination.
fn apply_tree_diff(diff_dir: &Path, dest_root: &Path, cache: &mut RegionFileCache) -> BackupResult<()> {
	for entry in WalkDir::new(diff_dir) {
		let entry = entry.map_err(|e| BackupError::Metadata(e.to_string()))?;
		if !entry.file_type().is_file() {
			continue;
		}
		let relative = entry.path().strip_prefix(diff_dir).expect("under diff_dir").to_path_buf();
		let dest_path = dest_root.join(&relative);

		let is_mca = entry.path().extension().and_then(|e| e.to_str()) == Some("mca");
		let dest_non_empty = dest_path.exists() && fs::metadata(&dest_path).map_err(RegionError::Io)?.len() > 0;
		let src_non_empty = fs::metadata(entry.path()).map_err(RegionError::Io)?.len() > 0;

		if is_mca && dest_non_empty && src_non_empty {
			let diff_region = RegionFile::open(entry.path())?;
			let dest_region = cache.get_mut(&dest_path)?;
			dest_region.apply_diff(&diff_region, true)?;
		} else {
			if let Some(parent) = dest_path.parent() {
				fs::create_dir_all(parent).map_err(RegionError::Io)?;
			}
			fs::copy(entry.path(), &dest_path).map_err(RegionError::Io)?;
		}
	}
	Ok(())
}

/// Recursively copy `src` onto `dest`, creating directories as needed.
fn copy_tree(src: &Path, dest: &Path) -> BackupResult<()> {
	for entry in WalkDir::new(src) {
		let entry = entry.map_err(|e| BackupError::Metadata(e.to_string()))?;
		let relative = entry.path().strip_prefix(src).expect("under src");
		let dest_path = dest.join(relative);
		if entry.file_type().is_dir() {
			fs::create_dir_all(&dest_path).map_err(RegionError::Io)?;
		} else if entry.file_type().is_file() {
			if let Some(parent) = dest_path.parent() {
				fs::create_dir_all(parent).map_err(RegionError::Io)?;
			}
			fs::copy(entry.path(), &dest_path).map_err(RegionError::Io)?;
		}
	}
	Ok(())
}
