//! Backup-chain scenarios from spec.md §8: a three-backup chain where
//! each index restores a different historical world state, and deletion
//! of a middle backup that must not disturb restores of the survivors.

#[path = "support/mod.rs"]
mod support;

use std::fs;
use std::path::Path;

use mc_backup::manager::no_progress;
use mc_backup::region::{Compression, RegionFile};
use mc_backup::{BackupManager, DiffBackupManager};

fn region_path(world: &Path) -> std::path::PathBuf {
	world.join("region").join("r.0.0.mca")
}

fn write_region_chunk(world: &Path, mtime: u32, text: &str) {
	let path = region_path(world);
	if !path.exists() {
		support::bare_region(&path);
	}
	let tag = support::compound(&[(4, "LastUpdate", &support::long(mtime as i64)), (8, "name", &support::string_payload(text))]);
	support::write_chunk(&path, 0, mtime, &tag, Compression::Zlib);
}

fn assert_world_matches(world: &Path, reference: &Path) {
	let mut ref_files = std::collections::HashSet::new();
	for entry in walkdir::WalkDir::new(reference) {
		let entry = entry.unwrap();
		if !entry.file_type().is_file() {
			continue;
		}
		let rel = entry.path().strip_prefix(reference).unwrap().to_path_buf();
		ref_files.insert(rel.clone());
		let actual = world.join(&rel);
		assert!(actual.exists(), "missing {rel:?} after restore");
		compare_file(entry.path(), &actual, &rel);
	}
	for entry in walkdir::WalkDir::new(world) {
		let entry = entry.unwrap();
		if !entry.file_type().is_file() {
			continue;
		}
		let rel = entry.path().strip_prefix(world).unwrap().to_path_buf();
		assert!(ref_files.contains(&rel), "unexpected extra file {rel:?} after restore");
	}
}

fn compare_file(expected: &Path, actual: &Path, rel: &Path) {
	let parent_name = rel.parent().and_then(|p| p.file_name()).and_then(|n| n.to_str());
	let is_region = parent_name == Some("region") && actual.extension().and_then(|e| e.to_str()) == Some("mca");
	if is_region {
		let expected_region = RegionFile::open(expected).unwrap();
		let actual_region = RegionFile::open(actual).unwrap();
		for idx in 0..1024 {
			let e = expected_region.headers()[idx];
			let a = actual_region.headers()[idx];
			assert_eq!(e.is_not_created(), a.is_not_created(), "chunk {idx} presence differs in {rel:?}");
			assert!(!a.is_unmodified(), "restored world carries a diff sentinel at chunk {idx} in {rel:?}");
			if !a.is_not_created() {
				assert!(expected_region.check_unchanged(idx, &actual_region, true).unwrap(), "chunk {idx} content differs in {rel:?}");
			}
		}
	} else {
		assert_eq!(fs::read(expected).unwrap(), fs::read(actual).unwrap(), "file {rel:?} differs");
	}
}

/// S3 — three-backup chain: restoring each index reproduces the world as
/// it was when that backup was taken.
#[test]
fn three_backup_chain_restores_each_generation() {
	let tmp = tempfile::tempdir().unwrap();
	let world = tmp.path().join("world");
	let backup_dir = tmp.path().join("backups");
	fs::create_dir_all(&world).unwrap();

	let manager = DiffBackupManager::new(world.clone(), backup_dir, Some(1)).unwrap();
	manager.prepare().unwrap();

	write_region_chunk(&world, 1, "w1");
	manager.create_backup(None, &mut no_progress).unwrap(); // chain = [B1]
	let snap_w1 = tmp.path().join("snap_w1");
	support::copy_dir(&world, &snap_w1);

	write_region_chunk(&world, 2, "w2");
	manager.create_backup(None, &mut no_progress).unwrap(); // chain = [B2, B1]
	let snap_w2 = tmp.path().join("snap_w2");
	support::copy_dir(&world, &snap_w2);

	fs::write(world.join("level.dat"), b"w3").unwrap();
	manager.create_backup(None, &mut no_progress).unwrap(); // chain = [B3, B2, B1]
	let snap_w3 = tmp.path().join("snap_w3");
	support::copy_dir(&world, &snap_w3);

	assert_eq!(manager.list_backups().unwrap().len(), 3);

	manager.restore_backup(2, &mut no_progress).unwrap();
	assert_world_matches(&world, &snap_w1);

	manager.restore_backup(1, &mut no_progress).unwrap();
	assert_world_matches(&world, &snap_w2);

	manager.restore_backup(0, &mut no_progress).unwrap();
	assert_world_matches(&world, &snap_w3);
}

/// S4 — deleting a middle backup must not disturb restoring any surviving
/// index, including one whose `not_present` set only the deleted backup
/// carried information about.
#[test]
fn deleting_middle_backup_preserves_surviving_restores() {
	let tmp = tempfile::tempdir().unwrap();
	let world = tmp.path().join("world");
	let backup_dir = tmp.path().join("backups");
	fs::create_dir_all(&world).unwrap();

	let manager = DiffBackupManager::new(world.clone(), backup_dir, Some(1)).unwrap();
	manager.prepare().unwrap();

	write_region_chunk(&world, 1, "base");
	fs::write(world.join("a.txt"), b"present in w1 and w3").unwrap();
	manager.create_backup(None, &mut no_progress).unwrap(); // chain = [B1]
	let snap_w1 = tmp.path().join("snap_w1");
	support::copy_dir(&world, &snap_w1);

	fs::remove_file(world.join("a.txt")).unwrap();
	manager.create_backup(None, &mut no_progress).unwrap(); // chain = [B2, B1]

	fs::write(world.join("a.txt"), b"present in w1 and w3").unwrap();
	manager.create_backup(None, &mut no_progress).unwrap(); // chain = [B3, B2, B1]
	let snap_w3 = tmp.path().join("snap_w3");
	support::copy_dir(&world, &snap_w3);

	manager.delete_backup(1, &mut no_progress).unwrap();
	assert_eq!(manager.list_backups().unwrap().len(), 2);

	manager.restore_backup(1, &mut no_progress).unwrap();
	assert_world_matches(&world, &snap_w1);

	manager.restore_backup(0, &mut no_progress).unwrap();
	assert_world_matches(&world, &snap_w3);
}

/// Deleting the oldest backup is a plain drop, not a merge.
#[test]
fn deleting_oldest_backup_just_drops_it() {
	let tmp = tempfile::tempdir().unwrap();
	let world = tmp.path().join("world");
	let backup_dir = tmp.path().join("backups");
	fs::create_dir_all(&world).unwrap();

	let manager = DiffBackupManager::new(world.clone(), backup_dir.clone(), Some(1)).unwrap();
	manager.prepare().unwrap();

	write_region_chunk(&world, 1, "w1");
	manager.create_backup(None, &mut no_progress).unwrap();
	write_region_chunk(&world, 2, "w2");
	manager.create_backup(None, &mut no_progress).unwrap();

	let oldest_id = manager.list_backups().unwrap().last().unwrap().id.clone();
	manager.delete_backup(1, &mut no_progress).unwrap();

	assert_eq!(manager.list_backups().unwrap().len(), 1);
	assert!(!backup_dir.join(format!("{oldest_id}.tar.gz")).exists());
}
