//! Shared fixtures for the integration tests: raw NBT byte builders and a
//! region-file poker that writes chunk payloads directly onto disk,
//! bypassing the library (which only ever reads, diffs and applies
//! existing chunks — originating one from scratch is Minecraft's job,
//! not this engine's).

use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use mc_backup::region::Compression;

pub const SECTOR: u64 = 4096;

/// Build the raw bytes of an NBT Compound: root tag + empty name, then
/// each `(id, name, raw payload)` entry, terminated by an End tag.
pub fn compound(entries: &[(u8, &str, &[u8])]) -> Vec<u8> {
	let mut out = vec![0x0a, 0x00, 0x00];
	for &(id, name, payload) in entries {
		out.push(id);
		out.extend_from_slice(&(name.len() as u16).to_be_bytes());
		out.extend_from_slice(name.as_bytes());
		out.extend_from_slice(payload);
	}
	out.push(0x00);
	out
}

pub fn long(v: i64) -> [u8; 8] {
	v.to_be_bytes()
}

pub fn string_payload(s: &str) -> Vec<u8> {
	let mut out = (s.len() as u16).to_be_bytes().to_vec();
	out.extend_from_slice(s.as_bytes());
	out
}

/// Create a bare (header-only, zero chunks) region file at `path`.
pub fn bare_region(path: &Path) {
	if let Some(parent) = path.parent() {
		fs::create_dir_all(parent).unwrap();
	}
	fs::write(path, vec![0u8; (SECTOR * 2) as usize]).unwrap();
}

/// Append a compressed chunk payload to the end of the region file and
/// point chunk `idx`'s header at it, as if Minecraft had just (re)written
/// that chunk. Never reuses freed sectors, matching `defragment`'s job of
/// reclaiming the garbage this leaves behind.
pub fn write_chunk(path: &Path, idx: usize, mtime: u32, nbt: &[u8], compression: Compression) {
	let compressed = compression.compress(nbt).unwrap();
	let mut file = OpenOptions::new().read(true).write(true).open(path).unwrap();
	let len = file.metadata().unwrap().len();
	let next_sector = len / SECTOR;
	let payload_len = compressed.len() + 1;
	let sectors = (4 + payload_len as u64).div_ceil(SECTOR).max(1);

	file.set_len(len + sectors * SECTOR).unwrap();
	file.seek(SeekFrom::Start(next_sector * SECTOR)).unwrap();
	file.write_all(&(payload_len as u32).to_be_bytes()).unwrap();
	file.write_all(&[compression.to_byte()]).unwrap();
	file.write_all(&compressed).unwrap();

	let word = ((next_sector as u32) << 8) | sectors as u32;
	file.seek(SeekFrom::Start((idx * 4) as u64)).unwrap();
	file.write_all(&word.to_be_bytes()).unwrap();
	file.seek(SeekFrom::Start(SECTOR + (idx * 4) as u64)).unwrap();
	file.write_all(&mtime.to_be_bytes()).unwrap();
}

/// Overwrite chunk `idx`'s offset field in place, keeping its size byte,
/// so tests can stage corruption (overlapping payloads) deliberately.
pub fn set_header_offset(path: &Path, idx: usize, new_offset: u32) {
	let mut file = OpenOptions::new().read(true).write(true).open(path).unwrap();
	file.seek(SeekFrom::Start((idx * 4) as u64)).unwrap();
	let mut buf = [0u8; 4];
	file.read_exact(&mut buf).unwrap();
	let word = u32::from_be_bytes(buf);
	let size = word & 0xff;
	let new_word = (new_offset << 8) | size;
	file.seek(SeekFrom::Start((idx * 4) as u64)).unwrap();
	file.write_all(&new_word.to_be_bytes()).unwrap();
}

/// Recursively copy every file under `src` into `dest`.
pub fn copy_dir(src: &Path, dest: &Path) {
	for entry in walkdir::WalkDir::new(src) {
		let entry = entry.unwrap();
		let rel = entry.path().strip_prefix(src).unwrap();
		let target = dest.join(rel);
		if entry.file_type().is_dir() {
			fs::create_dir_all(&target).unwrap();
		} else if entry.file_type().is_file() {
			fs::create_dir_all(target.parent().unwrap()).unwrap();
			fs::copy(entry.path(), &target).unwrap();
		}
	}
}
