//! A single memory-mapped `.mca` region file: header tables plus the 1024
//! chunk payload slots that follow them.

use std::fs::{File, OpenOptions};
use std::path::Path;

use memmap2::MmapMut;

use crate::error::{BackupError, BackupResult, ChunkLoadingReason, RegionError};
use crate::nbt_raw::compare_nbt;
use crate::region::compression::Compression;
use crate::region::header::{ChunkHeader, CHUNK_COUNT, HEADER_SECTORS, SECTOR};

/// A memory-mapped region file, opened for read-write access.
///
/// Headers are parsed once at open time and kept in memory; callers that
/// mutate headers (`defragment`, `apply_diff`, `filter_diff_defragment`)
/// must eventually call [`RegionFile::flush_headers`] (done automatically
/// by those methods, and as a best-effort fallback on `Drop`).
pub struct RegionFile {
	file: File,
	mmap: MmapMut,
	headers: [ChunkHeader; CHUNK_COUNT],
	headers_changed: bool,
}

/// Diagnostic summary produced by [`RegionFile::report_diff`]. Not used on
/// any write path; exists purely to let callers explain what a diff will
/// contain before committing to it.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RegionDiffReport {
	pub created: usize,
	pub deleted: usize,
	pub modified: usize,
	pub moved: usize,
	pub touched: usize,
}

impl RegionFile {
	pub fn open(path: &Path) -> BackupResult<Self> {
		let file = OpenOptions::new().read(true).write(true).open(path).map_err(RegionError::Io)?;
		Self::from_file(file)
	}

	pub fn from_file(file: File) -> BackupResult<Self> {
		let len = file.metadata().map_err(RegionError::Io)?.len();
		if len == 0 {
			return Err(RegionError::EmptyRegion.into());
		}
		if len % SECTOR != 0 || len < HEADER_SECTORS * SECTOR {
			return Err(RegionError::RegionLoading.into());
		}
		let mmap = unsafe { MmapMut::map_mut(&file).map_err(RegionError::Io)? };
		let headers = load_headers(&mmap)?;
		Ok(Self { file, mmap, headers, headers_changed: false })
	}

	pub fn headers(&self) -> &[ChunkHeader; CHUNK_COUNT] {
		&self.headers
	}

	fn chunk_byte_range(&self, idx: usize) -> Option<(usize, usize)> {
		let header = self.headers[idx];
		if !header.is_live() {
			return None;
		}
		let start = header.offset as usize * SECTOR as usize;
		if start + 4 > self.mmap.len() {
			return None;
		}
		let length = u32::from_be_bytes(self.mmap[start..start + 4].try_into().unwrap()) as usize;
		let total = 4 + length;
		if start + total > self.mmap.len() {
			return None;
		}
		Some((start, total))
	}

	/// Decompress and return chunk `idx`'s payload.
	pub fn get_chunk_data(&self, idx: usize) -> BackupResult<Vec<u8>> {
		let header = self.headers[idx];
		if header.is_not_created() {
			return Err(RegionError::ChunkLoading(idx, ChunkLoadingReason::NotCreated).into());
		}
		if header.is_unmodified() {
			return Err(RegionError::ChunkLoading(idx, ChunkLoadingReason::Unmodified).into());
		}
		let (start, total) = self.chunk_byte_range(idx).ok_or(RegionError::CorruptedRegion)?;
		let compression_byte = self.mmap[start + 4];
		let compression = Compression::from_byte(compression_byte)
			.map_err(|reason| RegionError::ChunkLoading(idx, reason))?;
		let payload = &self.mmap[start + 5..start + total];
		Ok(compression.decompress(payload).map_err(RegionError::Io)?)
	}

	/// Test whether chunk `idx` is identical between `self` and `other`,
	/// short-circuiting on matching timestamps before ever decompressing.
	pub fn check_unchanged(&self, idx: usize, other: &RegionFile, is_chunk: bool) -> BackupResult<bool> {
		let a = self.headers[idx];
		let b = other.headers[idx];
		if a.is_not_created() && b.is_not_created() {
			return Ok(true);
		}
		if a.is_not_created() != b.is_not_created() {
			return Ok(false);
		}
		if a.mtime == b.mtime {
			return Ok(true);
		}
		let a_data = self.get_chunk_data(idx)?;
		let b_data = other.get_chunk_data(idx)?;
		if a_data.len() != b_data.len() {
			return Ok(false);
		}
		Ok(compare_nbt(&a_data, &b_data, is_chunk)?)
	}

	/// Ratio of used sectors (the two header sectors plus every live
	/// chunk's payload sectors) to the file's total length in sectors.
	pub fn density(&self) -> f64 {
		let total_sectors = self.mmap.len() as u64 / SECTOR;
		if total_sectors == 0 {
			return 1.0;
		}
		let live: u64 = self.headers.iter().filter(|h| h.is_live()).map(|h| h.size as u64).sum();
		(HEADER_SECTORS + live) as f64 / total_sectors as f64
	}

	/// Pack every live chunk back-to-back starting at sector
	/// [`HEADER_SECTORS`], in ascending offset order, and truncate the file
	/// to the new minimal length.
	pub fn defragment(&mut self) -> BackupResult<()> {
		let mut live: Vec<usize> = (0..CHUNK_COUNT).filter(|&i| self.headers[i].is_live()).collect();
		live.sort_by_key(|&i| self.headers[i]);

		let mut cursor = HEADER_SECTORS;
		let mut prev_end: Option<u64> = None;
		for &idx in &live {
			let header = self.headers[idx];
			let start_sector = header.offset as u64;
			if let Some(prev_end) = prev_end {
				if start_sector < prev_end {
					return Err(RegionError::CorruptedRegion.into());
				}
			}
			prev_end = Some(start_sector + header.size as u64);

			let src = start_sector as usize * SECTOR as usize;
			let dst = cursor as usize * SECTOR as usize;
			let len = header.size as usize * SECTOR as usize;
			if src != dst {
				self.mmap.copy_within(src..src + len, dst);
			}
			self.headers[idx].offset = cursor as u32;
			cursor += header.size as u64;
		}
		self.headers_changed = true;

		let new_len = cursor * SECTOR;
		if new_len != self.mmap.len() as u64 {
			self.resize(new_len)?;
		}
		self.flush_headers()
	}

	/// Mark every chunk in `self` that is unchanged relative to `other` as
	/// [`ChunkHeader::mark_unmodified`], defragment the remainder, and
	/// report whether every chunk ended up non-live (meaning the whole
	/// region is identical to `other` and can be omitted from the diff).
	pub fn filter_diff_defragment(&mut self, other: &RegionFile, is_chunk: bool) -> BackupResult<bool> {
		let mut any_live = false;
		for idx in 0..CHUNK_COUNT {
			if !self.headers[idx].is_live() {
				continue;
			}
			if other.headers[idx].is_live() && self.check_unchanged(idx, other, is_chunk)? {
				self.headers[idx].mark_unmodified();
				self.headers_changed = true;
			} else {
				any_live = true;
			}
		}
		self.defragment()?;
		Ok(!any_live)
	}

	/// Apply reverse-diff `diff` onto `self`, mutating `self` in place:
	/// timestamps always follow `diff`; `unmodified` entries keep `self`'s
	/// current payload; `not_created` entries clear `self`'s slot; payloads
	/// that fit in `self`'s already-allocated sectors overwrite in place;
	/// everything else is staged and appended after a single resize.
	pub fn apply_diff(&mut self, diff: &RegionFile, defragment: bool) -> BackupResult<()> {
		let mut staged: Vec<(usize, Vec<u8>, u32)> = Vec::new();

		for idx in 0..CHUNK_COUNT {
			let d = diff.headers[idx];
			self.headers[idx].mtime = d.mtime;
			self.headers_changed = true;

			if d.is_unmodified() {
				continue;
			}
			if d.is_not_created() {
				self.headers[idx].mark_not_created();
				continue;
			}

			let (start, len) = diff.chunk_byte_range(idx).ok_or(RegionError::CorruptedRegion)?;
			let sectors = d.size;
			if self.headers[idx].is_live() && sectors <= self.headers[idx].size {
				let dest = self.headers[idx].offset as usize * SECTOR as usize;
				self.mmap[dest..dest + len].copy_from_slice(&diff.mmap[start..start + len]);
				self.headers[idx].size = sectors;
			} else {
				staged.push((idx, diff.mmap[start..start + len].to_vec(), sectors));
			}
		}

		if !staged.is_empty() {
			self.append_staged(staged)?;
		}

		if defragment {
			self.defragment()
		} else {
			self.flush_headers()
		}
	}

	fn append_staged(&mut self, staged: Vec<(usize, Vec<u8>, u32)>) -> BackupResult<()> {
		let mut cursor = self.mmap.len() as u64 / SECTOR;
		let mut placements = Vec::with_capacity(staged.len());
		for (idx, bytes, sectors) in staged {
			placements.push((idx, bytes, cursor as u32, sectors));
			cursor += sectors as u64;
		}
		self.resize(cursor * SECTOR)?;
		for (idx, bytes, offset, sectors) in placements {
			let dest = offset as usize * SECTOR as usize;
			self.mmap[dest..dest + bytes.len()].copy_from_slice(&bytes);
			self.headers[idx].offset = offset;
			self.headers[idx].size = sectors;
		}
		self.headers_changed = true;
		Ok(())
	}

	fn resize(&mut self, new_len: u64) -> BackupResult<()> {
		self.file.set_len(new_len).map_err(RegionError::Io)?;
		self.mmap = unsafe { MmapMut::map_mut(&self.file).map_err(RegionError::Io)? };
		Ok(())
	}

	/// Summarize how `other` (the older state) differs from `self` (the
	/// newer state) without mutating either.
	pub fn report_diff(&self, other: &RegionFile, is_chunk: bool) -> BackupResult<RegionDiffReport> {
		let mut report = RegionDiffReport::default();
		for idx in 0..CHUNK_COUNT {
			let a = self.headers[idx];
			let b = other.headers[idx];
			match (a.is_live(), b.is_live()) {
				(true, false) => report.created += 1,
				(false, true) => report.deleted += 1,
				(true, true) => {
					if a.mtime != b.mtime {
						if self.check_unchanged(idx, other, is_chunk)? {
							report.touched += 1;
						} else {
							report.modified += 1;
						}
					}
					if a.offset != b.offset {
						report.moved += 1;
					}
				}
				(false, false) => {}
			}
		}
		Ok(report)
	}

	/// Write the in-memory headers back into the mmap's location and
	/// timestamp tables. Idempotent; cheap no-op if nothing changed.
	pub fn flush_headers(&mut self) -> BackupResult<()> {
		if !self.headers_changed {
			return Ok(());
		}
		for (idx, header) in self.headers.iter().enumerate() {
			let loc = header.location_word();
			self.mmap[idx * 4..idx * 4 + 4].copy_from_slice(&loc.to_be_bytes());
			self.mmap[4096 + idx * 4..4096 + idx * 4 + 4].copy_from_slice(&header.mtime.to_be_bytes());
		}
		self.mmap.flush().map_err(RegionError::Io)?;
		self.headers_changed = false;
		Ok(())
	}

	/// Flush pending header changes and sync the underlying file.
	pub fn close(mut self) -> BackupResult<()> {
		self.flush_headers()?;
		self.file.sync_all().map_err(RegionError::Io)?;
		Ok(())
	}
}

impl Drop for RegionFile {
	fn drop(&mut self) {
		let _ = self.flush_headers();
	}
}

fn load_headers(mmap: &MmapMut) -> Result<[ChunkHeader; CHUNK_COUNT], BackupError> {
	let mut headers = [ChunkHeader::not_created(); CHUNK_COUNT];
	for (idx, header) in headers.iter_mut().enumerate() {
		let loc_bytes: [u8; 4] = mmap[idx * 4..idx * 4 + 4].try_into().unwrap();
		let mtime_bytes: [u8; 4] = mmap[4096 + idx * 4..4096 + idx * 4 + 4].try_into().unwrap();
		let word = u32::from_be_bytes(loc_bytes);
		let mtime = u32::from_be_bytes(mtime_bytes);
		*header = ChunkHeader::from_location_word(word, mtime);
		if header.is_live() {
			let end_sector = header.offset as u64 + header.size as u64;
			if end_sector * SECTOR > mmap.len() as u64 {
				return Err(RegionError::RegionLoading.into());
			}
		}
	}
	Ok(headers)
}
