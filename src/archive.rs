//! Tar+gzip archive I/O: full creation (with the ignore filter), full
//! extraction, and partial extraction that skips a caller-supplied set of
//! relative paths.

use std::collections::HashSet;
use std::fs::File;
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression as Flate2Level;
use tar::{Archive, Builder};

use crate::error::{BackupResult, RegionError};
use crate::ignore::is_ignored;

/// Tar-gz the tree rooted at `src` into `dest`, skipping any path whose
/// basename is in the fixed ignore set at any depth.
pub fn create_archive(src: &Path, dest: &Path) -> BackupResult<()> {
	let file = File::create(dest).map_err(RegionError::Io)?;
	let encoder = GzEncoder::new(file, Flate2Level::default());
	let mut builder = Builder::new(encoder);
	append_tree(&mut builder, src, src)?;
	builder.into_inner().map_err(RegionError::Io)?.finish().map_err(RegionError::Io)?;
	Ok(())
}

fn append_tree(builder: &mut Builder<impl std::io::Write>, root: &Path, dir: &Path) -> BackupResult<()> {
	let mut entries: Vec<_> = std::fs::read_dir(dir).map_err(RegionError::Io)?.collect::<Result<_, _>>().map_err(RegionError::Io)?;
	entries.sort_by_key(|e| e.file_name());
	for entry in entries {
		let path = entry.path();
		if is_ignored(&path) {
			continue;
		}
		let file_type = entry.file_type().map_err(RegionError::Io)?;
		if file_type.is_dir() {
			append_tree(builder, root, &path)?;
		} else if file_type.is_file() {
			let relative = path.strip_prefix(root).expect("path is under root");
			builder.append_path_with_name(&path, relative).map_err(RegionError::Io)?;
		}
	}
	Ok(())
}

/// Fully extract `archive` into `dest`, which must already exist.
pub fn extract_archive(archive: &Path, dest: &Path) -> BackupResult<()> {
	let file = File::open(archive).map_err(RegionError::Io)?;
	let decoder = GzDecoder::new(file);
	let mut reader = Archive::new(decoder);
	reader.unpack(dest).map_err(RegionError::Io)?;
	Ok(())
}

/// Extract `archive` into `dest`, skipping any entry whose normalized
/// relative path is in `skip`.
pub fn extract_archive_partial(archive: &Path, dest: &Path, skip: &HashSet<String>) -> BackupResult<()> {
	let file = File::open(archive).map_err(RegionError::Io)?;
	let decoder = GzDecoder::new(file);
	let mut reader = Archive::new(decoder);
	for entry in reader.entries().map_err(RegionError::Io)? {
		let mut entry = entry.map_err(RegionError::Io)?;
		let path = entry.path().map_err(RegionError::Io)?.to_string_lossy().replace('\\', "/");
		if skip.contains(path.as_str()) {
			continue;
		}
		entry.unpack_in(dest).map_err(RegionError::Io)?;
	}
	Ok(())
}
