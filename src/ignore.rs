//! World-directory entries that never participate in a backup, regardless
//! of how deep they appear in the tree.

use std::path::Path;

const IGNORED_BASENAMES: [&str; 4] = ["datapacks", "session.lock", "DistantHorizons.sqlite", "icon.png"];

/// Whether `path`'s file name matches one of the fixed ignore entries.
/// Applies at any depth: a `datapacks` directory is skipped whether it
/// sits at the world root or nested inside a dimension folder.
pub fn is_ignored(path: &Path) -> bool {
	match path.file_name().and_then(|n| n.to_str()) {
		Some(name) => IGNORED_BASENAMES.contains(&name),
		None => false,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::path::PathBuf;

	#[test]
	fn matches_at_any_depth() {
		assert!(is_ignored(&PathBuf::from("world/datapacks")));
		assert!(is_ignored(&PathBuf::from("world/DIM-1/datapacks")));
		assert!(is_ignored(&PathBuf::from("world/session.lock")));
		assert!(is_ignored(&PathBuf::from("world/icon.png")));
	}

	#[test]
	fn leaves_everything_else_alone() {
		assert!(!is_ignored(&PathBuf::from("world/region/r.0.0.mca")));
		assert!(!is_ignored(&PathBuf::from("world/level.dat")));
	}
}
