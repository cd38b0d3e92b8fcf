//! Crate-wide error taxonomy.
//!
//! Each subsystem gets its own `thiserror` enum (mirroring the split the
//! original engine drew between region errors, NBT errors and chain
//! errors); [`BackupError`] is the facade callers outside `mc_backup`
//! should match on.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading, writing or defragmenting a region file.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RegionError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	#[error("chunk headers are truncated or unparseable")]
	RegionLoading,
	#[error("region file is empty")]
	EmptyRegion,
	#[error("chunk {0} could not be loaded: {1}")]
	ChunkLoading(usize, ChunkLoadingReason),
	#[error("region file is corrupted: overlapping chunk payloads")]
	CorruptedRegion,
}

/// Why a particular chunk failed to load.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ChunkLoadingReason {
	#[error("chunk is not created")]
	NotCreated,
	#[error("chunk is marked unmodified and carries no payload")]
	Unmodified,
	#[error("unknown compression type: {0}")]
	UnknownCompression(u8),
	#[error("chunk payload is stored externally in a .mcc file, which is not supported")]
	Externalized,
}

/// Which side of a two-argument comparison triggered an NBT error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
	Left,
	Right,
}

impl std::fmt::Display for Side {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(match self {
			Side::Left => "left",
			Side::Right => "right",
		})
	}
}

/// Errors raised while parsing or comparing raw NBT payloads.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum NbtError {
	#[error("root tag is not a Compound (occurred while parsing {side})")]
	RootNotCompound { side: Side },
	#[error("unknown tag id {id} in Compound (occurred while parsing {side})")]
	UnknownTagInCompound { id: u8, side: Side },
	#[error("unknown tag id {id} in List (occurred while parsing {side})")]
	UnknownTagInList { id: u8, side: Side },
	#[error("unexpected EOF (occurred while parsing {side})")]
	UnexpectedEof { side: Side },
}

impl NbtError {
	/// Re-tag a side-less parse error with which blob it came from.
	pub(crate) fn with_side(self, side: Side) -> Self {
		match self {
			NbtError::RootNotCompound { .. } => NbtError::RootNotCompound { side },
			NbtError::UnknownTagInCompound { id, .. } => NbtError::UnknownTagInCompound { id, side },
			NbtError::UnknownTagInList { id, .. } => NbtError::UnknownTagInList { id, side },
			NbtError::UnexpectedEof { .. } => NbtError::UnexpectedEof { side },
		}
	}
}

/// Errors raised while reading or mutating a backup chain's metadata.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ChainError {
	#[error("no backup found at index {0}")]
	IndexOutOfRange(usize),
	#[error("backup metadata is missing: neither {dat} nor {json} exist")]
	MetadataMissing { dat: PathBuf, json: PathBuf },
}

/// Aggregate error raised by the worker pool when one or more submitted
/// tasks fail; wraps every error that was observed before cancellation.
#[derive(Debug, Error)]
#[error("{} worker task(s) failed: {}", .0.len(), join_errors(.0))]
pub struct PoolError(pub Vec<BackupError>);

fn join_errors(errors: &[BackupError]) -> String {
	errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

/// The crate-wide error type.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BackupError {
	#[error(transparent)]
	Io(#[from] std::io::Error),
	#[error(transparent)]
	Region(#[from] RegionError),
	#[error(transparent)]
	Nbt(#[from] NbtError),
	#[error(transparent)]
	Chain(#[from] ChainError),
	#[error(transparent)]
	Pool(#[from] PoolError),
	#[error("failed to (de)serialize backup metadata: {0}")]
	Metadata(String),
}

pub type BackupResult<T> = Result<T, BackupError>;
