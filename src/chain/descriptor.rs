//! A single entry in a backup chain.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Describes one backup: when it was taken, its archive's identity, which
/// paths present in the next-newer snapshot are absent here, and an
/// optional human description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupDescriptor {
	pub timestamp: DateTime<Utc>,
	pub id: Uuid,
	#[serde(default)]
	pub not_present: HashSet<String>,
	#[serde(default)]
	pub desc: Option<String>,
}

impl BackupDescriptor {
	pub fn new(id: Uuid, timestamp: DateTime<Utc>, desc: Option<String>) -> Self {
		Self { timestamp, id, not_present: HashSet::new(), desc }
	}

	/// `<uuid>.tar.gz`, the archive file name this descriptor identifies.
	pub fn archive_name(&self) -> String {
		format!("{}.tar.gz", self.id)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn archive_name_is_uuid_tar_gz() {
		let id = Uuid::nil();
		let d = BackupDescriptor::new(id, Utc::now(), None);
		assert_eq!(d.archive_name(), "00000000-0000-0000-0000-000000000000.tar.gz");
	}
}
