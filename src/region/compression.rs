//! Compression schemes recognized in the chunk payload header.

use std::io::{Read, Write};

use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression as Flate2Level;

use crate::error::ChunkLoadingReason;

/// A recognized chunk compression type byte. Values with bit 7 set denote
/// an externalized `.mcc` payload and are represented separately since the
/// core never loads them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
	Uncompressed,
	Gzip,
	Zlib,
	Lz4Frame,
}

impl Compression {
	pub fn from_byte(byte: u8) -> Result<Self, ChunkLoadingReason> {
		if byte & 0x80 != 0 {
			return Err(ChunkLoadingReason::Externalized);
		}
		match byte {
			0 | 3 => Ok(Compression::Uncompressed),
			1 => Ok(Compression::Gzip),
			2 => Ok(Compression::Zlib),
			4 => Ok(Compression::Lz4Frame),
			other => Err(ChunkLoadingReason::UnknownCompression(other)),
		}
	}

	pub fn to_byte(self) -> u8 {
		match self {
			Compression::Uncompressed => 3,
			Compression::Gzip => 1,
			Compression::Zlib => 2,
			Compression::Lz4Frame => 4,
		}
	}

	pub fn decompress(self, payload: &[u8]) -> std::io::Result<Vec<u8>> {
		match self {
			Compression::Uncompressed => Ok(payload.to_vec()),
			Compression::Gzip => {
				let mut out = Vec::new();
				GzDecoder::new(payload).read_to_end(&mut out)?;
				Ok(out)
			}
			Compression::Zlib => {
				let mut out = Vec::new();
				ZlibDecoder::new(payload).read_to_end(&mut out)?;
				Ok(out)
			}
			Compression::Lz4Frame => {
				let mut out = Vec::new();
				lz4_flex::frame::FrameDecoder::new(payload).read_to_end(&mut out)?;
				Ok(out)
			}
		}
	}

	pub fn compress(self, data: &[u8]) -> std::io::Result<Vec<u8>> {
		match self {
			Compression::Uncompressed => Ok(data.to_vec()),
			Compression::Gzip => {
				let mut encoder = GzEncoder::new(Vec::new(), Flate2Level::default());
				encoder.write_all(data)?;
				encoder.finish()
			}
			Compression::Zlib => {
				let mut encoder = ZlibEncoder::new(Vec::new(), Flate2Level::default());
				encoder.write_all(data)?;
				encoder.finish()
			}
			Compression::Lz4Frame => {
				let mut encoder = lz4_flex::frame::FrameEncoder::new(Vec::new());
				encoder.write_all(data)?;
				encoder.finish().map_err(std::io::Error::other)
			}
		}
	}
}
