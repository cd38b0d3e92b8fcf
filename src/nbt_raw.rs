//! Minimal NBT reader used only to test two compressed chunk payloads for
//! structural equality.
//!
//! No numeric interpretation and no UTF-8 validation happens here: every
//! leaf tag becomes the exact byte slice of its on-disk payload, and
//! equality of two trees is just derived `PartialEq` over nested maps and
//! vectors. This is cheap to build and cheap to compare, which is all a
//! backup engine needs from NBT.

use std::collections::HashMap;

use crate::error::{NbtError, Side};

/// A raw, unvalidated NBT value: either a leaf payload, a list of values,
/// or a compound mapping raw (non-UTF-8-checked) names to values.
#[derive(Debug, PartialEq)]
pub enum RawTag<'a> {
	Leaf(&'a [u8]),
	List(Vec<RawTag<'a>>),
	Compound(HashMap<&'a [u8], RawTag<'a>>),
}

struct Cursor<'a> {
	buf: &'a [u8],
	pos: usize,
}

impl<'a> Cursor<'a> {
	fn new(buf: &'a [u8]) -> Self {
		Self { buf, pos: 0 }
	}

	fn take(&mut self, n: usize) -> Result<&'a [u8], NbtError> {
		let end = self.pos.checked_add(n).filter(|&end| end <= self.buf.len());
		let end = end.ok_or(NbtError::UnexpectedEof { side: Side::Left })?;
		let slice = &self.buf[self.pos..end];
		self.pos = end;
		Ok(slice)
	}

	fn u8(&mut self) -> Result<u8, NbtError> {
		Ok(self.take(1)?[0])
	}

	fn u16(&mut self) -> Result<u16, NbtError> {
		Ok(u16::from_be_bytes(self.take(2)?.try_into().unwrap()))
	}

	fn u32(&mut self) -> Result<u32, NbtError> {
		Ok(u32::from_be_bytes(self.take(4)?.try_into().unwrap()))
	}
}

const SIZED_LEAF: [usize; 7] = [0, 1, 2, 4, 8, 4, 8]; // indexed by tag id 0..=6, id 0 unused

fn parse_tag<'a>(id: u8, cur: &mut Cursor<'a>) -> Result<RawTag<'a>, NbtError> {
	Ok(match id {
		1..=6 => RawTag::Leaf(cur.take(SIZED_LEAF[id as usize])?),
		7 => {
			let len = cur.u32()? as usize;
			RawTag::Leaf(cur.take(len)?)
		}
		8 => {
			let len = cur.u16()? as usize;
			RawTag::Leaf(cur.take(len)?)
		}
		9 => parse_list(cur)?,
		10 => RawTag::Compound(parse_compound_body(cur)?),
		11 => {
			let len = cur.u32()? as usize;
			let bytes = len.checked_mul(4).ok_or(NbtError::UnexpectedEof { side: Side::Left })?;
			RawTag::Leaf(cur.take(bytes)?)
		}
		12 => {
			let len = cur.u32()? as usize;
			let bytes = len.checked_mul(8).ok_or(NbtError::UnexpectedEof { side: Side::Left })?;
			RawTag::Leaf(cur.take(bytes)?)
		}
		_ => unreachable!("caller validates tag ids before calling parse_tag"),
	})
}

fn parse_list<'a>(cur: &mut Cursor<'a>) -> Result<RawTag<'a>, NbtError> {
	let id = cur.u8()?;
	let count = cur.u32()? as usize;
	if id == 0 {
		// Untyped/empty list sentinel; no elements follow regardless of `count`.
		return Ok(RawTag::List(Vec::new()));
	}
	if id > 12 {
		return Err(NbtError::UnknownTagInList { id, side: Side::Left });
	}
	let mut items = Vec::with_capacity(count.min(4096));
	for _ in 0..count {
		items.push(parse_tag(id, cur)?);
	}
	Ok(RawTag::List(items))
}

fn parse_compound_body<'a>(cur: &mut Cursor<'a>) -> Result<HashMap<&'a [u8], RawTag<'a>>, NbtError> {
	let mut map = HashMap::new();
	loop {
		let id = cur.u8()?;
		if id == 0 {
			break;
		}
		if id > 12 {
			return Err(NbtError::UnknownTagInCompound { id, side: Side::Left });
		}
		let name_len = cur.u16()? as usize;
		let name = cur.take(name_len)?;
		let value = parse_tag(id, cur)?;
		map.insert(name, value);
	}
	Ok(map)
}

/// Parse just the root Compound's entries, skipping the root tag's own id
/// and name. Fails with [`NbtError::RootNotCompound`] if the stream does
/// not start with a Compound tag.
pub fn parse_root(buf: &[u8]) -> Result<HashMap<&[u8], RawTag<'_>>, NbtError> {
	let mut cur = Cursor::new(buf);
	let id = cur.u8()?;
	if id != 10 {
		return Err(NbtError::RootNotCompound { side: Side::Left });
	}
	let name_len = cur.u16()? as usize;
	cur.take(name_len)?;
	parse_compound_body(&mut cur)
}

const LAST_UPDATE: &[u8] = b"LastUpdate";

/// Compare two compressed-and-then-decompressed NBT blobs for structural
/// equality. When `treat_as_chunk` is set, the top-level `LastUpdate` key
/// is removed from both sides first, since Minecraft rewrites it on every
/// chunk save even when nothing else changed.
pub fn compare_nbt(left: &[u8], right: &[u8], treat_as_chunk: bool) -> Result<bool, NbtError> {
	let mut left_map = parse_root(left).map_err(|e| e.with_side(Side::Left))?;
	let mut right_map = parse_root(right).map_err(|e| e.with_side(Side::Right))?;
	if treat_as_chunk {
		left_map.remove(LAST_UPDATE);
		right_map.remove(LAST_UPDATE);
	}
	Ok(left_map == right_map)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn compound_bytes(entries: &[(u8, &str, &[u8])]) -> Vec<u8> {
		let mut out = vec![0x0a, 0x00, 0x00]; // root Compound, empty name
		for &(id, name, payload) in entries {
			out.push(id);
			out.extend_from_slice(&(name.len() as u16).to_be_bytes());
			out.extend_from_slice(name.as_bytes());
			out.extend_from_slice(payload);
		}
		out.push(0x00); // End
		out
	}

	#[test]
	fn equal_compounds_compare_equal() {
		let a = compound_bytes(&[(4, "LastUpdate", &1i64.to_be_bytes()), (8, "hello", &[0, 5, b'w', b'o', b'r', b'l', b'd'])]);
		assert!(compare_nbt(&a, &a, false).unwrap());
	}

	#[test]
	fn last_update_ignored_for_chunks() {
		let a = compound_bytes(&[(4, "LastUpdate", &1i64.to_be_bytes())]);
		let b = compound_bytes(&[(4, "LastUpdate", &2i64.to_be_bytes())]);
		assert!(compare_nbt(&a, &b, true).unwrap());
		assert!(!compare_nbt(&a, &b, false).unwrap());
	}

	#[test]
	fn root_must_be_compound() {
		let not_compound = [0x09u8, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
		let compound = compound_bytes(&[]);
		let err = compare_nbt(&not_compound, &compound, false).unwrap_err();
		assert!(matches!(err, NbtError::RootNotCompound { side: Side::Left }));
	}

	#[test]
	fn unknown_tag_in_compound_is_reported() {
		let left = compound_bytes(&[]);
		let right: Vec<u8> = vec![0x0a, 0x00, 0x00, 0x0d, 0x00, 0x00];
		let err = compare_nbt(&left, &right, false).unwrap_err();
		assert!(matches!(err, NbtError::UnknownTagInCompound { id: 13, side: Side::Right }));
	}

	#[test]
	fn truncated_nbt_is_unexpected_eof() {
		let full = compound_bytes(&[(7, "bytes", &[0, 0, 0, 1, 0xff])]);
		for cutoff in 0..full.len() {
			let truncated = &full[..cutoff];
			let err = compare_nbt(truncated, &full, false).unwrap_err();
			assert!(matches!(err, NbtError::UnexpectedEof { side: Side::Left }), "cutoff {cutoff}");
		}
	}
}
