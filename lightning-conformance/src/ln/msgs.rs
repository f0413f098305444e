// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Wire messages as scripts see them: a message type name and a map of field values.
//!
//! Field values are loosely typed. Scripts may give any field as a [`FieldValue::Str`] in its
//! canonical text form (decimal integers, hex bytes, `BLOCKxTXxOUT` short channel ids, `[a,b]`
//! arrays and `{name=value}` structures) and the [`Namespace`] coerces it to the field's type
//! when the message is encoded or compared.
//!
//! [`Namespace`]: crate::ln::wire::Namespace

use alloc::collections::BTreeMap;

use bitcoin::hex::{DisplayHex, FromHex};
use bitcoin::secp256k1::PublicKey;

use core::fmt;

use crate::ln::signature::Sig;
use crate::prelude::*;
use crate::util::errors::DecodeError;
use crate::util::scid_utils::ShortChannelId;

/// The fields of a message, TLV record or subtype, by name.
pub type FieldMap = BTreeMap<String, FieldValue>;

/// The value of a single field.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
	/// Any integer type, including a single `byte`.
	Int(u64),
	/// A byte array, including the 32-byte hash types.
	Bytes(Vec<u8>),
	/// A `point`.
	Point(PublicKey),
	/// A `signature`.
	Sig(Sig),
	/// A `short_channel_id`.
	ShortChannelId(ShortChannelId),
	/// A `utf8` string, or any value in canonical text form awaiting coercion.
	Str(String),
	/// An array of a non-byte type.
	Array(Vec<FieldValue>),
	/// A subtype, a TLV record or a whole TLV stream.
	Struct(FieldMap),
}

impl FieldValue {
	/// The integer value, parsing a decimal string if need be.
	pub fn as_u64(&self) -> Result<u64, DecodeError> {
		match self {
			FieldValue::Int(v) => Ok(*v),
			FieldValue::Str(s) => s
				.parse()
				.map_err(|_| DecodeError::InvalidValue(format!("{} is not an integer", s))),
			_ => Err(DecodeError::InvalidValue(format!("{} is not an integer", self))),
		}
	}

	/// The byte value, parsing a hex string if need be.
	pub fn as_bytes(&self) -> Result<Vec<u8>, DecodeError> {
		match self {
			FieldValue::Bytes(v) => Ok(v.clone()),
			FieldValue::Point(pk) => Ok(pk.serialize().to_vec()),
			FieldValue::Sig(sig) => Ok(sig.to_compact().to_vec()),
			FieldValue::Str(s) => Vec::<u8>::from_hex(s)
				.map_err(|_| DecodeError::InvalidValue(format!("{} is not hex", s))),
			_ => Err(DecodeError::InvalidValue(format!("{} is not a byte array", self))),
		}
	}

	/// The number of elements this value would have as the array a length field describes.
	pub(crate) fn array_len(&self) -> Result<usize, DecodeError> {
		match self {
			FieldValue::Bytes(v) => Ok(v.len()),
			FieldValue::Array(v) => Ok(v.len()),
			FieldValue::Str(s) if s.starts_with('[') => Ok(split_list(s)?.len()),
			FieldValue::Str(s) => Ok(Vec::<u8>::from_hex(s)
				.map_err(|_| DecodeError::InvalidValue(format!("{} is not hex", s)))?
				.len()),
			_ => Err(DecodeError::InvalidValue(format!("{} has no length", self))),
		}
	}
}

impl fmt::Display for FieldValue {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			FieldValue::Int(v) => write!(f, "{}", v),
			FieldValue::Bytes(v) => write!(f, "{}", v.as_hex()),
			FieldValue::Point(pk) => write!(f, "{}", pk),
			FieldValue::Sig(sig) => write!(f, "{}", sig),
			FieldValue::ShortChannelId(scid) => write!(f, "{}", scid),
			FieldValue::Str(s) => f.write_str(s),
			FieldValue::Array(v) => {
				f.write_str("[")?;
				for (i, elem) in v.iter().enumerate() {
					if i > 0 {
						f.write_str(",")?;
					}
					write!(f, "{}", elem)?;
				}
				f.write_str("]")
			},
			FieldValue::Struct(map) => write_fields(f, map),
		}
	}
}

fn write_fields(f: &mut fmt::Formatter, map: &FieldMap) -> fmt::Result {
	f.write_str("{")?;
	for (i, (name, value)) in map.iter().enumerate() {
		if i > 0 {
			f.write_str(",")?;
		}
		write!(f, "{}={}", name, value)?;
	}
	f.write_str("}")
}

macro_rules! impl_from_int {
	($($ty: ty),*) => {$(
		impl From<$ty> for FieldValue {
			fn from(v: $ty) -> Self {
				FieldValue::Int(v as u64)
			}
		}
	)*}
}
impl_from_int!(u8, u16, u32, u64);

impl From<&str> for FieldValue {
	fn from(s: &str) -> Self {
		FieldValue::Str(s.to_owned())
	}
}

impl From<String> for FieldValue {
	fn from(s: String) -> Self {
		FieldValue::Str(s)
	}
}

impl From<Vec<u8>> for FieldValue {
	fn from(v: Vec<u8>) -> Self {
		FieldValue::Bytes(v)
	}
}

impl From<PublicKey> for FieldValue {
	fn from(pk: PublicKey) -> Self {
		FieldValue::Point(pk)
	}
}

impl From<Sig> for FieldValue {
	fn from(sig: Sig) -> Self {
		FieldValue::Sig(sig)
	}
}

impl From<ShortChannelId> for FieldValue {
	fn from(scid: ShortChannelId) -> Self {
		FieldValue::ShortChannelId(scid)
	}
}

impl From<FieldMap> for FieldValue {
	fn from(map: FieldMap) -> Self {
		FieldValue::Struct(map)
	}
}

/// A peer message: its type name and (possibly partial) fields.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
	/// The message type name, eg `init`.
	pub msgtype: String,
	/// The fields given so far.
	pub fields: FieldMap,
}

impl Message {
	/// A message of type `msgtype` with no fields set.
	pub fn new(msgtype: &str) -> Self {
		Message { msgtype: msgtype.to_owned(), fields: FieldMap::new() }
	}

	/// Sets `field` to `value`, builder-style.
	pub fn with(mut self, field: &str, value: impl Into<FieldValue>) -> Self {
		self.fields.insert(field.to_owned(), value.into());
		self
	}

	/// The value of `field`, if set.
	pub fn get(&self, field: &str) -> Option<&FieldValue> {
		self.fields.get(field)
	}
}

impl fmt::Display for Message {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.write_str(&self.msgtype)?;
		write_fields(f, &self.fields)
	}
}

/// Splits `s` at top-level occurrences of `sep`, ignoring those nested in brackets or braces.
pub(crate) fn split_top_level(s: &str, sep: char) -> Result<Vec<&str>, DecodeError> {
	let mut parts = Vec::new();
	let mut depth = 0i32;
	let mut start = 0;
	for (idx, c) in s.char_indices() {
		match c {
			'[' | '{' => depth += 1,
			']' | '}' => {
				depth -= 1;
				if depth < 0 {
					return Err(DecodeError::InvalidValue(format!("unbalanced {}", s)));
				}
			},
			c if c == sep && depth == 0 => {
				parts.push(&s[start..idx]);
				start = idx + c.len_utf8();
			},
			_ => {},
		}
	}
	if depth != 0 {
		return Err(DecodeError::InvalidValue(format!("unbalanced {}", s)));
	}
	parts.push(&s[start..]);
	Ok(parts)
}

fn strip_delims<'a>(s: &'a str, open: char, close: char) -> Result<&'a str, DecodeError> {
	s.strip_prefix(open)
		.and_then(|s| s.strip_suffix(close))
		.ok_or_else(|| DecodeError::InvalidValue(format!("{} is not wrapped in {}{}", s, open, close)))
}

/// The elements of a `[a,b,c]` list.
pub(crate) fn split_list(s: &str) -> Result<Vec<&str>, DecodeError> {
	let inner = strip_delims(s, '[', ']')?;
	if inner.is_empty() {
		return Ok(Vec::new());
	}
	split_top_level(inner, ',')
}

/// The `(name, value)` pairs of a `{name=value,...}` structure.
pub(crate) fn split_struct(s: &str) -> Result<Vec<(&str, &str)>, DecodeError> {
	let inner = strip_delims(s, '{', '}')?;
	if inner.is_empty() {
		return Ok(Vec::new());
	}
	split_top_level(inner, ',')?
		.into_iter()
		.map(|pair| {
			pair.split_once('=')
				.ok_or_else(|| DecodeError::InvalidValue(format!("{} is not name=value", pair)))
		})
		.collect()
}

/// Checks that every field of `expected` is present in `actual` with an equal value, recursing
/// into structures. Fields absent from `expected` are wildcards. Returns a description of the
/// first difference.
pub fn cmp_fields(actual: &FieldMap, expected: &FieldMap, prefix: &str) -> Option<String> {
	for (name, exp) in expected.iter() {
		let path = if prefix.is_empty() { name.clone() } else { format!("{}.{}", prefix, name) };
		match actual.get(name) {
			None => return Some(format!("{} not present", path)),
			Some(act) => {
				if let Some(diff) = cmp_value(act, exp, &path) {
					return Some(diff);
				}
			},
		}
	}
	None
}

fn cmp_value(actual: &FieldValue, expected: &FieldValue, path: &str) -> Option<String> {
	match (actual, expected) {
		(FieldValue::Struct(act), FieldValue::Struct(exp)) => cmp_fields(act, exp, path),
		(FieldValue::Array(act), FieldValue::Array(exp)) => {
			if act.len() != exp.len() {
				return Some(format!("{}: expected {} elements, got {}", path, exp.len(), act.len()));
			}
			act.iter()
				.zip(exp.iter())
				.enumerate()
				.find_map(|(i, (a, e))| cmp_value(a, e, &format!("{}[{}]", path, i)))
		},
		(FieldValue::Sig(act), FieldValue::Sig(exp)) => {
			if act == exp {
				None
			} else {
				Some(format!("{}: expected {:?}, got {}", path, exp, act))
			}
		},
		_ => {
			let (act, exp) = (actual.to_string(), expected.to_string());
			if act == exp {
				None
			} else {
				Some(format!("{}: expected {}, got {}", path, exp, act))
			}
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn canonical_strings() {
		let mut tlv = FieldMap::new();
		tlv.insert("type".to_owned(), FieldValue::Bytes(vec![0x10, 0x00]));
		let mut tlvs = FieldMap::new();
		tlvs.insert("channel_type".to_owned(), FieldValue::Struct(tlv));
		let msg = Message::new("open_channel")
			.with("feerate_per_kw", 253u32)
			.with("tlvs", tlvs)
			.with("htlc_signature", FieldValue::Array(vec![]))
			.with("short_channel_id", ShortChannelId { block: 103, tx_index: 1, vout: 0 });
		assert_eq!(
			msg.to_string(),
			"open_channel{feerate_per_kw=253,htlc_signature=[],short_channel_id=103x1x0,tlvs={channel_type={type=1000}}}"
		);
	}

	#[test]
	fn splitting_respects_nesting() {
		assert_eq!(split_list("[]").unwrap(), Vec::<&str>::new());
		assert_eq!(split_list("[a,{b=1,c=2},[d,e]]").unwrap(), vec!["a", "{b=1,c=2}", "[d,e]"]);
		assert_eq!(
			split_struct("{a=1,b={c=[x,y]}}").unwrap(),
			vec![("a", "1"), ("b", "{c=[x,y]}")]
		);
		assert!(split_list("[a,b").is_err());
		assert!(split_struct("{a}").is_err());
		assert!(split_top_level("a]", ',').is_err());
	}

	#[test]
	fn partial_comparison() {
		let actual = Message::new("init")
			.with("globalfeatures", Vec::<u8>::new())
			.with("features", vec![0x22u8])
			.fields;
		let mut expected = FieldMap::new();
		assert_eq!(cmp_fields(&actual, &expected, ""), None);
		expected.insert("features".to_owned(), FieldValue::Str("22".to_owned()));
		assert_eq!(cmp_fields(&actual, &expected, ""), None);
		expected.insert("features".to_owned(), FieldValue::Str("20".to_owned()));
		assert_eq!(
			cmp_fields(&actual, &expected, ""),
			Some("features: expected 20, got 22".to_owned())
		);
		expected.clear();
		expected.insert("tlvs".to_owned(), FieldValue::Struct(FieldMap::new()));
		assert_eq!(cmp_fields(&actual, &expected, ""), Some("tlvs not present".to_owned()));
	}

	#[test]
	fn value_accessors() {
		assert_eq!(FieldValue::from("42").as_u64().unwrap(), 42);
		assert_eq!(FieldValue::from(7u16).as_u64().unwrap(), 7);
		assert!(FieldValue::from("0x").as_u64().is_err());
		assert_eq!(FieldValue::from("00ff").as_bytes().unwrap(), vec![0, 0xff]);
		assert_eq!(FieldValue::from("[a,b,c]").array_len().unwrap(), 3);
		assert_eq!(FieldValue::from("0102").array_len().unwrap(), 2);
	}
}
