// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Wire encoding and decoding of [`Message`]s, driven by a table of field definitions.
//!
//! A [`Namespace`] is loaded once and handed to the [`Runner`], which is the only place events
//! get it from. Each message is a big-endian `u16` type followed by its fields in table order.
//!
//! [`Runner`]: crate::runner::Runner

use alloc::borrow::Cow;

use bitcoin::secp256k1::PublicKey;

use crate::ln::bolt_csv;
use crate::ln::msgs::{split_list, split_struct, FieldMap, FieldValue, Message};
use crate::ln::signature::Sig;
use crate::prelude::*;
use crate::util::errors::DecodeError;
use crate::util::scid_utils::ShortChannelId;

/// The built-in field types.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FundamentalType {
	/// A single byte, or the element of a byte array.
	Byte,
	/// Big-endian 16-bit integer.
	U16,
	/// Big-endian 32-bit integer.
	U32,
	/// Big-endian 64-bit integer.
	U64,
	/// A 16-bit integer with leading zero bytes omitted. Only valid as the last field of a TLV
	/// record.
	Tu16,
	/// As [`FundamentalType::Tu16`], 32 bits.
	Tu32,
	/// As [`FundamentalType::Tu16`], 64 bits.
	Tu64,
	/// The variable-length integer used for TLV types and lengths.
	BigSize,
	/// A 32-byte genesis block hash.
	ChainHash,
	/// A 32-byte channel id.
	ChannelId,
	/// A 32-byte hash.
	Sha256,
	/// A 33-byte compressed public key.
	Point,
	/// A 64-byte compact ECDSA signature.
	Signature,
	/// An 8-byte short channel id.
	ShortChannelId,
	/// A byte of UTF-8 text.
	Utf8,
}

impl FundamentalType {
	fn from_name(name: &str) -> Option<Self> {
		Some(match name {
			"byte" | "u8" => FundamentalType::Byte,
			"u16" => FundamentalType::U16,
			"u32" => FundamentalType::U32,
			"u64" => FundamentalType::U64,
			"tu16" => FundamentalType::Tu16,
			"tu32" => FundamentalType::Tu32,
			"tu64" => FundamentalType::Tu64,
			"bigsize" | "varint" => FundamentalType::BigSize,
			"chain_hash" => FundamentalType::ChainHash,
			"channel_id" => FundamentalType::ChannelId,
			"sha256" => FundamentalType::Sha256,
			"point" => FundamentalType::Point,
			"signature" => FundamentalType::Signature,
			"short_channel_id" => FundamentalType::ShortChannelId,
			"utf8" => FundamentalType::Utf8,
			_ => return None,
		})
	}

	fn int_width(&self) -> Option<usize> {
		match self {
			FundamentalType::Byte => Some(1),
			FundamentalType::U16 | FundamentalType::Tu16 => Some(2),
			FundamentalType::U32 | FundamentalType::Tu32 => Some(4),
			FundamentalType::U64 | FundamentalType::Tu64 | FundamentalType::BigSize => Some(8),
			_ => None,
		}
	}

	/// Whether values of this type are integers.
	pub fn is_integer(&self) -> bool {
		self.int_width().is_some()
	}
}

/// The type of a field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldType {
	/// A built-in type.
	Fundamental(FundamentalType),
	/// A structure defined by `subtype` lines.
	Subtype(String),
	/// A TLV stream defined by `tlvtype` lines.
	TlvStream(String),
}

/// How many elements of its type a field holds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldCount {
	/// Exactly one.
	Single,
	/// A fixed-size array.
	Fixed(usize),
	/// An array whose length is held by the named earlier field.
	LengthField(String),
	/// An array running to the end of the enclosing message or TLV record.
	Ellipsis,
}

/// The definition of one field of a message, subtype or TLV record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDef {
	/// The field name.
	pub name: String,
	/// The element type.
	pub fieldtype: FieldType,
	/// The number of elements.
	pub count: FieldCount,
	is_length: bool,
}

impl FieldDef {
	/// Whether another field uses this one as its length. Such fields are filled in
	/// automatically when encoding.
	pub fn is_length_field(&self) -> bool {
		self.is_length
	}

	fn is_bytes(&self) -> bool {
		self.count != FieldCount::Single
			&& self.fieldtype == FieldType::Fundamental(FundamentalType::Byte)
	}

	fn is_text(&self) -> bool {
		self.count != FieldCount::Single
			&& self.fieldtype == FieldType::Fundamental(FundamentalType::Utf8)
	}
}

/// A message type: its name, number and fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageType {
	/// The message type name.
	pub name: String,
	/// The two-byte type number.
	pub number: u16,
	/// The fields in wire order.
	pub fields: Vec<FieldDef>,
}

impl MessageType {
	/// The definition of `field`.
	pub fn find_field(&self, field: &str) -> Option<&FieldDef> {
		self.fields.iter().find(|f| f.name == field)
	}
}

#[derive(Clone, Debug)]
struct TlvRecordType {
	name: String,
	number: u64,
	fields: Vec<FieldDef>,
}

struct RawField {
	name: String,
	typename: String,
	count: FieldCount,
}

/// A set of message definitions.
pub struct Namespace {
	messages: Vec<MessageType>,
	subtypes: HashMap<String, Vec<FieldDef>>,
	tlv_streams: HashMap<String, Vec<TlvRecordType>>,
}

impl Namespace {
	/// Loads message definitions from BOLT CSV lines:
	///
	/// ```text
	/// msgtype,<name>,<number>[,<option>]
	/// msgdata,<msgname>,<field>,<type>,[<count>]
	/// subtype,<name>
	/// subtypedata,<subtype>,<field>,<type>,[<count>]
	/// tlvtype,<stream>,<record>,<number>
	/// tlvdata,<stream>,<record>,<field>,<type>,[<count>]
	/// ```
	///
	/// `<count>` is empty for a single element, a number for a fixed array, `...` for an array
	/// running to the end, or the name of an earlier field holding the length. `<type>` is a
	/// fundamental type, a subtype or, for `msgdata`, a TLV stream name.
	pub fn from_csv(csv: &str) -> Result<Self, DecodeError> {
		let mut messages: Vec<(String, u16, Vec<RawField>)> = Vec::new();
		let mut subtypes: Vec<(String, Vec<RawField>)> = Vec::new();
		let mut tlvs: Vec<(String, Vec<(String, u64, Vec<RawField>)>)> = Vec::new();

		for line in csv.lines().map(str::trim).filter(|l| !l.is_empty() && !l.starts_with('#')) {
			let parts: Vec<&str> = line.split(',').collect();
			let bad = || DecodeError::BadSchema(line.to_owned());
			let parse_count = |count: Option<&&str>| match count.copied().unwrap_or("") {
				"" => FieldCount::Single,
				"..." => FieldCount::Ellipsis,
				n => match n.parse::<usize>() {
					Ok(size) => FieldCount::Fixed(size),
					Err(_) => FieldCount::LengthField(n.to_owned()),
				},
			};
			match parts[0] {
				"msgtype" if parts.len() >= 3 => {
					let number = parts[2].parse::<u16>().map_err(|_| bad())?;
					messages.push((parts[1].to_owned(), number, Vec::new()));
				},
				"msgdata" if parts.len() >= 4 => {
					let msg = messages.iter_mut().find(|m| m.0 == parts[1]).ok_or_else(bad)?;
					let count = parse_count(parts.get(4));
					msg.2.push(RawField { name: parts[2].to_owned(), typename: parts[3].to_owned(), count });
				},
				"subtype" if parts.len() >= 2 => subtypes.push((parts[1].to_owned(), Vec::new())),
				"subtypedata" if parts.len() >= 4 => {
					let sub = subtypes.iter_mut().find(|s| s.0 == parts[1]).ok_or_else(bad)?;
					let count = parse_count(parts.get(4));
					sub.1.push(RawField { name: parts[2].to_owned(), typename: parts[3].to_owned(), count });
				},
				"tlvtype" if parts.len() >= 4 => {
					let number = parts[3].parse::<u64>().map_err(|_| bad())?;
					let stream = match tlvs.iter_mut().position(|t| t.0 == parts[1]) {
						Some(idx) => &mut tlvs[idx],
						None => {
							tlvs.push((parts[1].to_owned(), Vec::new()));
							tlvs.last_mut().ok_or_else(bad)?
						},
					};
					stream.1.push((parts[2].to_owned(), number, Vec::new()));
				},
				"tlvdata" if parts.len() >= 5 => {
					let stream = tlvs.iter_mut().find(|t| t.0 == parts[1]).ok_or_else(bad)?;
					let record = stream.1.iter_mut().find(|r| r.0 == parts[2]).ok_or_else(bad)?;
					let count = parse_count(parts.get(5));
					record.2.push(RawField { name: parts[3].to_owned(), typename: parts[4].to_owned(), count });
				},
				_ => return Err(bad()),
			}
		}

		let subtype_names: Vec<String> = subtypes.iter().map(|s| s.0.clone()).collect();
		let tlv_names: Vec<String> = tlvs.iter().map(|t| t.0.clone()).collect();
		let resolve = |container: &str, raw: Vec<RawField>, allow_tlv: bool| -> Result<Vec<FieldDef>, DecodeError> {
			let mut fields: Vec<FieldDef> = Vec::with_capacity(raw.len());
			for field in raw {
				let fieldtype = if let Some(fundamental) = FundamentalType::from_name(&field.typename) {
					FieldType::Fundamental(fundamental)
				} else if subtype_names.contains(&field.typename) {
					FieldType::Subtype(field.typename)
				} else if allow_tlv && tlv_names.contains(&field.typename) {
					FieldType::TlvStream(field.typename)
				} else {
					return Err(DecodeError::BadSchema(format!(
						"{}.{} has unknown type {}", container, field.name, field.typename
					)));
				};
				if let FieldCount::LengthField(ref len) = field.count {
					let len_field = fields.iter_mut().find(|f| &f.name == len).ok_or_else(|| {
						DecodeError::BadSchema(format!("{}.{} has unknown length {}", container, field.name, len))
					})?;
					len_field.is_length = true;
				}
				fields.push(FieldDef { name: field.name, fieldtype, count: field.count, is_length: false });
			}
			Ok(fields)
		};

		let mut namespace = Namespace {
			messages: Vec::with_capacity(messages.len()),
			subtypes: new_hash_map(),
			tlv_streams: new_hash_map(),
		};
		for (name, raw) in subtypes {
			let fields = resolve(&name, raw, false)?;
			namespace.subtypes.insert(name, fields);
		}
		for (name, records) in tlvs {
			let mut resolved = Vec::with_capacity(records.len());
			for (record, number, raw) in records {
				let fields = resolve(&record, raw, false)?;
				resolved.push(TlvRecordType { name: record, number, fields });
			}
			resolved.sort_by_key(|r| r.number);
			namespace.tlv_streams.insert(name, resolved);
		}
		for (name, number, raw) in messages {
			if namespace.messages.iter().any(|m| m.number == number || m.name == name) {
				return Err(DecodeError::BadSchema(format!("{} ({}) defined twice", name, number)));
			}
			let fields = resolve(&name, raw, true)?;
			namespace.messages.push(MessageType { name, number, fields });
		}
		Ok(namespace)
	}

	/// The peer messages of BOLTs #1, #2 and #7.
	pub fn bolts() -> Self {
		let csv = [bolt_csv::BOLT1, bolt_csv::BOLT2, bolt_csv::BOLT7].concat();
		Namespace::from_csv(&csv).expect("The built-in BOLT tables are well-formed")
	}

	/// The message type called `name`.
	pub fn get_msgtype(&self, name: &str) -> Option<&MessageType> {
		self.messages.iter().find(|m| m.name == name)
	}

	/// The message type numbered `number`.
	pub fn get_msgtype_by_number(&self, number: u16) -> Option<&MessageType> {
		self.messages.iter().find(|m| m.number == number)
	}

	fn msgtype_of(&self, msg: &Message) -> Result<&MessageType, DecodeError> {
		self.get_msgtype(&msg.msgtype).ok_or_else(|| DecodeError::UnknownMessage(msg.msgtype.clone()))
	}

	fn tlv_stream(&self, name: &str) -> Result<&[TlvRecordType], DecodeError> {
		self.tlv_streams.get(name).map(|v| &v[..]).ok_or_else(|| DecodeError::BadSchema(name.to_owned()))
	}

	fn subtype(&self, name: &str) -> Result<&[FieldDef], DecodeError> {
		self.subtypes.get(name).map(|v| &v[..]).ok_or_else(|| DecodeError::BadSchema(name.to_owned()))
	}

	/// The fields of `msg` which must be given before it can be sent. Length fields and TLV
	/// streams are never required.
	pub fn missing_fields<'a>(&'a self, msg: &Message) -> Result<Vec<&'a FieldDef>, DecodeError> {
		Ok(self
			.msgtype_of(msg)?
			.fields
			.iter()
			.filter(|f| !f.is_length && !matches!(f.fieldtype, FieldType::TlvStream(_)))
			.filter(|f| !msg.fields.contains_key(&f.name))
			.collect())
	}

	/// Serializes `msg`, type prefix included.
	///
	/// Length fields which are not given are computed from the array they describe. Trailing
	/// fields may be omitted, in which case nothing is written for them.
	pub fn encode(&self, msg: &Message) -> Result<Vec<u8>, DecodeError> {
		let msgtype = self.msgtype_of(msg)?;
		let mut out = Vec::new();
		out.extend_from_slice(&msgtype.number.to_be_bytes());
		self.write_fields(&msgtype.name, &msgtype.fields, &msg.fields, &mut out)?;
		Ok(out)
	}

	/// Parses a message, type prefix included. Bytes following the last known field are
	/// ignored.
	pub fn decode(&self, buf: &[u8]) -> Result<Message, DecodeError> {
		let mut reader = Reader::new(buf);
		let number = reader.read_u16()?;
		let msgtype = self
			.get_msgtype_by_number(number)
			.ok_or_else(|| DecodeError::UnknownMessage(number.to_string()))?;
		let fields = self.read_fields(&msgtype.fields, &mut reader)?;
		Ok(Message { msgtype: msgtype.name.clone(), fields })
	}

	/// Converts every textual field of `msg` to its typed form, failing on unknown fields or
	/// values which do not parse as their type. Typed values are kept as they are, so a lazy
	/// [`Sig`] stays lazy.
	pub fn coerce(&self, msg: &Message) -> Result<Message, DecodeError> {
		let msgtype = self.msgtype_of(msg)?;
		let fields = self.coerce_fields(&msgtype.name, &msgtype.fields, &msg.fields)?;
		Ok(Message { msgtype: msg.msgtype.clone(), fields })
	}

	fn coerce_fields(&self, container: &str, defs: &[FieldDef], values: &FieldMap) -> Result<FieldMap, DecodeError> {
		let mut res = FieldMap::new();
		for (name, value) in values.iter() {
			let def = defs.iter().find(|d| &d.name == name).ok_or_else(|| DecodeError::UnknownField {
				msgtype: container.to_owned(),
				field: name.clone(),
			})?;
			res.insert(name.clone(), self.coerce_value(def, value)?);
		}
		Ok(res)
	}

	fn coerce_value(&self, def: &FieldDef, value: &FieldValue) -> Result<FieldValue, DecodeError> {
		match (value, &def.fieldtype) {
			(FieldValue::Str(_), _) => {
				let mut buf = Vec::new();
				self.write_value(def, value, &mut buf)?;
				let mut reader = Reader::new(&buf);
				self.read_value(def, &mut reader, None)
			},
			(FieldValue::Struct(map), FieldType::Subtype(name)) if def.count == FieldCount::Single => {
				Ok(FieldValue::Struct(self.coerce_fields(name, self.subtype(name)?, map)?))
			},
			(FieldValue::Struct(map), FieldType::TlvStream(name)) => {
				let records = self.tlv_stream(name)?;
				let mut res = FieldMap::new();
				for (recname, recval) in map.iter() {
					let coerced = match (records.iter().find(|r| &r.name == recname), recval) {
						(Some(record), FieldValue::Struct(fields)) => {
							FieldValue::Struct(self.coerce_fields(recname, &record.fields, fields)?)
						},
						(Some(record), FieldValue::Str(s)) => {
							let mut fields = FieldMap::new();
							for (k, v) in split_struct(s)? {
								fields.insert(k.to_owned(), FieldValue::Str(v.to_owned()));
							}
							FieldValue::Struct(self.coerce_fields(recname, &record.fields, &fields)?)
						},
						(Some(_), other) => {
							return Err(DecodeError::InvalidValue(format!("{} is not a TLV record", other)))
						},
						(None, _) if recname.parse::<u64>().is_err() => {
							return Err(DecodeError::UnknownField { msgtype: name.clone(), field: recname.clone() })
						},
						(None, other) => FieldValue::Bytes(other.as_bytes()?),
					};
					res.insert(recname.clone(), coerced);
				}
				Ok(FieldValue::Struct(res))
			},
			(FieldValue::Array(elems), _) => {
				let single = FieldDef { count: FieldCount::Single, ..def.clone() };
				let coerced = elems.iter().map(|e| self.coerce_value(&single, e)).collect::<Result<Vec<_>, _>>()?;
				Ok(FieldValue::Array(coerced))
			},
			_ => Ok(value.clone()),
		}
	}

	fn write_fields(&self, container: &str, defs: &[FieldDef], values: &FieldMap, out: &mut Vec<u8>) -> Result<(), DecodeError> {
		if let Some(unknown) = values.keys().find(|k| !defs.iter().any(|d| &d.name == *k)) {
			return Err(DecodeError::UnknownField { msgtype: container.to_owned(), field: unknown.clone() });
		}
		for (idx, def) in defs.iter().enumerate() {
			let value = match values.get(&def.name) {
				Some(value) => Cow::Borrowed(value),
				None => {
					if let FieldType::TlvStream(_) = def.fieldtype {
						continue;
					}
					let described = if def.is_length {
						defs.iter()
							.filter(|d| d.count == FieldCount::LengthField(def.name.clone()))
							.find_map(|d| values.get(&d.name))
					} else {
						None
					};
					match described {
						Some(array) => Cow::Owned(FieldValue::Int(array.array_len()? as u64)),
						None => {
							if defs[idx + 1..].iter().any(|d| values.contains_key(&d.name)) {
								return Err(DecodeError::MissingField(format!("{}.{}", container, def.name)));
							}
							return Ok(());
						},
					}
				},
			};
			self.write_value(def, &value, out)?;
		}
		Ok(())
	}

	fn write_value(&self, def: &FieldDef, value: &FieldValue, out: &mut Vec<u8>) -> Result<(), DecodeError> {
		if def.is_text() {
			let text = match value {
				FieldValue::Str(s) => s.as_bytes().to_vec(),
				other => other.as_bytes()?,
			};
			if let FieldCount::Fixed(n) = def.count {
				if text.len() != n {
					return Err(DecodeError::InvalidValue(format!("{} must be {} bytes", def.name, n)));
				}
			}
			out.extend_from_slice(&text);
			return Ok(());
		}
		if def.is_bytes() {
			let bytes = value.as_bytes()?;
			if let FieldCount::Fixed(n) = def.count {
				if bytes.len() != n {
					return Err(DecodeError::InvalidValue(format!(
						"{} must be {} bytes, not {}", def.name, n, bytes.len()
					)));
				}
			}
			out.extend_from_slice(&bytes);
			return Ok(());
		}
		match def.count {
			FieldCount::Single => self.write_single(&def.fieldtype, value, out),
			_ => {
				let elems: Vec<FieldValue> = match value {
					FieldValue::Array(v) => v.clone(),
					FieldValue::Str(s) => split_list(s)?.into_iter().map(|e| FieldValue::Str(e.to_owned())).collect(),
					other => return Err(DecodeError::InvalidValue(format!("{} is not an array", other))),
				};
				if let FieldCount::Fixed(n) = def.count {
					if elems.len() != n {
						return Err(DecodeError::InvalidValue(format!("{} must have {} elements", def.name, n)));
					}
				}
				for elem in elems.iter() {
					self.write_single(&def.fieldtype, elem, out)?;
				}
				Ok(())
			},
		}
	}

	fn write_single(&self, fieldtype: &FieldType, value: &FieldValue, out: &mut Vec<u8>) -> Result<(), DecodeError> {
		let fundamental = match fieldtype {
			FieldType::Fundamental(f) => *f,
			FieldType::Subtype(name) => {
				let fields = as_struct(value)?;
				return self.write_fields(name, self.subtype(name)?, &fields, out);
			},
			FieldType::TlvStream(name) => return self.write_tlvs(name, value, out),
		};
		match fundamental {
			FundamentalType::Byte | FundamentalType::U16 | FundamentalType::U32 | FundamentalType::U64 => {
				let width = fundamental.int_width().unwrap_or(8);
				let v = value.as_u64()?;
				if width < 8 && v >> (width * 8) != 0 {
					return Err(DecodeError::InvalidValue(format!("{} does not fit in {} bytes", v, width)));
				}
				out.extend_from_slice(&v.to_be_bytes()[8 - width..]);
			},
			FundamentalType::Tu16 | FundamentalType::Tu32 | FundamentalType::Tu64 => {
				let width = fundamental.int_width().unwrap_or(8);
				let v = value.as_u64()?;
				if width < 8 && v >> (width * 8) != 0 {
					return Err(DecodeError::InvalidValue(format!("{} does not fit in {} bytes", v, width)));
				}
				let bytes = v.to_be_bytes();
				let skip = bytes.iter().take_while(|b| **b == 0).count();
				out.extend_from_slice(&bytes[skip..]);
			},
			FundamentalType::BigSize => write_bigsize(value.as_u64()?, out),
			FundamentalType::ChainHash | FundamentalType::ChannelId | FundamentalType::Sha256 => {
				let bytes = value.as_bytes()?;
				if bytes.len() != 32 {
					return Err(DecodeError::InvalidValue(format!("{} is not 32 bytes", value)));
				}
				out.extend_from_slice(&bytes);
			},
			FundamentalType::Point => {
				let bytes = value.as_bytes()?;
				PublicKey::from_slice(&bytes)
					.map_err(|_| DecodeError::InvalidValue(format!("{} is not a point", value)))?;
				out.extend_from_slice(&bytes);
			},
			FundamentalType::Signature => {
				let sig = match value {
					FieldValue::Sig(sig) => sig.clone(),
					FieldValue::Str(s) => s.parse::<Sig>()?,
					other => {
						let bytes = other.as_bytes()?;
						let raw: [u8; 64] = bytes.try_into().map_err(|_| {
							DecodeError::InvalidValue(format!("{} is not a 64-byte signature", other))
						})?;
						Sig::raw(raw)
					},
				};
				out.extend_from_slice(&sig.to_compact());
			},
			FundamentalType::ShortChannelId => {
				let scid = match value {
					FieldValue::ShortChannelId(scid) => *scid,
					FieldValue::Str(s) => s.parse::<ShortChannelId>()?,
					FieldValue::Int(v) => ShortChannelId::from_u64(*v),
					other => return Err(DecodeError::InvalidValue(format!("{} is not a short_channel_id", other))),
				};
				out.extend_from_slice(&scid.to_u64().to_be_bytes());
			},
			FundamentalType::Utf8 => {
				let v = value.as_u64()?;
				out.push(u8::try_from(v).map_err(|_| DecodeError::InvalidValue(format!("{} is not a byte", v)))?);
			},
		}
		Ok(())
	}

	fn write_tlvs(&self, stream: &str, value: &FieldValue, out: &mut Vec<u8>) -> Result<(), DecodeError> {
		let records = self.tlv_stream(stream)?;
		let mut encoded: Vec<(u64, Vec<u8>)> = Vec::new();
		for (recname, recval) in as_struct(value)?.iter() {
			let (number, buf) = match records.iter().find(|r| &r.name == recname) {
				Some(record) => {
					let mut buf = Vec::new();
					self.write_fields(recname, &record.fields, &as_struct(recval)?, &mut buf)?;
					(record.number, buf)
				},
				None => {
					let number = recname.parse::<u64>().map_err(|_| DecodeError::UnknownField {
						msgtype: stream.to_owned(),
						field: recname.clone(),
					})?;
					(number, recval.as_bytes()?)
				},
			};
			encoded.push((number, buf));
		}
		encoded.sort_by_key(|(number, _)| *number);
		for (number, buf) in encoded {
			write_bigsize(number, out);
			write_bigsize(buf.len() as u64, out);
			out.extend_from_slice(&buf);
		}
		Ok(())
	}

	fn read_fields(&self, defs: &[FieldDef], reader: &mut Reader) -> Result<FieldMap, DecodeError> {
		let mut fields = FieldMap::new();
		for def in defs.iter() {
			let always_present = matches!(def.count, FieldCount::LengthField(_) | FieldCount::Ellipsis)
				|| matches!(def.fieldtype, FieldType::TlvStream(_));
			if reader.is_empty() && !always_present {
				break;
			}
			let count = match def.count {
				FieldCount::LengthField(ref len) => match fields.get(len) {
					Some(value) => Some(value.as_u64()? as usize),
					None => break,
				},
				_ => None,
			};
			let value = self.read_value(def, reader, count)?;
			fields.insert(def.name.clone(), value);
		}
		Ok(fields)
	}

	/// Reads one field. Arrays without a fixed size read `count` elements, or run to the end
	/// when `count` is `None`.
	fn read_value(&self, def: &FieldDef, reader: &mut Reader, count: Option<usize>) -> Result<FieldValue, DecodeError> {
		let count = match def.count {
			FieldCount::Single => return self.read_single(&def.fieldtype, reader),
			FieldCount::Fixed(n) => Some(n),
			_ => count,
		};
		if def.is_bytes() || def.is_text() {
			let bytes = match count {
				Some(n) => reader.read_bytes(n)?,
				None => reader.read_rest(),
			};
			if def.is_text() {
				let text = String::from_utf8(bytes.to_vec())
					.map_err(|_| DecodeError::InvalidValue(format!("{} is not UTF-8", def.name)))?;
				return Ok(FieldValue::Str(text));
			}
			return Ok(FieldValue::Bytes(bytes.to_vec()));
		}
		let mut elems = Vec::new();
		match count {
			Some(n) => {
				for _ in 0..n {
					elems.push(self.read_single(&def.fieldtype, reader)?);
				}
			},
			None => {
				while !reader.is_empty() {
					elems.push(self.read_single(&def.fieldtype, reader)?);
				}
			},
		}
		Ok(FieldValue::Array(elems))
	}

	fn read_single(&self, fieldtype: &FieldType, reader: &mut Reader) -> Result<FieldValue, DecodeError> {
		let fundamental = match fieldtype {
			FieldType::Fundamental(f) => *f,
			FieldType::Subtype(name) => {
				return Ok(FieldValue::Struct(self.read_fields(self.subtype(name)?, reader)?))
			},
			FieldType::TlvStream(name) => return self.read_tlvs(name, reader),
		};
		Ok(match fundamental {
			FundamentalType::Byte | FundamentalType::U16 | FundamentalType::U32 | FundamentalType::U64 => {
				let width = fundamental.int_width().unwrap_or(8);
				FieldValue::Int(be_to_u64(reader.read_bytes(width)?))
			},
			FundamentalType::Tu16 | FundamentalType::Tu32 | FundamentalType::Tu64 => {
				let width = fundamental.int_width().unwrap_or(8);
				let bytes = reader.read_rest();
				if bytes.len() > width {
					return Err(DecodeError::InvalidValue(format!("truncated integer of {} bytes", bytes.len())));
				}
				FieldValue::Int(be_to_u64(bytes))
			},
			FundamentalType::BigSize => FieldValue::Int(reader.read_bigsize()?),
			FundamentalType::ChainHash | FundamentalType::ChannelId | FundamentalType::Sha256 => {
				FieldValue::Bytes(reader.read_bytes(32)?.to_vec())
			},
			FundamentalType::Point => {
				let bytes = reader.read_bytes(33)?;
				FieldValue::Point(PublicKey::from_slice(bytes).map_err(|_| {
					DecodeError::InvalidValue(format!("{} is not a point", crate::util::logger::DebugBytes(bytes)))
				})?)
			},
			FundamentalType::Signature => {
				let mut raw = [0; 64];
				raw.copy_from_slice(reader.read_bytes(64)?);
				FieldValue::Sig(Sig::raw(raw))
			},
			FundamentalType::ShortChannelId => {
				FieldValue::ShortChannelId(ShortChannelId::from_u64(be_to_u64(reader.read_bytes(8)?)))
			},
			FundamentalType::Utf8 => FieldValue::Int(reader.read_bytes(1)?[0] as u64),
		})
	}

	fn read_tlvs(&self, stream: &str, reader: &mut Reader) -> Result<FieldValue, DecodeError> {
		let records = self.tlv_stream(stream)?;
		let mut res = FieldMap::new();
		let mut last_number = None;
		while !reader.is_empty() {
			let number = reader.read_bigsize()?;
			if last_number.map_or(false, |last| number <= last) {
				return Err(DecodeError::InvalidValue(format!("TLV type {} out of order", number)));
			}
			last_number = Some(number);
			let len = reader.read_bigsize()?;
			let value = reader.read_bytes(usize::try_from(len).map_err(|_| DecodeError::ShortRead)?)?;
			match records.iter().find(|r| r.number == number) {
				Some(record) => {
					let mut sub = Reader::new(value);
					let fields = self.read_fields(&record.fields, &mut sub)?;
					res.insert(record.name.clone(), FieldValue::Struct(fields));
				},
				None => {
					res.insert(number.to_string(), FieldValue::Bytes(value.to_vec()));
				},
			}
		}
		Ok(FieldValue::Struct(res))
	}
}

fn as_struct(value: &FieldValue) -> Result<FieldMap, DecodeError> {
	match value {
		FieldValue::Struct(map) => Ok(map.clone()),
		FieldValue::Str(s) => Ok(split_struct(s)?
			.into_iter()
			.map(|(k, v)| (k.to_owned(), FieldValue::Str(v.to_owned())))
			.collect()),
		other => Err(DecodeError::InvalidValue(format!("{} is not a structure", other))),
	}
}

fn be_to_u64(bytes: &[u8]) -> u64 {
	bytes.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64)
}

fn write_bigsize(v: u64, out: &mut Vec<u8>) {
	match v {
		0..=0xfc => out.push(v as u8),
		0xfd..=0xffff => {
			out.push(0xfd);
			out.extend_from_slice(&(v as u16).to_be_bytes());
		},
		0x10000..=0xffffffff => {
			out.push(0xfe);
			out.extend_from_slice(&(v as u32).to_be_bytes());
		},
		_ => {
			out.push(0xff);
			out.extend_from_slice(&v.to_be_bytes());
		},
	}
}

struct Reader<'a> {
	buf: &'a [u8],
	pos: usize,
}

impl<'a> Reader<'a> {
	fn new(buf: &'a [u8]) -> Self {
		Reader { buf, pos: 0 }
	}

	fn is_empty(&self) -> bool {
		self.pos >= self.buf.len()
	}

	fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
		if self.buf.len() - self.pos < n {
			return Err(DecodeError::ShortRead);
		}
		let res = &self.buf[self.pos..self.pos + n];
		self.pos += n;
		Ok(res)
	}

	fn read_rest(&mut self) -> &'a [u8] {
		let res = &self.buf[self.pos..];
		self.pos = self.buf.len();
		res
	}

	fn read_u16(&mut self) -> Result<u16, DecodeError> {
		Ok(be_to_u64(self.read_bytes(2)?) as u16)
	}

	fn read_bigsize(&mut self) -> Result<u64, DecodeError> {
		let (v, min) = match self.read_bytes(1)?[0] {
			0xff => (be_to_u64(self.read_bytes(8)?), 0x100000000),
			0xfe => (be_to_u64(self.read_bytes(4)?), 0x10000),
			0xfd => (be_to_u64(self.read_bytes(2)?), 0xfd),
			n => return Ok(n as u64),
		};
		if v < min {
			return Err(DecodeError::InvalidValue(format!("non-canonical bigsize {}", v)));
		}
		Ok(v)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use bitcoin::hex::{DisplayHex, FromHex};

	#[test]
	fn bolts_load() {
		let ns = Namespace::bolts();
		assert_eq!(ns.get_msgtype("init").unwrap().number, 16);
		assert_eq!(ns.get_msgtype_by_number(258).unwrap().name, "channel_update");
		assert!(ns.get_msgtype("init").unwrap().find_field("gflen").unwrap().is_length_field());
		assert!(!ns.get_msgtype("init").unwrap().find_field("features").unwrap().is_length_field());
	}

	#[test]
	fn init_round_trip_with_tlvs() {
		let ns = Namespace::bolts();
		let msg = Message::new("init")
			.with("globalfeatures", "")
			.with("features", "0a8a")
			.with("tlvs", "{networks={chains=[06226e46111a0b59caaf126043eb5bbf28c34f3a5e332a1fc7b2b73cf188910f]}}");
		let bytes = ns.encode(&msg).unwrap();
		assert_eq!(
			bytes.to_lower_hex_string(),
			"0010000000020a8a012006226e46111a0b59caaf126043eb5bbf28c34f3a5e332a1fc7b2b73cf188910f"
		);
		let decoded = ns.decode(&bytes).unwrap();
		assert_eq!(decoded.get("gflen"), Some(&FieldValue::Int(0)));
		assert_eq!(decoded.get("features"), Some(&FieldValue::Bytes(vec![0x0a, 0x8a])));
		assert_eq!(
			decoded.get("tlvs").unwrap().to_string(),
			"{networks={chains=[06226e46111a0b59caaf126043eb5bbf28c34f3a5e332a1fc7b2b73cf188910f]}}"
		);
	}

	#[test]
	fn missing_and_unknown_fields() {
		let ns = Namespace::bolts();
		let msg = Message::new("ping").with("num_pong_bytes", 4u16);
		let missing: Vec<&str> = ns.missing_fields(&msg).unwrap().iter().map(|f| f.name.as_str()).collect();
		assert_eq!(missing, vec!["ignored"]);
		// Trailing fields may be left off entirely.
		assert_eq!(ns.encode(&msg).unwrap(), vec![0x00, 0x12, 0x00, 0x04]);

		let gap = Message::new("ping").with("ignored", "00");
		assert_eq!(ns.encode(&gap), Err(DecodeError::MissingField("ping.num_pong_bytes".to_owned())));

		let unknown = Message::new("ping").with("bogus", 1u8);
		assert!(matches!(ns.encode(&unknown), Err(DecodeError::UnknownField { .. })));
		assert!(matches!(ns.encode(&Message::new("nonesuch")), Err(DecodeError::UnknownMessage(_))));
	}

	#[test]
	fn signature_arrays() {
		let ns = Namespace::bolts();
		let sig = "01".repeat(64);
		let msg = Message::new("commitment_signed")
			.with("channel_id", "00".repeat(32))
			.with("signature", sig.as_str())
			.with("htlc_signature", format!("[{},{}]", sig, sig));
		let bytes = ns.encode(&msg).unwrap();
		assert_eq!(bytes.len(), 2 + 32 + 64 + 2 + 128);
		let decoded = ns.decode(&bytes).unwrap();
		assert_eq!(decoded.get("num_htlcs"), Some(&FieldValue::Int(2)));
		assert_eq!(decoded.get("htlc_signature").unwrap().to_string(), format!("[{},{}]", sig, sig));
	}

	#[test]
	fn empty_trailing_array_is_present() {
		let ns = Namespace::bolts();
		let bytes = Vec::<u8>::from_hex(&format!("0011{}0000", "00".repeat(32))).unwrap();
		let decoded = ns.decode(&bytes).unwrap();
		assert_eq!(decoded.msgtype, "error");
		assert_eq!(decoded.get("data"), Some(&FieldValue::Bytes(Vec::new())));
	}

	#[test]
	fn coerce_keeps_typed_values() {
		let ns = Namespace::bolts();
		let lazy = Sig::lazy_from_hex("01", &"00".repeat(32)).unwrap();
		let msg = Message::new("funding_signed")
			.with("channel_id", "00".repeat(32))
			.with("signature", lazy.clone());
		let coerced = ns.coerce(&msg).unwrap();
		assert_eq!(coerced.get("channel_id"), Some(&FieldValue::Bytes(vec![0; 32])));
		assert_eq!(coerced.get("signature"), Some(&FieldValue::Sig(lazy)));
		assert!(ns.coerce(&Message::new("funding_signed").with("channel_id", "00")).is_err());
	}

	#[test]
	fn bigsize_encoding() {
		for (v, hex) in [(0u64, "00"), (0xfc, "fc"), (0xfd, "fd00fd"), (0xffff, "fdffff"), (0x10000, "fe00010000"), (0x100000000, "ff0000000100000000")] {
			let mut out = Vec::new();
			write_bigsize(v, &mut out);
			assert_eq!(out.to_lower_hex_string(), hex);
			assert_eq!(Reader::new(&out).read_bigsize().unwrap(), v);
		}
		assert!(Reader::new(&[0xfd, 0x00, 0xfc]).read_bigsize().is_err());
	}

	#[test]
	fn unknown_tlv_records_are_kept() {
		let ns = Namespace::bolts();
		let mut bytes = Vec::<u8>::from_hex("001000000000").unwrap();
		bytes.extend_from_slice(&[0x05, 0x01, 0xaa]);
		let decoded = ns.decode(&bytes).unwrap();
		assert_eq!(decoded.get("tlvs").unwrap().to_string(), "{5=aa}");
		assert_eq!(ns.encode(&decoded).unwrap(), bytes);
	}

	#[test]
	fn bad_schemas() {
		assert!(Namespace::from_csv("msgtype,foo,1\nmsgdata,foo,a,nonesuch,\n").is_err());
		assert!(Namespace::from_csv("msgdata,foo,a,u16,\n").is_err());
		assert!(Namespace::from_csv("msgtype,foo,1\nmsgdata,foo,a,byte,alen\n").is_err());
		assert!(Namespace::from_csv("msgtype,foo,1\nmsgtype,bar,1\n").is_err());
		let ns = Namespace::from_csv("subtype,pair\nsubtypedata,pair,a,u16,\nsubtypedata,pair,b,u16,\nmsgtype,foo,40000\nmsgdata,foo,n,u16,\nmsgdata,foo,pairs,pair,n\n").unwrap();
		let msg = Message::new("foo").with("pairs", "[{a=1,b=2},{a=3,b=4}]");
		let bytes = ns.encode(&msg).unwrap();
		assert_eq!(bytes.to_lower_hex_string(), "9c4000020001000200030004");
		assert_eq!(ns.decode(&bytes).unwrap().get("pairs").unwrap().to_string(), "[{a=1,b=2},{a=3,b=4}]");
	}
}
