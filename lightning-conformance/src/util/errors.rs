// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Error types live here.
//!
//! A script can fail in exactly two ways: the node under test misbehaved ([`EventError`]) or the
//! script itself is malformed ([`SpecFileError`]). Neither is retried.

use crate::prelude::*;

use core::fmt;

/// The node under test did something a conforming implementation would not: it sent an
/// unexpected or banned message, failed to send one in time, or sent a field with the wrong
/// value.
#[derive(Clone, PartialEq, Eq)]
pub struct EventError {
	/// The labels of the events enclosing the failing one, outermost first.
	pub path: Vec<String>,
	/// A human-readable error message
	pub message: String,
}

impl EventError {
	/// Creates an error raised by the event labelled `event`.
	pub fn new(event: &impl fmt::Display, message: String) -> Self {
		EventError { path: vec![event.to_string()], message }
	}

	/// Records that the failing event was nested inside `event`.
	pub fn add_path(&mut self, event: &impl fmt::Display) {
		self.path.insert(0, event.to_string());
	}
}

impl fmt::Display for EventError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "`{}` on event [{}]", self.message, self.path.join(","))
	}
}

impl fmt::Debug for EventError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		fmt::Display::fmt(self, f)
	}
}

/// The test script is malformed: it names an unknown message type or field, references a stash
/// entry which was never recorded, reuses an HTLC id, or mixes connections where one is required.
#[derive(Clone, PartialEq, Eq)]
pub struct SpecFileError {
	/// The label of the event which detected the problem.
	pub event: String,
	/// A human-readable error message
	pub message: String,
}

impl SpecFileError {
	/// Creates an error detected by the event labelled `event`.
	pub fn new(event: &impl fmt::Display, message: String) -> Self {
		SpecFileError { event: event.to_string(), message }
	}
}

impl fmt::Display for SpecFileError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{}: {}", self.event, self.message)
	}
}

impl fmt::Debug for SpecFileError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "Spec file error at {}", self)
	}
}

/// Either way in which executing a script can fail.
#[derive(Clone, PartialEq, Eq)]
pub enum ScriptError {
	/// The node under test failed a conformance check.
	Event(EventError),
	/// The script is malformed.
	SpecFile(SpecFileError),
}

impl ScriptError {
	/// Records that the failing event was nested inside `event`. Only [`EventError`]s carry a
	/// path; script errors already name the event which is at fault.
	pub fn add_path(mut self, event: &impl fmt::Display) -> Self {
		if let ScriptError::Event(ref mut err) = self {
			err.add_path(event);
		}
		self
	}

	/// Shorthand for an [`EventError`] raised by `event`.
	pub fn event(event: &impl fmt::Display, message: String) -> Self {
		ScriptError::Event(EventError::new(event, message))
	}

	/// Shorthand for a [`SpecFileError`] detected by `event`.
	pub fn spec(event: &impl fmt::Display, message: String) -> Self {
		ScriptError::SpecFile(SpecFileError::new(event, message))
	}
}

impl fmt::Display for ScriptError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			ScriptError::Event(err) => fmt::Display::fmt(err, f),
			ScriptError::SpecFile(err) => fmt::Display::fmt(err, f),
		}
	}
}

impl fmt::Debug for ScriptError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			ScriptError::Event(err) => write!(f, "EventError({:?})", err),
			ScriptError::SpecFile(err) => write!(f, "SpecFileError({:?})", err),
		}
	}
}

impl From<EventError> for ScriptError {
	fn from(err: EventError) -> Self {
		ScriptError::Event(err)
	}
}

impl From<SpecFileError> for ScriptError {
	fn from(err: SpecFileError) -> Self {
		ScriptError::SpecFile(err)
	}
}

impl std::error::Error for EventError {}
impl std::error::Error for SpecFileError {}
impl std::error::Error for ScriptError {}

/// An error in decoding a message, a hex string or a key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecodeError {
	/// The message type is not known to the namespace in use.
	UnknownMessage(String),
	/// The message has no field of that name.
	UnknownField {
		/// The message or TLV stream being encoded.
		msgtype: String,
		/// The offending field.
		field: String,
	},
	/// A required field was not given a value.
	MissingField(String),
	/// Value was invalid for the field's type. For example, a byte array of the wrong length or a
	/// public key which is not on the curve.
	InvalidValue(String),
	/// The buffer to be read was too short.
	ShortRead,
	/// The schema definition itself could not be parsed.
	BadSchema(String),
}

impl fmt::Display for DecodeError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			DecodeError::UnknownMessage(name) => write!(f, "Unknown message type {}", name),
			DecodeError::UnknownField { msgtype, field } => {
				write!(f, "{} has no field {}", msgtype, field)
			},
			DecodeError::MissingField(field) => write!(f, "Missing field {}", field),
			DecodeError::InvalidValue(err) => write!(f, "Invalid value: {}", err),
			DecodeError::ShortRead => f.write_str("Packet extended beyond the provided bytes"),
			DecodeError::BadSchema(err) => write!(f, "Bad schema: {}", err),
		}
	}
}

impl std::error::Error for DecodeError {}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn event_error_path() {
		let mut err = EventError::new(&"ExpectMsg:t.rs:3", "Did not receive a message init".to_owned());
		err.add_path(&"Sequence:t.rs:1");
		assert_eq!(err.path, vec!["Sequence:t.rs:1".to_owned(), "ExpectMsg:t.rs:3".to_owned()]);
		assert_eq!(
			err.to_string(),
			"`Did not receive a message init` on event [Sequence:t.rs:1,ExpectMsg:t.rs:3]"
		);
	}

	#[test]
	fn spec_errors_have_no_path() {
		let err = ScriptError::spec(&"Msg:t.rs:9", "Unknown msgtype foo".to_owned());
		assert_eq!(err.clone().add_path(&"Sequence:t.rs:1"), err);
		assert_eq!(err.to_string(), "Msg:t.rs:9: Unknown msgtype foo");
	}
}
