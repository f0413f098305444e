// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Log traits live here, which are called throughout the engine to report what a script is doing
//! to the node under test.
//!
//! Log messages should be filtered client-side by implementing check against a given [`Record`]'s
//! [`Level`] field. A [`Runner`] owns exactly one Logger which every event logs through.
//!
//! [`Runner`]: crate::runner::Runner

use core::cmp;
use core::fmt;
use core::fmt::Display;

use crate::prelude::*;

static LOG_LEVEL_NAMES: [&'static str; 6] = ["GOSSIP", "TRACE", "DEBUG", "INFO", "WARN", "ERROR"];

/// An enum representing the available verbosity levels of the logger.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum Level {
	/// Designates extremely verbose information, including gossip traffic ignored by filters
	Gossip,
	/// Designates very low priority, often extremely verbose, information
	Trace,
	/// Designates lower priority information, such as every message sent or received
	Debug,
	/// Designates useful information
	Info,
	/// Designates hazardous situations
	Warn,
	/// Designates very serious errors
	Error,
}

impl PartialOrd for Level {
	#[inline]
	fn partial_cmp(&self, other: &Level) -> Option<cmp::Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for Level {
	#[inline]
	fn cmp(&self, other: &Level) -> cmp::Ordering {
		(*self as usize).cmp(&(*other as usize))
	}
}

impl fmt::Display for Level {
	fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
		fmt.pad(LOG_LEVEL_NAMES[*self as usize])
	}
}

impl Level {
	/// Returns the most verbose logging level.
	#[inline]
	pub fn max() -> Level {
		Level::Gossip
	}
}

/// A Record, unit of logging output with Metadata to enable filtering
/// Module_path, file, line to inform on log's source
#[derive(Clone, Debug)]
pub struct Record<'a> {
	/// The verbosity level of the message.
	pub level: Level,
	/// The label of the event which was executing when the record was produced, if any. Since the
	/// label is not repeated in the message body, include it in the log output so entries remain
	/// clear.
	pub event: Option<String>,
	/// The message body.
	pub args: fmt::Arguments<'a>,
	/// The module path of the message.
	pub module_path: &'static str,
	/// The source file containing the message.
	pub file: &'static str,
	/// The line containing the message.
	pub line: u32,
}

impl<'a> Record<'a> {
	/// Returns a new Record.
	#[inline]
	pub fn new(
		level: Level, event: Option<String>, args: fmt::Arguments<'a>, module_path: &'static str,
		file: &'static str, line: u32,
	) -> Record<'a> {
		Record { level, event, args, module_path, file, line }
	}
}

impl<'a> Display for Record<'a> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{:<5} [{}:{}]", self.level, self.module_path, self.line)?;
		if let Some(event) = &self.event {
			write!(f, " [{}]", event)?;
		}
		write!(f, " {}", self.args)
	}
}

/// A trait encapsulating the operations required of a logger.
pub trait Logger {
	/// Logs the [`Record`]. Since [`Record::event`] is not embedded in the message body, log
	/// implementations should print it alongside the message to keep entries clear.
	fn log(&self, record: Record);
}

impl<L: Logger + ?Sized> Logger for alloc::sync::Arc<L> {
	fn log(&self, record: Record) {
		(**self).log(record)
	}
}

/// Adds the label of the currently executing event to a [`Record`] before passing it to the
/// wrapped [`Logger`].
pub struct WithEvent<'a, L: Logger + ?Sized> {
	/// The logger to delegate to after adding context to the record.
	logger: &'a L,
	/// The label of the event pertaining to the logged record.
	event: String,
}

impl<'a, L: Logger + ?Sized> Logger for WithEvent<'a, L> {
	fn log(&self, mut record: Record) {
		if record.event.is_none() {
			record.event = Some(self.event.clone());
		}
		self.logger.log(record)
	}
}

impl<'a, L: Logger + ?Sized> WithEvent<'a, L> {
	/// Wraps the given logger, tagging every record with `event`.
	pub fn from(logger: &'a L, event: &impl Display) -> Self {
		WithEvent { logger, event: event.to_string() }
	}
}

/// A [`Logger`] which prints every record at or above a given [`Level`] to stderr.
pub struct StderrLogger {
	level: Level,
}

impl StderrLogger {
	/// Creates a logger printing records at `level` and above.
	pub fn new(level: Level) -> Self {
		StderrLogger { level }
	}
}

impl Logger for StderrLogger {
	fn log(&self, record: Record) {
		if record.level >= self.level {
			eprintln!("{}", record);
		}
	}
}

/// Wrapper for logging byte slices in hex format.
#[doc(hidden)]
pub struct DebugBytes<'a>(pub &'a [u8]);
impl<'a> core::fmt::Display for DebugBytes<'a> {
	fn fmt(&self, f: &mut core::fmt::Formatter) -> Result<(), core::fmt::Error> {
		for i in self.0 {
			write!(f, "{:02x}", i)?;
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::util::test_utils::TestLogger;
	use alloc::sync::Arc;

	#[test]
	fn test_level_show() {
		assert_eq!("INFO", Level::Info.to_string());
		assert_eq!("ERROR", Level::Error.to_string());
		assert_ne!("WARN", Level::Error.to_string());
	}

	#[test]
	fn test_level_ordering() {
		assert!(Level::Gossip < Level::Trace);
		assert!(Level::Debug < Level::Info);
		assert!(Level::Error > Level::Warn);
		assert_eq!(Level::max(), Level::Gossip);
	}

	#[test]
	fn test_event_context() {
		let logger = Arc::new(TestLogger::new());
		let context = WithEvent::from(&*logger, &"ExpectMsg:script.rs:12");
		log_info!(context, "expecting init");
		logger.assert_log_contains("lightning_conformance::util::logger::tests", "expecting init", 1);
		assert_eq!(logger.events_logged(), vec!["ExpectMsg:script.rs:12".to_owned()]);
	}

	#[test]
	fn test_record_display() {
		assert_eq!(
			Record::new(
				Level::Debug,
				Some("Msg:a.rs:1".to_owned()),
				format_args!("sent {} bytes", 3),
				"mod",
				"file.rs",
				7,
			)
			.to_string(),
			"DEBUG [mod:7] [Msg:a.rs:1] sent 3 bytes"
		);
	}

	#[test]
	fn test_debug_bytes() {
		assert_eq!(DebugBytes(&[0xde, 0xad]).to_string(), "dead");
	}
}
