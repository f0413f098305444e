// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Events which open and close peer connections and exchange messages over them.

use bitcoin::hex::{DisplayHex, FromHex};

use crate::events::{find_conn, EventLabel, Resolved};
use crate::ln::msgs::{cmp_fields, FieldValue, Message};
use crate::prelude::*;
use crate::runner::{MustNot, Runner};
use crate::util::errors::ScriptError;
use crate::util::logger::{Logger, WithEvent};

/// Builds the message `msgtype` from resolved `fields`, in the order they were given, and
/// converts every value to its field's type.
pub(crate) fn resolve_message(
	runner: &dyn Runner, event: &EventLabel, msgtype: &str, fields: &[(String, Resolved<FieldValue>)],
) -> Result<Message, ScriptError> {
	let namespace = &runner.core().namespace;
	if namespace.get_msgtype(msgtype).is_none() {
		return Err(ScriptError::spec(event, format!("Unknown msgtype {}", msgtype)));
	}
	let mut msg = Message::new(msgtype);
	for (name, value) in fields.iter() {
		let value = value.resolve(runner, event, name)?;
		msg.fields.insert(name.clone(), value);
	}
	namespace.coerce(&msg).map_err(|e| ScriptError::spec(event, e.to_string()))
}

/// Encodes and delivers each of `msgs` to the node over `conn`.
pub(crate) fn send_messages(
	runner: &mut dyn Runner, event: &EventLabel, conn: &str, msgs: Vec<Message>,
) -> Result<(), ScriptError> {
	for msg in msgs {
		let binmsg = runner
			.core()
			.namespace
			.encode(&msg)
			.map_err(|e| ScriptError::event(event, format!("Cannot encode reply {}: {}", msg, e)))?;
		log_debug!(WithEvent::from(&*runner.core().logger, event), "Replying with {}", msg);
		runner.recv(event, conn, &binmsg)?;
	}
	Ok(())
}

/// Reads the next message the node sent over `conn`, failing if there is none, if it is banned
/// on `conn` or if it does not decode. `expect` is the expectation the message is read for.
pub(crate) fn read_message(
	runner: &mut dyn Runner, event: &EventLabel, conn: &str, expect: &ExpectMsg,
) -> Result<Message, ScriptError> {
	let timeout = runner.core().config.expect_msg_timeout();
	let binmsg = match runner.get_output_message(conn, expect, timeout)? {
		Some(binmsg) => binmsg,
		None => {
			return Err(ScriptError::event(
				event,
				format!("Did not receive a message {} from runner", expect.msgtype),
			))
		},
	};
	let core = runner.core();
	if let Some(c) = core.conn(conn) {
		if let Some(ban) = c.must_not.iter().find(|ban| ban.matches(&core.namespace, &binmsg)) {
			return Err(ScriptError::event(
				event,
				format!("Got msg banned by {}: {}", ban.event, binmsg.as_hex()),
			));
		}
	}
	let logger = WithEvent::from(&*core.logger, event);
	log_trace!(logger, "raw msg {}", log_bytes!(binmsg));
	let msg = core.namespace.decode(&binmsg).map_err(|e| {
		ScriptError::event(event, format!("Runner gave bad msg {}: {}", binmsg.as_hex(), e))
	})?;
	log_debug!(logger, "decoded msg {}", msg);
	Ok(msg)
}

/// Opens a connection to the node, with `connprivkey` as our node key.
pub struct Connect {
	pub(crate) label: EventLabel,
	pub(crate) done: bool,
	connprivkey: String,
}

impl Connect {
	/// Connects as the node with private key `connprivkey`, eg `"02"`.
	#[track_caller]
	pub fn new(connprivkey: &str) -> Self {
		Connect { label: EventLabel::new("Connect"), done: false, connprivkey: connprivkey.to_owned() }
	}

	/// Executes the event.
	pub fn action(&mut self, runner: &mut dyn Runner) -> Result<(), ScriptError> {
		let core = runner.core();
		if core.conns.contains_key(&self.connprivkey) {
			return Err(ScriptError::spec(
				&self.label,
				format!("Already have connection to {}", self.connprivkey),
			));
		}
		// Give the node time to send the first connection its gossip.
		if !core.conns.is_empty() {
			std::thread::sleep(core.config.connect_settle());
		}
		runner.connect(&self.label, &self.connprivkey)
	}
}

/// Closes a connection. Any pending task is collected and the connection's final error state
/// checked.
pub struct Disconnect {
	pub(crate) label: EventLabel,
	pub(crate) done: bool,
	connprivkey: Option<String>,
}

impl Disconnect {
	/// Closes the last connection used.
	#[track_caller]
	pub fn new() -> Self {
		Disconnect { label: EventLabel::new("Disconnect"), done: false, connprivkey: None }
	}

	/// Closes connection `connprivkey` instead.
	pub fn conn(mut self, connprivkey: &str) -> Self {
		self.connprivkey = Some(connprivkey.to_owned());
		self
	}

	/// Executes the event.
	pub fn action(&mut self, runner: &mut dyn Runner) -> Result<(), ScriptError> {
		let conn = find_conn(runner, &self.label, &self.connprivkey)?;
		runner.disconnect(&self.label, &conn)
	}
}

/// Sends a message to the node. Every field without a default must be given.
pub struct Msg {
	pub(crate) label: EventLabel,
	pub(crate) done: bool,
	msgtype: String,
	connprivkey: Option<String>,
	fields: Vec<(String, Resolved<FieldValue>)>,
}

impl Msg {
	/// Sends a `msgtype` message over the last connection used.
	#[track_caller]
	pub fn new(msgtype: &str) -> Self {
		Msg {
			label: EventLabel::new("Msg"),
			done: false,
			msgtype: msgtype.to_owned(),
			connprivkey: None,
			fields: Vec::new(),
		}
	}

	/// Sends over connection `connprivkey` instead.
	pub fn conn(mut self, connprivkey: &str) -> Self {
		self.connprivkey = Some(connprivkey.to_owned());
		self
	}

	/// Sets field `name`. Fields are resolved in the order they are set.
	pub fn field(mut self, name: &str, value: impl Into<Resolved<FieldValue>>) -> Self {
		self.fields.push((name.to_owned(), value.into()));
		self
	}

	/// Executes the event.
	pub fn action(&mut self, runner: &mut dyn Runner) -> Result<(), ScriptError> {
		let msg = resolve_message(&*runner, &self.label, &self.msgtype, &self.fields)?;
		let binmsg = {
			let namespace = &runner.core().namespace;
			let missing = namespace.missing_fields(&msg).map_err(|e| ScriptError::spec(&self.label, e.to_string()))?;
			if !missing.is_empty() {
				let names: Vec<&str> = missing.iter().map(|f| f.name.as_str()).collect();
				return Err(ScriptError::spec(&self.label, format!("Missing fields [{}]", names.join(", "))));
			}
			namespace.encode(&msg).map_err(|e| ScriptError::spec(&self.label, e.to_string()))?
		};
		let conn = find_conn(runner, &self.label, &self.connprivkey)?;
		log_debug!(WithEvent::from(&*runner.core().logger, &self.label), "Sending {} to {}", msg, conn);
		runner.recv(&self.label, &conn, &binmsg)?;
		runner.core_mut().stash.push_sent(msg);
		Ok(())
	}
}

/// What a [`RawMsg`] sends.
pub enum RawPayload {
	/// Bytes sent as they are.
	Bytes(Resolved<Vec<u8>>),
	/// A message, encoded without checking that every field is given.
	Message(Resolved<Message>),
}

/// Sends raw bytes, or a message which may be incomplete or malformed, to the node. Nothing is
/// stashed.
pub struct RawMsg {
	pub(crate) label: EventLabel,
	pub(crate) done: bool,
	payload: RawPayload,
	connprivkey: Option<String>,
}

impl RawMsg {
	/// Sends `binmsg` unchanged.
	#[track_caller]
	pub fn bytes(binmsg: impl Into<Resolved<Vec<u8>>>) -> Self {
		RawMsg {
			label: EventLabel::new("RawMsg"),
			done: false,
			payload: RawPayload::Bytes(binmsg.into()),
			connprivkey: None,
		}
	}

	/// Sends the encoding of `msg`.
	#[track_caller]
	pub fn message(msg: impl Into<Resolved<Message>>) -> Self {
		RawMsg {
			label: EventLabel::new("RawMsg"),
			done: false,
			payload: RawPayload::Message(msg.into()),
			connprivkey: None,
		}
	}

	/// Sends over connection `connprivkey` instead of the last one used.
	pub fn conn(mut self, connprivkey: &str) -> Self {
		self.connprivkey = Some(connprivkey.to_owned());
		self
	}

	/// Executes the event.
	pub fn action(&mut self, runner: &mut dyn Runner) -> Result<(), ScriptError> {
		let binmsg = match &self.payload {
			RawPayload::Bytes(bytes) => bytes.resolve(&*runner, &self.label, "binmsg")?,
			RawPayload::Message(msg) => {
				let msg = msg.resolve(&*runner, &self.label, "binmsg")?;
				let namespace = &runner.core().namespace;
				namespace
					.coerce(&msg)
					.and_then(|msg| namespace.encode(&msg))
					.map_err(|e| ScriptError::spec(&self.label, e.to_string()))?
			},
		};
		let conn = find_conn(runner, &self.label, &self.connprivkey)?;
		runner.recv(&self.label, &conn, &binmsg)
	}
}

/// Decides whether an unexpected message should be skipped while waiting for another. Returns
/// `None` if it should not, or the replies to send before reading on. Takes the message's type
/// number and the message.
pub type IgnoreFn = fn(u16, &Message) -> Option<Vec<Message>>;

/// A check run on a message after it matched an [`ExpectMsg`], before it is stashed.
pub type IfMatchFn = dyn Fn(&EventLabel, &Message, &dyn Runner) -> Result<(), ScriptError>;

/// Answers `ping`s with `pong`s of the requested length, and ignores those asking for none.
pub fn ignore_pings(_number: u16, msg: &Message) -> Option<Vec<Message>> {
	if msg.msgtype != "ping" {
		return None;
	}
	let num_pong_bytes = msg.get("num_pong_bytes").and_then(|v| v.as_u64().ok()).unwrap_or(0);
	if num_pong_bytes >= 65532 {
		return Some(Vec::new());
	}
	Some(vec![Message::new("pong").with("ignored", vec![0u8; num_pong_bytes as usize])])
}

/// Ignores gossip queries and answers pings. The default for [`ExpectMsg`].
pub fn ignore_gossip_queries(number: u16, msg: &Message) -> Option<Vec<Message>> {
	match msg.msgtype.as_str() {
		"gossip_timestamp_filter" | "query_channel_range" | "query_short_channel_ids" => Some(Vec::new()),
		_ => ignore_pings(number, msg),
	}
}

/// Ignores every gossip message (types 256 to 511) and answers pings.
pub fn ignore_all_gossip(number: u16, msg: &Message) -> Option<Vec<Message>> {
	if (256..512).contains(&number) {
		return Some(Vec::new());
	}
	ignore_pings(number, msg)
}

/// Ignores `channel_update`s and answers pings.
pub fn ignore_channel_update(number: u16, msg: &Message) -> Option<Vec<Message>> {
	if number == 258 {
		return Some(Vec::new());
	}
	ignore_pings(number, msg)
}

/// Waits for the node to send a message and checks it against a partial expectation: every
/// field given must match, fields not given are wildcards. A match is stashed.
pub struct ExpectMsg {
	pub(crate) label: EventLabel,
	pub(crate) done: bool,
	pub(crate) msgtype: String,
	connprivkey: Option<String>,
	fields: Vec<(String, Resolved<FieldValue>)>,
	ignore: IgnoreFn,
	if_match: Option<Box<IfMatchFn>>,
}

impl ExpectMsg {
	/// Expects a `msgtype` message on the last connection used.
	#[track_caller]
	pub fn new(msgtype: &str) -> Self {
		ExpectMsg {
			label: EventLabel::new("ExpectMsg"),
			done: false,
			msgtype: msgtype.to_owned(),
			connprivkey: None,
			fields: Vec::new(),
			ignore: ignore_gossip_queries,
			if_match: None,
		}
	}

	/// Expects it on connection `connprivkey` instead.
	pub fn conn(mut self, connprivkey: &str) -> Self {
		self.connprivkey = Some(connprivkey.to_owned());
		self
	}

	/// Expects field `name` to equal `value`.
	pub fn field(mut self, name: &str, value: impl Into<Resolved<FieldValue>>) -> Self {
		self.fields.push((name.to_owned(), value.into()));
		self
	}

	/// Replaces the filter for unexpected messages.
	pub fn ignore(mut self, ignore: IgnoreFn) -> Self {
		self.ignore = ignore;
		self
	}

	/// Adds a check run on the matching message.
	pub fn if_match<F>(mut self, f: F) -> Self
	where
		F: Fn(&EventLabel, &Message, &dyn Runner) -> Result<(), ScriptError> + 'static,
	{
		self.if_match = Some(Box::new(f));
		self
	}

	/// The expected message type.
	pub fn msgtype(&self) -> &str {
		&self.msgtype
	}

	/// The connection this expects a message on, if not the last one used.
	pub fn connprivkey(&self) -> Option<&str> {
		self.connprivkey.as_deref()
	}

	/// The partial message expected, with its fields resolved.
	pub fn expected(&self, runner: &dyn Runner) -> Result<Message, ScriptError> {
		resolve_message(runner, &self.label, &self.msgtype, &self.fields)
	}

	/// The replies to send if `msg` is to be skipped, or `None` if it should be matched.
	pub fn ignored(&self, runner: &dyn Runner, msg: &Message) -> Option<Vec<Message>> {
		let number = runner.core().namespace.get_msgtype(&msg.msgtype).map_or(0, |t| t.number);
		(self.ignore)(number, msg)
	}

	/// Checks `msg` against the expectation. On a match, runs the `if_match` check and stashes
	/// `msg`; otherwise describes the first difference.
	pub fn message_match(&self, runner: &mut dyn Runner, msg: &Message) -> Result<Option<String>, ScriptError> {
		if msg.msgtype != self.msgtype {
			return Ok(Some(format!("Expected {}, got {}", self.msgtype, msg.msgtype)));
		}
		let expected = self.expected(&*runner)?;
		if let Some(diff) = cmp_fields(&msg.fields, &expected.fields, &self.msgtype) {
			return Ok(Some(diff));
		}
		if let Some(check) = &self.if_match {
			check(&self.label, msg, &*runner)?;
		}
		runner.core_mut().stash.push_rcvd(msg.clone());
		Ok(None)
	}

	/// Executes the event.
	pub fn action(&mut self, runner: &mut dyn Runner) -> Result<(), ScriptError> {
		if runner.core().namespace.get_msgtype(&self.msgtype).is_none() {
			return Err(ScriptError::spec(&self.label, format!("Unknown msgtype {}", self.msgtype)));
		}
		let conn = find_conn(runner, &self.label, &self.connprivkey)?;
		loop {
			let msg = read_message(runner, &self.label, &conn, self)?;
			if let Some(replies) = self.ignored(&*runner, &msg) {
				log_gossip!(WithEvent::from(&*runner.core().logger, &self.label), "Ignoring {}", msg);
				send_messages(runner, &self.label, &conn, replies)?;
				continue;
			}
			return match self.message_match(runner, &msg)? {
				Some(err) => Err(ScriptError::event(&self.label, format!("{}: message was {}", err, msg))),
				None => Ok(()),
			};
		}
	}
}

/// Bans a message type on a connection until it closes.
pub struct MustNotMsg {
	pub(crate) label: EventLabel,
	pub(crate) done: bool,
	msgtype: String,
	connprivkey: Option<String>,
}

impl MustNotMsg {
	/// Bans `msgtype` (a name, or a number for unknown types) on the last connection used.
	#[track_caller]
	pub fn new(msgtype: &str) -> Self {
		MustNotMsg { label: EventLabel::new("MustNotMsg"), done: false, msgtype: msgtype.to_owned(), connprivkey: None }
	}

	/// Bans it on connection `connprivkey` instead.
	pub fn conn(mut self, connprivkey: &str) -> Self {
		self.connprivkey = Some(connprivkey.to_owned());
		self
	}

	/// Executes the event.
	pub fn action(&mut self, runner: &mut dyn Runner) -> Result<(), ScriptError> {
		let conn = find_conn(runner, &self.label, &self.connprivkey)?;
		let ban = MustNot { msgtype: self.msgtype.clone(), event: self.label.to_string() };
		if let Some(c) = runner.core_mut().conn_mut(&conn) {
			c.must_not.push(ban);
		}
		Ok(())
	}
}

fn expect_error_on(runner: &mut dyn Runner, event: &EventLabel, connprivkey: &Option<String>) -> Result<(String, Option<String>), ScriptError> {
	let conn = find_conn(runner, event, connprivkey)?;
	if let Some(c) = runner.core_mut().conn_mut(&conn) {
		c.expected_error = true;
	}
	let error = runner.check_error(event, &conn)?;
	Ok((conn, error))
}

/// Expects the node to have failed the connection with an `error`.
pub struct ExpectError {
	pub(crate) label: EventLabel,
	pub(crate) done: bool,
	connprivkey: Option<String>,
}

impl ExpectError {
	/// Expects an error on the last connection used.
	#[track_caller]
	pub fn new() -> Self {
		ExpectError { label: EventLabel::new("ExpectError"), done: false, connprivkey: None }
	}

	/// Expects it on connection `connprivkey` instead.
	pub fn conn(mut self, connprivkey: &str) -> Self {
		self.connprivkey = Some(connprivkey.to_owned());
		self
	}

	/// Executes the event.
	pub fn action(&mut self, runner: &mut dyn Runner) -> Result<(), ScriptError> {
		let error = match expect_error_on(runner, &self.label, &self.connprivkey)?.1 {
			Some(error) => error,
			None => return Err(ScriptError::event(&self.label, "No error found".to_owned())),
		};
		if runner.is_dummy() {
			return Ok(());
		}
		let binmsg = Vec::<u8>::from_hex(&error)
			.map_err(|_| ScriptError::event(&self.label, format!("Runner gave bad error {}", error)))?;
		let msg = runner
			.core()
			.namespace
			.decode(&binmsg)
			.map_err(|e| ScriptError::event(&self.label, format!("Runner gave bad msg {}: {}", error, e)))?;
		log_info!(WithEvent::from(&*runner.core().logger, &self.label), "message received {}, hex {}", msg.msgtype, error);
		if msg.msgtype != "error" {
			return Err(ScriptError::event(
				&self.label,
				format!("not error found but received `{}` with hex: `{}`", msg.msgtype, error),
			));
		}
		Ok(())
	}
}

/// Expects the node to have closed the connection without sending an error first.
pub struct ExpectDisconnect {
	pub(crate) label: EventLabel,
	pub(crate) done: bool,
	connprivkey: Option<String>,
}

impl ExpectDisconnect {
	/// Expects the last connection used to be closed.
	#[track_caller]
	pub fn new() -> Self {
		ExpectDisconnect { label: EventLabel::new("ExpectDisconnect"), done: false, connprivkey: None }
	}

	/// Expects connection `connprivkey` to be closed instead.
	pub fn conn(mut self, connprivkey: &str) -> Self {
		self.connprivkey = Some(connprivkey.to_owned());
		self
	}

	/// Executes the event.
	pub fn action(&mut self, runner: &mut dyn Runner) -> Result<(), ScriptError> {
		match expect_error_on(runner, &self.label, &self.connprivkey)? {
			(conn, Some(error)) if !runner.is_dummy() => Err(ScriptError::event(
				&self.label,
				format!("Expected {} to be closed, but got error {}", conn, error),
			)),
			_ => Ok(()),
		}
	}
}
