// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

use crate::events::{EventLabel, ExpectMsg};
use crate::ln::keyset::KeySet;
use crate::ln::msgs::Message;
use crate::ln::wire::Namespace;
use crate::prelude::*;
use crate::runner::task::PendingTask;
use crate::runner::{Conn, MustNot, Runner, RunnerCore};
use crate::util::config::RunnerConfig;
use crate::util::errors::ScriptError;
use crate::util::logger::{Level, Logger, Record};

use bitcoin::hex::DisplayHex;

use core::time::Duration;

use alloc::sync::Arc;
use std::sync::Mutex;

pub struct TestLogger {
	level: Level,
	id: String,
	pub lines: Mutex<HashMap<(String, String), usize>>,
	events: Mutex<Vec<String>>,
}

impl TestLogger {
	pub fn new() -> TestLogger {
		Self::with_id("".to_owned())
	}
	pub fn with_id(id: String) -> TestLogger {
		TestLogger { level: Level::Trace, id, lines: Mutex::new(new_hash_map()), events: Mutex::new(Vec::new()) }
	}
	pub fn enable(&mut self, level: Level) {
		self.level = level;
	}
	pub fn assert_log(&self, module: &str, line: &str, count: usize) {
		let log_entries = self.lines.lock().unwrap();
		assert_eq!(log_entries.get(&(module.to_owned(), line.to_owned())), Some(&count));
	}

	/// Search for the number of occurrence of the logged lines which
	/// 1. belongs to the specified module and
	/// 2. contains `line` in it.
	/// And asserts if the number of occurrences is the same with the given `count`
	pub fn assert_log_contains(&self, module: &str, line: &str, count: usize) {
		let log_entries = self.lines.lock().unwrap();
		let l: usize = log_entries
			.iter()
			.filter(|&(&(ref m, ref l), _c)| m == module && l.contains(line))
			.map(|(_, c)| c)
			.sum();
		assert_eq!(l, count)
	}

	/// Search for the number of occurrences of logged lines which
	/// 1. belong to the specified module and
	/// 2. match the given regex pattern.
	/// Assert that the number of occurrences equals the given `count`
	pub fn assert_log_regex(&self, module: &str, pattern: regex::Regex, count: usize) {
		let log_entries = self.lines.lock().unwrap();
		let l: usize = log_entries
			.iter()
			.filter(|&(&(ref m, ref l), _c)| m == module && pattern.is_match(&l))
			.map(|(_, c)| c)
			.sum();
		assert_eq!(l, count)
	}

	/// The event labels attached to logged records, in logging order.
	pub fn events_logged(&self) -> Vec<String> {
		self.events.lock().unwrap().clone()
	}
}

impl Logger for TestLogger {
	fn log(&self, record: Record) {
		*self
			.lines
			.lock()
			.unwrap()
			.entry((record.module_path.to_string(), format!("{}", record.args)))
			.or_insert(0) += 1;
		if let Some(event) = &record.event {
			self.events.lock().unwrap().push(event.clone());
		}
		if record.level >= self.level {
			println!("{:<5} {} [{} : {}, {}] {}", record.level.to_string(), self.id, record.module_path, record.file, record.line, record.args);
		}
	}
}

/// A scripted node: it sends whatever the test queued, in order, and records everything it is
/// sent.
pub struct TestRunner {
	core: RunnerCore,
	/// Messages the node will send, shared with background tasks.
	pub outgoing: Arc<parking_lot::Mutex<VecDeque<Vec<u8>>>>,
	/// Queued by the task `fundchannel` starts, as a node's `open_channel` would be.
	pub fundchannel_reply: Option<Vec<u8>>,
	received: Vec<(String, Vec<u8>)>,
	pub blockheight: u32,
	pub keyset: KeySet,
	pub starts: usize,
	pub stops: usize,
	pub restarts: usize,
	/// Each closed connection, with whether it was expected to fail.
	pub closed: Vec<(String, bool)>,
	pub mined: Vec<String>,
	pub invoices: Vec<(u64, [u8; 32])>,
	pub htlcs: Vec<(String, u64, [u8; 32])>,
	pub fundings: Vec<(String, u64, u32, bool)>,
	pub closes: Vec<String>,
}

impl TestRunner {
	pub fn new() -> TestRunner {
		Self::with_logger(Arc::new(TestLogger::new()))
	}

	pub fn with_logger(logger: Arc<TestLogger>) -> TestRunner {
		let config = RunnerConfig { connect_settle_ms: 0, expect_msg_timeout_secs: 1, ..RunnerConfig::default() };
		TestRunner {
			core: RunnerCore::new(config, logger, Namespace::bolts()),
			outgoing: Arc::new(parking_lot::Mutex::new(VecDeque::new())),
			fundchannel_reply: None,
			received: Vec::new(),
			blockheight: 102,
			keyset: KeySet::from_hex("11", "12", "13", "14", &"ff".repeat(32)).unwrap(),
			starts: 0,
			stops: 0,
			restarts: 0,
			closed: Vec::new(),
			mined: Vec::new(),
			invoices: Vec::new(),
			htlcs: Vec::new(),
			fundings: Vec::new(),
			closes: Vec::new(),
		}
	}

	pub fn encode(&self, msg: &Message) -> Vec<u8> {
		self.core.namespace.encode(&self.core.namespace.coerce(msg).unwrap()).unwrap()
	}

	pub fn queue_message(&self, msg: &Message) {
		let binmsg = self.encode(msg);
		self.queue_raw(binmsg);
	}

	pub fn queue_raw(&self, binmsg: Vec<u8>) {
		self.outgoing.lock().push_back(binmsg);
	}

	/// Everything delivered to the node, decoded.
	pub fn sent(&self) -> Vec<(String, Message)> {
		self.received
			.iter()
			.map(|(conn, binmsg)| (conn.clone(), self.core.namespace.decode(binmsg).unwrap()))
			.collect()
	}
}

impl Runner for TestRunner {
	fn core(&self) -> &RunnerCore {
		&self.core
	}

	fn core_mut(&mut self) -> &mut RunnerCore {
		&mut self.core
	}

	fn start(&mut self) -> Result<(), ScriptError> {
		self.starts += 1;
		Ok(())
	}

	fn stop(&mut self) -> Result<(), ScriptError> {
		self.stops += 1;
		self.core.cancel_pending_task();
		Ok(())
	}

	fn restart(&mut self) -> Result<(), ScriptError> {
		self.restarts += 1;
		self.core.reset();
		Ok(())
	}

	fn connect(&mut self, event: &EventLabel, connprivkey: &str) -> Result<(), ScriptError> {
		let conn = Conn::new(connprivkey).map_err(|e| ScriptError::spec(event, e.to_string()))?;
		self.core.add_conn(conn);
		Ok(())
	}

	fn recv(&mut self, _event: &EventLabel, conn: &str, outbuf: &[u8]) -> Result<(), ScriptError> {
		self.received.push((conn.to_owned(), outbuf.to_vec()));
		Ok(())
	}

	fn get_output_message(
		&mut self, _conn: &str, _event: &ExpectMsg, _timeout: Duration,
	) -> Result<Option<Vec<u8>>, ScriptError> {
		loop {
			if let Some(binmsg) = self.outgoing.lock().pop_front() {
				return Ok(Some(binmsg));
			}
			if !self.core.pending_task_outstanding() {
				return Ok(None);
			}
			std::thread::yield_now();
		}
	}

	fn getblockheight(&self) -> u32 {
		self.blockheight
	}

	fn trim_blocks(&mut self, _event: &EventLabel, newheight: u32) -> Result<(), ScriptError> {
		self.blockheight = newheight;
		Ok(())
	}

	fn add_blocks(&mut self, _event: &EventLabel, txs: &[String], n: u32) -> Result<(), ScriptError> {
		self.mined.extend(txs.iter().cloned());
		self.blockheight += n;
		Ok(())
	}

	fn expect_tx(&mut self, _event: &EventLabel, _txid: &str) -> Result<(), ScriptError> {
		Ok(())
	}

	fn invoice(&mut self, _event: &EventLabel, amount: u64, preimage: &[u8; 32]) -> Result<(), ScriptError> {
		self.invoices.push((amount, *preimage));
		Ok(())
	}

	fn fundchannel(
		&mut self, event: &EventLabel, conn: &str, amount: u64, feerate: u32, expect_fail: bool,
	) -> Result<(), ScriptError> {
		self.fundings.push((conn.to_owned(), amount, feerate, expect_fail));
		let outgoing = Arc::clone(&self.outgoing);
		let reply = self.fundchannel_reply.clone();
		self.core.start_task(
			event,
			PendingTask::spawn("fundchannel", move |_| {
				if let Some(binmsg) = reply {
					outgoing.lock().push_back(binmsg);
				}
				Ok(())
			}),
		)
	}

	fn addhtlc(&mut self, _event: &EventLabel, conn: &str, amount: u64, preimage: &[u8; 32]) -> Result<(), ScriptError> {
		self.htlcs.push((conn.to_owned(), amount, *preimage));
		Ok(())
	}

	fn get_keyset(&self) -> KeySet {
		self.keyset.clone()
	}

	fn get_node_privkey(&self) -> String {
		"01".to_owned()
	}

	fn get_node_bitcoinkey(&self) -> String {
		"10".to_owned()
	}

	fn has_option(&self, _optname: &str) -> Option<String> {
		None
	}

	fn check_error(&mut self, _event: &EventLabel, _conn: &str) -> Result<Option<String>, ScriptError> {
		let mut outgoing = self.outgoing.lock();
		let is_error = outgoing.front().map_or(false, |binmsg| binmsg.len() >= 2 && binmsg[..2] == [0, 17]);
		if is_error {
			Ok(outgoing.pop_front().map(|binmsg| binmsg.to_lower_hex_string()))
		} else {
			Ok(None)
		}
	}

	fn check_final_error(
		&mut self, _event: &EventLabel, conn: &Conn, expected_error: bool, _must_not: &[MustNot],
	) -> Result<(), ScriptError> {
		self.closed.push((conn.name.clone(), expected_error));
		Ok(())
	}

	fn close_channel(&mut self, _event: &EventLabel, channel_id: &str) -> Result<bool, ScriptError> {
		self.closes.push(channel_id.to_owned());
		Ok(true)
	}
}
