// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! The interface to the node under test.
//!
//! A [`Runner`] backend wraps one implementation: it opens peer connections to it, relays the
//! messages events send and returns the messages it sends back, mines blocks and drives its RPC
//! interface. The state which every backend needs (connections, the stash, configuration and the
//! logger) lives in a shared [`RunnerCore`].
//!
//! [`Runner::run`] drives a script to completion, re-running it from scratch until every
//! alternative of every [`TryAll`] has been explored.
//!
//! [`TryAll`]: crate::events::TryAll

pub mod dummy;
pub mod task;

use bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey, SignOnly};

use core::time::Duration;

use alloc::sync::Arc;

use crate::events::stash::Stash;
use crate::events::{EventLabel, ExpectMsg, Resolved, Sequence};
use crate::ln::keyset::{privkey_expand, KeySet};
use crate::ln::wire::Namespace;
use crate::prelude::*;
use crate::runner::task::PendingTask;
use crate::util::config::RunnerConfig;
use crate::util::errors::{DecodeError, ScriptError};
use crate::util::logger::Logger;

/// A message type a connection must not see until it closes, registered by `MustNotMsg`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MustNot {
	/// The banned message type name, or its number for types the namespace does not know.
	pub msgtype: String,
	/// The label of the event which banned it.
	pub event: String,
}

impl MustNot {
	/// Whether the encoded message `binmsg` is of the banned type.
	pub fn matches(&self, namespace: &Namespace, binmsg: &[u8]) -> bool {
		if binmsg.len() < 2 {
			return false;
		}
		let number = u16::from_be_bytes([binmsg[0], binmsg[1]]);
		match namespace.get_msgtype_by_number(number) {
			Some(msgtype) => msgtype.name == self.msgtype,
			None => self.msgtype == number.to_string(),
		}
	}
}

/// A peer connection to the node under test, identified by the private key of our end.
pub struct Conn {
	/// The hex private key the script named the connection by.
	pub name: String,
	/// Our node key for this connection.
	pub privkey: SecretKey,
	/// The public key of [`Self::privkey`].
	pub pubkey: PublicKey,
	/// Set once the script expects the node to fail the connection with an `error`.
	pub expected_error: bool,
	/// Message types which must not be seen before the connection closes.
	pub must_not: Vec<MustNot>,
}

impl Conn {
	/// A connection whose local key is `connprivkey`, padded as by [`privkey_expand`].
	pub fn new(connprivkey: &str) -> Result<Self, DecodeError> {
		let privkey = privkey_expand(connprivkey)?;
		let pubkey = PublicKey::from_secret_key(&Secp256k1::signing_only(), &privkey);
		Ok(Conn { name: connprivkey.to_owned(), privkey, pubkey, expected_error: false, must_not: Vec::new() })
	}
}

/// The backend-independent state of a runner.
pub struct RunnerCore {
	/// Open connections by name.
	pub conns: HashMap<String, Conn>,
	/// The connection events address when they name none.
	pub last_conn: Option<String>,
	/// What the script has built, sent and received so far in this run.
	pub stash: Stash,
	/// Runner configuration.
	pub config: RunnerConfig,
	/// Where events and backends log.
	pub logger: Arc<dyn Logger + Send + Sync>,
	/// The message definitions used to encode and decode everything on the wire.
	pub namespace: Namespace,
	pending_task: Option<PendingTask>,
}

impl RunnerCore {
	/// Creates the state for a fresh runner.
	pub fn new(config: RunnerConfig, logger: Arc<dyn Logger + Send + Sync>, namespace: Namespace) -> Self {
		RunnerCore {
			conns: new_hash_map(),
			last_conn: None,
			stash: Stash::default(),
			config,
			logger,
			namespace,
			pending_task: None,
		}
	}

	/// Resolves the connection named `connprivkey`, or the last one used. Naming a connection
	/// makes it the last one used.
	pub fn find_conn(&mut self, connprivkey: Option<&str>) -> Option<String> {
		match connprivkey {
			None => self.last_conn.clone().filter(|name| self.conns.contains_key(name)),
			Some(name) if self.conns.contains_key(name) => {
				self.last_conn = Some(name.to_owned());
				Some(name.to_owned())
			},
			Some(_) => None,
		}
	}

	/// Registers a newly opened connection and makes it the last one used.
	pub fn add_conn(&mut self, conn: Conn) {
		self.last_conn = Some(conn.name.clone());
		self.conns.insert(conn.name.clone(), conn);
	}

	/// The connection called `name`.
	pub fn conn(&self, name: &str) -> Option<&Conn> {
		self.conns.get(name)
	}

	/// The connection called `name`, mutably.
	pub fn conn_mut(&mut self, name: &str) -> Option<&mut Conn> {
		self.conns.get_mut(name)
	}

	/// Forgets every connection and the stash, and cancels any pending task, ready for the next
	/// run of a script.
	pub fn reset(&mut self) {
		self.conns.clear();
		self.last_conn = None;
		self.stash = Stash::default();
		self.cancel_pending_task();
	}

	/// Whether a background task is still running.
	pub fn pending_task_outstanding(&self) -> bool {
		self.pending_task.as_ref().map_or(false, |task| !task.poll())
	}

	/// Records `task` as the runner's pending task. Only one may run at a time.
	pub fn start_task(&mut self, event: &EventLabel, task: PendingTask) -> Result<(), ScriptError> {
		if let Some(old) = self.pending_task.take() {
			if !old.poll() {
				let err = format!("{} is still pending, cannot start {}", old.name(), task.name());
				self.pending_task = Some(old);
				return Err(ScriptError::spec(event, err));
			}
			let name = old.name().to_owned();
			if let Err(e) = old.join() {
				log_debug!(self.logger, "Earlier task {} had failed: {}", name, e);
			}
		}
		log_trace!(self.logger, "Starting task {}", task.name());
		self.pending_task = Some(task);
		Ok(())
	}

	/// Collects the pending task, if any. A task which completed with an error fails `event`; one
	/// which is still running is cancelled and its result discarded.
	pub fn finish_pending_task(&mut self, event: &EventLabel) -> Result<(), ScriptError> {
		let task = match self.pending_task.take() {
			Some(task) => task,
			None => return Ok(()),
		};
		let finished = task.poll();
		let name = task.name().to_owned();
		if !finished {
			task.cancel();
		}
		match task.join() {
			Ok(()) => Ok(()),
			Err(e) if finished => Err(ScriptError::event(event, format!("{} failed: {}", name, e))),
			Err(e) => {
				log_debug!(self.logger, "Cancelled {}: {}", name, e);
				Ok(())
			},
		}
	}

	/// Cancels the pending task, if any, and waits for it to exit.
	pub fn cancel_pending_task(&mut self) {
		if let Some(task) = self.pending_task.take() {
			task.cancel();
			let _ = task.join();
		}
	}
}

/// A backend driving one node implementation.
///
/// Methods which talk to the node take the label of the event on whose behalf they run, for use
/// in errors. Every blocking call must give up within
/// [`RunnerConfig::expect_msg_timeout`].
pub trait Runner {
	/// The shared state.
	fn core(&self) -> &RunnerCore;

	/// The shared state, mutably.
	fn core_mut(&mut self) -> &mut RunnerCore;

	/// Whether this is the [`DummyRunner`], which cannot validate anything the node says and so
	/// tolerates mismatches.
	///
	/// [`DummyRunner`]: crate::runner::dummy::DummyRunner
	fn is_dummy(&self) -> bool {
		false
	}

	/// Starts the node from a clean state.
	fn start(&mut self) -> Result<(), ScriptError>;

	/// Stops the node.
	fn stop(&mut self) -> Result<(), ScriptError>;

	/// Returns the node to a clean state between runs of a script.
	fn restart(&mut self) -> Result<(), ScriptError> {
		self.core_mut().reset();
		Ok(())
	}

	/// Opens a connection to the node, with `connprivkey` as our node key, and registers it with
	/// [`RunnerCore::add_conn`].
	fn connect(&mut self, event: &EventLabel, connprivkey: &str) -> Result<(), ScriptError>;

	/// Closes connection `conn`, collects any pending task and checks the connection ended the
	/// way the script expected.
	fn disconnect(&mut self, event: &EventLabel, conn: &str) -> Result<(), ScriptError> {
		let core = self.core_mut();
		let closed = match core.conns.remove(conn) {
			Some(closed) => closed,
			None => return Err(ScriptError::spec(event, format!("Unknown conn {}", conn))),
		};
		if core.last_conn.as_deref() == Some(conn) {
			core.last_conn = None;
		}
		let task_res = core.finish_pending_task(event);
		self.check_final_error(event, &closed, closed.expected_error, &closed.must_not)?;
		task_res
	}

	/// Called after each run of a script: disconnects whatever is still connected, in name
	/// order.
	fn post_check(&mut self, event: &EventLabel) -> Result<(), ScriptError> {
		let mut names: Vec<String> = self.core().conns.keys().cloned().collect();
		names.sort_unstable();
		for name in names {
			log_debug!(self.core().logger, "Closing connection {} after run", name);
			self.disconnect(event, &name)?;
		}
		Ok(())
	}

	/// Delivers an encoded message to the node over `conn`.
	fn recv(&mut self, event: &EventLabel, conn: &str, outbuf: &[u8]) -> Result<(), ScriptError>;

	/// The next message the node sent over `conn`, or `None` if it sent nothing within
	/// `timeout`. `event` is the expectation being waited on, which lets backends that cannot
	/// observe the node synthesize a conforming reply.
	fn get_output_message(
		&mut self, conn: &str, event: &ExpectMsg, timeout: Duration,
	) -> Result<Option<Vec<u8>>, ScriptError>;

	/// The height of the node's chain tip.
	fn getblockheight(&self) -> u32;

	/// Reorganizes the chain back to `newheight`.
	fn trim_blocks(&mut self, event: &EventLabel, newheight: u32) -> Result<(), ScriptError>;

	/// Mines `n` blocks, the first including the hex transactions `txs`.
	fn add_blocks(&mut self, event: &EventLabel, txs: &[String], n: u32) -> Result<(), ScriptError>;

	/// Waits until the node has broadcast the transaction with id `txid`.
	fn expect_tx(&mut self, event: &EventLabel, txid: &str) -> Result<(), ScriptError>;

	/// Has the node create an invoice for `amount` msat paid by revealing `preimage`.
	fn invoice(&mut self, event: &EventLabel, amount: u64, preimage: &[u8; 32]) -> Result<(), ScriptError>;

	/// Has the node open a channel to us over `conn`. This completes only after a message
	/// exchange which the script drives, so backends start it with
	/// [`RunnerCore::start_task`].
	fn fundchannel(
		&mut self, event: &EventLabel, conn: &str, amount: u64, feerate: u32, expect_fail: bool,
	) -> Result<(), ScriptError>;

	/// Has the node offer us an HTLC of `amount` msat paying to the hash of `preimage`.
	fn addhtlc(&mut self, event: &EventLabel, conn: &str, amount: u64, preimage: &[u8; 32]) -> Result<(), ScriptError>;

	/// The basepoint secrets and shachain seed the node uses for its channels.
	fn get_keyset(&self) -> KeySet;

	/// The node's hex node private key.
	fn get_node_privkey(&self) -> String;

	/// The node's hex funding private key.
	fn get_node_bitcoinkey(&self) -> String;

	/// Whether the node supports `optname`, with the option's value if it does.
	fn has_option(&self, optname: &str) -> Option<String>;

	/// The hex of the `error` message the node sent over `conn`, if it sent one.
	fn check_error(&mut self, event: &EventLabel, conn: &str) -> Result<Option<String>, ScriptError>;

	/// Checks a closed connection: the node must have sent an error if and only if
	/// `expected_error`, and nothing in `must_not`.
	fn check_final_error(
		&mut self, event: &EventLabel, conn: &Conn, expected_error: bool, must_not: &[MustNot],
	) -> Result<(), ScriptError>;

	/// Has the node cooperatively close the channel with hex id `channel_id`. Returns whether it
	/// agreed to.
	fn close_channel(&mut self, event: &EventLabel, channel_id: &str) -> Result<bool, ScriptError>;

	/// Runs `script` against the node until every alternative has been exercised, or a run
	/// fails. The node is started once and restarted before each pass, and stopped whatever the
	/// outcome.
	fn run(&mut self, mut script: Sequence) -> Result<(), ScriptError>
	where
		Self: Sized,
	{
		self.start()?;
		let label = script.label.clone();
		let mut passes = 0;
		let res = loop {
			passes += 1;
			log_debug!(self.core().logger, "Starting pass {} of {}", passes, label);
			if let Err(e) = self.restart() {
				break Err(e);
			}
			let mut res = script.action(self, false);
			if res.is_ok() {
				res = self.post_check(&label);
			}
			if let Err(e) = res {
				self.core_mut().cancel_pending_task();
				break Err(e);
			}
			let undone = script.num_undone();
			if undone == 0 {
				break Ok(());
			}
			if passes >= self.core().config.max_passes {
				break Err(ScriptError::spec(
					&label,
					format!("{} events still undone after {} passes", undone, passes),
				));
			}
		};
		let stopped = self.stop();
		match &res {
			Ok(()) => {
				log_info!(self.core().logger, "{} passed in {} passes", label, passes);
			},
			Err(e) => {
				log_error!(self.core().logger, "{} failed: {}", label, e);
			},
		}
		res.and(stopped)
	}
}

fn remote_basepoint(f: fn(&KeySet, &Secp256k1<SignOnly>) -> PublicKey) -> Resolved<PublicKey> {
	Resolved::deferred(move |runner, _, _| Ok(f(&runner.get_keyset(), &Secp256k1::signing_only())))
}

/// The node's revocation basepoint.
pub fn remote_revocation_basepoint() -> Resolved<PublicKey> {
	remote_basepoint(|keyset, secp| keyset.revocation_basepoint(secp))
}

/// The node's payment basepoint.
pub fn remote_payment_basepoint() -> Resolved<PublicKey> {
	remote_basepoint(|keyset, secp| keyset.payment_basepoint(secp))
}

/// The node's delayed payment basepoint.
pub fn remote_delayed_payment_basepoint() -> Resolved<PublicKey> {
	remote_basepoint(|keyset, secp| keyset.delayed_payment_basepoint(secp))
}

/// The node's HTLC basepoint.
pub fn remote_htlc_basepoint() -> Resolved<PublicKey> {
	remote_basepoint(|keyset, secp| keyset.htlc_basepoint(secp))
}

/// The node's funding pubkey.
pub fn remote_funding_pubkey() -> Resolved<PublicKey> {
	Resolved::deferred(|runner, event, _| {
		let privkey = privkey_expand(&runner.get_node_bitcoinkey())
			.map_err(|e| ScriptError::event(event, format!("Runner gave bad funding key: {}", e)))?;
		Ok(PublicKey::from_secret_key(&Secp256k1::signing_only(), &privkey))
	})
}

/// The node's hex funding private key.
pub fn remote_funding_privkey() -> Resolved<String> {
	Resolved::deferred(|runner, _, _| Ok(runner.get_node_bitcoinkey()))
}

const MAX_COMMITMENT_NUMBER: u64 = (1 << 48) - 1;

fn check_commitment_number(event: &EventLabel, n: u64) -> Result<(), ScriptError> {
	if n > MAX_COMMITMENT_NUMBER {
		return Err(ScriptError::spec(event, format!("Commitment number {} exceeds 2^48-1", n)));
	}
	Ok(())
}

/// The node's `n`th per-commitment point.
pub fn remote_per_commitment_point(n: u64) -> Resolved<PublicKey> {
	Resolved::deferred(move |runner, event, _| {
		check_commitment_number(event, n)?;
		Ok(runner.get_keyset().per_commit_point(&Secp256k1::signing_only(), n))
	})
}

/// The node's `n`th per-commitment secret, as revealed in `revoke_and_ack`.
pub fn remote_per_commitment_secret(n: u64) -> Resolved<Vec<u8>> {
	Resolved::deferred(move |runner, event, _| {
		check_commitment_number(event, n)?;
		Ok(runner.get_keyset().per_commit_secret(n).secret_bytes().to_vec())
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::events::{Connect, Disconnect, ExpectMsg, Msg, Sequence, TryAll};
	use crate::runner::dummy::DummyRunner;
	use crate::util::errors::SpecFileError;
	use crate::util::test_utils::{TestLogger, TestRunner};

	use bitcoin::hex::DisplayHex;

	fn dummy() -> DummyRunner {
		let config = RunnerConfig { connect_settle_ms: 0, ..RunnerConfig::default() };
		DummyRunner::new(config, Arc::new(TestLogger::new()))
	}

	#[test]
	fn must_not_matches_by_name_or_number() {
		let namespace = Namespace::bolts();
		let ban = MustNot { msgtype: "error".to_owned(), event: "MustNotMsg:x.rs:1".to_owned() };
		assert!(ban.matches(&namespace, &[0, 17, 0]));
		assert!(!ban.matches(&namespace, &[0, 16]));
		assert!(!ban.matches(&namespace, &[0]));
		let ban = MustNot { msgtype: "32769".to_owned(), event: "MustNotMsg:x.rs:1".to_owned() };
		assert!(ban.matches(&namespace, &[0x80, 0x01]));
	}

	#[test]
	fn last_connection_tracking() {
		let mut runner = dummy();
		let core = runner.core_mut();
		assert_eq!(core.find_conn(None), None);
		core.add_conn(Conn::new("02").unwrap());
		core.add_conn(Conn::new("03").unwrap());
		assert_eq!(core.find_conn(None), Some("03".to_owned()));
		assert_eq!(core.find_conn(Some("02")), Some("02".to_owned()));
		assert_eq!(core.find_conn(None), Some("02".to_owned()));
		assert_eq!(core.find_conn(Some("04")), None);
		core.reset();
		assert_eq!(core.find_conn(None), None);
	}

	#[test]
	fn one_task_at_a_time() {
		let mut runner = dummy();
		let label = EventLabel::new("FundChannel");
		let core = runner.core_mut();
		let (tx, rx) = std::sync::mpsc::channel::<()>();
		core.start_task(&label, PendingTask::spawn("first", move |_| rx.recv().map_err(|e| e.to_string())))
			.unwrap();
		assert!(core.pending_task_outstanding());
		match core.start_task(&label, PendingTask::spawn("second", |_| Ok(()))) {
			Err(ScriptError::SpecFile(SpecFileError { message, .. })) => {
				assert_eq!(message, "first is still pending, cannot start second")
			},
			_ => panic!(),
		}
		tx.send(()).unwrap();
		assert_eq!(core.finish_pending_task(&label), Ok(()));
		assert!(!core.pending_task_outstanding());
	}

	#[test]
	fn failed_tasks_fail_the_event() {
		let mut runner = dummy();
		let label = EventLabel::new("Disconnect");
		let core = runner.core_mut();
		let task = PendingTask::spawn("fundchannel", |_| Err("insufficient funds".to_owned()));
		while !task.poll() {
			std::thread::yield_now();
		}
		core.start_task(&label, task).unwrap();
		match core.finish_pending_task(&label) {
			Err(ScriptError::Event(err)) => assert_eq!(err.message, "fundchannel failed: insufficient funds"),
			_ => panic!(),
		}
	}

	#[test]
	fn disconnect_checks_the_connection_even_if_a_task_failed() {
		let mut runner = TestRunner::new();
		let label = EventLabel::new("Disconnect");
		runner.connect(&label, "02").unwrap();
		let task = PendingTask::spawn("fundchannel", |_| Err("insufficient funds".to_owned()));
		while !task.poll() {
			std::thread::yield_now();
		}
		runner.core_mut().start_task(&label, task).unwrap();
		match runner.disconnect(&label, "02") {
			Err(ScriptError::Event(err)) => assert_eq!(err.message, "fundchannel failed: insufficient funds"),
			_ => panic!(),
		}
		assert_eq!(runner.closed, vec![("02".to_owned(), false)]);
		assert!(!runner.core().pending_task_outstanding());
	}

	#[test]
	fn remote_keys_come_from_the_runner() {
		let runner = dummy();
		let label = EventLabel::new("Msg");
		let secp = Secp256k1::signing_only();
		let keyset = runner.get_keyset();
		assert_eq!(
			remote_revocation_basepoint().resolve(&runner, &label, "").unwrap(),
			keyset.revocation_basepoint(&secp)
		);
		assert_eq!(
			remote_htlc_basepoint().resolve(&runner, &label, "").unwrap(),
			keyset.htlc_basepoint(&secp)
		);
		assert_eq!(remote_funding_privkey().resolve(&runner, &label, "").unwrap(), "10");
		assert_eq!(
			remote_funding_pubkey().resolve(&runner, &label, "").unwrap(),
			PublicKey::from_secret_key(&secp, &privkey_expand("10").unwrap())
		);
		assert_eq!(
			remote_per_commitment_secret(0).resolve(&runner, &label, "").unwrap().to_lower_hex_string(),
			keyset.per_commit_secret(0).secret_bytes().to_lower_hex_string()
		);
		assert!(remote_per_commitment_point(1 << 48).resolve(&runner, &label, "").is_err());
	}

	#[test]
	fn run_stops_after_failure() {
		let mut runner = TestRunner::new();
		let script = Sequence::new(vec![
			Connect::new("02").into(),
			ExpectMsg::new("init").into(),
		]);
		match runner.run(script) {
			Err(ScriptError::Event(err)) => assert_eq!(err.message, "Did not receive a message init from runner"),
			res => panic!("{:?}", res),
		}
		assert_eq!((runner.starts, runner.restarts, runner.stops), (1, 1, 1));
	}

	#[test]
	fn run_explores_every_alternative() {
		let mut runner = TestRunner::new();
		let script = Sequence::new(vec![
			Connect::new("02").into(),
			TryAll::new(vec![
				Sequence::new(vec![Msg::new("ping").field("num_pong_bytes", 0u16).field("ignored", "").into()]),
				Sequence::new(vec![Msg::new("pong").field("ignored", "").into()]),
				Sequence::new(vec![Disconnect::new().into()]),
			])
			.into(),
		]);
		runner.run(script).unwrap();
		assert_eq!(runner.restarts, 3);
		let sent: Vec<String> = runner.sent().into_iter().map(|(_, msg)| msg.msgtype).collect();
		assert_eq!(sent, vec!["ping".to_owned(), "pong".to_owned()]);
	}

	#[test]
	fn run_gives_up_after_max_passes() {
		let mut runner = TestRunner::new();
		runner.core_mut().config.max_passes = 1;
		let script = Sequence::new(vec![TryAll::new(vec![
			Sequence::new(vec![Connect::new("02").into()]),
			Sequence::new(vec![Connect::new("03").into()]),
		])
		.into()]);
		match runner.run(script) {
			Err(ScriptError::SpecFile(err)) => assert_eq!(err.message, "1 events still undone after 1 passes"),
			res => panic!("{:?}", res),
		}
	}
}
