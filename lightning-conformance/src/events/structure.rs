// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Combinators which order events.
//!
//! A [`Sequence`] runs its events in order. [`OneOf`] and [`AnyOrder`] branch on which message the
//! node sends next: every alternative starts with an [`ExpectMsg`] and the one which matches runs.
//! [`TryAll`] instead runs a single alternative per pass, the runner restarting the node until each
//! has run once.

use crate::events::conn::{read_message, send_messages};
use crate::events::{find_conn, Event, EventLabel, ExpectMsg, Resolved};
use crate::ln::msgs::Message;
use crate::prelude::*;
use crate::runner::Runner;
use crate::util::errors::{ScriptError, SpecFileError};
use crate::util::logger::{Logger, WithEvent};

use core::fmt;

/// Events run one after the other. A disabled sequence does nothing.
pub struct Sequence {
	pub(crate) label: EventLabel,
	events: Vec<Event>,
	enable: Resolved<bool>,
	enabled: Option<bool>,
}

impl Sequence {
	/// Runs `events` in order. Nested sequences which are always enabled are spliced in.
	#[track_caller]
	pub fn new(events: Vec<Event>) -> Self {
		let mut flat = Vec::with_capacity(events.len());
		for event in events {
			match event {
				Event::Sequence(seq) if matches!(seq.enable, Resolved::Literal(true)) => flat.extend(seq.events),
				event => flat.push(event),
			}
		}
		Sequence { label: EventLabel::new("Sequence"), events: flat, enable: Resolved::Literal(true), enabled: None }
	}

	/// Only runs the sequence if `enable` holds. It is evaluated the first time the sequence is
	/// reached and holds for every pass of the run after that.
	pub fn enable(mut self, enable: impl Into<Resolved<bool>>) -> Self {
		self.enable = enable.into();
		self.enabled = None;
		self
	}

	/// Whether the sequence runs.
	pub fn enabled(&mut self, runner: &dyn Runner) -> Result<bool, ScriptError> {
		if let Some(enabled) = self.enabled {
			return Ok(enabled);
		}
		let enabled = self.enable.resolve(runner, &self.label, "enable")?;
		self.enabled = Some(enabled);
		Ok(enabled)
	}

	fn known_disabled(&self) -> bool {
		self.enabled == Some(false)
	}

	/// The events of the sequence.
	pub fn events(&self) -> &[Event] {
		&self.events
	}

	fn first_expect(&self) -> Option<&ExpectMsg> {
		self.events.first().and_then(Event::as_expect_msg)
	}

	/// Runs the sequence. With `skip_first`, its first event is taken as having already run, as
	/// when a [`OneOf`] consumed the message it expects.
	pub fn action(&mut self, runner: &mut dyn Runner, skip_first: bool) -> Result<(), ScriptError> {
		if !self.enabled(&*runner)? {
			return Ok(());
		}
		let mut skip = skip_first;
		for event in self.events.iter_mut() {
			if !event.enabled(&*runner)? {
				continue;
			}
			if skip {
				skip = false;
				event.mark_done();
				continue;
			}
			event.action(runner).map_err(|e| e.add_path(&self.label))?;
		}
		Ok(())
	}

	/// How many of the sequence's events have never run. A disabled sequence has none.
	pub fn num_undone(&self) -> usize {
		if self.known_disabled() {
			return 0;
		}
		self.events.iter().map(Event::num_undone).sum()
	}
}

impl fmt::Display for Sequence {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		fmt::Display::fmt(&self.label, f)
	}
}

/// Checks the alternatives of a [`OneOf`] or [`AnyOrder`]: there is at least one, each starts by
/// expecting a message, and all expect it on the same connection. Returns that connection.
fn check_alternatives(label: &EventLabel, sequences: &[Sequence]) -> Result<Option<String>, SpecFileError> {
	if sequences.is_empty() {
		return Err(SpecFileError::new(label, "needs at least one sequence".to_owned()));
	}
	let mut conn = None;
	for (idx, seq) in sequences.iter().enumerate() {
		let expect = seq.first_expect().ok_or_else(|| {
			SpecFileError::new(label, format!("{} does not start with an ExpectMsg", seq.label))
		})?;
		if idx == 0 {
			conn = expect.connprivkey();
		} else if expect.connprivkey() != conn {
			return Err(SpecFileError::new(label, "sequences do not all use the same conn".to_owned()));
		}
	}
	Ok(conn.map(|c| c.to_owned()))
}

fn expect_of<'a>(sequences: &'a [Sequence], idx: usize) -> &'a ExpectMsg {
	sequences[idx].first_expect().expect("Alternatives are checked to start with an ExpectMsg")
}

/// The replies to send if every candidate skips `msg` the same way.
fn ignored_by_all(runner: &dyn Runner, msg: &Message, sequences: &[Sequence], candidates: &[usize]) -> Option<Vec<Message>> {
	let mut replies = candidates.iter().map(|idx| expect_of(sequences, *idx).ignored(runner, msg));
	let first = replies.next()??;
	if replies.all(|r| r.as_ref() == Some(&first)) {
		Some(first)
	} else {
		None
	}
}

/// The first candidate whose expectation `msg` matches. Only that candidate stashes `msg`.
fn match_which_sequence(
	runner: &mut dyn Runner, msg: &Message, sequences: &[Sequence], candidates: &[usize],
) -> Result<Option<usize>, ScriptError> {
	for idx in candidates.iter() {
		if expect_of(sequences, *idx).message_match(runner, msg)?.is_none() {
			return Ok(Some(*idx));
		}
	}
	Ok(None)
}

fn labels(sequences: &[Sequence], candidates: &[usize]) -> String {
	let labels: Vec<String> = candidates.iter().map(|idx| sequences[*idx].label.to_string()).collect();
	format!("[{}]", labels.join(", "))
}

/// Reads messages until one is not skipped by every candidate, answering the skipped ones.
fn next_message(
	runner: &mut dyn Runner, label: &EventLabel, conn: &str, sequences: &[Sequence], candidates: &[usize],
) -> Result<Message, ScriptError> {
	loop {
		let msg = read_message(runner, label, conn, expect_of(sequences, candidates[0]))?;
		match ignored_by_all(&*runner, &msg, sequences, candidates) {
			Some(replies) => {
				log_gossip!(WithEvent::from(&*runner.core().logger, label), "Ignoring {}", msg);
				send_messages(runner, label, conn, replies)?
			},
			None => return Ok(msg),
		}
	}
}

fn enabled_candidates(runner: &dyn Runner, sequences: &mut [Sequence]) -> Result<Vec<usize>, ScriptError> {
	let mut candidates = Vec::new();
	for (idx, seq) in sequences.iter_mut().enumerate() {
		if seq.enabled(runner)? {
			candidates.push(idx);
		}
	}
	Ok(candidates)
}

/// Alternatives of which exactly one happens, chosen by the next message the node sends.
pub struct OneOf {
	pub(crate) label: EventLabel,
	sequences: Vec<Sequence>,
	connprivkey: Option<String>,
	fired: bool,
}

impl OneOf {
	/// Fails if `sequences` is empty, if one does not start with an [`ExpectMsg`] or if they
	/// expect on different connections.
	#[track_caller]
	pub fn new(sequences: Vec<Sequence>) -> Result<Self, SpecFileError> {
		let label = EventLabel::new("OneOf");
		let connprivkey = check_alternatives(&label, &sequences)?;
		Ok(OneOf { label, sequences, connprivkey, fired: false })
	}

	/// Executes the event.
	pub fn action(&mut self, runner: &mut dyn Runner) -> Result<(), ScriptError> {
		let conn = find_conn(runner, &self.label, &self.connprivkey)?;
		let candidates = enabled_candidates(&*runner, &mut self.sequences)?;
		if candidates.is_empty() {
			return Ok(());
		}
		let msg = next_message(runner, &self.label, &conn, &self.sequences, &candidates)?;
		let idx = match match_which_sequence(runner, &msg, &self.sequences, &candidates)? {
			Some(idx) => idx,
			None => {
				return Err(ScriptError::event(
					&self.label,
					format!("None of the sequences {} matched {}", labels(&self.sequences, &candidates), msg),
				))
			},
		};
		self.fired = true;
		self.sequences[idx].action(runner, true).map_err(|e| e.add_path(&self.label))
	}

	/// One until an alternative has run.
	pub fn num_undone(&self) -> usize {
		if self.fired {
			0
		} else {
			1
		}
	}
}

/// Alternatives which all happen, in whichever order the node sends their first messages.
pub struct AnyOrder {
	pub(crate) label: EventLabel,
	sequences: Vec<Sequence>,
	connprivkey: Option<String>,
	fired: bool,
}

impl AnyOrder {
	/// Fails if `sequences` is empty, if one does not start with an [`ExpectMsg`] or if they
	/// expect on different connections.
	#[track_caller]
	pub fn new(sequences: Vec<Sequence>) -> Result<Self, SpecFileError> {
		let label = EventLabel::new("AnyOrder");
		let connprivkey = check_alternatives(&label, &sequences)?;
		Ok(AnyOrder { label, sequences, connprivkey, fired: false })
	}

	/// Executes the event.
	pub fn action(&mut self, runner: &mut dyn Runner) -> Result<(), ScriptError> {
		let conn = find_conn(runner, &self.label, &self.connprivkey)?;
		let mut candidates = enabled_candidates(&*runner, &mut self.sequences)?;
		while !candidates.is_empty() {
			let msg = next_message(runner, &self.label, &conn, &self.sequences, &candidates)?;
			let idx = match match_which_sequence(runner, &msg, &self.sequences, &candidates)? {
				Some(idx) => idx,
				None => {
					return Err(ScriptError::event(
						&self.label,
						format!("Message did not match any sequences {}: {}", labels(&self.sequences, &candidates), msg),
					))
				},
			};
			candidates.retain(|c| *c != idx);
			self.sequences[idx].action(runner, true).map_err(|e| e.add_path(&self.label))?;
		}
		self.fired = true;
		Ok(())
	}

	/// One until every alternative has run.
	pub fn num_undone(&self) -> usize {
		if self.fired {
			0
		} else {
			1
		}
	}
}

/// Alternatives of which one runs per pass. The runner restarts the node until each has run.
pub struct TryAll {
	pub(crate) label: EventLabel,
	sequences: Vec<Sequence>,
	tried: Vec<bool>,
}

impl TryAll {
	/// Explores each of `sequences`.
	#[track_caller]
	pub fn new(sequences: Vec<Sequence>) -> Self {
		let tried = vec![false; sequences.len()];
		TryAll { label: EventLabel::new("TryAll"), sequences, tried }
	}

	/// How much is left to explore in alternative `idx`. Untried alternatives count for at least
	/// one, disabled ones for nothing.
	fn score(&self, idx: usize) -> usize {
		let seq = &self.sequences[idx];
		if seq.known_disabled() {
			0
		} else if !self.tried[idx] {
			seq.num_undone().max(1)
		} else {
			seq.num_undone()
		}
	}

	/// Runs the least-explored enabled alternative, the first of them on ties.
	pub fn action(&mut self, runner: &mut dyn Runner) -> Result<(), ScriptError> {
		let candidates = enabled_candidates(&*runner, &mut self.sequences)?;
		let mut best: Option<(usize, usize)> = None;
		for idx in candidates {
			let score = self.score(idx);
			if best.map_or(true, |(_, best_score)| score > best_score) {
				best = Some((idx, score));
			}
		}
		let idx = match best {
			Some((idx, _)) => idx,
			// Every alternative is disabled.
			None => return Ok(()),
		};
		self.tried[idx] = true;
		self.sequences[idx].action(runner, false).map_err(|e| e.add_path(&self.label))
	}

	/// The alternatives' scores, summed.
	pub fn num_undone(&self) -> usize {
		(0..self.sequences.len()).map(|idx| self.score(idx)).sum()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::events::{negotiated, CheckEq, Connect, Msg};
	use crate::runner::dummy::DummyRunner;
	use crate::util::config::RunnerConfig;
	use crate::util::test_utils::{TestLogger, TestRunner};

	use alloc::sync::Arc;

	fn ping() -> Message {
		Message::new("ping").with("num_pong_bytes", 0u16).with("ignored", Vec::<u8>::new())
	}

	#[test]
	fn nested_sequences_are_flattened() {
		let inner = Sequence::new(vec![Connect::new("02").into(), Msg::new("ping").into()]);
		let gated = Sequence::new(vec![Msg::new("pong").into()]).enable(false);
		let outer = Sequence::new(vec![inner.into(), gated.into()]);
		assert_eq!(outer.events().len(), 3);
		assert_eq!(outer.num_undone(), 3);
	}

	#[test]
	fn disabled_sequences_do_nothing() {
		let mut runner = TestRunner::new();
		let features = Sequence::new(vec![Msg::new("init").into()]).enable(negotiated("2000", "", vec![12], vec![]));
		let mut script = Sequence::new(vec![Connect::new("02").into(), features.into()]);
		script.action(&mut runner, false).unwrap();
		assert!(runner.sent().is_empty());
		assert_eq!(script.num_undone(), 0);
	}

	#[test]
	fn one_of_runs_the_matching_alternative() {
		let mut runner = TestRunner::new();
		Connect::new("02").action(&mut runner).unwrap();
		runner.queue_message(&Message::new("pong").with("ignored", vec![0u8; 2]));

		let mut one_of = OneOf::new(vec![
			Sequence::new(vec![ExpectMsg::new("init").into(), Msg::new("ping").into()]),
			Sequence::new(vec![ExpectMsg::new("pong").into(), CheckEq::new(1u64, 1u64).into()]),
		])
		.unwrap();
		assert_eq!(one_of.num_undone(), 1);
		one_of.action(&mut runner).unwrap();
		assert_eq!(one_of.num_undone(), 0);
		// The first alternative never ran.
		assert!(runner.sent().is_empty());
		assert_eq!(runner.core().stash.history(crate::events::stash::History::Rcvd)[0].0, "pong");
		assert_eq!(one_of.sequences[0].num_undone(), 2);
		assert_eq!(one_of.sequences[1].num_undone(), 0);
	}

	#[test]
	fn one_of_rejects_unexpected_messages() {
		let mut runner = TestRunner::new();
		Connect::new("02").action(&mut runner).unwrap();
		runner.queue_message(&Message::new("pong").with("ignored", vec![0u8; 2]));
		let mut one_of = OneOf::new(vec![Sequence::new(vec![ExpectMsg::new("init").into()])]).unwrap();
		match one_of.action(&mut runner) {
			Err(ScriptError::Event(err)) => assert!(err.message.starts_with("None of the sequences [Sequence:structure.rs:")),
			res => panic!("{:?}", res),
		}
	}

	#[test]
	fn alternatives_are_checked() {
		assert!(OneOf::new(vec![]).is_err());
		assert!(OneOf::new(vec![Sequence::new(vec![Msg::new("init").into()])]).is_err());
		let err = AnyOrder::new(vec![
			Sequence::new(vec![ExpectMsg::new("init").into()]),
			Sequence::new(vec![ExpectMsg::new("init").conn("03").into()]),
		])
		.err()
		.unwrap();
		assert_eq!(err.message, "sequences do not all use the same conn");
	}

	#[test]
	fn any_order_takes_every_alternative() {
		let logger = Arc::new(TestLogger::new());
		let mut runner = TestRunner::with_logger(logger.clone());
		Connect::new("02").action(&mut runner).unwrap();
		runner.queue_message(&ping());
		runner.queue_message(&Message::new("pong").with("ignored", vec![0u8; 2]));
		runner.queue_message(&Message::new("init").with("globalfeatures", Vec::<u8>::new()).with("features", vec![0x20u8, 0]));

		// Both alternatives answer the ping the same way, so it is answered once and skipped.
		let mut any = AnyOrder::new(vec![
			Sequence::new(vec![ExpectMsg::new("init").ignore(crate::events::conn::ignore_pings).into()]),
			Sequence::new(vec![ExpectMsg::new("pong").ignore(crate::events::conn::ignore_pings).into()]),
		])
		.unwrap();
		any.action(&mut runner).unwrap();
		assert_eq!(any.num_undone(), 0);
		let sent: Vec<String> = runner.sent().into_iter().map(|(_, msg)| msg.msgtype).collect();
		assert_eq!(sent, vec!["pong".to_owned()]);
		logger.assert_log_contains("lightning_conformance::events::structure", "Ignoring ping", 1);
		let rcvd: Vec<&str> = runner
			.core()
			.stash
			.history(crate::events::stash::History::Rcvd)
			.iter()
			.map(|(t, _)| t.as_str())
			.collect();
		assert_eq!(rcvd, vec!["pong", "init"]);
	}

	#[test]
	fn try_all_explores_one_alternative_per_pass() {
		let mut runner = TestRunner::new();
		let mut try_all = TryAll::new(vec![
			Sequence::new(vec![Connect::new("02").into()]),
			Sequence::new(vec![Connect::new("03").into(), Connect::new("04").into()]),
			Sequence::new(vec![Connect::new("05").into()]).enable(false),
			Sequence::new(vec![Connect::new("06").into()]),
		]);
		let mut passes = 0;
		let mut connected = Vec::new();
		while try_all.num_undone() > 0 {
			runner.restart().unwrap();
			try_all.action(&mut runner).unwrap();
			let mut conns: Vec<String> = runner.core().conns.keys().cloned().collect();
			conns.sort();
			connected.push(conns.join(","));
			passes += 1;
			assert!(passes <= 4);
		}
		// The disabled alternative scores nothing once it has been evaluated.
		assert_eq!(passes, 3);
		assert_eq!(connected[0], "03,04");
	}

	#[test]
	fn dummy_runner_runs_scripts_end_to_end() {
		let logger = Arc::new(TestLogger::new());
		let mut runner = DummyRunner::new(RunnerConfig::default(), logger.clone());
		let script = Sequence::new(vec![
			Connect::new("02").into(),
			ExpectMsg::new("init").into(),
			Msg::new("init").field("globalfeatures", "").field("features", "").into(),
			TryAll::new(vec![
				Sequence::new(vec![Msg::new("ping").field("num_pong_bytes", 1u16).field("ignored", "").into()]),
				Sequence::new(vec![
					OneOf::new(vec![
						Sequence::new(vec![ExpectMsg::new("pong").into()]),
						Sequence::new(vec![ExpectMsg::new("ping").into()]),
					])
					.unwrap()
					.into(),
				]),
			])
			.into(),
		]);
		runner.run(script).unwrap();
		logger.assert_log_contains("lightning_conformance::runner", "passed in 2 passes", 1);
	}
}
