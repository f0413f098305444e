// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Events are the steps of a test script.
//!
//! A script is a tree of [`Event`]s: leaves which talk to the node under test through a
//! [`Runner`] (sending and expecting messages, mining blocks, opening channels) and combinators
//! which order them ([`Sequence`]), branch on what the node sends ([`OneOf`], [`AnyOrder`]) or
//! explore every alternative across repeated runs ([`TryAll`]).
//!
//! Event arguments are [`Resolved`] values: either literals or functions evaluated when the event
//! executes, which lets a field refer to what an earlier event sent or received.
//!
//! [`Runner`]: crate::runner::Runner

pub mod chain;
pub mod channel;
pub mod conn;
pub mod stash;
pub mod structure;

pub use self::chain::{AddHtlc, Block, CheckEq, CloseChannel, ExpectTx, FundChannel, Invoice, Wait};
pub use self::channel::{AcceptFunding, Commit, CreateFunding, UpdateCommit};
pub use self::conn::{
	Connect, Disconnect, ExpectDisconnect, ExpectError, ExpectMsg, MustNotMsg, Msg, RawMsg,
};
pub use self::structure::{AnyOrder, OneOf, Sequence, TryAll};

use bitcoin::secp256k1::PublicKey;

use core::fmt;
use core::panic::Location;

use crate::ln::features;
use crate::ln::msgs::{FieldMap, FieldValue};
use crate::ln::signature::Sig;
use crate::prelude::*;
use crate::runner::Runner;
use crate::util::errors::ScriptError;
use crate::util::logger::Level;
use crate::util::scid_utils::ShortChannelId;

/// Where an event was created, used to name it in errors and logs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventLabel {
	/// The event type, eg `ExpectMsg`.
	pub kind: &'static str,
	/// The file name (without directories) of the script which created the event.
	pub file: &'static str,
	/// The line at which the event was created.
	pub line: u32,
}

impl EventLabel {
	/// Labels an event of type `kind` created by the caller of the (`#[track_caller]`)
	/// constructor calling this.
	#[track_caller]
	pub fn new(kind: &'static str) -> Self {
		let location = Location::caller();
		let file = location.file();
		let file = match file.rfind(|c| c == '/' || c == '\\') {
			Some(idx) => &file[idx + 1..],
			None => file,
		};
		EventLabel { kind, file, line: location.line() }
	}
}

impl fmt::Display for EventLabel {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{}:{}:{}", self.kind, self.file, self.line)
	}
}

/// The signature of the functions behind [`Resolved::Deferred`]: given the runner, the label of
/// the event being executed and the name of the argument being resolved, compute its value.
pub type ResolveFn<T> = dyn Fn(&dyn Runner, &EventLabel, &str) -> Result<T, ScriptError>;

/// An event argument: a literal or a value computed when the event executes.
pub enum Resolved<T> {
	/// A value known when the script is written.
	Literal(T),
	/// A value computed from runner state (usually the stash) at execution time.
	Deferred(Box<ResolveFn<T>>),
}

impl<T: Clone> Resolved<T> {
	/// Produces the value of argument `field` of `event`.
	pub fn resolve(&self, runner: &dyn Runner, event: &EventLabel, field: &str) -> Result<T, ScriptError> {
		match self {
			Resolved::Literal(v) => Ok(v.clone()),
			Resolved::Deferred(f) => f(runner, event, field),
		}
	}
}

impl<T> Resolved<T> {
	/// Wraps a resolver function.
	pub fn deferred<F>(f: F) -> Self
	where
		F: Fn(&dyn Runner, &EventLabel, &str) -> Result<T, ScriptError> + 'static,
	{
		Resolved::Deferred(Box::new(f))
	}
}

impl<T: fmt::Debug> fmt::Debug for Resolved<T> {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Resolved::Literal(v) => write!(f, "{:?}", v),
			Resolved::Deferred(_) => f.write_str("<deferred>"),
		}
	}
}

impl<T> From<T> for Resolved<T> {
	fn from(v: T) -> Self {
		Resolved::Literal(v)
	}
}

impl From<&str> for Resolved<String> {
	fn from(v: &str) -> Self {
		Resolved::Literal(v.to_owned())
	}
}

macro_rules! impl_resolved_field {
	($($ty: ty),*) => {$(
		impl From<$ty> for Resolved<FieldValue> {
			fn from(v: $ty) -> Self {
				Resolved::Literal(v.into())
			}
		}

		impl From<Resolved<$ty>> for Resolved<FieldValue> {
			fn from(v: Resolved<$ty>) -> Self {
				match v {
					Resolved::Literal(v) => Resolved::Literal(v.into()),
					Resolved::Deferred(f) => Resolved::deferred(move |runner, event, field| {
						f(runner, event, field).map(Into::into)
					}),
				}
			}
		}
	)*}
}
impl_resolved_field!(u8, u16, u32, u64, String, Vec<u8>, PublicKey, Sig, ShortChannelId, FieldMap);

impl From<&str> for Resolved<FieldValue> {
	fn from(v: &str) -> Self {
		Resolved::Literal(v.into())
	}
}

/// A script step. Every variant carries an [`EventLabel`] and, for leaves, whether it has
/// executed at least once across all runs.
pub enum Event {
	/// See [`Connect`].
	Connect(Connect),
	/// See [`Disconnect`].
	Disconnect(Disconnect),
	/// See [`Msg`].
	Msg(Msg),
	/// See [`RawMsg`].
	RawMsg(RawMsg),
	/// See [`ExpectMsg`].
	ExpectMsg(ExpectMsg),
	/// See [`MustNotMsg`].
	MustNotMsg(MustNotMsg),
	/// See [`ExpectError`].
	ExpectError(ExpectError),
	/// See [`ExpectDisconnect`].
	ExpectDisconnect(ExpectDisconnect),
	/// See [`Block`].
	Block(Block),
	/// See [`ExpectTx`].
	ExpectTx(ExpectTx),
	/// See [`FundChannel`].
	FundChannel(FundChannel),
	/// See [`Invoice`].
	Invoice(Invoice),
	/// See [`AddHtlc`].
	AddHtlc(AddHtlc),
	/// See [`CheckEq`].
	CheckEq(CheckEq),
	/// See [`Wait`].
	Wait(Wait),
	/// See [`CloseChannel`].
	CloseChannel(CloseChannel),
	/// See [`AcceptFunding`].
	AcceptFunding(AcceptFunding),
	/// See [`CreateFunding`].
	CreateFunding(CreateFunding),
	/// See [`Commit`].
	Commit(Commit),
	/// See [`UpdateCommit`].
	UpdateCommit(UpdateCommit),
	/// See [`Sequence`].
	Sequence(Sequence),
	/// See [`OneOf`].
	OneOf(OneOf),
	/// See [`AnyOrder`].
	AnyOrder(AnyOrder),
	/// See [`TryAll`].
	TryAll(TryAll),
}

macro_rules! for_each_leaf {
	($self: expr, $ev: ident => $body: expr, $($combinator: ident($c: ident) => $cbody: expr),*) => {
		match $self {
			Event::Connect($ev) => $body,
			Event::Disconnect($ev) => $body,
			Event::Msg($ev) => $body,
			Event::RawMsg($ev) => $body,
			Event::ExpectMsg($ev) => $body,
			Event::MustNotMsg($ev) => $body,
			Event::ExpectError($ev) => $body,
			Event::ExpectDisconnect($ev) => $body,
			Event::Block($ev) => $body,
			Event::ExpectTx($ev) => $body,
			Event::FundChannel($ev) => $body,
			Event::Invoice($ev) => $body,
			Event::AddHtlc($ev) => $body,
			Event::CheckEq($ev) => $body,
			Event::Wait($ev) => $body,
			Event::CloseChannel($ev) => $body,
			Event::AcceptFunding($ev) => $body,
			Event::CreateFunding($ev) => $body,
			Event::Commit($ev) => $body,
			Event::UpdateCommit($ev) => $body,
			$(Event::$combinator($c) => $cbody,)*
		}
	}
}

impl Event {
	/// The event's label.
	pub fn label(&self) -> &EventLabel {
		for_each_leaf!(self, ev => &ev.label,
			Sequence(s) => &s.label, OneOf(s) => &s.label, AnyOrder(s) => &s.label, TryAll(s) => &s.label)
	}

	/// Executes the event. Errors carry the path of labels from this event down to the one which
	/// failed.
	pub fn action(&mut self, runner: &mut dyn Runner) -> Result<(), ScriptError> {
		log_event_start(runner, self.label());
		for_each_leaf!(self, ev => {
			ev.action(runner)?;
			ev.done = true;
			Ok(())
		},
			Sequence(s) => s.action(runner, false),
			OneOf(s) => s.action(runner),
			AnyOrder(s) => s.action(runner),
			TryAll(s) => s.action(runner))
	}

	/// How many leaves (or unexplored alternatives) have never executed. A script has been fully
	/// exercised once this reaches zero.
	pub fn num_undone(&self) -> usize {
		for_each_leaf!(self, ev => if ev.done { 0 } else { 1 },
			Sequence(s) => s.num_undone(), OneOf(s) => s.num_undone(), AnyOrder(s) => s.num_undone(),
			TryAll(s) => s.num_undone())
	}

	/// Whether the event takes part in this run. Only [`Sequence`]s can be disabled.
	pub fn enabled(&mut self, runner: &dyn Runner) -> Result<bool, ScriptError> {
		match self {
			Event::Sequence(s) => s.enabled(runner),
			_ => Ok(true),
		}
	}

	/// Records that the event was executed on its behalf, as when a [`OneOf`] consumes the
	/// message an [`ExpectMsg`] was waiting for.
	pub(crate) fn mark_done(&mut self) {
		if let Event::ExpectMsg(ev) = self {
			ev.done = true;
		}
	}

	pub(crate) fn as_expect_msg(&self) -> Option<&ExpectMsg> {
		match self {
			Event::ExpectMsg(ev) => Some(ev),
			_ => None,
		}
	}
}

impl fmt::Display for Event {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		fmt::Display::fmt(self.label(), f)
	}
}

impl fmt::Debug for Event {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		fmt::Display::fmt(self.label(), f)
	}
}

macro_rules! impl_from_event {
	($($variant: ident),*) => {$(
		impl From<$variant> for Event {
			fn from(ev: $variant) -> Self {
				Event::$variant(ev)
			}
		}
	)*}
}
impl_from_event!(
	Connect, Disconnect, Msg, RawMsg, ExpectMsg, MustNotMsg, ExpectError, ExpectDisconnect, Block,
	ExpectTx, FundChannel, Invoice, AddHtlc, CheckEq, Wait, CloseChannel, AcceptFunding,
	CreateFunding, Commit, UpdateCommit, Sequence, OneOf, AnyOrder, TryAll
);

fn log_event_start(runner: &dyn Runner, label: &EventLabel) {
	let core = runner.core();
	let level = if core.config.verbose { Level::Info } else { Level::Trace };
	log_given_level!(core.logger, level, "# running {}", label);
}

/// Looks up the connection an event addressed by `connprivkey`, or the last one used if `None`.
pub(crate) fn find_conn(
	runner: &mut dyn Runner, event: &EventLabel, connprivkey: &Option<String>,
) -> Result<String, ScriptError> {
	match runner.core_mut().find_conn(connprivkey.as_deref()) {
		Some(name) => Ok(name),
		None => match connprivkey {
			None => Err(ScriptError::spec(event, "No current connection".to_owned())),
			Some(key) => Err(ScriptError::spec(event, format!("Unknown connection {}", key))),
		},
	}
}

/// Whether both feature bitfields offer every feature in `included` and neither offers any in
/// `excluded`. Used to enable a [`Sequence`] only for runs where a feature was negotiated.
pub fn negotiated(
	a_features: impl Into<Resolved<FieldValue>>, b_features: impl Into<Resolved<FieldValue>>,
	included: Vec<usize>, excluded: Vec<usize>,
) -> Resolved<bool> {
	let (a_features, b_features) = (a_features.into(), b_features.into());
	Resolved::deferred(move |runner, event, _| {
		let a = a_features.resolve(runner, event, "features")?;
		let b = b_features.resolve(runner, event, "features")?;
		let (a, b) = match (a.as_bytes(), b.as_bytes()) {
			(Ok(a), Ok(b)) => (a, b),
			(Err(e), _) | (_, Err(e)) => return Err(ScriptError::spec(event, e.to_string())),
		};
		Ok(features::negotiated(&a, &b, &included, &excluded))
	})
}

/// Whether the node under test supports `optname`.
pub fn has_option(optname: &str) -> Resolved<bool> {
	let optname = optname.to_owned();
	Resolved::deferred(move |runner, _, _| Ok(runner.has_option(&optname).is_some()))
}

/// Converts satoshis to millisatoshis.
pub fn msat(sats: impl Into<Resolved<u64>>) -> Resolved<u64> {
	match sats.into() {
		Resolved::Literal(sats) => Resolved::Literal(features::msat(sats)),
		Resolved::Deferred(f) => {
			Resolved::deferred(move |runner, event, field| f(runner, event, field).map(features::msat))
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::runner::dummy::DummyRunner;
	use crate::util::config::RunnerConfig;
	use crate::util::test_utils::TestLogger;
	use alloc::sync::Arc;

	#[test]
	fn labels_name_the_caller() {
		let label = EventLabel::new("Msg");
		assert_eq!(label.kind, "Msg");
		assert_eq!(label.file, "mod.rs");
		assert_eq!(label.to_string(), format!("Msg:mod.rs:{}", label.line));
	}

	#[test]
	fn deferred_values_resolve_at_execution() {
		let runner = DummyRunner::new(RunnerConfig::default(), Arc::new(TestLogger::new()));
		let label = EventLabel::new("CheckEq");
		let literal: Resolved<u64> = 7u64.into();
		assert_eq!(literal.resolve(&runner, &label, "a").unwrap(), 7);

		let deferred: Resolved<FieldValue> =
			Resolved::deferred(|runner, _, field| Ok(format!("{}@{}", field, runner.getblockheight()).into()));
		assert_eq!(deferred.resolve(&runner, &label, "b").unwrap(), FieldValue::Str("b@102".to_owned()));

		let widened: Resolved<FieldValue> = Resolved::<u64>::deferred(|_, _, _| Ok(3)).into();
		assert_eq!(widened.resolve(&runner, &label, "c").unwrap(), FieldValue::Int(3));
	}

	#[test]
	fn feature_helpers() {
		let runner = DummyRunner::new(RunnerConfig::default(), Arc::new(TestLogger::new()));
		let label = EventLabel::new("Sequence");
		// Bit 13 is the optional static_remotekey bit.
		let both = negotiated("2000", "1000", vec![12], vec![]);
		assert!(both.resolve(&runner, &label, "enable").unwrap());
		let one = negotiated("2000", "", vec![12], vec![]);
		assert!(!one.resolve(&runner, &label, "enable").unwrap());
		let excluded = negotiated("2000", "2000", vec![], vec![12]);
		assert!(!excluded.resolve(&runner, &label, "enable").unwrap());
		assert!(negotiated("zz", "", vec![], vec![]).resolve(&runner, &label, "enable").is_err());

		assert!(!has_option("option_static_remotekey").resolve(&runner, &label, "enable").unwrap());
		assert_eq!(msat(5u64).resolve(&runner, &label, "amount").unwrap(), 5000);
		let deferred = msat(Resolved::deferred(|runner, _, _| Ok(runner.getblockheight() as u64)));
		assert_eq!(deferred.resolve(&runner, &label, "amount").unwrap(), 102_000);
	}
}
