// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! The per-run store of what a script has built, sent and received, and the resolvers which read
//! it back when later events execute.

use bitcoin::hex::DisplayHex;
use bitcoin::secp256k1::PublicKey;

use core::fmt;
use core::str::FromStr;

use crate::events::{EventLabel, Resolved};
use crate::ln::commitment::Commitment;
use crate::ln::funding::{ChannelUpdateFields, Funding};
use crate::ln::keyset::privkey_expand;
use crate::ln::msgs::{FieldMap, FieldValue, Message};
use crate::ln::Side;
use crate::prelude::*;
use crate::util::errors::ScriptError;
use crate::util::scid_utils::ShortChannelId;

/// Which message history a lookup reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum History {
	/// Messages the script sent with `Msg`.
	Sent,
	/// Messages the script matched with `ExpectMsg`.
	Rcvd,
}

impl fmt::Display for History {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			History::Sent => f.write_str("Msg"),
			History::Rcvd => f.write_str("ExpectMsg"),
		}
	}
}

/// Everything a run has recorded. Reset whenever the runner restarts.
#[derive(Default)]
pub struct Stash {
	funding: Option<Funding>,
	funding_tx: Option<String>,
	commitment: Option<Commitment>,
	sent: Vec<(String, FieldMap)>,
	rcvd: Vec<(String, FieldMap)>,
}

fn unknown(event: &EventLabel, name: &str) -> ScriptError {
	ScriptError::spec(event, format!("Unknown stash name {}", name))
}

impl Stash {
	/// Records the channel funding, replacing any earlier one.
	pub fn set_funding(&mut self, funding: Funding) {
		self.funding = Some(funding);
	}

	/// The funding recorded by `AcceptFunding` or `CreateFunding`.
	pub fn funding(&self, event: &EventLabel) -> Result<&Funding, ScriptError> {
		self.funding.as_ref().ok_or_else(|| unknown(event, "Funding"))
	}

	/// Records the hex of the funding transaction built by `CreateFunding`.
	pub fn set_funding_tx(&mut self, tx_hex: String) {
		self.funding_tx = Some(tx_hex);
	}

	/// The funding transaction hex.
	pub fn funding_tx(&self, event: &EventLabel) -> Result<&str, ScriptError> {
		self.funding_tx.as_deref().ok_or_else(|| unknown(event, "FundingTx"))
	}

	/// Records the commitment state built by `Commit`.
	pub fn set_commitment(&mut self, commitment: Commitment) {
		self.commitment = Some(commitment);
	}

	/// The commitment state.
	pub fn commitment(&self, event: &EventLabel) -> Result<&Commitment, ScriptError> {
		self.commitment.as_ref().ok_or_else(|| unknown(event, "Commit"))
	}

	/// The commitment state, for `UpdateCommit` to modify.
	pub fn commitment_mut(&mut self, event: &EventLabel) -> Result<&mut Commitment, ScriptError> {
		self.commitment.as_mut().ok_or_else(|| unknown(event, "Commit"))
	}

	/// Appends a message the script sent.
	pub fn push_sent(&mut self, msg: Message) {
		self.sent.push((msg.msgtype, msg.fields));
	}

	/// Appends a message the script matched.
	pub fn push_rcvd(&mut self, msg: Message) {
		self.rcvd.push((msg.msgtype, msg.fields));
	}

	/// The messages in `history`, oldest first.
	pub fn history(&self, history: History) -> &[(String, FieldMap)] {
		match history {
			History::Sent => &self.sent,
			History::Rcvd => &self.rcvd,
		}
	}

	/// Looks up `var` in `history`, most recent message first if `last`. `var` is either
	/// `msgtype.field`, which only considers messages of that type, or a bare `field`, which
	/// reads the latest message of any type. The message found must have the field.
	pub fn get_member(
		&self, event: &EventLabel, history: History, var: &str, last: bool,
	) -> Result<&FieldValue, ScriptError> {
		let (prevname, var) = match var.split_once('.') {
			Some((prevname, var)) => (prevname, var),
			None => ("", var),
		};
		let entries = self.history(history);
		let wanted = |entry: &&(String, FieldMap)| prevname.is_empty() || entry.0 == prevname;
		let found = if last { entries.iter().rev().find(wanted) } else { entries.iter().find(wanted) };
		match found {
			Some((name, fields)) => fields.get(var).ok_or_else(|| {
				ScriptError::spec(event, format!("{}: {} did not receive a {}", history, name, var))
			}),
			None if prevname.is_empty() => Err(ScriptError::spec(event, format!("{}: have no prior message", history))),
			None => Err(ScriptError::spec(event, format!("{}: have no prior {}", history, prevname))),
		}
	}
}

fn member(history: History, fieldname: Option<&str>) -> Resolved<FieldValue> {
	let fieldname = fieldname.map(|s| s.to_owned());
	Resolved::deferred(move |runner, event, field| {
		let var = fieldname.as_deref().unwrap_or(field);
		runner.core().stash.get_member(event, history, var, true).cloned()
	})
}

fn member_as<T: FromStr + 'static>(history: History, fieldname: Option<&str>) -> Resolved<T> {
	let fieldname = fieldname.map(|s| s.to_owned());
	Resolved::deferred(move |runner, event, field| {
		let var = fieldname.as_deref().unwrap_or(field);
		let strval = runner.core().stash.get_member(event, history, var, true)?.to_string();
		strval.parse::<T>().map_err(|_| {
			ScriptError::spec(
				event,
				format!("{}.{} is {}, not a valid {}", history, var, strval, core::any::type_name::<T>()),
			)
		})
	})
}

/// The value of a field of the latest matched message. `fieldname` is `msgtype.field` or
/// `field`; `None` reads the field of the same name as the one being filled in.
pub fn rcvd(fieldname: Option<&str>) -> Resolved<FieldValue> {
	member(History::Rcvd, fieldname)
}

/// Like [`rcvd`], for messages the script sent.
pub fn sent(fieldname: Option<&str>) -> Resolved<FieldValue> {
	member(History::Sent, fieldname)
}

/// Like [`rcvd`], parsing the field's canonical text as a `T`.
pub fn rcvd_as<T: FromStr + 'static>(fieldname: Option<&str>) -> Resolved<T> {
	member_as(History::Rcvd, fieldname)
}

/// Like [`sent`], parsing the field's canonical text as a `T`.
pub fn sent_as<T: FromStr + 'static>(fieldname: Option<&str>) -> Resolved<T> {
	member_as(History::Sent, fieldname)
}

/// Our signature of the node's current commitment transaction.
pub fn commitsig_to_send() -> Resolved<FieldValue> {
	Resolved::deferred(|runner, event, _| {
		let commit = runner.core().stash.commitment(event)?;
		Ok(FieldValue::Sig(commit.local_sig(&commit.remote_unsigned_tx())))
	})
}

/// The signature the node should send of our current commitment transaction.
pub fn commitsig_to_recv() -> Resolved<FieldValue> {
	Resolved::deferred(|runner, event, _| {
		let commit = runner.core().stash.commitment(event)?;
		Ok(FieldValue::Sig(commit.remote_sig(&commit.local_unsigned_tx())))
	})
}

fn htlc_sigs(signer: Side) -> Resolved<FieldValue> {
	Resolved::deferred(move |runner, event, _| {
		let commit = runner.core().stash.commitment(event)?;
		Ok(FieldValue::Array(commit.htlc_sigs(signer, !signer).into_iter().map(FieldValue::Sig).collect()))
	})
}

/// Our HTLC signatures for the node's commitment transaction, in output order.
pub fn htlc_sigs_to_send() -> Resolved<FieldValue> {
	htlc_sigs(Side::Local)
}

/// The HTLC signatures the node should send for our commitment transaction.
pub fn htlc_sigs_to_recv() -> Resolved<FieldValue> {
	htlc_sigs(Side::Remote)
}

/// The channel id derived from the commitment's funding outpoint.
pub fn channel_id() -> Resolved<FieldValue> {
	Resolved::deferred(|runner, event, _| {
		Ok(FieldValue::Bytes(runner.core().stash.commitment(event)?.funding.channel_id().to_vec()))
	})
}

/// The channel id of a channel opened with the v2 protocol.
pub fn channel_id_v2() -> Resolved<FieldValue> {
	Resolved::deferred(|runner, event, _| {
		Ok(FieldValue::Bytes(runner.core().stash.commitment(event)?.channel_id_v2().to_vec()))
	})
}

/// A signed `channel_announcement` for the committed channel.
pub fn channel_announcement(short_channel_id: ShortChannelId, features: Vec<u8>) -> Resolved<Message> {
	Resolved::deferred(move |runner, event, _| {
		let core = runner.core();
		core.stash
			.commitment(event)?
			.funding
			.channel_announcement(&core.namespace, short_channel_id, features.clone())
			.map_err(|e| ScriptError::spec(event, e.to_string()))
	})
}

/// A signed `channel_update` for the committed channel.
pub fn channel_update(fields: ChannelUpdateFields) -> Resolved<Message> {
	Resolved::deferred(move |runner, event, _| {
		let core = runner.core();
		core.stash
			.commitment(event)?
			.funding
			.channel_update(&core.namespace, &fields)
			.map_err(|e| ScriptError::spec(event, e.to_string()))
	})
}

/// The funding amount, in satoshis.
pub fn funding_amount() -> Resolved<u64> {
	Resolved::deferred(|runner, event, _| Ok(runner.core().stash.funding(event)?.amount))
}

/// `side`'s funding pubkey.
pub fn funding_pubkey(side: Side) -> Resolved<PublicKey> {
	Resolved::deferred(move |runner, event, _| Ok(runner.core().stash.funding(event)?.funding_pubkey(side)))
}

/// The hex of the funding transaction built by `CreateFunding`.
pub fn funding_tx() -> Resolved<String> {
	Resolved::deferred(|runner, event, _| Ok(runner.core().stash.funding_tx(event)?.to_owned()))
}

/// The funding txid as hex in wire order, as `funding_created` carries it.
pub fn funding_txid() -> Resolved<String> {
	Resolved::deferred(|runner, event, _| Ok(runner.core().stash.funding(event)?.txid_bytes().to_lower_hex_string()))
}

/// The funding itself.
pub fn funding() -> Resolved<Funding> {
	Resolved::deferred(|runner, event, _| Ok(runner.core().stash.funding(event)?.clone()))
}

/// The P2WSH scriptPubKey of the funding output.
pub fn locking_script() -> Resolved<Vec<u8>> {
	Resolved::deferred(|runner, event, _| {
		Ok(runner.core().stash.funding(event)?.locking_script().into_bytes())
	})
}

/// A mutual close of the funding output paying `fee`, the rest going to P2WPKH of
/// `dest_privkey`.
pub fn funding_close_tx(fee: u64, dest_privkey: &str) -> Resolved<String> {
	let dest_privkey = dest_privkey.to_owned();
	Resolved::deferred(move |runner, event, _| {
		let dest = privkey_expand(&dest_privkey).map_err(|e| ScriptError::spec(event, e.to_string()))?;
		runner.core().stash.funding(event)?.close_tx(fee, &dest).map_err(|e| ScriptError::spec(event, e.to_string()))
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::ln::funding::FundingKeys;
	use crate::runner::dummy::DummyRunner;
	use crate::runner::Runner;
	use crate::util::config::RunnerConfig;
	use crate::util::errors::{ScriptError, SpecFileError};
	use crate::util::test_utils::TestLogger;

	use alloc::sync::Arc;
	use bitcoin::hashes::Hash;
	use bitcoin::Txid;

	fn runner() -> DummyRunner {
		DummyRunner::new(RunnerConfig::default(), Arc::new(TestLogger::new()))
	}

	fn label() -> EventLabel {
		EventLabel::new("Msg")
	}

	#[test]
	fn lookups_are_most_recent_first() {
		let mut runner = runner();
		let stash = &mut runner.core_mut().stash;
		stash.push_rcvd(Message::new("init").with("features", vec![0x01u8]));
		stash.push_rcvd(Message::new("ping").with("num_pong_bytes", 1u16));
		stash.push_rcvd(Message::new("init").with("features", vec![0x02u8]));

		let label = label();
		assert_eq!(stash.get_member(&label, History::Rcvd, "init.features", true).unwrap(), &FieldValue::Bytes(vec![2]));
		assert_eq!(stash.get_member(&label, History::Rcvd, "init.features", false).unwrap(), &FieldValue::Bytes(vec![1]));
		// A bare field reads the latest message, which must have it.
		assert_eq!(stash.get_member(&label, History::Rcvd, "features", true).unwrap(), &FieldValue::Bytes(vec![2]));
		match stash.get_member(&label, History::Rcvd, "num_pong_bytes", true) {
			Err(ScriptError::SpecFile(SpecFileError { message, .. })) => {
				assert_eq!(message, "ExpectMsg: init did not receive a num_pong_bytes")
			},
			_ => panic!(),
		}
		match stash.get_member(&label, History::Sent, "init.features", true) {
			Err(ScriptError::SpecFile(SpecFileError { message, .. })) => assert_eq!(message, "Msg: have no prior init"),
			_ => panic!(),
		}
	}

	#[test]
	fn field_resolvers() {
		let mut runner = runner();
		runner.core_mut().stash.push_sent(Message::new("open_channel").with("funding_satoshis", 100000u64));
		let label = label();

		let same_name = sent(None);
		assert_eq!(same_name.resolve(&runner, &label, "funding_satoshis").unwrap(), FieldValue::Int(100000));
		let typed = sent_as::<u64>(Some("open_channel.funding_satoshis"));
		assert_eq!(typed.resolve(&runner, &label, "amount").unwrap(), 100000);
		let bad_cast = sent_as::<bool>(Some("funding_satoshis"));
		assert!(matches!(bad_cast.resolve(&runner, &label, "x"), Err(ScriptError::SpecFile(_))));
		assert!(matches!(rcvd(None).resolve(&runner, &label, "x"), Err(ScriptError::SpecFile(_))));
	}

	#[test]
	fn funding_resolvers_need_a_funding() {
		let mut runner = runner();
		let label = label();
		match funding_amount().resolve(&runner, &label, "funding_satoshis") {
			Err(ScriptError::SpecFile(err)) => assert_eq!(err.message, "Unknown stash name Funding"),
			_ => panic!(),
		}
		assert!(commitsig_to_send().resolve(&runner, &label, "signature").is_err());

		let keys = FundingKeys {
			local_node_privkey: privkey_expand("02").unwrap(),
			local_funding_privkey: privkey_expand("10").unwrap(),
			remote_node_privkey: privkey_expand("01").unwrap(),
			remote_funding_privkey: privkey_expand("20").unwrap(),
		};
		let mut wire = [0u8; 32];
		wire[0] = 0xaa;
		let txid = Txid::from_byte_array(wire);
		runner.core_mut().stash.set_funding(Funding::new(txid, 1, 999877, keys));
		assert_eq!(funding_amount().resolve(&runner, &label, "").unwrap(), 999877);
		assert_eq!(funding_txid().resolve(&runner, &label, "").unwrap(), format!("aa{}", "00".repeat(31)));
		assert_eq!(locking_script().resolve(&runner, &label, "").unwrap().len(), 34);
		assert!(funding_tx().resolve(&runner, &label, "").is_err());
		let close = funding_close_tx(1000, "99").resolve(&runner, &label, "").unwrap();
		assert!(close.starts_with("02000000"));
	}
}
