// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! A runner with no node behind it, for checking that scripts are well-formed.
//!
//! Every expectation is answered with a message built from the expectation itself, with any
//! fields it leaves open filled with placeholder values, so a script runs end to end without a
//! node. Checks which depend on what a real node would say pass unconditionally.

use bitcoin::hex::DisplayHex;
use bitcoin::secp256k1::PublicKey;

use core::str::FromStr;
use core::time::Duration;

use alloc::sync::Arc;

use crate::events::{EventLabel, ExpectMsg};
use crate::ln::keyset::KeySet;
use crate::ln::msgs::FieldValue;
use crate::ln::signature::Sig;
use crate::ln::wire::{FieldCount, FieldDef, FieldType, FundamentalType, Namespace};
use crate::prelude::*;
use crate::runner::task::PendingTask;
use crate::runner::{Conn, MustNot, Runner, RunnerCore};
use crate::util::config::RunnerConfig;
use crate::util::errors::ScriptError;
use crate::util::logger::Logger;
use crate::util::scid_utils::ShortChannelId;

/// The height a fresh regtest node sits at after mining the coins it funds channels with.
const INITIAL_BLOCKHEIGHT: u32 = 102;

/// The secp256k1 generator, used wherever a message needs some valid point.
const PLACEHOLDER_POINT: &str = "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";

/// A [`Runner`] which talks to no node.
pub struct DummyRunner {
	core: RunnerCore,
	blockheight: u32,
}

impl DummyRunner {
	/// Creates a dummy runner using the BOLT message definitions.
	pub fn new(config: RunnerConfig, logger: Arc<dyn Logger + Send + Sync>) -> Self {
		DummyRunner { core: RunnerCore::new(config, logger, Namespace::bolts()), blockheight: INITIAL_BLOCKHEIGHT }
	}

	fn placeholder(event: &EventLabel, def: &FieldDef) -> Result<FieldValue, ScriptError> {
		let fundamental = match def.fieldtype {
			FieldType::Fundamental(fundamental) => fundamental,
			_ => {
				return Err(ScriptError::spec(
					event,
					format!("Cannot make up a value for {} of type {:?}", def.name, def.fieldtype),
				))
			},
		};
		match def.count {
			FieldCount::Single => Self::placeholder_single(event, &def.name, fundamental),
			FieldCount::Ellipsis | FieldCount::LengthField(_) => Ok(match fundamental {
				FundamentalType::Byte => FieldValue::Bytes(Vec::new()),
				FundamentalType::Utf8 => FieldValue::Str(String::new()),
				_ => FieldValue::Array(Vec::new()),
			}),
			FieldCount::Fixed(n) => match fundamental {
				FundamentalType::Byte => Ok(FieldValue::Bytes(vec![0; n])),
				FundamentalType::Utf8 => Ok(FieldValue::Str("\0".repeat(n))),
				_ => (0..n)
					.map(|_| Self::placeholder_single(event, &def.name, fundamental))
					.collect::<Result<Vec<_>, _>>()
					.map(FieldValue::Array),
			},
		}
	}

	fn placeholder_single(
		event: &EventLabel, name: &str, fundamental: FundamentalType,
	) -> Result<FieldValue, ScriptError> {
		Ok(match fundamental {
			t if t.is_integer() => FieldValue::Int(0),
			FundamentalType::ChainHash | FundamentalType::ChannelId | FundamentalType::Sha256 => {
				FieldValue::Bytes(vec![0; 32])
			},
			FundamentalType::Point => FieldValue::Point(
				PublicKey::from_str(PLACEHOLDER_POINT).expect("The generator is a valid point"),
			),
			FundamentalType::Signature => FieldValue::Sig(Sig::raw([1; 64])),
			FundamentalType::ShortChannelId => {
				FieldValue::ShortChannelId(ShortChannelId { block: 0, tx_index: 0, vout: 0 })
			},
			_ => {
				return Err(ScriptError::spec(
					event,
					format!("Cannot make up a value for {} of type {:?}", name, fundamental),
				))
			},
		})
	}
}

impl Runner for DummyRunner {
	fn core(&self) -> &RunnerCore {
		&self.core
	}

	fn core_mut(&mut self) -> &mut RunnerCore {
		&mut self.core
	}

	fn is_dummy(&self) -> bool {
		true
	}

	fn start(&mut self) -> Result<(), ScriptError> {
		log_trace!(self.core.logger, "Starting dummy runner");
		self.blockheight = INITIAL_BLOCKHEIGHT;
		Ok(())
	}

	fn stop(&mut self) -> Result<(), ScriptError> {
		log_trace!(self.core.logger, "Stopping dummy runner");
		self.core.cancel_pending_task();
		Ok(())
	}

	fn restart(&mut self) -> Result<(), ScriptError> {
		log_trace!(self.core.logger, "Restarting dummy runner");
		self.core.reset();
		self.blockheight = INITIAL_BLOCKHEIGHT;
		Ok(())
	}

	fn connect(&mut self, event: &EventLabel, connprivkey: &str) -> Result<(), ScriptError> {
		let conn = Conn::new(connprivkey).map_err(|e| ScriptError::spec(event, e.to_string()))?;
		log_debug!(self.core.logger, "[CONNECT {}]", connprivkey);
		self.core.add_conn(conn);
		Ok(())
	}

	fn recv(&mut self, _event: &EventLabel, conn: &str, outbuf: &[u8]) -> Result<(), ScriptError> {
		log_debug!(self.core.logger, "[RECV {}] {}", conn, outbuf.as_hex());
		Ok(())
	}

	fn get_output_message(
		&mut self, conn: &str, event: &ExpectMsg, _timeout: Duration,
	) -> Result<Option<Vec<u8>>, ScriptError> {
		let mut msg = event.expected(self)?;
		let missing: Vec<FieldDef> = self
			.core
			.namespace
			.missing_fields(&msg)
			.map_err(|e| ScriptError::spec(&event.label, e.to_string()))?
			.into_iter()
			.cloned()
			.collect();
		for def in missing {
			let value = Self::placeholder(&event.label, &def)?;
			msg.fields.insert(def.name, value);
		}
		let binmsg =
			self.core.namespace.encode(&msg).map_err(|e| ScriptError::spec(&event.label, e.to_string()))?;
		log_debug!(self.core.logger, "[SEND {}] {}", conn, msg);
		Ok(Some(binmsg))
	}

	fn getblockheight(&self) -> u32 {
		self.blockheight
	}

	fn trim_blocks(&mut self, _event: &EventLabel, newheight: u32) -> Result<(), ScriptError> {
		log_debug!(self.core.logger, "[TRIMBLOCK TO HEIGHT {}]", newheight);
		self.blockheight = newheight;
		Ok(())
	}

	fn add_blocks(&mut self, _event: &EventLabel, txs: &[String], n: u32) -> Result<(), ScriptError> {
		log_debug!(self.core.logger, "[ADDBLOCKS {} WITH {} TXS]", n, txs.len());
		self.blockheight += n;
		Ok(())
	}

	fn expect_tx(&mut self, _event: &EventLabel, txid: &str) -> Result<(), ScriptError> {
		log_debug!(self.core.logger, "[EXPECT-TX {}]", txid);
		Ok(())
	}

	fn invoice(&mut self, _event: &EventLabel, amount: u64, preimage: &[u8; 32]) -> Result<(), ScriptError> {
		log_debug!(self.core.logger, "[INVOICE for {} with PREIMAGE {}]", amount, preimage.as_hex());
		Ok(())
	}

	fn fundchannel(
		&mut self, event: &EventLabel, conn: &str, amount: u64, feerate: u32, expect_fail: bool,
	) -> Result<(), ScriptError> {
		log_debug!(
			self.core.logger,
			"[FUNDCHANNEL TO {} for {} at feerate {}. Expect fail? {}]",
			conn,
			amount,
			feerate,
			expect_fail
		);
		self.core.start_task(event, PendingTask::spawn("fundchannel", |_| Ok(())))
	}

	fn addhtlc(&mut self, _event: &EventLabel, conn: &str, amount: u64, preimage: &[u8; 32]) -> Result<(), ScriptError> {
		log_debug!(self.core.logger, "[ADDHTLC TO {} for {} with PREIMAGE {}]", conn, amount, preimage.as_hex());
		Ok(())
	}

	fn get_keyset(&self) -> KeySet {
		KeySet::from_hex("11", "12", "13", "14", &"FF".repeat(32)).expect("Static keys are valid")
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

	fn check_error(&mut self, _event: &EventLabel, conn: &str) -> Result<Option<String>, ScriptError> {
		log_debug!(self.core.logger, "[CHECK-ERROR {}]", conn);
		Ok(Some("Dummy error".to_owned()))
	}

	fn check_final_error(
		&mut self, _event: &EventLabel, conn: &Conn, expected_error: bool, must_not: &[MustNot],
	) -> Result<(), ScriptError> {
		log_trace!(
			self.core.logger,
			"[CHECK-FINAL-ERROR {} expected {} with {} banned types]",
			conn.name,
			expected_error,
			must_not.len()
		);
		Ok(())
	}

	fn close_channel(&mut self, _event: &EventLabel, channel_id: &str) -> Result<bool, ScriptError> {
		log_debug!(self.core.logger, "[CLOSE-CHANNEL {}]", channel_id);
		Ok(true)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::util::test_utils::TestLogger;

	#[test]
	fn expectations_are_answered() {
		let logger = Arc::new(TestLogger::new());
		let mut runner = DummyRunner::new(RunnerConfig::default(), logger.clone());
		let expect = ExpectMsg::new("accept_channel").field("minimum_depth", 3u32);
		let binmsg = runner.get_output_message("02", &expect, Duration::from_secs(1)).unwrap().unwrap();
		let msg = runner.core().namespace.decode(&binmsg).unwrap();
		assert_eq!(msg.msgtype, "accept_channel");
		assert_eq!(msg.get("minimum_depth"), Some(&FieldValue::Int(3)));
		assert_eq!(msg.get("dust_limit_satoshis"), Some(&FieldValue::Int(0)));
		assert_eq!(msg.get("temporary_channel_id"), Some(&FieldValue::Bytes(vec![0; 32])));
		logger.assert_log_contains("lightning_conformance::runner::dummy", "[SEND 02] accept_channel{", 1);
	}

	#[test]
	fn chain_height_follows_blocks() {
		let mut runner = DummyRunner::new(RunnerConfig::default(), Arc::new(TestLogger::new()));
		let label = EventLabel::new("Block");
		assert_eq!(runner.getblockheight(), 102);
		runner.add_blocks(&label, &[], 6).unwrap();
		assert_eq!(runner.getblockheight(), 108);
		runner.trim_blocks(&label, 103).unwrap();
		assert_eq!(runner.getblockheight(), 103);
		runner.restart().unwrap();
		assert_eq!(runner.getblockheight(), 102);
	}

	#[test]
	fn keys_are_fixed() {
		let runner = DummyRunner::new(RunnerConfig::default(), Arc::new(TestLogger::new()));
		let keyset = runner.get_keyset();
		assert_eq!(keyset.revocation_base_secret.secret_bytes()[31], 0x11);
		assert_eq!(keyset.htlc_base_secret.secret_bytes()[31], 0x14);
		assert_eq!(keyset.shachain_seed, [0xff; 32]);
		assert_eq!(runner.get_node_privkey(), "01");
		assert!(runner.has_option("option_anchor_outputs").is_none());
	}
}
