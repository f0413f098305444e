// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Events which act on the chain and the node's RPC interface rather than a peer connection.

use bitcoin::hex::FromHex;

use core::time::Duration;

use crate::events::{find_conn, EventLabel, Resolved};
use crate::ln::msgs::FieldValue;
use crate::prelude::*;
use crate::runner::Runner;
use crate::util::errors::ScriptError;
use crate::util::logger::{Logger, WithEvent};

fn check_preimage(event: &EventLabel, preimage: &str) -> Result<[u8; 32], ScriptError> {
	<[u8; 32]>::from_hex(preimage).map_err(|_| {
		ScriptError::spec(event, format!("Expected 64 hex characters, got {}", preimage))
	})
}

/// Mines blocks so the chain tip is at `blockheight + number - 1`, first reorganizing away
/// anything at or above `blockheight`.
pub struct Block {
	pub(crate) label: EventLabel,
	pub(crate) done: bool,
	blockheight: Resolved<u32>,
	number: Resolved<u32>,
	txs: Vec<Resolved<String>>,
}

impl Block {
	/// Mines one block at `blockheight`.
	#[track_caller]
	pub fn new(blockheight: impl Into<Resolved<u32>>) -> Self {
		Block {
			label: EventLabel::new("Block"),
			done: false,
			blockheight: blockheight.into(),
			number: Resolved::Literal(1),
			txs: Vec::new(),
		}
	}

	/// Mines `number` blocks instead.
	pub fn number(mut self, number: impl Into<Resolved<u32>>) -> Self {
		self.number = number.into();
		self
	}

	/// Includes the hex transaction `tx` in the first block.
	pub fn tx(mut self, tx: impl Into<Resolved<String>>) -> Self {
		self.txs.push(tx.into());
		self
	}

	/// Executes the event.
	pub fn action(&mut self, runner: &mut dyn Runner) -> Result<(), ScriptError> {
		let blockheight = self.blockheight.resolve(&*runner, &self.label, "blockheight")?;
		let height = runner.getblockheight();
		if height + 1 < blockheight {
			return Err(ScriptError::spec(
				&self.label,
				format!("Cannot generate block #{} at height {}", blockheight, height),
			));
		}
		// Throw away blocks we're replacing.
		if height >= blockheight {
			runner.trim_blocks(&self.label, blockheight.saturating_sub(1))?;
		}
		let number = self.number.resolve(&*runner, &self.label, "number")?;
		let txs = self.txs.iter().map(|tx| tx.resolve(&*runner, &self.label, "tx")).collect::<Result<Vec<_>, _>>()?;
		runner.add_blocks(&self.label, &txs, number)?;
		let expected = blockheight.saturating_sub(1) + number;
		if runner.getblockheight() != expected {
			return Err(ScriptError::event(
				&self.label,
				format!("Expected height {} after mining, got {}", expected, runner.getblockheight()),
			));
		}
		Ok(())
	}
}

/// Waits for the node to broadcast a transaction.
pub struct ExpectTx {
	pub(crate) label: EventLabel,
	pub(crate) done: bool,
	txid: Resolved<String>,
}

impl ExpectTx {
	/// Expects the transaction with id `txid`.
	#[track_caller]
	pub fn new(txid: impl Into<Resolved<String>>) -> Self {
		ExpectTx { label: EventLabel::new("ExpectTx"), done: false, txid: txid.into() }
	}

	/// Executes the event.
	pub fn action(&mut self, runner: &mut dyn Runner) -> Result<(), ScriptError> {
		let txid = self.txid.resolve(&*runner, &self.label, "txid")?;
		runner.expect_tx(&self.label, &txid)
	}
}

/// Asks the node to open a channel to us. The open completes in the background while the script
/// exchanges the funding messages.
pub struct FundChannel {
	pub(crate) label: EventLabel,
	pub(crate) done: bool,
	amount: Resolved<u64>,
	feerate: Resolved<u32>,
	expect_fail: Resolved<bool>,
	connprivkey: Option<String>,
}

impl FundChannel {
	/// Opens a channel of `amount` satoshis over the last connection used, at 253 sat/kw.
	#[track_caller]
	pub fn new(amount: impl Into<Resolved<u64>>) -> Self {
		FundChannel {
			label: EventLabel::new("FundChannel"),
			done: false,
			amount: amount.into(),
			feerate: Resolved::Literal(253),
			expect_fail: Resolved::Literal(false),
			connprivkey: None,
		}
	}

	/// Sets the funding feerate, in sat/kw.
	pub fn feerate(mut self, feerate: impl Into<Resolved<u32>>) -> Self {
		self.feerate = feerate.into();
		self
	}

	/// Whether the open is expected to fail.
	pub fn expect_fail(mut self, expect_fail: impl Into<Resolved<bool>>) -> Self {
		self.expect_fail = expect_fail.into();
		self
	}

	/// Opens over connection `connprivkey` instead.
	pub fn conn(mut self, connprivkey: &str) -> Self {
		self.connprivkey = Some(connprivkey.to_owned());
		self
	}

	/// Executes the event.
	pub fn action(&mut self, runner: &mut dyn Runner) -> Result<(), ScriptError> {
		if runner.core().pending_task_outstanding() {
			return Err(ScriptError::spec(&self.label, "A fundchannel is already pending".to_owned()));
		}
		let conn = find_conn(runner, &self.label, &self.connprivkey)?;
		let amount = self.amount.resolve(&*runner, &self.label, "amount")?;
		let feerate = self.feerate.resolve(&*runner, &self.label, "feerate")?;
		let expect_fail = self.expect_fail.resolve(&*runner, &self.label, "expect_fail")?;
		runner.fundchannel(&self.label, &conn, amount, feerate, expect_fail)
	}
}

/// Has the node create an invoice we can pay.
pub struct Invoice {
	pub(crate) label: EventLabel,
	pub(crate) done: bool,
	amount: u64,
	preimage: Resolved<String>,
}

impl Invoice {
	/// An invoice for `amount` msat, paid by revealing the 64-hex-character `preimage`.
	#[track_caller]
	pub fn new(amount: u64, preimage: impl Into<Resolved<String>>) -> Self {
		Invoice { label: EventLabel::new("Invoice"), done: false, amount, preimage: preimage.into() }
	}

	/// Executes the event.
	pub fn action(&mut self, runner: &mut dyn Runner) -> Result<(), ScriptError> {
		let preimage = self.preimage.resolve(&*runner, &self.label, "preimage")?;
		let preimage = check_preimage(&self.label, &preimage)?;
		runner.invoice(&self.label, self.amount, &preimage)
	}
}

/// Has the node offer us an HTLC.
pub struct AddHtlc {
	pub(crate) label: EventLabel,
	pub(crate) done: bool,
	amount: u64,
	preimage: Resolved<String>,
	connprivkey: Option<String>,
}

impl AddHtlc {
	/// An HTLC of `amount` msat, over the last connection used, paying to the hash of the
	/// 64-hex-character `preimage`.
	#[track_caller]
	pub fn new(amount: u64, preimage: impl Into<Resolved<String>>) -> Self {
		AddHtlc { label: EventLabel::new("AddHtlc"), done: false, amount, preimage: preimage.into(), connprivkey: None }
	}

	/// Offers it over connection `connprivkey` instead.
	pub fn conn(mut self, connprivkey: &str) -> Self {
		self.connprivkey = Some(connprivkey.to_owned());
		self
	}

	/// Executes the event.
	pub fn action(&mut self, runner: &mut dyn Runner) -> Result<(), ScriptError> {
		let conn = find_conn(runner, &self.label, &self.connprivkey)?;
		let preimage = self.preimage.resolve(&*runner, &self.label, "preimage")?;
		let preimage = check_preimage(&self.label, &preimage)?;
		runner.addhtlc(&self.label, &conn, self.amount, &preimage)
	}
}

/// Checks two values are equal, by their canonical text.
pub struct CheckEq {
	pub(crate) label: EventLabel,
	pub(crate) done: bool,
	a: Resolved<FieldValue>,
	b: Resolved<FieldValue>,
}

impl CheckEq {
	/// Checks `a` equals `b`.
	#[track_caller]
	pub fn new(a: impl Into<Resolved<FieldValue>>, b: impl Into<Resolved<FieldValue>>) -> Self {
		CheckEq { label: EventLabel::new("CheckEq"), done: false, a: a.into(), b: b.into() }
	}

	/// Executes the event.
	pub fn action(&mut self, runner: &mut dyn Runner) -> Result<(), ScriptError> {
		let a = self.a.resolve(&*runner, &self.label, "a")?.to_string();
		let b = self.b.resolve(&*runner, &self.label, "b")?.to_string();
		// The dummy runner makes up the values it sends.
		if a != b && !runner.is_dummy() {
			return Err(ScriptError::event(&self.label, format!("{} != {}", a, b)));
		}
		Ok(())
	}
}

/// Pauses the script, giving the node time to act.
pub struct Wait {
	pub(crate) label: EventLabel,
	pub(crate) done: bool,
	delay: Duration,
}

impl Wait {
	/// Waits for `delay`.
	#[track_caller]
	pub fn new(delay: Duration) -> Self {
		Wait { label: EventLabel::new("Wait"), done: false, delay }
	}

	/// Executes the event.
	pub fn action(&mut self, _runner: &mut dyn Runner) -> Result<(), ScriptError> {
		std::thread::sleep(self.delay);
		Ok(())
	}
}

/// Has the node cooperatively close a channel.
pub struct CloseChannel {
	pub(crate) label: EventLabel,
	pub(crate) done: bool,
	channel_id: Resolved<FieldValue>,
}

impl CloseChannel {
	/// Closes the channel with id `channel_id`.
	#[track_caller]
	pub fn new(channel_id: impl Into<Resolved<FieldValue>>) -> Self {
		CloseChannel { label: EventLabel::new("CloseChannel"), done: false, channel_id: channel_id.into() }
	}

	/// Executes the event.
	pub fn action(&mut self, runner: &mut dyn Runner) -> Result<(), ScriptError> {
		let channel_id = self.channel_id.resolve(&*runner, &self.label, "channel_id")?.to_string();
		log_debug!(WithEvent::from(&*runner.core().logger, &self.label), "Closing channel {}", channel_id);
		if !runner.close_channel(&self.label, &channel_id)? {
			return Err(ScriptError::event(&self.label, format!("Node refused to close channel {}", channel_id)));
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::events::Connect;
	use crate::runner::dummy::DummyRunner;
	use crate::util::config::RunnerConfig;
	use crate::util::test_utils::{TestLogger, TestRunner};

	use alloc::sync::Arc;

	const PREIMAGE: &str = "0000000000000000000000000000000000000000000000000000000000000001";

	#[test]
	fn blocks_extend_or_replace_the_tip() {
		let mut runner = TestRunner::new();
		Block::new(103u32).number(3u32).tx("0200").action(&mut runner).unwrap();
		assert_eq!(runner.blockheight, 105);
		assert_eq!(runner.mined, vec!["0200".to_owned()]);
		// Mining at 104 again replaces blocks 104 and 105.
		Block::new(104u32).action(&mut runner).unwrap();
		assert_eq!(runner.blockheight, 104);
		match Block::new(110u32).action(&mut runner) {
			Err(ScriptError::SpecFile(err)) => assert_eq!(err.message, "Cannot generate block #110 at height 104"),
			res => panic!("{:?}", res),
		}
		let deferred = Resolved::deferred(|runner, _, _| Ok(runner.getblockheight() + 1));
		Block::new(deferred).action(&mut runner).unwrap();
		assert_eq!(runner.blockheight, 105);
	}

	#[test]
	fn preimages_must_be_32_bytes() {
		let mut runner = TestRunner::new();
		Connect::new("02").action(&mut runner).unwrap();
		Invoice::new(1000, PREIMAGE).action(&mut runner).unwrap();
		AddHtlc::new(2000, PREIMAGE).action(&mut runner).unwrap();
		assert_eq!(runner.invoices[0].1[31], 1);
		assert_eq!(runner.htlcs[0].0, "02");
		assert!(matches!(Invoice::new(1000, "01").action(&mut runner), Err(ScriptError::SpecFile(_))));
	}

	#[test]
	fn fundchannel_is_one_at_a_time() {
		let mut runner = TestRunner::new();
		Connect::new("02").action(&mut runner).unwrap();
		FundChannel::new(100000u64).feerate(1000u32).action(&mut runner).unwrap();
		assert_eq!(runner.fundings, vec![("02".to_owned(), 100000, 1000, false)]);
		// The task has finished or been collected by the time the second one starts.
		runner.core_mut().finish_pending_task(&EventLabel::new("FundChannel")).unwrap();
		FundChannel::new(5u64).expect_fail(true).action(&mut runner).unwrap();
	}

	#[test]
	fn check_eq_compares_text() {
		let mut runner = TestRunner::new();
		CheckEq::new(5u64, "5").action(&mut runner).unwrap();
		match CheckEq::new(5u64, 6u32).action(&mut runner) {
			Err(ScriptError::Event(err)) => assert_eq!(err.message, "5 != 6"),
			res => panic!("{:?}", res),
		}
		let mut dummy = DummyRunner::new(RunnerConfig::default(), Arc::new(TestLogger::new()));
		CheckEq::new(5u64, 6u32).action(&mut dummy).unwrap();
	}

	#[test]
	fn close_and_wait() {
		let mut runner = TestRunner::new();
		CloseChannel::new(vec![1u8, 2]).action(&mut runner).unwrap();
		assert_eq!(runner.closes, vec!["0102".to_owned()]);
		Wait::new(Duration::from_millis(1)).action(&mut runner).unwrap();
		ExpectTx::new("00".repeat(32)).action(&mut runner).unwrap();
	}
}
