// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Events which build the channel state later messages are signed against. They exchange nothing
//! with the node, they only fill the stash.

use bitcoin::hashes::Hash;
use bitcoin::hex::FromHex;
use bitcoin::secp256k1::SecretKey;
use bitcoin::Txid;

use crate::events::{EventLabel, Resolved};
use crate::ln::commitment::{Commitment, CommitmentSide, HTLC};
use crate::ln::features::{self, ANCHORS_ZERO_FEE_HTLC_TX, ANCHOR_OUTPUTS, STATIC_REMOTEKEY};
use crate::ln::funding::{Funding, FundingKeys};
use crate::ln::keyset::{privkey_expand, KeySet};
use crate::ln::msgs::FieldValue;
use crate::ln::Side;
use crate::prelude::*;
use crate::runner::Runner;
use crate::util::errors::ScriptError;
use crate::util::logger::{Logger, WithEvent};

/// Parses a txid given as hex in the byte order messages carry it, not the reversed order block
/// explorers display.
fn wire_txid(event: &EventLabel, hex: &str) -> Result<Txid, ScriptError> {
	<[u8; 32]>::from_hex(hex)
		.map(Txid::from_byte_array)
		.map_err(|_| ScriptError::spec(event, format!("{} is not a txid", hex)))
}

/// The four private keys of a [`Funding`], each resolved to hex and zero-padded.
struct FundingKeyArgs {
	local_node_privkey: Resolved<String>,
	local_funding_privkey: Resolved<String>,
	remote_node_privkey: Resolved<String>,
	remote_funding_privkey: Resolved<String>,
}

impl FundingKeyArgs {
	fn resolve(&self, runner: &dyn Runner, event: &EventLabel) -> Result<FundingKeys, ScriptError> {
		let key = |arg: &Resolved<String>, field: &str| -> Result<SecretKey, ScriptError> {
			let hex = arg.resolve(runner, event, field)?;
			privkey_expand(&hex).map_err(|e| ScriptError::spec(event, format!("{}: {}", field, e)))
		};
		Ok(FundingKeys {
			local_node_privkey: key(&self.local_node_privkey, "local_node_privkey")?,
			local_funding_privkey: key(&self.local_funding_privkey, "local_funding_privkey")?,
			remote_node_privkey: key(&self.remote_node_privkey, "remote_node_privkey")?,
			remote_funding_privkey: key(&self.remote_funding_privkey, "remote_funding_privkey")?,
		})
	}
}

/// Records the funding of a channel the node opened: its outpoint, amount and keys. Stashes the
/// [`Funding`].
pub struct AcceptFunding {
	pub(crate) label: EventLabel,
	pub(crate) done: bool,
	funding_txid: Resolved<String>,
	funding_output_index: Resolved<u64>,
	funding_amount: Resolved<u64>,
	keys: FundingKeyArgs,
	chain_hash: Option<[u8; 32]>,
}

impl AcceptFunding {
	/// Describes the funding output `funding_txid:funding_output_index` of `funding_amount`
	/// satoshis. The txid is hex in wire order, as `funding_created` carries it.
	#[track_caller]
	pub fn new(
		funding_txid: impl Into<Resolved<String>>, funding_output_index: impl Into<Resolved<u64>>,
		funding_amount: impl Into<Resolved<u64>>, local_node_privkey: impl Into<Resolved<String>>,
		local_funding_privkey: impl Into<Resolved<String>>, remote_node_privkey: impl Into<Resolved<String>>,
		remote_funding_privkey: impl Into<Resolved<String>>,
	) -> Self {
		AcceptFunding {
			label: EventLabel::new("AcceptFunding"),
			done: false,
			funding_txid: funding_txid.into(),
			funding_output_index: funding_output_index.into(),
			funding_amount: funding_amount.into(),
			keys: FundingKeyArgs {
				local_node_privkey: local_node_privkey.into(),
				local_funding_privkey: local_funding_privkey.into(),
				remote_node_privkey: remote_node_privkey.into(),
				remote_funding_privkey: remote_funding_privkey.into(),
			},
			chain_hash: None,
		}
	}

	/// Puts the channel on another chain than regtest.
	pub fn chain_hash(mut self, chain_hash: [u8; 32]) -> Self {
		self.chain_hash = Some(chain_hash);
		self
	}

	/// Executes the event.
	pub fn action(&mut self, runner: &mut dyn Runner) -> Result<(), ScriptError> {
		let funding = {
			let runner = &*runner;
			let txid = self.funding_txid.resolve(runner, &self.label, "funding_txid")?;
			let txid = wire_txid(&self.label, &txid)?;
			let index = self.funding_output_index.resolve(runner, &self.label, "funding_output_index")?;
			let index = u16::try_from(index).map_err(|_| {
				ScriptError::spec(&self.label, format!("Output index {} does not fit a u16", index))
			})?;
			let amount = self.funding_amount.resolve(runner, &self.label, "funding_amount")?;
			let keys = self.keys.resolve(runner, &self.label)?;
			Funding::new(txid, index, amount, keys)
		};
		let funding = match self.chain_hash {
			Some(chain_hash) => funding.with_chain_hash(chain_hash),
			None => funding,
		};
		runner.core_mut().stash.set_funding(funding);
		Ok(())
	}
}

/// Builds and signs a funding transaction spending a P2WPKH output we control. Stashes the
/// [`Funding`] and the transaction hex.
pub struct CreateFunding {
	pub(crate) label: EventLabel,
	pub(crate) done: bool,
	txid_in: String,
	tx_index_in: u32,
	sats_in: u64,
	spending_privkey: String,
	fee: u64,
	keys: FundingKeyArgs,
	chain_hash: Option<[u8; 32]>,
}

impl CreateFunding {
	/// Spends `txid_in:tx_index_in` (txid hex in wire order), worth `sats_in` and locked to
	/// `spending_privkey`, into a funding output paying `fee`.
	#[track_caller]
	pub fn new(
		txid_in: &str, tx_index_in: u32, sats_in: u64, spending_privkey: &str, fee: u64,
		local_node_privkey: impl Into<Resolved<String>>, local_funding_privkey: impl Into<Resolved<String>>,
		remote_node_privkey: impl Into<Resolved<String>>, remote_funding_privkey: impl Into<Resolved<String>>,
	) -> Self {
		CreateFunding {
			label: EventLabel::new("CreateFunding"),
			done: false,
			txid_in: txid_in.to_owned(),
			tx_index_in,
			sats_in,
			spending_privkey: spending_privkey.to_owned(),
			fee,
			keys: FundingKeyArgs {
				local_node_privkey: local_node_privkey.into(),
				local_funding_privkey: local_funding_privkey.into(),
				remote_node_privkey: remote_node_privkey.into(),
				remote_funding_privkey: remote_funding_privkey.into(),
			},
			chain_hash: None,
		}
	}

	/// Puts the channel on another chain than regtest.
	pub fn chain_hash(mut self, chain_hash: [u8; 32]) -> Self {
		self.chain_hash = Some(chain_hash);
		self
	}

	/// Executes the event.
	pub fn action(&mut self, runner: &mut dyn Runner) -> Result<(), ScriptError> {
		let txid_in = wire_txid(&self.label, &self.txid_in)?;
		let spending_privkey =
			privkey_expand(&self.spending_privkey).map_err(|e| ScriptError::spec(&self.label, e.to_string()))?;
		let keys = self.keys.resolve(&*runner, &self.label)?;
		let (funding, tx_hex) =
			Funding::from_utxo(txid_in, self.tx_index_in, self.sats_in, &spending_privkey, self.fee, keys)
				.map_err(|e| ScriptError::spec(&self.label, e.to_string()))?;
		let funding = match self.chain_hash {
			Some(chain_hash) => funding.with_chain_hash(chain_hash),
			None => funding,
		};
		let stash = &mut runner.core_mut().stash;
		stash.set_funding(funding);
		stash.set_funding_tx(tx_hex);
		Ok(())
	}
}

/// Builds the commitment state of a freshly-funded channel. The node's keys come from the
/// runner. Stashes the [`Commitment`].
///
/// Note that `local_to_self_delay` is chosen by the node and `remote_to_self_delay` by us.
pub struct Commit {
	pub(crate) label: EventLabel,
	pub(crate) done: bool,
	opener: Side,
	local_keyset: KeySet,
	funding: Resolved<Funding>,
	local_to_self_delay: Resolved<u64>,
	remote_to_self_delay: Resolved<u64>,
	local_amount: Resolved<u64>,
	remote_amount: Resolved<u64>,
	local_dust_limit: Resolved<u64>,
	remote_dust_limit: Resolved<u64>,
	feerate: Resolved<u32>,
	local_features: Resolved<FieldValue>,
	remote_features: Resolved<FieldValue>,
}

impl Commit {
	/// Describes the channel. Amounts are in millisatoshis and dust limits in satoshis. The
	/// features are the `init` feature bitfields each side sent, from which
	/// `option_static_remotekey` and anchors are negotiated.
	#[track_caller]
	pub fn new(
		opener: Side, local_keyset: KeySet, funding: impl Into<Resolved<Funding>>,
		local_to_self_delay: impl Into<Resolved<u64>>, remote_to_self_delay: impl Into<Resolved<u64>>,
		local_amount: impl Into<Resolved<u64>>, remote_amount: impl Into<Resolved<u64>>,
		local_dust_limit: impl Into<Resolved<u64>>, remote_dust_limit: impl Into<Resolved<u64>>,
		feerate: impl Into<Resolved<u32>>, local_features: impl Into<Resolved<FieldValue>>,
		remote_features: impl Into<Resolved<FieldValue>>,
	) -> Self {
		Commit {
			label: EventLabel::new("Commit"),
			done: false,
			opener,
			local_keyset,
			funding: funding.into(),
			local_to_self_delay: local_to_self_delay.into(),
			remote_to_self_delay: remote_to_self_delay.into(),
			local_amount: local_amount.into(),
			remote_amount: remote_amount.into(),
			local_dust_limit: local_dust_limit.into(),
			remote_dust_limit: remote_dust_limit.into(),
			feerate: feerate.into(),
			local_features: local_features.into(),
			remote_features: remote_features.into(),
		}
	}

	fn delay(&self, runner: &dyn Runner, arg: &Resolved<u64>, field: &str) -> Result<u16, ScriptError> {
		let delay = arg.resolve(runner, &self.label, field)?;
		u16::try_from(delay).map_err(|_| ScriptError::spec(&self.label, format!("{} {} does not fit a u16", field, delay)))
	}

	fn build(&self, runner: &dyn Runner) -> Result<Commitment, ScriptError> {
		let local_features = self.local_features.resolve(runner, &self.label, "local_features")?;
		let remote_features = self.remote_features.resolve(runner, &self.label, "remote_features")?;
		let (local_features, remote_features) = match (local_features.as_bytes(), remote_features.as_bytes()) {
			(Ok(local), Ok(remote)) => (local, remote),
			(Err(e), _) | (_, Err(e)) => return Err(ScriptError::spec(&self.label, e.to_string())),
		};
		let static_remotekey = features::negotiated(&local_features, &remote_features, &[STATIC_REMOTEKEY], &[]);
		let anchor_outputs = features::negotiated(&local_features, &remote_features, &[ANCHOR_OUTPUTS], &[])
			|| features::negotiated(&local_features, &remote_features, &[ANCHORS_ZERO_FEE_HTLC_TX], &[]);
		if anchor_outputs && !static_remotekey {
			return Err(ScriptError::event(
				&self.label,
				"Cannot have option_anchor_outputs without option_static_remotekey".to_owned(),
			));
		}

		let local = CommitmentSide {
			keyset: self.local_keyset.clone(),
			to_self_delay: self.delay(runner, &self.local_to_self_delay, "local_to_self_delay")?,
			amount_msat: self.local_amount.resolve(runner, &self.label, "local_amount")?,
			dust_limit_sat: self.local_dust_limit.resolve(runner, &self.label, "local_dust_limit")?,
		};
		let remote = CommitmentSide {
			keyset: runner.get_keyset(),
			to_self_delay: self.delay(runner, &self.remote_to_self_delay, "remote_to_self_delay")?,
			amount_msat: self.remote_amount.resolve(runner, &self.label, "remote_amount")?,
			dust_limit_sat: self.remote_dust_limit.resolve(runner, &self.label, "remote_dust_limit")?,
		};
		let funding = self.funding.resolve(runner, &self.label, "funding")?;
		let feerate = self.feerate.resolve(runner, &self.label, "feerate")?;
		Commitment::new(funding, self.opener, local, remote, feerate, static_remotekey, anchor_outputs)
			.map_err(|e| ScriptError::spec(&self.label, e.to_string()))
	}

	/// Executes the event.
	pub fn action(&mut self, runner: &mut dyn Runner) -> Result<(), ScriptError> {
		let commit = self.build(&*runner)?;
		let (local_tx, _) = commit.unsigned_tx(Side::Local);
		log_trace!(
			WithEvent::from(&*runner.core().logger, &self.label),
			"Initial local commitment {}",
			log_tx!(local_tx)
		);
		runner.core_mut().stash.set_commitment(commit);
		Ok(())
	}
}

/// Moves the stashed [`Commitment`] to its next state: HTLCs are added, then fulfilled ones are
/// credited to their recipient, then failed ones are refunded, then the feerate changes.
pub struct UpdateCommit {
	pub(crate) label: EventLabel,
	pub(crate) done: bool,
	new_htlcs: Vec<(HTLC, u64)>,
	resolved_htlcs: Vec<HTLC>,
	failed_htlcs: Vec<HTLC>,
	new_feerate: Option<Resolved<u32>>,
}

impl UpdateCommit {
	/// An update which only increments the commitment number.
	#[track_caller]
	pub fn new() -> Self {
		UpdateCommit {
			label: EventLabel::new("UpdateCommit"),
			done: false,
			new_htlcs: Vec::new(),
			resolved_htlcs: Vec::new(),
			failed_htlcs: Vec::new(),
			new_feerate: None,
		}
	}

	/// Adds `htlc` under `htlc_id`.
	pub fn new_htlc(mut self, htlc: HTLC, htlc_id: u64) -> Self {
		self.new_htlcs.push((htlc, htlc_id));
		self
	}

	/// Removes `htlc` as fulfilled.
	pub fn resolved_htlc(mut self, htlc: HTLC) -> Self {
		self.resolved_htlcs.push(htlc);
		self
	}

	/// Removes `htlc` as failed.
	pub fn failed_htlc(mut self, htlc: HTLC) -> Self {
		self.failed_htlcs.push(htlc);
		self
	}

	/// Changes the feerate.
	pub fn new_feerate(mut self, feerate: impl Into<Resolved<u32>>) -> Self {
		self.new_feerate = Some(feerate.into());
		self
	}

	/// Executes the event.
	pub fn action(&mut self, runner: &mut dyn Runner) -> Result<(), ScriptError> {
		let new_feerate = match &self.new_feerate {
			Some(feerate) => Some(feerate.resolve(&*runner, &self.label, "feerate")?),
			None => None,
		};
		let commit = runner.core_mut().stash.commitment_mut(&self.label)?;
		for (htlc, htlc_id) in self.new_htlcs.iter() {
			if !commit.add_htlc(htlc.clone(), *htlc_id) {
				return Err(ScriptError::spec(&self.label, format!("Already have htlc id {}", htlc_id)));
			}
		}
		for htlc in self.resolved_htlcs.iter() {
			if !commit.del_htlc(htlc, true) {
				return Err(ScriptError::spec(&self.label, format!("Cannot resolve missing htlc {}", htlc)));
			}
		}
		for htlc in self.failed_htlcs.iter() {
			if !commit.del_htlc(htlc, false) {
				return Err(ScriptError::spec(&self.label, format!("Cannot resolve missing htlc {}", htlc)));
			}
		}
		if let Some(feerate) = new_feerate {
			commit.feerate = feerate;
		}
		commit.inc_commitnum();
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::events::stash;
	use crate::ln::commitment::ONION_PACKET_LEN;
	use crate::util::test_utils::TestRunner;

	fn local_keyset() -> KeySet {
		KeySet::from_hex("21", "22", "23", "24", &"22".repeat(32)).unwrap()
	}

	const BOLT3_FUNDING_TXID: &str = "bef67e4e2fb9ddeeb3461973cd4c62abb35050b1add772995b820b584a488489";

	fn accept_funding() -> AcceptFunding {
		AcceptFunding::new(
			BOLT3_FUNDING_TXID,
			0u64,
			10_000_000u64,
			"02",
			"10",
			"01",
			"20",
		)
	}

	fn commit(local_features: &str, remote_features: &str) -> Commit {
		Commit::new(
			Side::Local,
			local_keyset(),
			stash::funding(),
			144u64,
			145u64,
			7_000_000_000u64,
			3_000_000_000u64,
			546u64,
			546u64,
			15000u32,
			local_features,
			remote_features,
		)
	}

	fn htlc(owner: Side, amount_msat: u64) -> HTLC {
		HTLC::new(owner, amount_msat, [1; 32], 500, vec![0; ONION_PACKET_LEN]).unwrap()
	}

	#[test]
	fn accept_funding_stashes_the_outpoint() {
		let mut runner = TestRunner::new();
		accept_funding().action(&mut runner).unwrap();
		let funding = runner.core().stash.funding(&EventLabel::new("Commit")).unwrap();
		assert_eq!(funding.amount, 10_000_000);
		assert_eq!(funding.txid_bytes().to_vec(), Vec::<u8>::from_hex(BOLT3_FUNDING_TXID).unwrap());

		let mut bad = AcceptFunding::new("zz", 0u64, 1u64, "02", "10", "01", "20");
		assert!(matches!(bad.action(&mut runner), Err(ScriptError::SpecFile(_))));
		let mut too_far = AcceptFunding::new("00".repeat(32), 70000u64, 1u64, "02", "10", "01", "20");
		assert!(matches!(too_far.action(&mut runner), Err(ScriptError::SpecFile(_))));
	}

	#[test]
	fn funding_txids_keep_wire_order() {
		let mut runner = TestRunner::new();
		AcceptFunding::new(BOLT3_FUNDING_TXID, 1u64, 10_000_000u64, "02", "10", "01", "20").action(&mut runner).unwrap();
		let label = EventLabel::new("Msg");
		let funding = runner.core().stash.funding(&label).unwrap();
		let wire = <[u8; 32]>::from_hex(BOLT3_FUNDING_TXID).unwrap();
		assert_eq!(funding.txid_bytes(), wire);
		assert_eq!(funding.txid.to_string(), "8984484a580b825b9972d7adb15050b3ab624ccd731946b3eeddb92f4e7ef6be");

		// The output index is XORed into the last two bytes of the txid.
		let chan_id = funding.channel_id();
		assert_eq!(chan_id[..30], wire[..30]);
		assert_eq!(chan_id[30..], [0x84, 0x88]);

		assert_eq!(stash::funding_txid().resolve(&runner, &label, "").unwrap(), BOLT3_FUNDING_TXID);
	}

	#[test]
	fn create_funding_stashes_the_tx() {
		let mut runner = TestRunner::new();
		let mut create = CreateFunding::new(BOLT3_FUNDING_TXID, 0, 1_000_000, "76", 1000, "02", "10", "01", "20");
		create.action(&mut runner).unwrap();
		let label = EventLabel::new("Msg");
		assert_eq!(stash::funding_amount().resolve(&runner, &label, "").unwrap(), 999_000);
		let tx = stash::funding_tx().resolve(&runner, &label, "").unwrap();
		assert!(tx.starts_with("02000000"));
		assert!(tx.contains(&format!("{}00000000", BOLT3_FUNDING_TXID)));

		let mut overspend = CreateFunding::new(&"01".repeat(32), 0, 500, "76", 1000, "02", "10", "01", "20");
		assert!(matches!(overspend.action(&mut runner), Err(ScriptError::SpecFile(_))));
	}

	#[test]
	fn commit_negotiates_commitment_features() {
		let mut runner = TestRunner::new();
		assert!(matches!(commit("", "").action(&mut runner), Err(ScriptError::SpecFile(_))));
		accept_funding().action(&mut runner).unwrap();

		commit("", "").action(&mut runner).unwrap();
		let label = EventLabel::new("Msg");
		{
			let c = runner.core().stash.commitment(&label).unwrap();
			assert!(!c.option_static_remotekey);
			assert!(!c.option_anchor_outputs);
			assert_eq!(c.self_delay, [144, 145]);
			assert_eq!(c.keyset[Side::Remote.idx()], runner.keyset);
		}

		// Bit 13 is optional static_remotekey, bit 23 optional anchors_zero_fee_htlc_tx.
		let both = "802000";
		commit(both, both).action(&mut runner).unwrap();
		let c = runner.core().stash.commitment(&label).unwrap();
		assert!(c.option_static_remotekey && c.option_anchor_outputs);

		let anchors_only = "800000";
		match commit(anchors_only, anchors_only).action(&mut runner) {
			Err(ScriptError::Event(err)) => {
				assert_eq!(err.message, "Cannot have option_anchor_outputs without option_static_remotekey")
			},
			res => panic!("{:?}", res),
		}
	}

	#[test]
	fn update_commit_moves_funds() {
		let mut runner = TestRunner::new();
		accept_funding().action(&mut runner).unwrap();
		commit("", "").action(&mut runner).unwrap();
		let label = EventLabel::new("Msg");

		let offered = htlc(Side::Local, 1_000_000);
		UpdateCommit::new().new_htlc(offered.clone(), 0).action(&mut runner).unwrap();
		{
			let c = runner.core().stash.commitment(&label).unwrap();
			assert_eq!(c.amounts, [6_999_000_000, 3_000_000_000]);
			assert_eq!(c.commitnum, 1);
		}
		match UpdateCommit::new().new_htlc(htlc(Side::Remote, 5), 0).action(&mut runner) {
			Err(ScriptError::SpecFile(err)) => assert_eq!(err.message, "Already have htlc id 0"),
			res => panic!("{:?}", res),
		}

		UpdateCommit::new().resolved_htlc(offered.clone()).new_feerate(253u32).action(&mut runner).unwrap();
		{
			let c = runner.core().stash.commitment(&label).unwrap();
			assert_eq!(c.amounts, [6_999_000_000, 3_001_000_000]);
			assert_eq!(c.feerate, 253);
			assert_eq!(c.commitnum, 2);
		}
		match UpdateCommit::new().failed_htlc(offered).action(&mut runner) {
			Err(ScriptError::SpecFile(err)) => assert!(err.message.starts_with("Cannot resolve missing htlc")),
			res => panic!("{:?}", res),
		}
	}
}
