// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Commitment and HTLC transactions as BOLT #3 defines them, built for either side of a
//! channel whose keys are all known, so that the test engine can both produce the signatures
//! it must send and predict those it should receive.

use bitcoin::blockdata::opcodes;
use bitcoin::blockdata::script::{Builder, ScriptBuf};
use bitcoin::hashes::hash160::Hash as Hash160;
use bitcoin::hashes::ripemd160::Hash as Ripemd160;
use bitcoin::hashes::sha256::Hash as Sha256;
use bitcoin::hashes::{Hash, HashEngine};
use bitcoin::secp256k1::{self, All, PublicKey, Scalar, Secp256k1, SecretKey};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::transaction::{self, Transaction, TxIn, TxOut};
use bitcoin::{absolute, Amount, OutPoint, Sequence, WPubkeyHash, Witness};

use core::fmt;

use crate::ln::features::msat;
use crate::ln::funding::{sighash_all_der, Funding};
use crate::ln::keyset::KeySet;
use crate::ln::signature::Sig;
use crate::ln::Side;
use crate::prelude::*;
use crate::util::errors::DecodeError;
use crate::util::transaction_utils::{sort_outputs, sort_outputs_keyed_first};

use alloc::collections::BTreeMap;

/// The size of the onion packet every `update_add_htlc` carries.
pub const ONION_PACKET_LEN: usize = 1366;

/// The value of each anchor output, in satoshis.
pub const ANCHOR_OUTPUT_VALUE_SATOSHI: u64 = 330;

/// Gets the weight for an HTLC-Success transaction.
#[inline]
pub fn htlc_success_tx_weight(opt_anchors: bool) -> u64 {
	const HTLC_SUCCESS_TX_WEIGHT: u64 = 703;
	const HTLC_SUCCESS_ANCHOR_TX_WEIGHT: u64 = 706;
	if opt_anchors { HTLC_SUCCESS_ANCHOR_TX_WEIGHT } else { HTLC_SUCCESS_TX_WEIGHT }
}

/// Gets the weight for an HTLC-Timeout transaction.
#[inline]
pub fn htlc_timeout_tx_weight(opt_anchors: bool) -> u64 {
	const HTLC_TIMEOUT_TX_WEIGHT: u64 = 663;
	const HTLC_TIMEOUT_ANCHOR_TX_WEIGHT: u64 = 666;
	if opt_anchors { HTLC_TIMEOUT_ANCHOR_TX_WEIGHT } else { HTLC_TIMEOUT_TX_WEIGHT }
}

/// An HTLC offered by `owner`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HTLC {
	/// The side which offered the HTLC, and whose balance funds it.
	pub owner: Side,
	/// The HTLC value.
	pub amount_msat: u64,
	/// The preimage of the payment hash.
	pub payment_secret: [u8; 32],
	/// The absolute block height at which the HTLC times out.
	pub cltv_expiry: u32,
	/// The onion packet, always [`ONION_PACKET_LEN`] bytes.
	pub onion_routing_packet: Vec<u8>,
}

impl HTLC {
	/// Creates an HTLC, checking the onion packet length.
	pub fn new(
		owner: Side, amount_msat: u64, payment_secret: [u8; 32], cltv_expiry: u32, onion_routing_packet: Vec<u8>,
	) -> Result<Self, DecodeError> {
		if onion_routing_packet.len() != ONION_PACKET_LEN {
			return Err(DecodeError::InvalidValue(format!(
				"onion packet is {} bytes, not {}", onion_routing_packet.len(), ONION_PACKET_LEN
			)));
		}
		Ok(HTLC { owner, amount_msat, payment_secret, cltv_expiry, onion_routing_packet })
	}

	/// The SHA256 of the payment secret.
	pub fn payment_hash(&self) -> [u8; 32] {
		Sha256::hash(&self.payment_secret).to_byte_array()
	}

	/// The fee of the HTLC-timeout transaction, in satoshis.
	pub fn htlc_timeout_fee(feerate_per_kw: u32, option_anchor_outputs: bool) -> u64 {
		feerate_per_kw as u64 * htlc_timeout_tx_weight(option_anchor_outputs) / 1000
	}

	/// The fee of the HTLC-success transaction, in satoshis.
	pub fn htlc_success_fee(feerate_per_kw: u32, option_anchor_outputs: bool) -> u64 {
		feerate_per_kw as u64 * htlc_success_tx_weight(option_anchor_outputs) / 1000
	}
}

impl fmt::Display for HTLC {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		use bitcoin::hex::DisplayHex;
		write!(f, "htlc({},{},{})", self.owner, self.amount_msat, self.payment_hash().as_hex())
	}
}

/// How commitment transaction outputs are ordered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum OutputOrdering {
	/// BIP 69 (value, then scriptPubKey), with `cltv_expiry` breaking ties between otherwise
	/// identical HTLC outputs.
	#[default]
	Bip69,
	/// `cltv_expiry` first, then BIP 69. Only for reproducing transactions built under early
	/// BOLT #3 drafts.
	LegacyCltvFirst,
}

/// One side's parameters of a [`Commitment`].
#[derive(Clone, Debug)]
pub struct CommitmentSide {
	/// The side's keys.
	pub keyset: KeySet,
	/// The CSV delay on this side's `to_local` output, which the other side dictates.
	pub to_self_delay: u16,
	/// The side's balance.
	pub amount_msat: u64,
	/// The dust limit applying to this side's commitment transaction, in satoshis.
	pub dust_limit_sat: u64,
}

/// A second-stage HTLC transaction, unsigned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HtlcTx {
	/// The HTLC-timeout or HTLC-success transaction.
	pub tx: Transaction,
	/// The witness script of the commitment output it spends.
	pub redeemscript: ScriptBuf,
	/// The value of that output, in satoshis.
	pub amount_sat: u64,
}

/// The state of both commitment transactions of a channel.
#[derive(Clone)]
pub struct Commitment {
	/// The funding output spent by the commitment transactions.
	pub funding: Funding,
	/// The side which opened the channel and pays the commitment fee.
	pub opener: Side,
	/// Each side's keys.
	pub keyset: [KeySet; 2],
	/// Each side's `to_self_delay`.
	pub self_delay: [u16; 2],
	/// Each side's balance, not counting HTLCs.
	pub amounts: [u64; 2],
	/// Each side's dust limit in satoshis.
	pub dust_limit: [u64; 2],
	/// The feerate in satoshis per 1000 weight.
	pub feerate: u32,
	/// Whether `to_remote` pays the raw payment basepoint.
	pub option_static_remotekey: bool,
	/// Whether anchors apply. Implies `option_static_remotekey`.
	pub option_anchor_outputs: bool,
	/// The current commitment number.
	pub commitnum: u64,
	/// The output ordering rule.
	pub ordering: OutputOrdering,
	htlcs: BTreeMap<u64, HTLC>,
	secp_ctx: Secp256k1<All>,
}

/// Derives a per-commitment private key (eg an htlc key or delayed_payment key) from the base
/// secret and the per_commitment_point.
fn derive_private_key<T: secp256k1::Signing>(
	secp_ctx: &Secp256k1<T>, per_commitment_point: &PublicKey, base_secret: &SecretKey,
) -> SecretKey {
	let mut sha = Sha256::engine();
	sha.input(&per_commitment_point.serialize());
	sha.input(&PublicKey::from_secret_key(&secp_ctx, &base_secret).serialize());
	let res = Sha256::from_engine(sha).to_byte_array();

	base_secret.clone().add_tweak(&Scalar::from_be_bytes(res).expect("Hashes are below the curve order unless SHA-256 is broken"))
		.expect("Addition only fails if the tweak is the inverse of the key. This is not possible when the tweak contains the hash of the key.")
}

/// Derives the revocation private key of a commitment from the secret of the commitment owner
/// and the revocation base secret of its counterparty.
fn derive_private_revocation_key<T: secp256k1::Signing>(
	secp_ctx: &Secp256k1<T>, per_commitment_secret: &SecretKey, countersignatory_revocation_base_secret: &SecretKey,
) -> SecretKey {
	let countersignatory_revocation_base_point = PublicKey::from_secret_key(&secp_ctx, &countersignatory_revocation_base_secret);
	let per_commitment_point = PublicKey::from_secret_key(&secp_ctx, &per_commitment_secret);

	let rev_append_commit_hash_key = {
		let mut sha = Sha256::engine();
		sha.input(&countersignatory_revocation_base_point.serialize());
		sha.input(&per_commitment_point.serialize());
		Sha256::from_engine(sha).to_byte_array()
	};
	let commit_append_rev_hash_key = {
		let mut sha = Sha256::engine();
		sha.input(&per_commitment_point.serialize());
		sha.input(&countersignatory_revocation_base_point.serialize());
		Sha256::from_engine(sha).to_byte_array()
	};

	let countersignatory_contrib = countersignatory_revocation_base_secret.clone()
		.mul_tweak(&Scalar::from_be_bytes(rev_append_commit_hash_key).expect("Hashes are below the curve order unless SHA-256 is broken"))
		.expect("Multiplying a secret key by a hash is expected to never fail per secp256k1 docs");
	let broadcaster_contrib = per_commitment_secret.clone()
		.mul_tweak(&Scalar::from_be_bytes(commit_append_rev_hash_key).expect("Hashes are below the curve order unless SHA-256 is broken"))
		.expect("Multiplying a secret key by a hash is expected to never fail per secp256k1 docs");
	countersignatory_contrib.add_tweak(&Scalar::from_be_bytes(broadcaster_contrib.secret_bytes()).expect("Secret keys are below the curve order"))
		.expect("Addition only fails if the tweak is the inverse of the key. This is not possible when the tweak commits to the key.")
}

/// A script either spendable by the revocation key or the delayed payment key after
/// `contest_delay` blocks. Encumbers `to_local` outputs and the outputs of HTLC transactions.
pub fn get_revokeable_redeemscript(revocation_key: &PublicKey, contest_delay: u16, delayed_payment_key: &PublicKey) -> ScriptBuf {
	Builder::new().push_opcode(opcodes::all::OP_IF)
		.push_slice(revocation_key.serialize())
		.push_opcode(opcodes::all::OP_ELSE)
		.push_int(contest_delay as i64)
		.push_opcode(opcodes::all::OP_CSV)
		.push_opcode(opcodes::all::OP_DROP)
		.push_slice(delayed_payment_key.serialize())
		.push_opcode(opcodes::all::OP_ENDIF)
		.push_opcode(opcodes::all::OP_CHECKSIG)
		.into_script()
}

/// The witness script of the `to_remote` output when anchors apply.
pub fn get_to_countersignatory_with_anchors_redeemscript(payment_point: &PublicKey) -> ScriptBuf {
	Builder::new()
		.push_slice(payment_point.serialize())
		.push_opcode(opcodes::all::OP_CHECKSIGVERIFY)
		.push_int(1)
		.push_opcode(opcodes::all::OP_CSV)
		.into_script()
}

/// The witness script of an anchor output: spendable by the funding key, or by anyone after 16
/// blocks.
pub fn get_anchor_redeemscript(funding_pubkey: &PublicKey) -> ScriptBuf {
	Builder::new().push_slice(funding_pubkey.serialize())
		.push_opcode(opcodes::all::OP_CHECKSIG)
		.push_opcode(opcodes::all::OP_IFDUP)
		.push_opcode(opcodes::all::OP_NOTIF)
		.push_int(16)
		.push_opcode(opcodes::all::OP_CSV)
		.push_opcode(opcodes::all::OP_ENDIF)
		.into_script()
}

/// The witness script of an HTLC output. `offered` is relative to the commitment owner, whose
/// HTLC key is `broadcaster_htlc_key`.
pub fn get_htlc_redeemscript(
	payment_hash: &[u8; 32], cltv_expiry: u32, offered: bool, opt_anchors: bool, broadcaster_htlc_key: &PublicKey,
	countersignatory_htlc_key: &PublicKey, revocation_key: &PublicKey,
) -> ScriptBuf {
	let payment_hash160 = Ripemd160::hash(&payment_hash[..]).to_byte_array();
	let revocation_hash160 = Hash160::hash(&revocation_key.serialize()).to_byte_array();
	let bldr = Builder::new().push_opcode(opcodes::all::OP_DUP)
		.push_opcode(opcodes::all::OP_HASH160)
		.push_slice(revocation_hash160)
		.push_opcode(opcodes::all::OP_EQUAL)
		.push_opcode(opcodes::all::OP_IF)
		.push_opcode(opcodes::all::OP_CHECKSIG)
		.push_opcode(opcodes::all::OP_ELSE)
		.push_slice(countersignatory_htlc_key.serialize())
		.push_opcode(opcodes::all::OP_SWAP)
		.push_opcode(opcodes::all::OP_SIZE)
		.push_int(32)
		.push_opcode(opcodes::all::OP_EQUAL);
	let mut bldr = if offered {
		bldr.push_opcode(opcodes::all::OP_NOTIF)
			.push_opcode(opcodes::all::OP_DROP)
			.push_int(2)
			.push_opcode(opcodes::all::OP_SWAP)
			.push_slice(broadcaster_htlc_key.serialize())
			.push_int(2)
			.push_opcode(opcodes::all::OP_CHECKMULTISIG)
			.push_opcode(opcodes::all::OP_ELSE)
			.push_opcode(opcodes::all::OP_HASH160)
			.push_slice(payment_hash160)
			.push_opcode(opcodes::all::OP_EQUALVERIFY)
			.push_opcode(opcodes::all::OP_CHECKSIG)
			.push_opcode(opcodes::all::OP_ENDIF)
	} else {
		bldr.push_opcode(opcodes::all::OP_IF)
			.push_opcode(opcodes::all::OP_HASH160)
			.push_slice(payment_hash160)
			.push_opcode(opcodes::all::OP_EQUALVERIFY)
			.push_int(2)
			.push_opcode(opcodes::all::OP_SWAP)
			.push_slice(broadcaster_htlc_key.serialize())
			.push_int(2)
			.push_opcode(opcodes::all::OP_CHECKMULTISIG)
			.push_opcode(opcodes::all::OP_ELSE)
			.push_opcode(opcodes::all::OP_DROP)
			.push_int(cltv_expiry as i64)
			.push_opcode(opcodes::all::OP_CLTV)
			.push_opcode(opcodes::all::OP_DROP)
			.push_opcode(opcodes::all::OP_CHECKSIG)
			.push_opcode(opcodes::all::OP_ENDIF)
	};
	if opt_anchors {
		bldr = bldr.push_opcode(opcodes::all::OP_PUSHNUM_1)
			.push_opcode(opcodes::all::OP_CSV)
			.push_opcode(opcodes::all::OP_DROP);
	}
	bldr.push_opcode(opcodes::all::OP_ENDIF).into_script()
}

impl Commitment {
	/// Creates the commitment state at commitment number 0.
	pub fn new(
		funding: Funding, opener: Side, local: CommitmentSide, remote: CommitmentSide, feerate: u32,
		option_static_remotekey: bool, option_anchor_outputs: bool,
	) -> Result<Self, DecodeError> {
		if option_anchor_outputs && !option_static_remotekey {
			return Err(DecodeError::InvalidValue(
				"option_anchor_outputs requires option_static_remotekey".to_owned(),
			));
		}
		Ok(Commitment {
			funding,
			opener,
			keyset: [local.keyset, remote.keyset],
			self_delay: [local.to_self_delay, remote.to_self_delay],
			amounts: [local.amount_msat, remote.amount_msat],
			dust_limit: [local.dust_limit_sat, remote.dust_limit_sat],
			feerate,
			option_static_remotekey,
			option_anchor_outputs,
			commitnum: 0,
			ordering: OutputOrdering::default(),
			htlcs: BTreeMap::new(),
			secp_ctx: Secp256k1::new(),
		})
	}

	fn per_commit_point(&self, side: Side) -> PublicKey {
		self.keyset[side.idx()].per_commit_point(&self.secp_ctx, self.commitnum)
	}

	/// The private key which can spend `side`'s commitment outputs once revoked.
	pub fn revocation_privkey(&self, side: Side) -> SecretKey {
		derive_private_revocation_key(
			&self.secp_ctx,
			&self.keyset[side.idx()].per_commit_secret(self.commitnum),
			&self.keyset[(!side).idx()].revocation_base_secret,
		)
	}

	/// The revocation key of `side`'s commitment transaction.
	pub fn revocation_pubkey(&self, side: Side) -> PublicKey {
		PublicKey::from_secret_key(&self.secp_ctx, &self.revocation_privkey(side))
	}

	/// `basesecret` tweaked by `side`'s current per-commitment point.
	fn basepoint_tweak(&self, basesecret: &SecretKey, side: Side) -> SecretKey {
		derive_private_key(&self.secp_ctx, &self.per_commit_point(side), basesecret)
	}

	/// The delayed payment key of `side`'s commitment transaction.
	pub fn delayed_pubkey(&self, side: Side) -> PublicKey {
		let privkey = self.basepoint_tweak(&self.keyset[side.idx()].delayed_payment_base_secret, side);
		PublicKey::from_secret_key(&self.secp_ctx, &privkey)
	}

	/// The key `to_remote` pays on `side`'s commitment transaction.
	pub fn to_remote_pubkey(&self, side: Side) -> PublicKey {
		let base = &self.keyset[(!side).idx()].payment_base_secret;
		if self.option_static_remotekey {
			PublicKey::from_secret_key(&self.secp_ctx, base)
		} else {
			PublicKey::from_secret_key(&self.secp_ctx, &self.basepoint_tweak(base, side))
		}
	}

	/// `side`'s own HTLC key on its commitment transaction.
	pub fn local_htlc_pubkey(&self, side: Side) -> PublicKey {
		let privkey = self.basepoint_tweak(&self.keyset[side.idx()].htlc_base_secret, side);
		PublicKey::from_secret_key(&self.secp_ctx, &privkey)
	}

	/// The counterparty's HTLC key on `side`'s commitment transaction.
	pub fn remote_htlc_pubkey(&self, side: Side) -> PublicKey {
		let privkey = self.basepoint_tweak(&self.keyset[(!side).idx()].htlc_base_secret, side);
		PublicKey::from_secret_key(&self.secp_ctx, &privkey)
	}

	/// Adds `htlc` under `htlc_id`, debiting its owner. Returns false if the id is taken.
	pub fn add_htlc(&mut self, htlc: HTLC, htlc_id: u64) -> bool {
		if self.htlcs.contains_key(&htlc_id) {
			return false;
		}
		let owner = htlc.owner.idx();
		self.amounts[owner] = self.amounts[owner].saturating_sub(htlc.amount_msat);
		self.htlcs.insert(htlc_id, htlc);
		true
	}

	/// Removes `htlc`, crediting the other side if `xfer_funds` (it was fulfilled) or the owner
	/// otherwise (it failed). Returns false if no such HTLC is committed.
	pub fn del_htlc(&mut self, htlc: &HTLC, xfer_funds: bool) -> bool {
		let htlc_id = match self.htlcs.iter().find(|(_, v)| *v == htlc) {
			Some((id, _)) => *id,
			None => return false,
		};
		let gains_to = if xfer_funds { !htlc.owner } else { htlc.owner };
		self.amounts[gains_to.idx()] += htlc.amount_msat;
		self.htlcs.remove(&htlc_id);
		true
	}

	/// The HTLC committed under `htlc_id`.
	pub fn get_htlc(&self, htlc_id: u64) -> Option<&HTLC> {
		self.htlcs.get(&htlc_id)
	}

	/// Moves to the next commitment number.
	pub fn inc_commitnum(&mut self) {
		self.commitnum += 1;
	}

	/// The channel id of a channel opened with the v2 protocol: the SHA256 of the lesser
	/// revocation basepoint followed by the greater.
	pub fn channel_id_v2(&self) -> [u8; 32] {
		let local = self.keyset[Side::Local.idx()].revocation_basepoint(&self.secp_ctx);
		let remote = self.keyset[Side::Remote.idx()].revocation_basepoint(&self.secp_ctx);
		let (first, second) = Funding::sort_by_keys(&local, &remote, local, remote);
		let mut sha = Sha256::engine();
		sha.input(&first.serialize());
		sha.input(&second.serialize());
		Sha256::from_engine(sha).to_byte_array()
	}

	/// XORs `commitnum` with the lower 48 bits of
	/// `SHA256(opener_payment_basepoint || non_opener_payment_basepoint)`. Applying it twice
	/// gives `commitnum` back.
	pub fn obscured_commit_num(
		opener_payment_basepoint: &PublicKey, non_opener_payment_basepoint: &PublicKey, commitnum: u64,
	) -> u64 {
		let mut sha = Sha256::engine();
		sha.input(&opener_payment_basepoint.serialize());
		sha.input(&non_opener_payment_basepoint.serialize());
		let res = Sha256::from_engine(sha).to_byte_array();

		let obscurer = ((res[26] as u64) << 5 * 8)
			| ((res[27] as u64) << 4 * 8)
			| ((res[28] as u64) << 3 * 8)
			| ((res[29] as u64) << 2 * 8)
			| ((res[30] as u64) << 1 * 8)
			| ((res[31] as u64) << 0 * 8);
		commitnum ^ obscurer
	}

	/// The commitment transaction fee given the number of untrimmed HTLCs, anchors included.
	pub fn fee(&self, num_untrimmed_htlcs: usize) -> u64 {
		let base = if self.option_anchor_outputs { 1124 } else { 724 };
		let mut fee = (base + 172 * num_untrimmed_htlcs as u64) * self.feerate as u64 / 1000;
		if self.option_anchor_outputs {
			fee += 2 * ANCHOR_OUTPUT_VALUE_SATOSHI;
		}
		fee
	}

	/// The witness script and value of `to_local` on `side`'s commitment. The value is negative
	/// when the opener cannot afford the fee.
	pub fn to_local_output(&self, fee: u64, side: Side) -> (ScriptBuf, i64) {
		let script = get_revokeable_redeemscript(
			&self.revocation_pubkey(side),
			self.self_delay[side.idx()],
			&self.delayed_pubkey(side),
		);
		let mut sats = (self.amounts[side.idx()] / 1000) as i64;
		if side == self.opener {
			sats -= fee as i64;
		}
		(script, sats)
	}

	/// The scriptPubKey and value of `to_remote` on `side`'s commitment.
	pub fn to_remote_output(&self, fee: u64, side: Side) -> (ScriptBuf, i64) {
		let mut sats = (self.amounts[(!side).idx()] / 1000) as i64;
		if side != self.opener {
			sats -= fee as i64;
		}
		let remote_pubkey = self.to_remote_pubkey(side);
		let script = if self.option_anchor_outputs {
			get_to_countersignatory_with_anchors_redeemscript(&remote_pubkey).to_p2wsh()
		} else {
			ScriptBuf::new_p2wpkh(&WPubkeyHash::hash(&remote_pubkey.serialize()))
		};
		(script, sats)
	}

	/// The witness script of `htlc`'s output on `side`'s commitment.
	pub fn htlc_redeemscript(&self, htlc: &HTLC, side: Side) -> ScriptBuf {
		get_htlc_redeemscript(
			&htlc.payment_hash(),
			htlc.cltv_expiry,
			htlc.owner == side,
			self.option_anchor_outputs,
			&self.local_htlc_pubkey(side),
			&self.remote_htlc_pubkey(side),
			&self.revocation_pubkey(side),
		)
	}

	/// The anchor output keyed to `side`'s funding key.
	pub fn anchor_output(&self, side: Side) -> TxOut {
		TxOut {
			value: Amount::from_sat(ANCHOR_OUTPUT_VALUE_SATOSHI),
			script_pubkey: get_anchor_redeemscript(&self.funding.funding_pubkey(side)).to_p2wsh(),
		}
	}

	/// The HTLCs which get an output on `side`'s commitment, with their ids. Offered HTLCs are
	/// trimmed against the HTLC-timeout fee, received ones against the HTLC-success fee.
	pub fn untrimmed_htlcs(&self, side: Side) -> Vec<(u64, &HTLC)> {
		let dust_msat = msat(self.dust_limit[side.idx()]);
		self.htlcs
			.iter()
			.filter(|(_, htlc)| {
				let fee = if htlc.owner == side {
					HTLC::htlc_timeout_fee(self.feerate, self.option_anchor_outputs)
				} else {
					HTLC::htlc_success_fee(self.feerate, self.option_anchor_outputs)
				};
				htlc.amount_msat >= msat(fee) + dust_msat
			})
			.map(|(id, htlc)| (*id, htlc))
			.collect()
	}

	/// Builds `side`'s unsigned commitment transaction, returning it with the HTLC id behind
	/// each output (`None` for non-HTLC outputs).
	pub fn unsigned_tx(&self, side: Side) -> (Transaction, Vec<Option<u64>>) {
		let ocn = Commitment::obscured_commit_num(
			&self.keyset[self.opener.idx()].payment_basepoint(&self.secp_ctx),
			&self.keyset[(!self.opener).idx()].payment_basepoint(&self.secp_ctx),
			self.commitnum,
		);
		let txin = TxIn {
			previous_output: OutPoint { txid: self.funding.txid, vout: self.funding.output_index as u32 },
			script_sig: ScriptBuf::new(),
			sequence: Sequence(((0x80 as u32) << 8 * 3) | ((ocn >> 3 * 8) as u32)),
			witness: Witness::new(),
		};

		let mut txouts: Vec<(TxOut, (u32, Option<u64>))> = Vec::new();
		for (htlc_id, htlc) in self.untrimmed_htlcs(side) {
			let script_pubkey = self.htlc_redeemscript(htlc, side).to_p2wsh();
			let value = Amount::from_sat(htlc.amount_msat / 1000);
			txouts.push((TxOut { value, script_pubkey }, (htlc.cltv_expiry, Some(htlc_id))));
		}
		let have_htlcs = !txouts.is_empty();
		let fee = self.fee(txouts.len());
		let dust_limit = self.dust_limit[side.idx()] as i64;

		let (to_local_script, to_local_sats) = self.to_local_output(fee, side);
		let have_to_local = to_local_sats >= dust_limit;
		if have_to_local {
			txouts.push((
				TxOut { value: Amount::from_sat(to_local_sats as u64), script_pubkey: to_local_script.to_p2wsh() },
				(0, None),
			));
		}
		let (to_remote_script, to_remote_sats) = self.to_remote_output(fee, side);
		let have_to_remote = to_remote_sats >= dust_limit;
		if have_to_remote {
			txouts.push((TxOut { value: Amount::from_sat(to_remote_sats as u64), script_pubkey: to_remote_script }, (0, None)));
		}
		if self.option_anchor_outputs {
			if have_htlcs || have_to_local {
				txouts.push((self.anchor_output(side), (0, None)));
			}
			if have_htlcs || have_to_remote {
				txouts.push((self.anchor_output(!side), (0, None)));
			}
		}

		match self.ordering {
			OutputOrdering::Bip69 => sort_outputs(&mut txouts, |a, b| a.0.cmp(&b.0)),
			OutputOrdering::LegacyCltvFirst => sort_outputs_keyed_first(&mut txouts, |t| t.0),
		}

		let (output, htlc_ids): (Vec<TxOut>, Vec<Option<u64>>) =
			txouts.into_iter().map(|(txout, (_, htlc_id))| (txout, htlc_id)).unzip();
		let tx = Transaction {
			version: transaction::Version::TWO,
			lock_time: absolute::LockTime::from_consensus(((0x20 as u32) << 8 * 3) | ((ocn & 0xffffff) as u32)),
			input: vec![txin],
			output,
		};
		(tx, htlc_ids)
	}

	/// The test engine's unsigned commitment transaction.
	pub fn local_unsigned_tx(&self) -> Transaction {
		self.unsigned_tx(Side::Local).0
	}

	/// The node under test's unsigned commitment transaction.
	pub fn remote_unsigned_tx(&self) -> Transaction {
		self.unsigned_tx(Side::Remote).0
	}

	/// The HTLC-timeout or HTLC-success transaction spending output `outnum` of `commit_tx`.
	fn htlc_tx(&self, commit_tx: &Transaction, outnum: u32, side: Side, amount_sat: u64, locktime: u32) -> Transaction {
		let redeemscript = get_revokeable_redeemscript(
			&self.revocation_pubkey(side),
			self.self_delay[side.idx()],
			&self.delayed_pubkey(side),
		);
		Transaction {
			version: transaction::Version::TWO,
			lock_time: absolute::LockTime::from_consensus(locktime),
			input: vec![TxIn {
				previous_output: OutPoint { txid: commit_tx.compute_txid(), vout: outnum },
				script_sig: ScriptBuf::new(),
				sequence: Sequence(if self.option_anchor_outputs { 1 } else { 0 }),
				witness: Witness::new(),
			}],
			output: vec![TxOut { value: Amount::from_sat(amount_sat), script_pubkey: redeemscript.to_p2wsh() }],
		}
	}

	/// The second-stage transactions of `side`'s commitment, in commitment output order.
	pub fn htlc_txs(&self, side: Side) -> Vec<HtlcTx> {
		let (commit_tx, htlc_ids) = self.unsigned_tx(side);
		let mut res = Vec::new();
		for (outnum, htlc_id) in htlc_ids.iter().enumerate() {
			let htlc = match htlc_id.and_then(|id| self.htlcs.get(&id)) {
				Some(htlc) => htlc,
				None => continue,
			};
			let (fee, locktime) = if htlc.owner == side {
				(HTLC::htlc_timeout_fee(self.feerate, self.option_anchor_outputs), htlc.cltv_expiry)
			} else {
				(HTLC::htlc_success_fee(self.feerate, self.option_anchor_outputs), 0)
			};
			let amount_sat = htlc.amount_msat.saturating_sub(msat(fee)) / 1000;
			res.push(HtlcTx {
				tx: self.htlc_tx(&commit_tx, outnum as u32, side, amount_sat, locktime),
				redeemscript: self.htlc_redeemscript(htlc, side),
				amount_sat: htlc.amount_msat / 1000,
			});
		}
		res
	}

	fn funding_sighash(&self, tx: &Transaction) -> [u8; 32] {
		SighashCache::new(tx)
			.p2wsh_signature_hash(0, &self.funding.redeemscript(), Amount::from_sat(self.funding.amount), EcdsaSighashType::All)
			.expect("Commitment transactions have exactly one input")
			.to_byte_array()
	}

	/// The test engine's signature of a commitment transaction.
	pub fn local_sig(&self, tx: &Transaction) -> Sig {
		Sig::lazy(*self.funding.funding_privkey(Side::Local), self.funding_sighash(tx))
	}

	/// The node under test's signature of a commitment transaction.
	pub fn remote_sig(&self, tx: &Transaction) -> Sig {
		Sig::lazy(*self.funding.funding_privkey(Side::Remote), self.funding_sighash(tx))
	}

	/// `signer`'s signatures of the HTLC transactions of `side`'s commitment, in commitment
	/// output order.
	pub fn htlc_sigs(&self, signer: Side, side: Side) -> Vec<Sig> {
		let hashtype = if self.option_anchor_outputs {
			EcdsaSighashType::SinglePlusAnyoneCanPay
		} else {
			EcdsaSighashType::All
		};
		let privkey = self.basepoint_tweak(&self.keyset[signer.idx()].htlc_base_secret, side);
		self.htlc_txs(side)
			.iter()
			.map(|htlc_tx| {
				let sighash = SighashCache::new(&htlc_tx.tx)
					.p2wsh_signature_hash(0, &htlc_tx.redeemscript, Amount::from_sat(htlc_tx.amount_sat), hashtype)
					.expect("HTLC transactions have exactly one input");
				Sig::lazy(privkey, sighash.to_byte_array())
			})
			.collect()
	}

	/// `unsigned_tx` with both funding signatures in its witness.
	pub fn signed_tx(&self, unsigned_tx: &Transaction) -> Transaction {
		let mut tx = unsigned_tx.clone();
		let msg = secp256k1::Message::from_digest(self.funding_sighash(&tx));
		let (key_a, key_b) = self.funding.funding_privkeys_for_tx();
		let witness = &mut tx.input[0].witness;
		witness.push(Vec::<u8>::new());
		witness.push(sighash_all_der(&self.secp_ctx.sign_ecdsa(&msg, key_a)));
		witness.push(sighash_all_der(&self.secp_ctx.sign_ecdsa(&msg, key_b)));
		witness.push(self.funding.redeemscript().as_bytes());
		tx
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::ln::funding::FundingKeys;
	use crate::ln::keyset::privkey_expand;
	use bitcoin::consensus::encode::{deserialize, serialize_hex};
	use bitcoin::hex::{DisplayHex, FromHex};
	use bitcoin::Txid;

	use core::str::FromStr;

	const SIMPLE_COMMIT_TX: &str = "02000000000101bef67e4e2fb9ddeeb3461973cd4c62abb35050b1add772995b820b584a488489000000000038b02b8002c0c62d0000000000160014ccf1af2f2aabee14bb40fa3851ab2301de84311054a56a00000000002200204adb4e2f00643db396dd120d4e7dc17625f5f2c11a40d857accc862d6b7dd80e0400473044022051b75c73198c6deee1a875871c3961832909acd297c6b908d59e3319e5185a46022055c419379c5051a78d00dbbce11b5b664a0c22815fbcc6fcef6b1937c383693901483045022100f51d2e566a70ba740fc5d8c0f07b9b93d2ed741c3c0860c613173de7d39e7968022041376d520e9c0e1ad52248ddf4b22e12be8763007df977253ef45a4ca3bdb7c001475221023da092f6980e58d2c037173180e9a465476026ee50f96695963e8efe436f54eb21030e9f7b623d2ccc7c9bd44d66d5ce21ce504c0acf6385a132cec6d3c39fa711c152ae3e195220";

	const FIVE_HTLCS_COMMIT_TX: &str = "02000000000101bef67e4e2fb9ddeeb3461973cd4c62abb35050b1add772995b820b584a488489000000000038b02b8007e80300000000000022002052bfef0479d7b293c27e0f1eb294bea154c63a3294ef092c19af51409bce0e2ad007000000000000220020403d394747cae42e98ff01734ad5c08f82ba123d3d9a620abda88989651e2ab5d007000000000000220020748eba944fedc8827f6b06bc44678f93c0f9e6078b35c6331ed31e75f8ce0c2db80b000000000000220020c20b5d1f8584fd90443e7b7b720136174fa4b9333c261d04dbbd012635c0f419a00f0000000000002200208c48d15160397c9731df9bc3b236656efb6665fbfe92b4a6878e88a499f741c4c0c62d0000000000160014ccf1af2f2aabee14bb40fa3851ab2301de843110e0a06a00000000002200204adb4e2f00643db396dd120d4e7dc17625f5f2c11a40d857accc862d6b7dd80e04004730440220275b0c325a5e9355650dc30c0eccfbc7efb23987c24b556b9dfdd40effca18d202206caceb2c067836c51f296740c7ae807ffcbfbf1dd3a0d56b6de9a5b247985f060147304402204fd4928835db1ccdfc40f5c78ce9bd65249b16348df81f0c44328dcdefc97d630220194d3869c38bc732dd87d13d2958015e2fc16829e74cd4377f84d215c0b7060601475221023da092f6980e58d2c037173180e9a465476026ee50f96695963e8efe436f54eb21030e9f7b623d2ccc7c9bd44d66d5ce21ce504c0acf6385a132cec6d3c39fa711c152ae3e195220";

	fn txid_of(hex: &str) -> Txid {
		let tx: Transaction = deserialize(&Vec::<u8>::from_hex(hex).unwrap()).unwrap();
		tx.compute_txid()
	}

	fn sig(der_hex: &str) -> Sig {
		Sig::from_str(der_hex).unwrap()
	}

	// The BOLT #3 Appendix C channel, at commitment number 42.
	fn bolt3_commitment(static_remotekey: bool, anchors: bool) -> Commitment {
		let funding_txid = <[u8; 32]>::from_hex("bef67e4e2fb9ddeeb3461973cd4c62abb35050b1add772995b820b584a488489").unwrap();
		let funding = Funding::new(Txid::from_byte_array(funding_txid), 0, 10_000_000, FundingKeys {
			local_node_privkey: privkey_expand("99").unwrap(),
			local_funding_privkey: privkey_expand("30ff4956bbdd3222d44cc5e8a1261dab1e07957bdac5ae88fe3261ef321f3749").unwrap(),
			remote_node_privkey: privkey_expand("99").unwrap(),
			remote_funding_privkey: privkey_expand("1552dfba4f6cf29a62a0af13c8d6981d36d0ef8d61ba10fb0fe90da7634d7e13").unwrap(),
		});
		let seed = "99".repeat(32);
		let mut local_keyset = KeySet::from_hex("99", &"11".repeat(32), &"33".repeat(32), &"11".repeat(32), &seed).unwrap();
		local_keyset.set_per_commit_secret_override(
			privkey_expand("1f1e1d1c1b1a191817161514131211100f0e0d0c0b0a09080706050403020100").unwrap(),
		);
		let remote_keyset = KeySet::from_hex(&"22".repeat(32), &"44".repeat(32), "99", &"44".repeat(32), &seed).unwrap();

		let mut c = Commitment::new(
			funding,
			Side::Local,
			CommitmentSide { keyset: local_keyset, to_self_delay: 144, amount_msat: 7_000_000_000, dust_limit_sat: 546 },
			CommitmentSide { keyset: remote_keyset, to_self_delay: 145, amount_msat: 3_000_000_000, dust_limit_sat: 546 },
			15000,
			static_remotekey,
			anchors,
		).unwrap();
		c.commitnum = 42;
		c
	}

	fn five_htlcs() -> Vec<HTLC> {
		[(Side::Remote, 1_000_000), (Side::Remote, 2_000_000), (Side::Local, 2_000_000), (Side::Local, 3_000_000), (Side::Remote, 4_000_000)]
			.iter()
			.enumerate()
			.map(|(i, (owner, amount_msat))| {
				HTLC::new(*owner, *amount_msat, [i as u8; 32], 500 + i as u32, vec![0; ONION_PACKET_LEN]).unwrap()
			})
			.collect()
	}

	#[test]
	fn commitment_number_obscuring() {
		let secp_ctx = Secp256k1::new();
		let opener = PublicKey::from_secret_key(&secp_ctx, &SecretKey::from_slice(&[0x11; 32]).unwrap());
		let non_opener = PublicKey::from_secret_key(&secp_ctx, &SecretKey::from_slice(&[0x44; 32]).unwrap());
		assert_eq!(opener.serialize().as_hex().to_string(), "034f355bdcb7cc0af728ef3cceb9615d90684bb5b2ca5f859ab0f0b704075871aa");
		assert_eq!(Commitment::obscured_commit_num(&opener, &non_opener, 42), 0x2bb038521914 ^ 42);
		for n in [0, 1, 42, 0xffff_ffff_ffff] {
			let obscured = Commitment::obscured_commit_num(&opener, &non_opener, n);
			assert_eq!(Commitment::obscured_commit_num(&opener, &non_opener, obscured), n);
		}
	}

	#[test]
	fn simple_commitment_tx() {
		let c = bolt3_commitment(false, false);
		let fee = c.fee(0);
		assert_eq!(fee, 10860);

		let (to_local, sats) = c.to_local_output(fee, Side::Local);
		assert_eq!(sats, 6989140);
		assert_eq!(
			to_local.as_bytes().as_hex().to_string(),
			"63210212a140cd0c6539d07cd08dfe09984dec3251ea808b892efeac3ede9402bf2b1967029000b2752103fd5960528dc152014952efdb702a88f71e3c1653b2314431701ec77e57fde83c68ac"
		);
		let (to_remote, sats) = c.to_remote_output(fee, Side::Local);
		assert_eq!(sats, 3000000);
		let remotepubkey = PublicKey::from_slice(
			&Vec::<u8>::from_hex("0394854aa6eab5b2a8122cc726e9dded053a2184d88256816826d6231c068d4a5b").unwrap(),
		).unwrap();
		assert_eq!(to_remote, ScriptBuf::new_p2wpkh(&WPubkeyHash::hash(&remotepubkey.serialize())));

		let tx = c.local_unsigned_tx();
		assert_eq!(tx.compute_txid(), txid_of(SIMPLE_COMMIT_TX));
		assert_eq!(c.remote_sig(&tx), sig("3045022100f51d2e566a70ba740fc5d8c0f07b9b93d2ed741c3c0860c613173de7d39e7968022041376d520e9c0e1ad52248ddf4b22e12be8763007df977253ef45a4ca3bdb7c0"));
		assert_eq!(c.local_sig(&tx), sig("3044022051b75c73198c6deee1a875871c3961832909acd297c6b908d59e3319e5185a46022055c419379c5051a78d00dbbce11b5b664a0c22815fbcc6fcef6b1937c3836939"));
		assert_eq!(serialize_hex(&c.signed_tx(&tx)), SIMPLE_COMMIT_TX);
	}

	#[test]
	fn commitment_tx_with_five_htlcs() {
		let mut c = bolt3_commitment(false, false);
		for (i, htlc) in five_htlcs().into_iter().enumerate() {
			assert!(c.add_htlc(htlc, i as u64));
		}
		c.amounts = [6_988_000_000, 3_000_000_000];
		c.feerate = 0;

		let tx = c.local_unsigned_tx();
		assert_eq!(tx.compute_txid(), txid_of(FIVE_HTLCS_COMMIT_TX));
		assert_eq!(c.local_sig(&tx), sig("30440220275b0c325a5e9355650dc30c0eccfbc7efb23987c24b556b9dfdd40effca18d202206caceb2c067836c51f296740c7ae807ffcbfbf1dd3a0d56b6de9a5b247985f06"));
		assert_eq!(c.remote_sig(&tx), sig("304402204fd4928835db1ccdfc40f5c78ce9bd65249b16348df81f0c44328dcdefc97d630220194d3869c38bc732dd87d13d2958015e2fc16829e74cd4377f84d215c0b70606"));

		let expected_htlc_sigs = [
			"304402206a6e59f18764a5bf8d4fa45eebc591566689441229c918b480fb2af8cc6a4aeb02205248f273be447684b33e3c8d1d85a8e0ca9fa0bae9ae33f0527ada9c162919a6",
			"3045022100d5275b3619953cb0c3b5aa577f04bc512380e60fa551762ce3d7a1bb7401cff9022037237ab0dac3fe100cde094e82e2bed9ba0ed1bb40154b48e56aa70f259e608b",
			"304402201b63ec807771baf4fdff523c644080de17f1da478989308ad13a58b51db91d360220568939d38c9ce295adba15665fa68f51d967e8ed14a007b751540a80b325f202",
			"3045022100daee1808f9861b6c3ecd14f7b707eca02dd6bdfc714ba2f33bc8cdba507bb182022026654bf8863af77d74f51f4e0b62d461a019561bb12acb120d3f7195d148a554",
			"304402207e0410e45454b0978a623f36a10626ef17b27d9ad44e2760f98cfa3efb37924f0220220bd8acd43ecaa916a80bd4f919c495a2c58982ce7c8625153f8596692a801d",
		];
		let htlc_sigs = c.htlc_sigs(Side::Remote, Side::Local);
		assert_eq!(htlc_sigs.len(), expected_htlc_sigs.len());
		for (actual, expected) in htlc_sigs.iter().zip(expected_htlc_sigs.iter()) {
			assert_eq!(*actual, sig(expected));
		}
		assert_eq!(serialize_hex(&c.signed_tx(&tx)), FIVE_HTLCS_COMMIT_TX);
	}

	#[test]
	fn htlcs_trim_one_at_a_time() {
		let mut c = bolt3_commitment(false, false);
		for (i, htlc) in five_htlcs().into_iter().enumerate() {
			c.add_htlc(htlc, i as u64);
		}
		// Received HTLCs pay the larger success fee, so the received 2000 sat one goes before the
		// offered one of the same amount.
		for (feerate, untrimmed) in [
			(0, &[0u64, 1, 2, 3, 4][..]),
			(647, &[0, 1, 2, 3, 4]),
			(648, &[1, 2, 3, 4]),
			(2069, &[1, 2, 3, 4]),
			(2070, &[2, 3, 4]),
			(2194, &[2, 3, 4]),
			(2195, &[3, 4]),
			(3702, &[3, 4]),
			(3703, &[4]),
			(4914, &[4]),
			(4915, &[]),
			(9651181, &[]),
		] {
			c.feerate = feerate;
			let mut ids: Vec<u64> = c.untrimmed_htlcs(Side::Local).iter().map(|(id, _)| *id).collect();
			ids.sort_unstable();
			assert_eq!(ids, untrimmed, "feerate {}", feerate);
			let (_, htlc_ids) = c.unsigned_tx(Side::Local);
			let mut output_ids: Vec<u64> = htlc_ids.into_iter().flatten().collect();
			output_ids.sort_unstable();
			assert_eq!(output_ids, untrimmed, "feerate {}", feerate);
		}
	}

	#[test]
	fn htlc_add_and_remove_conserve_funds() {
		let mut c = bolt3_commitment(false, false);
		let before = c.amounts;
		let htlcs = five_htlcs();
		for (i, htlc) in htlcs.iter().enumerate() {
			assert!(c.add_htlc(htlc.clone(), i as u64));
		}
		assert!(!c.add_htlc(htlcs[0].clone(), 0));
		assert_eq!(c.amounts, [before[0] - 5_000_000, before[1] - 7_000_000]);

		for htlc in htlcs.iter() {
			assert!(c.del_htlc(htlc, false));
		}
		assert_eq!(c.amounts, before);
		assert!(!c.del_htlc(&htlcs[0], false));

		assert!(c.add_htlc(htlcs[2].clone(), 7));
		assert!(c.del_htlc(&htlcs[2], true));
		assert_eq!(c.amounts, [before[0] - 2_000_000, before[1] + 2_000_000]);
		assert!(c.get_htlc(7).is_none());
	}

	#[test]
	fn output_order_ignores_insertion_order() {
		let mut forward = bolt3_commitment(false, false);
		let mut backward = bolt3_commitment(false, false);
		let htlcs = five_htlcs();
		for (i, htlc) in htlcs.iter().enumerate() {
			forward.add_htlc(htlc.clone(), i as u64);
		}
		for (i, htlc) in htlcs.iter().rev().enumerate() {
			backward.add_htlc(htlc.clone(), i as u64);
		}
		forward.feerate = 0;
		backward.feerate = 0;
		assert_eq!(forward.local_unsigned_tx(), backward.local_unsigned_tx());
		assert_eq!(forward.htlc_sigs(Side::Remote, Side::Local), backward.htlc_sigs(Side::Remote, Side::Local));

		// The legacy rule puts outputs without a cltv_expiry first.
		forward.ordering = OutputOrdering::LegacyCltvFirst;
		let tx = forward.local_unsigned_tx();
		assert_eq!(tx.output.len(), 7);
		assert!(tx.output[0].value > Amount::from_sat(1_000_000));
	}

	#[test]
	fn htlc_txs_spend_commitment_outputs() {
		let mut c = bolt3_commitment(false, false);
		for (i, htlc) in five_htlcs().into_iter().enumerate() {
			c.add_htlc(htlc, i as u64);
		}
		c.feerate = 0;
		let commit_tx = c.local_unsigned_tx();
		let htlc_txs = c.htlc_txs(Side::Local);
		assert_eq!(htlc_txs.len(), 5);
		for htlc_tx in htlc_txs.iter() {
			let prevout = htlc_tx.tx.input[0].previous_output;
			assert_eq!(prevout.txid, commit_tx.compute_txid());
			assert_eq!(commit_tx.output[prevout.vout as usize].script_pubkey, htlc_tx.redeemscript.to_p2wsh());
			assert_eq!(htlc_tx.tx.input[0].sequence, Sequence(0));
		}
		// Offered HTLCs time out at their expiry, received ones have no locktime.
		assert!(htlc_txs.iter().any(|t| t.tx.lock_time == absolute::LockTime::from_consensus(502)));
		assert!(htlc_txs.iter().any(|t| t.tx.lock_time == absolute::LockTime::ZERO));
	}

	#[test]
	fn anchors_add_outputs_and_fees() {
		assert!(Commitment::new(
			bolt3_commitment(false, false).funding,
			Side::Local,
			CommitmentSide { keyset: bolt3_commitment(false, false).keyset[0].clone(), to_self_delay: 144, amount_msat: 0, dust_limit_sat: 546 },
			CommitmentSide { keyset: bolt3_commitment(false, false).keyset[1].clone(), to_self_delay: 144, amount_msat: 0, dust_limit_sat: 546 },
			253,
			false,
			true,
		).is_err());

		let c = bolt3_commitment(true, true);
		assert_eq!(c.fee(0), 1124 * 15000 / 1000 + 660);
		let tx = c.local_unsigned_tx();
		assert_eq!(tx.output.len(), 4);
		assert_eq!(tx.output.iter().filter(|o| o.value == Amount::from_sat(ANCHOR_OUTPUT_VALUE_SATOSHI)).count(), 2);
		// With static_remotekey, to_remote pays the raw payment basepoint.
		assert_eq!(c.to_remote_pubkey(Side::Local), c.keyset[1].payment_basepoint(&Secp256k1::new()));
	}

	#[test]
	fn channel_id_v2_is_symmetric() {
		let c = bolt3_commitment(false, false);
		let mut swapped = c.clone();
		swapped.keyset.swap(0, 1);
		assert_eq!(c.channel_id_v2(), swapped.channel_id_v2());
		assert_ne!(c.channel_id_v2(), [0; 32]);
	}
}
