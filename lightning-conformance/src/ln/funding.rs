// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! The funding output of a channel and everything derived from it: the 2-of-2 scripts, the
//! channel id and the signed gossip messages announcing the channel.

use bitcoin::blockdata::opcodes;
use bitcoin::blockdata::script::{Builder, ScriptBuf};
use bitcoin::consensus::encode::serialize_hex;
use bitcoin::hashes::sha256d::Hash as Sha256dHash;
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::{self, All, PublicKey, Secp256k1, SecretKey};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::transaction::{self, Transaction, TxIn, TxOut};
use bitcoin::{absolute, Amount, OutPoint, Sequence, Txid, WPubkeyHash, Witness};

use crate::ln::msgs::{FieldValue, Message};
use crate::ln::signature::Sig;
use crate::ln::wire::Namespace;
use crate::ln::Side;
use crate::prelude::*;
use crate::util::errors::DecodeError;
use crate::util::scid_utils::ShortChannelId;

/// The genesis block hash of regtest, in the byte order it takes in messages.
pub const REGTEST_CHAIN_HASH: [u8; 32] = [
	0x06, 0x22, 0x6e, 0x46, 0x11, 0x1a, 0x0b, 0x59,
	0xca, 0xaf, 0x12, 0x60, 0x43, 0xeb, 0x5b, 0xbf,
	0x28, 0xc3, 0x4f, 0x3a, 0x5e, 0x33, 0x2a, 0x1f,
	0xc7, 0xb2, 0xb7, 0x3c, 0xf1, 0x88, 0x91, 0x0f,
];

/// The node and funding private keys of both sides of a channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FundingKeys {
	/// The node key of the test engine.
	pub local_node_privkey: SecretKey,
	/// The funding key of the test engine.
	pub local_funding_privkey: SecretKey,
	/// The node key of the node under test.
	pub remote_node_privkey: SecretKey,
	/// The funding key of the node under test.
	pub remote_funding_privkey: SecretKey,
}

/// The fields of a `channel_update` which are not derived from the [`Funding`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelUpdateFields {
	/// The channel being updated.
	pub short_channel_id: ShortChannelId,
	/// The side whose node signs the update.
	pub side: Side,
	/// Sets the `disable` bit of `channel_flags`.
	pub disable: bool,
	/// `cltv_expiry_delta`.
	pub cltv_expiry_delta: u16,
	/// `htlc_minimum_msat`.
	pub htlc_minimum_msat: u64,
	/// `fee_base_msat`.
	pub fee_base_msat: u32,
	/// `fee_proportional_millionths`.
	pub fee_proportional_millionths: u32,
	/// `timestamp`.
	pub timestamp: u32,
	/// `htlc_maximum_msat`, omitted from the message when `None`.
	pub htlc_maximum_msat: Option<u64>,
}

/// The offset of the signed part of a `channel_announcement`: the type and four signatures.
const CHANNEL_ANNOUNCEMENT_SIGNED_OFFSET: usize = 2 + 4 * 64;
/// The offset of the signed part of `channel_update` and `node_announcement`.
const SINGLE_SIG_SIGNED_OFFSET: usize = 2 + 64;

/// A channel's funding output and the keys which control it.
#[derive(Clone)]
pub struct Funding {
	/// The genesis hash of the chain the channel lives on.
	pub chain_hash: [u8; 32],
	/// The funding transaction id.
	pub txid: Txid,
	/// The index of the funding output.
	pub output_index: u16,
	/// The value of the funding output, in satoshis.
	pub amount: u64,
	/// The locktime of the funding transaction.
	pub locktime: u32,
	bitcoin_privkeys: [SecretKey; 2],
	node_privkeys: [SecretKey; 2],
	tx: Option<Transaction>,
	secp_ctx: Secp256k1<All>,
}

impl Funding {
	/// Describes an existing funding output, on regtest.
	pub fn new(txid: Txid, output_index: u16, amount: u64, keys: FundingKeys) -> Self {
		Funding {
			chain_hash: REGTEST_CHAIN_HASH,
			txid,
			output_index,
			amount,
			locktime: 0,
			bitcoin_privkeys: [keys.local_funding_privkey, keys.remote_funding_privkey],
			node_privkeys: [keys.local_node_privkey, keys.remote_node_privkey],
			tx: None,
			secp_ctx: Secp256k1::new(),
		}
	}

	/// Moves the channel to another chain.
	pub fn with_chain_hash(mut self, chain_hash: [u8; 32]) -> Self {
		self.chain_hash = chain_hash;
		self
	}

	/// Builds and signs a version 2 transaction spending the P2WPKH output `txid_in:tx_index_in`
	/// of `sats` (controlled by `privkey`) into a funding output of `sats - fee`. Returns the
	/// funding and the signed transaction hex.
	pub fn from_utxo(
		txid_in: Txid, tx_index_in: u32, sats: u64, privkey: &SecretKey, fee: u64, keys: FundingKeys,
	) -> Result<(Funding, String), DecodeError> {
		let amount = sats.checked_sub(fee).ok_or_else(|| {
			DecodeError::InvalidValue(format!("fee {} exceeds input of {} sats", fee, sats))
		})?;
		let mut funding = Funding::new(Txid::all_zeros(), 0, amount, keys);

		let mut tx = Transaction {
			version: transaction::Version::TWO,
			lock_time: absolute::LockTime::from_consensus(funding.locktime),
			input: vec![TxIn {
				previous_output: OutPoint { txid: txid_in, vout: tx_index_in },
				script_sig: ScriptBuf::new(),
				// RBF-able, as dual-funded opens require
				sequence: Sequence(0xfffffffd),
				witness: Witness::new(),
			}],
			output: vec![TxOut { value: Amount::from_sat(amount), script_pubkey: funding.locking_script() }],
		};

		let inkey_pub = PublicKey::from_secret_key(&funding.secp_ctx, privkey);
		let spent_script = ScriptBuf::new_p2wpkh(&WPubkeyHash::hash(&inkey_pub.serialize()));
		let sighash = SighashCache::new(&tx)
			.p2wpkh_signature_hash(0, &spent_script, Amount::from_sat(sats), EcdsaSighashType::All)
			.expect("The funding transaction has exactly one input");
		let sig = funding.secp_ctx.sign_ecdsa(&secp256k1::Message::from_digest(sighash.to_byte_array()), privkey);
		tx.input[0].witness.push(sighash_all_der(&sig));
		tx.input[0].witness.push(inkey_pub.serialize());

		funding.txid = tx.compute_txid();
		let hex = serialize_hex(&tx);
		funding.tx = Some(tx);
		Ok((funding, hex))
	}

	/// The funding transaction, if this funding built it.
	pub fn tx_hex(&self) -> Option<String> {
		self.tx.as_ref().map(serialize_hex)
	}

	/// The funding txid in the byte order it takes in messages.
	pub fn txid_bytes(&self) -> [u8; 32] {
		self.txid.to_byte_array()
	}

	/// Orders `(val_one, val_two)` by the compressed encodings of `key_one` and `key_two`,
	/// lesser first. The result depends only on the key bytes, never on argument order.
	pub fn sort_by_keys<T>(key_one: &PublicKey, key_two: &PublicKey, val_one: T, val_two: T) -> (T, T) {
		if key_one.serialize()[..] < key_two.serialize()[..] {
			(val_one, val_two)
		} else {
			(val_two, val_one)
		}
	}

	/// The funding public key of `side`.
	pub fn funding_pubkey(&self, side: Side) -> PublicKey {
		PublicKey::from_secret_key(&self.secp_ctx, &self.bitcoin_privkeys[side.idx()])
	}

	/// The funding private key of `side`.
	pub fn funding_privkey(&self, side: Side) -> &SecretKey {
		&self.bitcoin_privkeys[side.idx()]
	}

	/// The node id of `side`.
	pub fn node_id(&self, side: Side) -> PublicKey {
		PublicKey::from_secret_key(&self.secp_ctx, &self.node_privkeys[side.idx()])
	}

	/// The node private key of `side`.
	pub fn node_privkey(&self, side: Side) -> &SecretKey {
		&self.node_privkeys[side.idx()]
	}

	/// Orders `(local, remote)` the way BOLT #7 orders `node_id_1` and `node_id_2`.
	pub fn node_id_sort<T>(&self, local: T, remote: T) -> (T, T) {
		Funding::sort_by_keys(&self.node_id(Side::Local), &self.node_id(Side::Remote), local, remote)
	}

	/// The funding public keys in redeemscript order.
	pub fn funding_pubkeys_for_tx(&self) -> (PublicKey, PublicKey) {
		let (local, remote) = (self.funding_pubkey(Side::Local), self.funding_pubkey(Side::Remote));
		Funding::sort_by_keys(&local, &remote, local, remote)
	}

	/// The funding private keys in redeemscript order.
	pub fn funding_privkeys_for_tx(&self) -> (&SecretKey, &SecretKey) {
		Funding::sort_by_keys(
			&self.funding_pubkey(Side::Local),
			&self.funding_pubkey(Side::Remote),
			&self.bitcoin_privkeys[0],
			&self.bitcoin_privkeys[1],
		)
	}

	/// The node ids, lesser first.
	pub fn node_ids(&self) -> (PublicKey, PublicKey) {
		self.node_id_sort(self.node_id(Side::Local), self.node_id(Side::Remote))
	}

	/// The node private keys in node id order.
	pub fn node_id_privkeys(&self) -> (&SecretKey, &SecretKey) {
		self.node_id_sort(&self.node_privkeys[0], &self.node_privkeys[1])
	}

	/// The funding public keys in node id order, as `bitcoin_key_1` and `bitcoin_key_2`.
	pub fn funding_pubkeys_for_gossip(&self) -> (PublicKey, PublicKey) {
		self.node_id_sort(self.funding_pubkey(Side::Local), self.funding_pubkey(Side::Remote))
	}

	/// The funding private keys in node id order.
	pub fn funding_privkeys_for_gossip(&self) -> (&SecretKey, &SecretKey) {
		self.node_id_sort(&self.bitcoin_privkeys[0], &self.bitcoin_privkeys[1])
	}

	/// `2 <pubkey1> <pubkey2> 2 OP_CHECKMULTISIG` with the lesser key first, whatever the
	/// argument order.
	pub fn redeemscript_keys(key_one: &PublicKey, key_two: &PublicKey) -> ScriptBuf {
		let (first, second) = Funding::sort_by_keys(key_one, key_two, key_one, key_two);
		Builder::new()
			.push_opcode(opcodes::all::OP_PUSHNUM_2)
			.push_slice(first.serialize())
			.push_slice(second.serialize())
			.push_opcode(opcodes::all::OP_PUSHNUM_2)
			.push_opcode(opcodes::all::OP_CHECKMULTISIG)
			.into_script()
	}

	/// The witness script of the funding output.
	pub fn redeemscript(&self) -> ScriptBuf {
		let (a, b) = self.funding_pubkeys_for_tx();
		Funding::redeemscript_keys(&a, &b)
	}

	/// The P2WSH script of the funding output.
	pub fn locking_script(&self) -> ScriptBuf {
		self.redeemscript().to_p2wsh()
	}

	/// The funding txid with the output index XORed into its last two bytes.
	pub fn channel_id(&self) -> [u8; 32] {
		let mut chan_id = self.txid_bytes();
		chan_id[30] ^= (self.output_index >> 8) as u8;
		chan_id[31] ^= (self.output_index & 0xff) as u8;
		chan_id
	}

	/// Signs `digest` with each of `keys`, returning DER signatures with the sighash byte.
	fn sign_all(&self, digest: [u8; 32], keys: &[&SecretKey]) -> Vec<Vec<u8>> {
		let msg = secp256k1::Message::from_digest(digest);
		keys.iter().map(|key| sighash_all_der(&self.secp_ctx.sign_ecdsa(&msg, key))).collect()
	}

	/// A mutual close paying `amount - fee` to the P2WPKH of `dest_privkey`'s public key, signed
	/// by both funding keys. Returns the transaction hex.
	pub fn close_tx(&self, fee: u64, dest_privkey: &SecretKey) -> Result<String, DecodeError> {
		let value = self.amount.checked_sub(fee).ok_or_else(|| {
			DecodeError::InvalidValue(format!("fee {} exceeds funding of {} sats", fee, self.amount))
		})?;
		let dest = PublicKey::from_secret_key(&self.secp_ctx, dest_privkey);
		let mut tx = Transaction {
			version: transaction::Version::TWO,
			lock_time: absolute::LockTime::ZERO,
			input: vec![TxIn {
				previous_output: OutPoint { txid: self.txid, vout: self.output_index as u32 },
				script_sig: ScriptBuf::new(),
				sequence: Sequence::MAX,
				witness: Witness::new(),
			}],
			output: vec![TxOut {
				value: Amount::from_sat(value),
				script_pubkey: ScriptBuf::new_p2wpkh(&WPubkeyHash::hash(&dest.serialize())),
			}],
		};
		let redeemscript = self.redeemscript();
		let sighash = SighashCache::new(&tx)
			.p2wsh_signature_hash(0, &redeemscript, Amount::from_sat(self.amount), EcdsaSighashType::All)
			.expect("The closing transaction has exactly one input");
		let (key_a, key_b) = self.funding_privkeys_for_tx();
		let sigs = self.sign_all(sighash.to_byte_array(), &[key_a, key_b]);
		let witness = &mut tx.input[0].witness;
		witness.push(Vec::<u8>::new());
		for sig in sigs {
			witness.push(sig);
		}
		witness.push(redeemscript.as_bytes());
		Ok(serialize_hex(&tx))
	}

	/// Encodes `msg`, hashes everything from `offset` on with double-SHA256 and returns the hash.
	fn gossip_hash(namespace: &Namespace, msg: &Message, offset: usize) -> Result<[u8; 32], DecodeError> {
		let buf = namespace.encode(msg)?;
		if buf.len() < offset {
			return Err(DecodeError::ShortRead);
		}
		Ok(Sha256dHash::hash(&buf[offset..]).to_byte_array())
	}

	/// A signed `channel_announcement` for this channel.
	pub fn channel_announcement(
		&self, namespace: &Namespace, short_channel_id: ShortChannelId, features: Vec<u8>,
	) -> Result<Message, DecodeError> {
		let (node_id_1, node_id_2) = self.node_ids();
		let (bitcoin_key_1, bitcoin_key_2) = self.funding_pubkeys_for_gossip();
		let placeholder = Sig::raw([0; 64]);
		let mut ann = Message::new("channel_announcement")
			.with("node_signature_1", placeholder.clone())
			.with("node_signature_2", placeholder.clone())
			.with("bitcoin_signature_1", placeholder.clone())
			.with("bitcoin_signature_2", placeholder)
			.with("features", features)
			.with("chain_hash", self.chain_hash.to_vec())
			.with("short_channel_id", short_channel_id)
			.with("node_id_1", node_id_1)
			.with("node_id_2", node_id_2)
			.with("bitcoin_key_1", bitcoin_key_1)
			.with("bitcoin_key_2", bitcoin_key_2);
		let h = Funding::gossip_hash(namespace, &ann, CHANNEL_ANNOUNCEMENT_SIGNED_OFFSET)?;

		let (node_key_1, node_key_2) = self.node_id_privkeys();
		let (bitcoin_privkey_1, bitcoin_privkey_2) = self.funding_privkeys_for_gossip();
		for (field, key) in [
			("node_signature_1", node_key_1),
			("node_signature_2", node_key_2),
			("bitcoin_signature_1", bitcoin_privkey_1),
			("bitcoin_signature_2", bitcoin_privkey_2),
		] {
			ann.fields.insert(field.to_owned(), FieldValue::Sig(Sig::lazy(*key, h)));
		}
		Ok(ann)
	}

	/// A `channel_update` signed by `fields.side`.
	pub fn channel_update(&self, namespace: &Namespace, fields: &ChannelUpdateFields) -> Result<Message, DecodeError> {
		let mut channel_flags = if self.node_id(fields.side) == self.node_ids().0 { 0u8 } else { 1 };
		if fields.disable {
			channel_flags |= 2;
		}
		let message_flags = if fields.htlc_maximum_msat.is_some() { 1u8 } else { 0 };

		let mut update = Message::new("channel_update")
			.with("signature", Sig::raw([0; 64]))
			.with("chain_hash", self.chain_hash.to_vec())
			.with("short_channel_id", fields.short_channel_id)
			.with("timestamp", fields.timestamp)
			.with("message_flags", message_flags)
			.with("channel_flags", channel_flags)
			.with("cltv_expiry_delta", fields.cltv_expiry_delta)
			.with("htlc_minimum_msat", fields.htlc_minimum_msat)
			.with("fee_base_msat", fields.fee_base_msat)
			.with("fee_proportional_millionths", fields.fee_proportional_millionths);
		if let Some(max) = fields.htlc_maximum_msat {
			update = update.with("htlc_maximum_msat", max);
		}
		let h = Funding::gossip_hash(namespace, &update, SINGLE_SIG_SIGNED_OFFSET)?;
		update.fields.insert("signature".to_owned(), FieldValue::Sig(Sig::lazy(*self.node_privkey(fields.side), h)));
		Ok(update)
	}

	/// A `node_announcement` for `side`, signed by its node key. `alias` is padded with zero
	/// bytes to 32 bytes.
	pub fn node_announcement(
		&self, namespace: &Namespace, side: Side, features: Vec<u8>, rgb_color: [u8; 3], alias: &str,
		addresses: Vec<u8>, timestamp: u32,
	) -> Result<Message, DecodeError> {
		if alias.len() > 32 {
			return Err(DecodeError::InvalidValue(format!("alias {} is longer than 32 bytes", alias)));
		}
		let mut alias_bytes = alias.as_bytes().to_vec();
		alias_bytes.resize(32, 0);
		let mut ann = Message::new("node_announcement")
			.with("signature", Sig::raw([0; 64]))
			.with("features", features)
			.with("timestamp", timestamp)
			.with("node_id", self.node_id(side))
			.with("rgb_color", rgb_color.to_vec())
			.with("alias", alias_bytes)
			.with("addresses", addresses);
		let h = Funding::gossip_hash(namespace, &ann, SINGLE_SIG_SIGNED_OFFSET)?;
		ann.fields.insert("signature".to_owned(), FieldValue::Sig(Sig::lazy(*self.node_privkey(side), h)));
		Ok(ann)
	}
}

/// A DER signature followed by the `SIGHASH_ALL` byte, as pushed in a witness.
pub(crate) fn sighash_all_der(sig: &secp256k1::ecdsa::Signature) -> Vec<u8> {
	let mut res = sig.serialize_der().to_vec();
	res.push(EcdsaSighashType::All as u8);
	res
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::ln::keyset::privkey_expand;
	use bitcoin::hex::{DisplayHex, FromHex};

	fn bolt3_keys() -> FundingKeys {
		FundingKeys {
			local_node_privkey: privkey_expand("01").unwrap(),
			local_funding_privkey: privkey_expand("30ff4956bbdd3222d44cc5e8a1261dab1e07957bdac5ae88fe3261ef321f3749").unwrap(),
			remote_node_privkey: privkey_expand("02").unwrap(),
			remote_funding_privkey: privkey_expand("1552dfba4f6cf29a62a0af13c8d6981d36d0ef8d61ba10fb0fe90da7634d7e13").unwrap(),
		}
	}

	fn bolt3_funding() -> Funding {
		let txid = <[u8; 32]>::from_hex("bef67e4e2fb9ddeeb3461973cd4c62abb35050b1add772995b820b584a488489").unwrap();
		Funding::new(Txid::from_byte_array(txid), 0, 10_000_000, bolt3_keys())
	}

	#[test]
	fn funding_redeemscript() {
		let funding = bolt3_funding();
		assert_eq!(
			funding.redeemscript().as_bytes().as_hex().to_string(),
			"5221023da092f6980e58d2c037173180e9a465476026ee50f96695963e8efe436f54eb21030e9f7b623d2ccc7c9bd44d66d5ce21ce504c0acf6385a132cec6d3c39fa711c152ae"
		);
		assert!(funding.locking_script().is_p2wsh());
	}

	#[test]
	fn key_sort_ignores_argument_order() {
		let funding = bolt3_funding();
		let local = funding.funding_pubkey(Side::Local);
		let remote = funding.funding_pubkey(Side::Remote);
		assert_eq!(Funding::sort_by_keys(&local, &remote, 1, 2), (1, 2));
		assert_eq!(Funding::sort_by_keys(&remote, &local, 2, 1), (1, 2));
		assert_eq!(
			Funding::redeemscript_keys(&local, &remote),
			Funding::redeemscript_keys(&remote, &local)
		);
		let (first, second) = funding.node_ids();
		assert!(first.serialize()[..] < second.serialize()[..]);
		assert_eq!(funding.node_id_sort("local", "remote"), if first == funding.node_id(Side::Local) {
			("local", "remote")
		} else {
			("remote", "local")
		});
	}

	#[test]
	fn channel_id_xors_output_index() {
		let mut funding = bolt3_funding();
		assert_eq!(funding.channel_id(), funding.txid_bytes());
		funding.output_index = 0x0102;
		let chan_id = funding.channel_id();
		assert_eq!(chan_id[..30], funding.txid_bytes()[..30]);
		assert_eq!(chan_id[30], funding.txid_bytes()[30] ^ 0x01);
		assert_eq!(chan_id[31], funding.txid_bytes()[31] ^ 0x02);
	}

	#[test]
	fn announcement_signatures_verify() {
		let ns = Namespace::bolts();
		let funding = bolt3_funding();
		let scid = ShortChannelId::from_parts(103, 1, 0).unwrap();
		let ann = funding.channel_announcement(&ns, scid, Vec::new()).unwrap();

		let bytes = ns.encode(&ann).unwrap();
		let h = Sha256dHash::hash(&bytes[CHANNEL_ANNOUNCEMENT_SIGNED_OFFSET..]).to_byte_array();
		let secp_ctx = Secp256k1::new();
		let msg = secp256k1::Message::from_digest(h);
		let (node_id_1, _) = funding.node_ids();
		let sig = secp256k1::ecdsa::Signature::from_compact(&bytes[2..66]).unwrap();
		assert!(secp_ctx.verify_ecdsa(&msg, &sig, &node_id_1).is_ok());

		// The decoded form compares equal to the lazily-signed one.
		let decoded = ns.decode(&bytes).unwrap();
		assert_eq!(decoded.get("node_signature_2"), ann.get("node_signature_2"));
		assert_eq!(decoded.get("short_channel_id").unwrap().to_string(), "103x1x0");
	}

	#[test]
	fn channel_update_flags() {
		let ns = Namespace::bolts();
		let funding = bolt3_funding();
		let mut fields = ChannelUpdateFields {
			short_channel_id: ShortChannelId::from_parts(103, 1, 0).unwrap(),
			side: Side::Local,
			disable: true,
			cltv_expiry_delta: 6,
			htlc_minimum_msat: 0,
			fee_base_msat: 1000,
			fee_proportional_millionths: 10,
			timestamp: 1_600_000_000,
			htlc_maximum_msat: None,
		};
		let local_is_first = funding.node_ids().0 == funding.node_id(Side::Local);
		let update = funding.channel_update(&ns, &fields).unwrap();
		let direction = if local_is_first { 0 } else { 1 };
		assert_eq!(update.get("channel_flags"), Some(&FieldValue::Int(direction | 2)));
		assert_eq!(update.get("message_flags"), Some(&FieldValue::Int(0)));
		assert!(update.get("htlc_maximum_msat").is_none());

		fields.side = Side::Remote;
		fields.disable = false;
		fields.htlc_maximum_msat = Some(10_000_000);
		let update = funding.channel_update(&ns, &fields).unwrap();
		assert_eq!(update.get("channel_flags"), Some(&FieldValue::Int(1 - direction)));
		assert_eq!(update.get("message_flags"), Some(&FieldValue::Int(1)));
		assert_eq!(ns.encode(&update).unwrap().len(), 2 + 64 + 32 + 8 + 4 + 1 + 1 + 2 + 8 + 4 + 4 + 8);
	}

	#[test]
	fn node_announcement_pads_alias() {
		let ns = Namespace::bolts();
		let funding = bolt3_funding();
		let ann = funding.node_announcement(&ns, Side::Remote, Vec::new(), [1, 2, 3], "tester", Vec::new(), 1).unwrap();
		let mut alias = b"tester".to_vec();
		alias.resize(32, 0);
		assert_eq!(ann.get("alias"), Some(&FieldValue::Bytes(alias)));
		assert_eq!(ann.get("node_id"), Some(&FieldValue::Point(funding.node_id(Side::Remote))));
		assert!(funding.node_announcement(&ns, Side::Remote, Vec::new(), [0; 3], &"x".repeat(33), Vec::new(), 1).is_err());
	}

	#[test]
	fn utxo_funding_and_close() {
		let spending_key = privkey_expand("76edf0c303b9e692da9cb491abedef46ca5b81d32f102eb4648461b239cb0f99").unwrap();
		let txid_in = Txid::from_byte_array([0x42; 32]);
		let (funding, tx_hex) = Funding::from_utxo(txid_in, 1, 1_000_000, &spending_key, 500, bolt3_keys()).unwrap();
		assert_eq!(funding.amount, 999_500);
		assert_eq!(funding.output_index, 0);
		assert_eq!(funding.tx_hex(), Some(tx_hex.clone()));

		let tx: Transaction = bitcoin::consensus::encode::deserialize(&Vec::<u8>::from_hex(&tx_hex).unwrap()).unwrap();
		assert_eq!(tx.compute_txid(), funding.txid);
		assert_eq!(tx.input[0].sequence, Sequence(0xfffffffd));
		assert_eq!(tx.input[0].witness.len(), 2);
		assert_eq!(tx.output[0].script_pubkey, funding.locking_script());
		assert_eq!(tx.output[0].value, Amount::from_sat(999_500));

		let dest = privkey_expand("05").unwrap();
		let close: Transaction = bitcoin::consensus::encode::deserialize(
			&Vec::<u8>::from_hex(&funding.close_tx(300, &dest).unwrap()).unwrap(),
		).unwrap();
		assert_eq!(close.input[0].previous_output, OutPoint { txid: funding.txid, vout: 0 });
		assert_eq!(close.input[0].witness.len(), 4);
		assert_eq!(close.output[0].value, Amount::from_sat(999_200));
		assert!(funding.close_tx(1_000_000, &dest).is_err());
		assert!(Funding::from_utxo(txid_in, 1, 100, &spending_key, 500, bolt3_keys()).is_err());
	}
}
