// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Per-side channel key material: the four basepoint secrets and the shachain seed from which
//! per-commitment secrets are derived.

use bitcoin::hashes::sha256::Hash as Sha256;
use bitcoin::hashes::Hash;
use bitcoin::hex::FromHex;
use bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey, Signing};

use crate::prelude::*;
use crate::util::errors::DecodeError;

/// The largest commitment number a shachain of 48 bits can produce a secret for.
pub const MAX_COMMITMENT_NUMBER: u64 = (1 << 48) - 1;

/// Build the commitment secret from the seed and the shachain index.
pub fn build_commitment_secret(commitment_seed: &[u8; 32], idx: u64) -> [u8; 32] {
	let mut res: [u8; 32] = commitment_seed.clone();
	for i in 0..48 {
		let bitpos = 47 - i;
		if idx & (1 << bitpos) == (1 << bitpos) {
			res[bitpos / 8] ^= 1 << (bitpos & 7);
			res = Sha256::hash(&res).to_byte_array();
		}
	}
	res
}

/// Parses a hex private key, left-padding it with zero bytes to 32 bytes, so that scripts may
/// write the synthetic key `0x01` as `"01"`.
pub fn privkey_expand(secret: &str) -> Result<SecretKey, DecodeError> {
	let bytes = Vec::<u8>::from_hex(secret)
		.map_err(|_| DecodeError::InvalidValue(format!("{} is not a hex private key", secret)))?;
	if bytes.len() > 32 {
		return Err(DecodeError::InvalidValue(format!("{} is longer than 32 bytes", secret)));
	}
	let mut padded = [0u8; 32];
	padded[32 - bytes.len()..].copy_from_slice(&bytes);
	SecretKey::from_slice(&padded)
		.map_err(|_| DecodeError::InvalidValue(format!("{} is not a valid private key", secret)))
}

/// The basepoint secrets and shachain seed of one channel participant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeySet {
	/// The secret behind `revocation_basepoint`.
	pub revocation_base_secret: SecretKey,
	/// The secret behind `payment_basepoint`.
	pub payment_base_secret: SecretKey,
	/// The secret behind `delayed_payment_basepoint`.
	pub delayed_payment_base_secret: SecretKey,
	/// The secret behind `htlc_basepoint`.
	pub htlc_base_secret: SecretKey,
	/// The seed of the per-commitment secret chain.
	pub shachain_seed: [u8; 32],
	per_commit_secret_override: Option<SecretKey>,
}

impl KeySet {
	/// Creates a key set from its secrets.
	pub fn new(
		revocation_base_secret: SecretKey, payment_base_secret: SecretKey,
		delayed_payment_base_secret: SecretKey, htlc_base_secret: SecretKey, shachain_seed: [u8; 32],
	) -> Self {
		KeySet {
			revocation_base_secret,
			payment_base_secret,
			delayed_payment_base_secret,
			htlc_base_secret,
			shachain_seed,
			per_commit_secret_override: None,
		}
	}

	/// Creates a key set from hex secrets, each padded as by [`privkey_expand`]. The seed must be
	/// exactly 32 bytes.
	pub fn from_hex(
		revocation_base_secret: &str, payment_base_secret: &str,
		delayed_payment_base_secret: &str, htlc_base_secret: &str, shachain_seed: &str,
	) -> Result<Self, DecodeError> {
		let seed = <[u8; 32]>::from_hex(shachain_seed)
			.map_err(|_| DecodeError::InvalidValue(format!("{} is not a 32-byte seed", shachain_seed)))?;
		Ok(KeySet::new(
			privkey_expand(revocation_base_secret)?,
			privkey_expand(payment_base_secret)?,
			privkey_expand(delayed_payment_base_secret)?,
			privkey_expand(htlc_base_secret)?,
			seed,
		))
	}

	/// Makes every per-commitment secret equal `secret`, regardless of commitment number. Used to
	/// reproduce published test vectors, which fix the secret rather than the seed.
	pub fn set_per_commit_secret_override(&mut self, secret: SecretKey) {
		self.per_commit_secret_override = Some(secret);
	}

	/// The per-commitment secret for commitment number `n`.
	///
	/// `n` must not exceed [`MAX_COMMITMENT_NUMBER`].
	pub fn per_commit_secret(&self, n: u64) -> SecretKey {
		debug_assert!(n <= MAX_COMMITMENT_NUMBER);
		if let Some(secret) = self.per_commit_secret_override {
			return secret;
		}
		let raw = build_commitment_secret(&self.shachain_seed, MAX_COMMITMENT_NUMBER - (n & MAX_COMMITMENT_NUMBER));
		SecretKey::from_slice(&raw).expect("Hashes should always be valid keys unless SHA-256 is broken")
	}

	/// The per-commitment point for commitment number `n`.
	pub fn per_commit_point<T: Signing>(&self, secp_ctx: &Secp256k1<T>, n: u64) -> PublicKey {
		PublicKey::from_secret_key(secp_ctx, &self.per_commit_secret(n))
	}

	/// The revocation basepoint.
	pub fn revocation_basepoint<T: Signing>(&self, secp_ctx: &Secp256k1<T>) -> PublicKey {
		PublicKey::from_secret_key(secp_ctx, &self.revocation_base_secret)
	}

	/// The payment basepoint.
	pub fn payment_basepoint<T: Signing>(&self, secp_ctx: &Secp256k1<T>) -> PublicKey {
		PublicKey::from_secret_key(secp_ctx, &self.payment_base_secret)
	}

	/// The delayed payment basepoint.
	pub fn delayed_payment_basepoint<T: Signing>(&self, secp_ctx: &Secp256k1<T>) -> PublicKey {
		PublicKey::from_secret_key(secp_ctx, &self.delayed_payment_base_secret)
	}

	/// The HTLC basepoint.
	pub fn htlc_basepoint<T: Signing>(&self, secp_ctx: &Secp256k1<T>) -> PublicKey {
		PublicKey::from_secret_key(secp_ctx, &self.htlc_base_secret)
	}
}
