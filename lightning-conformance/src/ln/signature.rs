// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Signatures as they appear in message fields.
//!
//! A [`Sig`] is either the 64 raw bytes read off the wire or a private key and digest which
//! will be signed when the bytes are first needed. The two compare equal when the raw bytes are
//! a valid signature of the digest by that key, so an expected message may carry the key and
//! digest while the node under test is free to produce any valid signature.

use bitcoin::hex::{DisplayHex, FromHex};
use bitcoin::secp256k1::ecdsa::Signature;
use bitcoin::secp256k1::{Message, PublicKey, Secp256k1, SecretKey};

use core::cell::OnceCell;
use core::fmt;
use core::str::FromStr;

use crate::ln::keyset::privkey_expand;
use crate::prelude::*;
use crate::util::errors::DecodeError;

#[derive(Clone)]
enum SigInner {
	Raw([u8; 64]),
	Lazy { privkey: SecretKey, digest: [u8; 32], signed: OnceCell<[u8; 64]> },
}

/// The value of a `signature` field.
#[derive(Clone)]
pub struct Sig {
	inner: SigInner,
}

impl Sig {
	/// A signature with the given 64-byte compact encoding.
	pub fn raw(bytes: [u8; 64]) -> Self {
		Sig { inner: SigInner::Raw(bytes) }
	}

	/// The signature of `digest` by `privkey`, computed on first use.
	pub fn lazy(privkey: SecretKey, digest: [u8; 32]) -> Self {
		Sig { inner: SigInner::Lazy { privkey, digest, signed: OnceCell::new() } }
	}

	/// Like [`Sig::lazy`], taking a short hex private key and a 32-byte hex digest.
	pub fn lazy_from_hex(privkey: &str, digest: &str) -> Result<Self, DecodeError> {
		let digest = <[u8; 32]>::from_hex(digest)
			.map_err(|_| DecodeError::InvalidValue(format!("{} is not a 32-byte digest", digest)))?;
		Ok(Sig::lazy(privkey_expand(privkey)?, digest))
	}

	/// Parses a DER-encoded signature into its compact form.
	pub fn from_der(der: &[u8]) -> Result<Self, DecodeError> {
		let sig = Signature::from_der_lax(der).map_err(|_| {
			DecodeError::InvalidValue(format!("{} is not a DER signature", der.as_hex()))
		})?;
		Ok(Sig::raw(sig.serialize_compact()))
	}

	/// The DER encoding of this signature, without any sighash byte.
	pub fn to_der(&self) -> Result<Vec<u8>, DecodeError> {
		let sig = Signature::from_compact(&self.to_compact())
			.map_err(|_| DecodeError::InvalidValue("signature overflows the curve order".to_owned()))?;
		Ok(sig.serialize_der().to_vec())
	}

	/// The 64-byte compact encoding, as carried in messages. A lazy signature is signed
	/// (deterministically, low-S) the first time this is called.
	pub fn to_compact(&self) -> [u8; 64] {
		match &self.inner {
			SigInner::Raw(bytes) => *bytes,
			SigInner::Lazy { privkey, digest, signed } => *signed.get_or_init(|| {
				let secp_ctx = Secp256k1::signing_only();
				secp_ctx.sign_ecdsa(&Message::from_digest(*digest), privkey).serialize_compact()
			}),
		}
	}

	/// Whether `raw` is a valid signature of `digest` by `privkey`.
	fn verifies(raw: &[u8; 64], privkey: &SecretKey, digest: &[u8; 32]) -> bool {
		let secp_ctx = Secp256k1::new();
		let pubkey = PublicKey::from_secret_key(&secp_ctx, privkey);
		match Signature::from_compact(raw) {
			Ok(sig) => secp_ctx.verify_ecdsa(&Message::from_digest(*digest), &sig, &pubkey).is_ok(),
			Err(_) => false,
		}
	}
}

impl PartialEq for Sig {
	fn eq(&self, other: &Sig) -> bool {
		match (&self.inner, &other.inner) {
			(SigInner::Raw(a), SigInner::Raw(b)) => a == b,
			(
				SigInner::Lazy { privkey: key_a, digest: digest_a, .. },
				SigInner::Lazy { privkey: key_b, digest: digest_b, .. },
			) => key_a == key_b && digest_a == digest_b,
			(SigInner::Raw(raw), SigInner::Lazy { privkey, digest, .. })
			| (SigInner::Lazy { privkey, digest, .. }, SigInner::Raw(raw)) => {
				Sig::verifies(raw, privkey, digest)
			},
		}
	}
}

impl fmt::Display for Sig {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{}", self.to_compact().as_hex())
	}
}

impl fmt::Debug for Sig {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match &self.inner {
			SigInner::Raw(bytes) => write!(f, "Sig({})", bytes.as_hex()),
			SigInner::Lazy { privkey, digest, .. } => {
				write!(f, "Sig({},{})", privkey.secret_bytes().as_hex(), digest.as_hex())
			},
		}
	}
}

impl FromStr for Sig {
	type Err = DecodeError;

	/// Parses 128 hex digits as a compact signature and anything else as DER hex.
	fn from_str(s: &str) -> Result<Self, DecodeError> {
		let bytes = Vec::<u8>::from_hex(s)
			.map_err(|_| DecodeError::InvalidValue(format!("{} is not a hex signature", s)))?;
		if bytes.len() == 64 {
			let mut raw = [0; 64];
			raw.copy_from_slice(&bytes);
			Ok(Sig::raw(raw))
		} else {
			Sig::from_der(&bytes)
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const DER: &str = "3045022100a0b37f8fba683cc68f6574cd43b39f0343a50008bf6ccea9d13231d9e7e2e1e4022011edc8d307254296264aebfc3dc76cd8b668373a072fd64665b50000e9fcce52";

	#[test]
	fn der_round_trips() {
		let der = Vec::<u8>::from_hex(DER).unwrap();
		let sig = Sig::from_der(&der).unwrap();
		assert_eq!(
			sig.to_string(),
			"a0b37f8fba683cc68f6574cd43b39f0343a50008bf6ccea9d13231d9e7e2e1e411edc8d307254296264aebfc3dc76cd8b668373a072fd64665b50000e9fcce52"
		);
		assert_eq!(sig.to_der().unwrap(), der);
		assert_eq!(Sig::from_str(DER).unwrap(), sig);
	}

	#[test]
	fn lazy_equals_its_own_signature() {
		let lazy = Sig::lazy_from_hex("01", &"00".repeat(32)).unwrap();
		assert_eq!(lazy, lazy);

		let raw = Sig::raw(lazy.to_compact());
		assert_eq!(lazy, raw);
		assert_eq!(raw, lazy);
	}

	#[test]
	fn lazy_differs_from_other_signatures() {
		let lazy = Sig::lazy_from_hex("01", &"00".repeat(32)).unwrap();
		let other_key = Sig::lazy_from_hex("02", &"00".repeat(32)).unwrap();
		let other_digest = Sig::lazy_from_hex("01", &"11".repeat(32)).unwrap();
		assert_ne!(lazy, other_key);
		assert_ne!(lazy, other_digest);
		assert_ne!(lazy, Sig::raw(other_key.to_compact()));
		assert_ne!(Sig::raw([0; 64]), lazy);
	}

	#[test]
	fn parses_compact_hex() {
		let hex = "01".repeat(64);
		assert_eq!(Sig::from_str(&hex).unwrap(), Sig::raw([1; 64]));
		assert_eq!(Sig::raw([1; 64]).to_string(), hex);
		assert!(Sig::from_str("0102").is_err());
		assert!(Sig::lazy_from_hex("01", "00").is_err());
	}
}
