// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Feature bitfields as carried in `init`, `channel_announcement` and `channel_type`.
//!
//! Bitfields are big-endian: bit 0 is the least significant bit of the last byte. Features come
//! in pairs, the even bit marking the feature required and the odd bit optional.

use crate::prelude::*;

/// `option_static_remotekey`.
pub const STATIC_REMOTEKEY: usize = 12;
/// `option_anchor_outputs`.
pub const ANCHOR_OUTPUTS: usize = 20;
/// `option_anchors_zero_fee_htlc_tx`.
pub const ANCHORS_ZERO_FEE_HTLC_TX: usize = 22;

/// Whether `bit` is set in `bitfield`.
pub fn has_bit(bitfield: &[u8], bit: usize) -> bool {
	if bit >= bitfield.len() * 8 {
		return false;
	}
	bitfield[bitfield.len() - 1 - bit / 8] & (1 << (bit % 8)) != 0
}

/// Whether `bitfield` offers the feature of `bit`, as either its required or optional bit.
pub fn has_feature(bitfield: &[u8], bit: usize) -> bool {
	has_bit(bitfield, bit) || has_bit(bitfield, bit ^ 1)
}

/// Builds the shortest bitfield with exactly `bits` set.
pub fn bitfield(bits: &[usize]) -> Vec<u8> {
	let len = match bits.iter().max() {
		Some(max) => max / 8 + 1,
		None => return Vec::new(),
	};
	let mut res = vec![0; len];
	for bit in bits {
		res[len - 1 - bit / 8] |= 1 << (bit % 8);
	}
	res
}

/// Whether both peers offer every feature in `included` and neither offers any in `excluded`.
pub fn negotiated(a: &[u8], b: &[u8], included: &[usize], excluded: &[usize]) -> bool {
	included.iter().all(|bit| has_feature(a, *bit) && has_feature(b, *bit))
		&& !excluded.iter().any(|bit| has_feature(a, *bit) || has_feature(b, *bit))
}

/// The `channel_type` of a channel: the features which change its commitment transactions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelType {
	bitfield: Vec<u8>,
}

impl ChannelType {
	/// Wraps a `channel_type` TLV value.
	pub fn from_bitfield(bitfield: Vec<u8>) -> Self {
		ChannelType { bitfield }
	}

	/// The legacy channel type, with no features.
	pub fn legacy() -> Self {
		ChannelType { bitfield: Vec::new() }
	}

	/// `option_static_remotekey` alone.
	pub fn static_remotekey() -> Self {
		ChannelType { bitfield: bitfield(&[STATIC_REMOTEKEY]) }
	}

	/// `option_anchor_outputs`, which implies `option_static_remotekey`.
	pub fn anchor_outputs() -> Self {
		ChannelType { bitfield: bitfield(&[STATIC_REMOTEKEY, ANCHOR_OUTPUTS]) }
	}

	/// `option_anchors_zero_fee_htlc_tx`, which implies `option_static_remotekey`.
	pub fn anchors_zero_fee_htlc_tx() -> Self {
		ChannelType { bitfield: bitfield(&[STATIC_REMOTEKEY, ANCHORS_ZERO_FEE_HTLC_TX]) }
	}

	/// The channel type two peers use when neither sends an explicit `channel_type`: the most
	/// featureful of the above which both offer in their `init` features.
	pub fn default_for(a: &[u8], b: &[u8]) -> Self {
		if negotiated(a, b, &[ANCHORS_ZERO_FEE_HTLC_TX], &[]) {
			ChannelType::anchors_zero_fee_htlc_tx()
		} else if negotiated(a, b, &[ANCHOR_OUTPUTS], &[]) {
			ChannelType::anchor_outputs()
		} else if negotiated(a, b, &[STATIC_REMOTEKEY], &[]) {
			ChannelType::static_remotekey()
		} else {
			ChannelType::legacy()
		}
	}

	/// The raw bitfield.
	pub fn bitfield(&self) -> &[u8] {
		&self.bitfield
	}

	/// Whether commitments use `option_static_remotekey`.
	pub fn has_static_remotekey(&self) -> bool {
		has_bit(&self.bitfield, STATIC_REMOTEKEY)
	}

	/// Whether commitments carry anchor outputs, of either flavor.
	pub fn has_anchors(&self) -> bool {
		has_bit(&self.bitfield, ANCHOR_OUTPUTS) || has_bit(&self.bitfield, ANCHORS_ZERO_FEE_HTLC_TX)
	}
}

/// Converts satoshis to millisatoshis.
pub fn msat(sats: u64) -> u64 {
	sats * 1000
}
