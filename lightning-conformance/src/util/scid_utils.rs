// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! `short_channel_id` handling, in the `BLOCKxTXxOUT` form scripts write them in.

use core::fmt;
use core::str::FromStr;

use crate::util::errors::DecodeError;

/// Maximum block height that can be used in a `short_channel_id`. This
/// value is based on the 3-bytes available for block height.
pub const MAX_SCID_BLOCK: u32 = 0x00ffffff;

/// Maximum transaction index that can be used in a `short_channel_id`.
/// This value is based on the 3-bytes available for tx index.
pub const MAX_SCID_TX_INDEX: u32 = 0x00ffffff;

/// A `short_channel_id`: the block height, index within the block and output index of a funding
/// transaction output.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShortChannelId {
	/// The block the funding transaction confirmed in.
	pub block: u32,
	/// The funding transaction's index in its block.
	pub tx_index: u32,
	/// The funding output's index.
	pub vout: u16,
}

impl ShortChannelId {
	/// Constructs a `short_channel_id`, failing if the block height or tx index overflow their
	/// three bytes.
	pub fn from_parts(block: u32, tx_index: u32, vout: u16) -> Result<Self, DecodeError> {
		if block > MAX_SCID_BLOCK {
			return Err(DecodeError::InvalidValue(format!("block {} too large for scid", block)));
		}
		if tx_index > MAX_SCID_TX_INDEX {
			return Err(DecodeError::InvalidValue(format!("tx index {} too large for scid", tx_index)));
		}
		Ok(ShortChannelId { block, tx_index, vout })
	}

	/// The eight-byte wire form.
	pub fn to_u64(&self) -> u64 {
		((self.block as u64) << 40) | ((self.tx_index as u64) << 16) | self.vout as u64
	}

	/// Splits the eight-byte wire form.
	pub fn from_u64(scid: u64) -> Self {
		ShortChannelId {
			block: (scid >> 40) as u32,
			tx_index: ((scid >> 16) & MAX_SCID_TX_INDEX as u64) as u32,
			vout: (scid & 0xffff) as u16,
		}
	}
}

impl fmt::Display for ShortChannelId {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{}x{}x{}", self.block, self.tx_index, self.vout)
	}
}

impl FromStr for ShortChannelId {
	type Err = DecodeError;

	fn from_str(s: &str) -> Result<Self, DecodeError> {
		let bad = || DecodeError::InvalidValue(format!("{} is not a short_channel_id", s));
		let mut parts = s.split('x');
		let mut next = || parts.next().ok_or_else(bad);
		let block = next()?.parse::<u32>().map_err(|_| bad())?;
		let tx_index = next()?.parse::<u32>().map_err(|_| bad())?;
		let vout = next()?.parse::<u16>().map_err(|_| bad())?;
		if parts.next().is_some() {
			return Err(bad());
		}
		ShortChannelId::from_parts(block, tx_index, vout)
	}
}
