// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! The reference BOLT engine: key derivation, funding and commitment transactions, gossip
//! signing and the wire schema used to encode and decode peer messages.

pub mod bolt_csv;
pub mod commitment;
pub mod features;
pub mod funding;
pub mod keyset;
pub mod msgs;
pub mod signature;
pub mod wire;

use core::fmt;
use core::ops::Not;

/// One of the two channel participants. `Local` is always the test engine, `Remote` the node
/// under test.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Side {
	/// The test engine.
	Local = 0,
	/// The node under test.
	Remote = 1,
}

impl Side {
	/// The index of this side in two-element per-side arrays.
	#[inline]
	pub fn idx(self) -> usize {
		self as usize
	}
}

impl Not for Side {
	type Output = Side;

	fn not(self) -> Side {
		match self {
			Side::Local => Side::Remote,
			Side::Remote => Side::Local,
		}
	}
}

impl fmt::Display for Side {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Side::Local => f.write_str("local"),
			Side::Remote => f.write_str("remote"),
		}
	}
}
