// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

#![crate_name = "lightning_conformance"]

//! A conformance-test engine for the Lightning Network peer protocol.
//!
//! Test scripts are trees of [`events::Event`]s which are executed against a [`runner::Runner`],
//! the driver of the node implementation under test. Events send and expect BOLT messages whose
//! fields may be computed lazily from earlier traffic or from the reference BOLT #3/#7 engine in
//! [`ln`], which builds funding, commitment and HTLC transactions and signs gossip.
//!
//! The [`runner::dummy::DummyRunner`] executes scripts without any node, fabricating the messages
//! a conforming peer would send, which makes it useful for checking scripts themselves.

#![cfg_attr(not(any(test, feature = "_test_utils")), deny(missing_docs))]
#![cfg_attr(not(any(test, feature = "_test_utils")), forbid(unsafe_code))]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]
#![allow(bare_trait_objects)]
#![allow(ellipsis_inclusive_range_patterns)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub extern crate bitcoin;
extern crate hashbrown;

#[cfg(any(test, feature = "_test_utils"))]
extern crate regex;

#[macro_use]
pub mod util;
pub mod events;
pub mod ln;
pub mod runner;

mod prelude {
	#![allow(unused_imports)]

	pub use alloc::{boxed::Box, collections::VecDeque, string::String, vec, vec::Vec};

	pub use alloc::borrow::ToOwned;
	pub use alloc::string::ToString;

	pub use crate::util::hash_tables::*;
}

extern crate alloc;
