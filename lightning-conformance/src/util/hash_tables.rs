// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! The `HashMap` used for connection and stash bookkeeping, re-exported for public consumption.
//!
//! This is `hashbrown`'s map keyed with `std`'s randomized `SipHasher`, so that lookups keyed by
//! peer-provided message names do not need a second hashing scheme.

pub use std::collections::hash_map::RandomState;

/// The [`hashbrown::HashMap`] with the standard library's randomized hasher.
pub type HashMap<K, V> = hashbrown::HashMap<K, V, RandomState>;

/// Builds a new [`HashMap`].
pub fn new_hash_map<K, V>() -> HashMap<K, V> {
	HashMap::with_hasher(RandomState::new())
}
