// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

use bitcoin::transaction::TxOut;

use core::cmp::Ordering;

use crate::prelude::*;

/// Sorts outputs in BIP 69 order: by value, then by scriptPubKey bytes, with `tie_breaker`
/// ordering outputs which are otherwise identical.
pub(crate) fn sort_outputs<T, C: Fn(&T, &T) -> Ordering>(
	outputs: &mut Vec<(TxOut, T)>, tie_breaker: C,
) {
	outputs.sort_unstable_by(|a, b| {
		a.0.value.cmp(&b.0.value).then_with(|| {
			a.0.script_pubkey[..].cmp(&b.0.script_pubkey[..]).then_with(|| tie_breaker(&a.1, &b.1))
		})
	});
}

/// Sorts outputs by `key` first and only then in BIP 69 order. Early BOLT #3 drafts placed HTLC
/// outputs by `cltv_expiry` this way; it is kept to reproduce commitment transactions built
/// under that rule.
pub(crate) fn sort_outputs_keyed_first<T, K: Ord, F: Fn(&T) -> K>(
	outputs: &mut Vec<(TxOut, T)>, key: F,
) {
	outputs.sort_by(|a, b| {
		key(&a.1)
			.cmp(&key(&b.1))
			.then_with(|| a.0.value.cmp(&b.0.value))
			.then_with(|| a.0.script_pubkey[..].cmp(&b.0.script_pubkey[..]))
	});
}
