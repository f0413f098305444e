// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Various user-configurable settings which a [`Runner`] applies while executing a script.
//!
//! [`Runner`]: crate::runner::Runner

use bitcoin::Network;

use core::time::Duration;

/// Settings shared by every [`Runner`] backend.
///
/// Default::default() provides sane defaults.
///
/// [`Runner`]: crate::runner::Runner
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RunnerConfig {
	/// Whether events log their progress at [`Level::Info`] rather than [`Level::Trace`].
	///
	/// Default value: false.
	///
	/// [`Level::Info`]: crate::util::logger::Level::Info
	/// [`Level::Trace`]: crate::util::logger::Level::Trace
	pub verbose: bool,
	/// How long an `ExpectMsg` (or any event reading from the node) waits for a message before
	/// failing. Backends must never block longer than this.
	///
	/// Default value: 10 seconds.
	pub expect_msg_timeout_secs: u64,
	/// The maximum number of times a script is re-run to explore every alternative of its
	/// `TryAll`s. A script which has not converged after this many passes fails with a
	/// [`SpecFileError`], as it most likely contains more alternatives than intended.
	///
	/// Default value: 64.
	///
	/// [`SpecFileError`]: crate::util::errors::SpecFileError
	pub max_passes: usize,
	/// How long to pause before opening a connection while another is already open, giving the
	/// node time to propagate gossip to the first.
	///
	/// Default value: 1000 milliseconds.
	pub connect_settle_ms: u64,
	/// The chain the node under test runs on.
	///
	/// Default value: [`Network::Regtest`].
	pub network: Network,
}

impl RunnerConfig {
	/// The message timeout as a [`Duration`].
	pub fn expect_msg_timeout(&self) -> Duration {
		Duration::from_secs(self.expect_msg_timeout_secs)
	}

	/// The connection settle delay as a [`Duration`].
	pub fn connect_settle(&self) -> Duration {
		Duration::from_millis(self.connect_settle_ms)
	}
}

impl Default for RunnerConfig {
	fn default() -> RunnerConfig {
		RunnerConfig {
			verbose: false,
			expect_msg_timeout_secs: 10,
			max_passes: 64,
			connect_settle_ms: 1000,
			network: Network::Regtest,
		}
	}
}
