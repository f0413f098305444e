// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! A background operation a runner starts on behalf of an event and collects later, such as a
//! `fundchannel` RPC which only returns once the node has exchanged several messages with us.

use core::sync::atomic::{AtomicBool, Ordering};

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::prelude::*;

/// A running background operation. At most one is outstanding per runner.
///
/// The closure is handed a cancellation flag which it should poll; [`PendingTask::cancel`] sets
/// it and [`PendingTask::join`] waits for the closure to notice.
pub struct PendingTask {
	name: String,
	cancelled: Arc<AtomicBool>,
	handle: Option<JoinHandle<Result<(), String>>>,
}

impl PendingTask {
	/// Runs `f` on a new thread.
	pub fn spawn<F>(name: &str, f: F) -> Self
	where
		F: FnOnce(&AtomicBool) -> Result<(), String> + Send + 'static,
	{
		let cancelled = Arc::new(AtomicBool::new(false));
		let flag = Arc::clone(&cancelled);
		let handle = thread::spawn(move || f(&flag));
		PendingTask { name: name.to_owned(), cancelled, handle: Some(handle) }
	}

	/// The name the task was started with.
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Whether the task has run to completion.
	pub fn poll(&self) -> bool {
		self.handle.as_ref().map_or(true, |h| h.is_finished())
	}

	/// Asks the task to stop early. Does not wait.
	pub fn cancel(&self) {
		self.cancelled.store(true, Ordering::Release);
	}

	/// Whether [`Self::cancel`] was called.
	pub fn is_cancelled(&self) -> bool {
		self.cancelled.load(Ordering::Acquire)
	}

	/// Waits for the task and returns its result. A panic in the task is reported as an error.
	pub fn join(mut self) -> Result<(), String> {
		match self.handle.take() {
			Some(handle) => match handle.join() {
				Ok(res) => res,
				Err(_) => Err(format!("{} panicked", self.name)),
			},
			None => Ok(()),
		}
	}
}

impl Drop for PendingTask {
	fn drop(&mut self) {
		if let Some(handle) = self.handle.take() {
			self.cancel();
			let _ = handle.join();
		}
	}
}
