// Copyright 2020 The Weft Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Cooperative state machine scheduling. Components expose a single
//! `execute()` step which must never block on I/O; the reactor drives each
//! attached component from a dedicated worker thread whenever the component
//! reports itself ready. A component defers its own re-execution with
//! `StateMachine::delay`.

use crate::Mutex;
use log::{debug, trace, warn};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Interval at which reactor workers re-check a component that reported
/// itself not ready.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// A component that can be driven by the reactor. Each call to `execute`
/// runs exactly one state handler and returns.
pub trait Runnable: Send {
	/// Name used for the worker thread and logging.
	fn name(&self) -> String;
	/// Whether the component wants to execute now. Typically backed by
	/// `StateMachine::is_ready`.
	fn is_ready_to_execute(&self) -> bool;
	/// Run a single state handler. Must not block on I/O.
	fn execute(&mut self);
}

/// Bookkeeping for an explicit state machine: the current state plus an
/// optional wake-up time set by the owning component via `delay`.
pub struct StateMachine<S> {
	name: String,
	state: S,
	wake_at: Option<Instant>,
}

impl<S> StateMachine<S>
where
	S: Copy + PartialEq + fmt::Display,
{
	/// New state machine starting in the provided state.
	pub fn new(name: &str, initial: S) -> StateMachine<S> {
		StateMachine {
			name: name.to_owned(),
			state: initial,
			wake_at: None,
		}
	}

	/// The current state.
	pub fn state(&self) -> S {
		self.state
	}

	/// Defer the next execution by the given duration. A subsequent call
	/// overrides any earlier deferral.
	pub fn delay(&mut self, duration: Duration) {
		self.wake_at = Some(Instant::now() + duration);
	}

	/// Whether the machine is due to execute.
	pub fn is_ready(&self) -> bool {
		match self.wake_at {
			Some(at) => Instant::now() >= at,
			None => true,
		}
	}

	/// Move to the next state, logging the transition when it changes.
	pub fn transition(&mut self, next: S) {
		if next != self.state {
			trace!("{}: state {} -> {}", self.name, self.state, next);
		}
		self.state = next;
	}
}

/// Drives a set of state machine components, one worker thread each.
pub struct Reactor {
	name: String,
	stop: Arc<AtomicBool>,
	runnables: Vec<Arc<Mutex<dyn Runnable>>>,
	workers: Vec<thread::JoinHandle<()>>,
}

impl Reactor {
	/// New reactor with no attached components.
	pub fn new(name: &str) -> Reactor {
		Reactor {
			name: name.to_owned(),
			stop: Arc::new(AtomicBool::new(false)),
			runnables: vec![],
			workers: vec![],
		}
	}

	/// Attach a component. Must be called before `start`.
	pub fn attach(&mut self, runnable: Arc<Mutex<dyn Runnable>>) {
		self.runnables.push(runnable);
	}

	/// Spawn a worker per attached component. Idempotent.
	pub fn start(&mut self) {
		if !self.workers.is_empty() {
			return;
		}
		self.stop.store(false, Ordering::Relaxed);

		for runnable in &self.runnables {
			let runnable = runnable.clone();
			let stop = self.stop.clone();
			let thread_name = format!("{}-{}", self.name, runnable.lock().name());
			let worker = thread::Builder::new()
				.name(thread_name.clone())
				.spawn(move || {
					debug!("{}: worker started", thread_name);
					while !stop.load(Ordering::Relaxed) {
						{
							let mut r = runnable.lock();
							if r.is_ready_to_execute() {
								r.execute();
								continue;
							}
						}
						thread::sleep(POLL_INTERVAL);
					}
					debug!("{}: worker stopped", thread_name);
				})
				.expect("failed to spawn reactor worker");
			self.workers.push(worker);
		}
	}

	/// Signal all workers to stop and join them. Idempotent.
	pub fn stop(&mut self) {
		self.stop.store(true, Ordering::Relaxed);
		for worker in self.workers.drain(..) {
			if worker.join().is_err() {
				warn!("{}: worker panicked", self.name);
			}
		}
	}
}

impl Drop for Reactor {
	fn drop(&mut self) {
		self.stop();
	}
}

/// A wall-clock deadline. An unset timepoint reports itself as due, so a
/// freshly constructed timer fires immediately on first use.
#[derive(Clone, Copy, Debug, Default)]
pub struct FutureTimepoint {
	due: Option<Instant>,
}

impl FutureTimepoint {
	/// New unset timepoint, due immediately.
	pub fn new() -> FutureTimepoint {
		FutureTimepoint { due: None }
	}

	/// Schedule the timepoint `duration` from now.
	pub fn set(&mut self, duration: Duration) {
		self.due = Some(Instant::now() + duration);
	}

	/// Whether the deadline has been reached (or was never set).
	pub fn is_due(&self) -> bool {
		match self.due {
			Some(at) => Instant::now() >= at,
			None => true,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[derive(Clone, Copy, PartialEq)]
	enum TestState {
		Ping,
		Pong,
	}

	impl fmt::Display for TestState {
		fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
			match self {
				TestState::Ping => write!(f, "Ping"),
				TestState::Pong => write!(f, "Pong"),
			}
		}
	}

	struct PingPong {
		sm: StateMachine<TestState>,
		executions: usize,
	}

	impl Runnable for PingPong {
		fn name(&self) -> String {
			"pingpong".to_owned()
		}

		fn is_ready_to_execute(&self) -> bool {
			self.sm.is_ready()
		}

		fn execute(&mut self) {
			self.executions += 1;
			let next = match self.sm.state() {
				TestState::Ping => TestState::Pong,
				TestState::Pong => {
					self.sm.delay(Duration::from_millis(50));
					TestState::Ping
				}
			};
			self.sm.transition(next);
		}
	}

	#[test]
	fn delay_defers_execution() {
		let mut machine = PingPong {
			sm: StateMachine::new("pingpong", TestState::Ping),
			executions: 0,
		};
		machine.execute();
		machine.execute();
		// second handler requested a delay
		assert!(!machine.is_ready_to_execute());
		assert_eq!(machine.executions, 2);
		thread::sleep(Duration::from_millis(60));
		assert!(machine.is_ready_to_execute());
	}

	#[test]
	fn reactor_drives_attached_machine() {
		let machine = Arc::new(Mutex::new(PingPong {
			sm: StateMachine::new("pingpong", TestState::Ping),
			executions: 0,
		}));
		let mut reactor = Reactor::new("test");
		reactor.attach(machine.clone());
		reactor.start();
		thread::sleep(Duration::from_millis(100));
		reactor.stop();
		assert!(machine.lock().executions >= 2);
	}

	#[test]
	fn unset_timepoint_is_due() {
		let mut tp = FutureTimepoint::new();
		assert!(tp.is_due());
		tp.set(Duration::from_millis(40));
		assert!(!tp.is_due());
		thread::sleep(Duration::from_millis(50));
		assert!(tp.is_due());
	}
}
