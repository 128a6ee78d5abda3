//
// Copyright 2026 The Project Oak Authors
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
//

use alloc::sync::Arc;

use crate::{DataAvail, Queue, SpaceAvail};

/// Cooperative task scheduler used by the blocking queue primitives.
///
/// The queue only needs a way to put the current task to sleep and to wake a
/// sleeping task up again; how tasks are represented is up to the scheduler.
pub trait Scheduler {
    /// Handle to a task that can be woken up.
    type Task: Send;

    /// Returns a handle to the task that is currently running.
    fn current_task(&self) -> Self::Task;

    /// Marks the current task as about to block.
    ///
    /// An [`Scheduler::unblock`] for the current task that arrives after this
    /// call and before [`Scheduler::block`] must make the following `block`
    /// return immediately. A `prepare_to_block` that is not followed by a
    /// `block` is cancelled by the next `prepare_to_block`.
    fn prepare_to_block(&self);

    /// Suspends the current task until it is unblocked.
    ///
    /// May return spuriously; callers re-check their condition.
    fn block(&self);

    /// Makes a blocked task runnable again. Safe to call from interrupt
    /// context.
    fn unblock(&self, task: &Self::Task);
}

/// A queue hook that wakes up a task whenever it is notified.
///
/// A task using the blocking primitives attaches one of these for its role, so
/// that the other role's notifications resume it.
pub struct Wakeup<S: Scheduler> {
    scheduler: Arc<S>,
    task: S::Task,
}

impl<S: Scheduler> Wakeup<S> {
    pub fn new(scheduler: Arc<S>, task: S::Task) -> Self {
        Self { scheduler, task }
    }

    /// Creates a hook that wakes up the task that is currently running.
    pub fn current(scheduler: Arc<S>) -> Self {
        let task = scheduler.current_task();
        Self::new(scheduler, task)
    }
}

impl<S> DataAvail for Wakeup<S>
where
    S: Scheduler + Send + Sync,
{
    fn data_avail(&mut self, _queue: &Queue, _blocking: bool) {
        self.scheduler.unblock(&self.task);
    }
}

impl<S> SpaceAvail for Wakeup<S>
where
    S: Scheduler + Send + Sync,
{
    fn space_avail(&mut self, _queue: &Queue) {
        self.scheduler.unblock(&self.task);
    }
}
