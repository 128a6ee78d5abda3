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

//! Producer and consumer notification hooks.
//!
//! A hook and the state it needs are a single object, so attaching one makes
//! both visible at once: a notification either sees no hook at all, or a fully
//! initialised one. Detaching takes the hook out of its slot, waiting for a
//! notification that is running it on another CPU to finish first.
//!
//! Notifications never spin. If the slot is busy, because the hook is being
//! attached or is already running, the notification is recorded as pending and
//! the context that owns the slot runs the hook once more before giving it up.
//! A hook is therefore never nested for the same queue, not even when it
//! notifies its own queue.

use alloc::boxed::Box;
use core::sync::atomic::{fence, AtomicBool, Ordering};

use spinning_top::Spinlock;

use crate::{Queue, QueueError};

/// Hook run when bytes become available in a queue.
pub trait DataAvail: Send {
    /// Called with the queue that has data available. If `blocking` is set the
    /// hook should drain the queue before returning rather than defer the work.
    fn data_avail(&mut self, queue: &Queue, blocking: bool);
}

impl<F> DataAvail for F
where
    F: FnMut(&Queue, bool) + Send,
{
    fn data_avail(&mut self, queue: &Queue, blocking: bool) {
        self(queue, blocking)
    }
}

/// Hook run when space becomes available in a queue.
pub trait SpaceAvail: Send {
    fn space_avail(&mut self, queue: &Queue);
}

impl<F> SpaceAvail for F
where
    F: FnMut(&Queue) + Send,
{
    fn space_avail(&mut self, queue: &Queue) {
        self(queue)
    }
}

pub(crate) struct HookSlot<H: ?Sized> {
    hook: Spinlock<Option<Box<H>>>,
    pending: AtomicBool,
}

impl<H: ?Sized> HookSlot<H> {
    pub(crate) const fn new() -> Self {
        Self { hook: Spinlock::new(None), pending: AtomicBool::new(false) }
    }

    fn attach(&self, hook: Box<H>) -> Result<(), QueueError> {
        let mut slot = self.hook.lock();
        if slot.is_some() {
            return Err(QueueError::AlreadyAttached);
        }
        *slot = Some(hook);
        Ok(())
    }

    fn detach(&self) -> Option<Box<H>> {
        let hook = self.hook.lock().take();
        self.pending.store(false, Ordering::Relaxed);
        hook
    }

    pub(crate) fn is_attached(&self) -> bool {
        self.hook.lock().is_some()
    }

    fn fire(&self, mut run: impl FnMut(&mut H)) {
        self.pending.store(true, Ordering::Release);
        // Pairs with the fence after releasing the slot below: either we see
        // the slot free, or its holder sees `pending`.
        fence(Ordering::SeqCst);
        loop {
            let Some(mut slot) = self.hook.try_lock() else {
                // Whoever holds the slot sees `pending` once it is done.
                return;
            };
            if self.pending.swap(false, Ordering::AcqRel) {
                if let Some(hook) = slot.as_deref_mut() {
                    run(hook);
                }
            }
            drop(slot);
            fence(Ordering::SeqCst);
            if !self.pending.load(Ordering::Acquire) {
                return;
            }
        }
    }
}

impl Queue {
    /// Attaches the consumer hook.
    ///
    /// Fails if a consumer is already attached; the existing hook is kept.
    pub fn attach_consumer<H: DataAvail + 'static>(&self, hook: H) -> Result<(), QueueError> {
        self.consumer.attach(Box::new(hook)).inspect_err(|_| {
            log::warn!("queue already has a consumer attached");
        })
    }

    /// Attaches the producer hook.
    ///
    /// Fails if a producer is already attached; the existing hook is kept.
    pub fn attach_producer<H: SpaceAvail + 'static>(&self, hook: H) -> Result<(), QueueError> {
        self.producer.attach(Box::new(hook)).inspect_err(|_| {
            log::warn!("queue already has a producer attached");
        })
    }

    /// Detaches and returns the consumer hook, if any.
    ///
    /// Must not be called from interrupt context, as it waits for a running
    /// notification to finish. For the same reason a consumer hook must not
    /// detach itself: it would spin forever on its own slot.
    pub fn detach_consumer(&self) -> Option<Box<dyn DataAvail>> {
        self.consumer.detach()
    }

    /// Detaches and returns the producer hook, if any.
    ///
    /// Must not be called from interrupt context, as it waits for a running
    /// notification to finish. For the same reason a producer hook must not
    /// detach itself.
    pub fn detach_producer(&self) -> Option<Box<dyn SpaceAvail>> {
        self.producer.detach()
    }

    /// Tells the consumer that bytes are available.
    ///
    /// Does nothing if no consumer hook is attached.
    pub fn notify_consumer(&self, blocking: bool) {
        self.consumer.fire(|hook| hook.data_avail(self, blocking));
    }

    /// Tells the producer that space is available.
    ///
    /// Does nothing if no producer hook is attached.
    pub fn notify_producer(&self) {
        self.producer.fire(|hook| hook.space_avail(self));
    }
}
