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

//! Lockless single-producer/single-consumer byte queues.
//!
//! A [`Queue`] is a power-of-two sized ring of bytes shared between exactly one
//! producer and one consumer. The producer only ever moves `tail`, the consumer
//! only ever moves `head`, and each side observes the other's index with an
//! acquire load. Publishing an index is a release store made after the bytes it
//! covers have been copied, so a consumer never sees a `tail` that runs ahead of
//! the data and a producer never reuses a slot the consumer is still reading.
//!
//! Neither side takes a lock on the data path, so the non-blocking primitives
//! can be used from interrupt context.

#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

mod bridge;
mod chardev;
mod error;
mod fmt;
mod notify;
mod sched;
mod transfer;

use alloc::{boxed::Box, vec::Vec};
use core::{
    cell::UnsafeCell,
    cmp::min,
    ops::Range,
    sync::atomic::{AtomicUsize, Ordering},
};

pub use bridge::{queue_to_chardev, queue_to_queue, queue_to_queue_blocking};
pub use chardev::{CharDev, CharDevError, CharDevFlags};
pub use error::{Busy, QueueError, WouldBlock};
pub use fmt::{BlockingQueueWriter, QueueWriter};
pub use notify::{DataAvail, SpaceAvail};
pub use sched::{Scheduler, Wakeup};

use notify::HookSlot;

/// A ring buffer of bytes with one producer and one consumer.
///
/// One slot is always kept free, so a queue of `size` bytes holds at most
/// `size - 1` bytes. This is what makes a full queue distinguishable from an
/// empty one without any extra state.
pub struct Queue {
    /// The backing storage. Only the queue's own primitives touch it.
    storage: Box<[UnsafeCell<u8>]>,

    /// `size - 1`; indices are wrapped with a bitwise AND.
    mask: usize,

    /// Index of the next byte to be read. Written only by the consumer.
    head: AtomicUsize,

    /// Index of the next byte to be written. Written only by the producer.
    tail: AtomicUsize,

    /// Hook notified when bytes become available.
    consumer: HookSlot<dyn DataAvail>,

    /// Hook notified when space becomes available.
    producer: HookSlot<dyn SpaceAvail>,
}

// Safety: the bytes in `storage` are partitioned between the two roles by
// `head` and `tail`. The producer only writes slots in `[tail, head - 1)` and the
// consumer only reads slots in `[head, tail)`; ownership of a slot moves to the
// other role only through a release store of the index, which the other role
// observes with an acquire load before touching the slot.
unsafe impl Sync for Queue {}

impl Queue {
    /// Creates a new queue with a freshly allocated backing buffer of `size`
    /// bytes.
    ///
    /// `size` must be a power of two and at least 2.
    pub fn new(size: usize) -> Result<Self, QueueError> {
        check_size(size)?;

        let mut storage = Vec::new();
        storage.try_reserve_exact(size).map_err(|_| {
            log::warn!("couldn't allocate {} bytes for queue", size);
            QueueError::OutOfMemory(size)
        })?;
        storage.resize_with(size, || UnsafeCell::new(0));

        Ok(Self::with_storage(storage.into_boxed_slice()))
    }

    /// Creates a new queue on top of a caller-supplied backing buffer.
    ///
    /// The length of `buffer` is the size of the queue and must be a power of
    /// two. The existing contents of the buffer are ignored.
    pub fn from_boxed_slice(buffer: Box<[u8]>) -> Result<Self, QueueError> {
        check_size(buffer.len())?;

        // Safety: `UnsafeCell<u8>` is `repr(transparent)` over `u8`, so the two
        // slice types have the same layout and the same metadata.
        let storage = unsafe { Box::from_raw(Box::into_raw(buffer) as *mut [UnsafeCell<u8>]) };
        Ok(Self::with_storage(storage))
    }

    fn with_storage(storage: Box<[UnsafeCell<u8>]>) -> Self {
        log::debug!("created queue of {} bytes", storage.len());
        Self {
            mask: storage.len() - 1,
            storage,
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            consumer: HookSlot::new(),
            producer: HookSlot::new(),
        }
    }

    /// The size of the backing buffer in bytes.
    pub fn size(&self) -> usize {
        self.mask + 1
    }

    /// The maximum number of bytes the queue can hold.
    pub fn capacity(&self) -> usize {
        self.mask
    }

    /// The number of unread bytes.
    pub fn available(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        self.wrap(tail.wrapping_sub(head))
    }

    /// The number of bytes that can be written without overrunning the reader.
    pub fn space(&self) -> usize {
        self.capacity() - self.available()
    }

    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire) == self.tail.load(Ordering::Acquire)
    }

    pub fn is_full(&self) -> bool {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        self.wrap(tail + 1) == head
    }

    fn wrap(&self, index: usize) -> usize {
        index & self.mask
    }

    /// Returns `head` and the number of readable bytes, as seen by the
    /// consumer.
    fn consumer_view(&self) -> (usize, usize) {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        (head, self.wrap(tail.wrapping_sub(head)))
    }

    /// Returns `tail` and the number of writable bytes, as seen by the
    /// producer.
    fn producer_view(&self) -> (usize, usize) {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);
        (tail, self.mask - self.wrap(tail.wrapping_sub(head)))
    }

    /// Publishes a new `head` after `len` bytes starting at `head` have been
    /// consumed.
    fn release_head(&self, head: usize, len: usize) {
        self.head.store(self.wrap(head + len), Ordering::Release);
    }

    /// Publishes a new `tail` after `len` bytes starting at `tail` have been
    /// produced.
    fn release_tail(&self, tail: usize, len: usize) {
        self.tail.store(self.wrap(tail + len), Ordering::Release);
    }

    /// Splits `len` bytes starting at the physical `index` into at most two
    /// contiguous runs of the backing buffer.
    ///
    /// The second run is empty unless the bytes wrap around the end of the
    /// buffer.
    fn spans(&self, index: usize, len: usize) -> (Range<usize>, Range<usize>) {
        debug_assert!(index < self.size() && len < self.size());
        let first = min(len, self.size() - index);
        (index..index + first, 0..len - first)
    }

    fn slot_ptr(&self, index: usize) -> *mut u8 {
        UnsafeCell::raw_get(self.storage[index..].as_ptr())
    }

    /// Returns a view of a contiguous run of the backing buffer.
    ///
    /// # Safety
    ///
    /// The caller must hold the consumer role and `span` must lie within the
    /// readable bytes, so that the producer does not write to it while the
    /// returned slice is alive.
    unsafe fn span(&self, span: Range<usize>) -> &[u8] {
        if span.is_empty() {
            return &[];
        }
        unsafe { core::slice::from_raw_parts(self.slot_ptr(span.start), span.len()) }
    }

    /// Copies bytes out of the buffer starting at the physical `index`.
    ///
    /// # Safety
    ///
    /// Same as [`Queue::span`], for the `dst.len()` bytes starting at `index`.
    unsafe fn copy_out(&self, index: usize, dst: &mut [u8]) {
        let (first, second) = self.spans(index, dst.len());
        let (dst_first, dst_second) = dst.split_at_mut(first.len());
        unsafe {
            dst_first.copy_from_slice(self.span(first));
            dst_second.copy_from_slice(self.span(second));
        }
    }

    /// Copies bytes into the buffer starting at the physical `index`.
    ///
    /// # Safety
    ///
    /// The caller must hold the producer role and the `src.len()` bytes
    /// starting at `index` must be free space.
    unsafe fn copy_in(&self, index: usize, src: &[u8]) {
        let (first, second) = self.spans(index, src.len());
        let (src_first, src_second) = src.split_at(first.len());
        unsafe {
            core::ptr::copy_nonoverlapping(
                src_first.as_ptr(),
                self.slot_ptr(first.start),
                first.len(),
            );
            if !second.is_empty() {
                core::ptr::copy_nonoverlapping(
                    src_second.as_ptr(),
                    self.slot_ptr(second.start),
                    second.len(),
                );
            }
        }
    }
}

impl Drop for Queue {
    fn drop(&mut self) {
        debug_assert!(
            !self.consumer.is_attached() && !self.producer.is_attached(),
            "queue dropped while a producer or consumer is still attached"
        );
    }
}

fn check_size(size: usize) -> Result<(), QueueError> {
    if size < 2 || !size.is_power_of_two() {
        log::debug!("rejected queue size {}", size);
        return Err(QueueError::NotPowerOfTwo(size));
    }
    Ok(())
}

#[cfg(test)]
mod tests;
