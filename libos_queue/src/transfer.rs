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

//! Byte transfer between a queue and linear buffers.
//!
//! The non-blocking primitives never wait and may be used from interrupt
//! context. The `_blocking` variants need a [`Scheduler`] and may only be used
//! from a task context.

use core::cmp::min;

use crate::{Busy, Queue, Scheduler, WouldBlock};

impl Queue {
    /// Copies up to `dst.len()` bytes out of the queue and returns how many
    /// were copied.
    ///
    /// If `peek` is set the bytes stay in the queue. Consumer side.
    pub fn read(&self, dst: &mut [u8], peek: bool) -> usize {
        let (head, available) = self.consumer_view();
        let len = min(available, dst.len());
        if len == 0 {
            return 0;
        }

        // Safety: the bytes in `[head, head + len)` were published by the
        // producer and are not touched again until we move `head` past them.
        unsafe { self.copy_out(head, &mut dst[..len]) };

        if !peek {
            self.release_head(head, len);
        }
        len
    }

    /// Copies as much of `src` into the queue as fits and returns how many
    /// bytes were copied.
    ///
    /// A short count, possibly zero, means the queue is full. Producer side.
    pub fn write(&self, src: &[u8]) -> usize {
        let (tail, space) = self.producer_view();
        let len = min(space, src.len());
        if len == 0 {
            return 0;
        }

        // Safety: the bytes in `[tail, tail + len)` are free space which the
        // consumer won't read until we move `tail` past them.
        unsafe { self.copy_in(tail, &src[..len]) };

        self.release_tail(tail, len);
        len
    }

    pub fn read_char(&self, peek: bool) -> Result<u8, WouldBlock> {
        let mut byte = [0u8];
        match self.read(&mut byte, peek) {
            1 => Ok(byte[0]),
            _ => Err(WouldBlock),
        }
    }

    pub fn write_char(&self, byte: u8) -> Result<(), Busy> {
        match self.write(&[byte]) {
            1 => Ok(()),
            _ => Err(Busy),
        }
    }

    /// Fills all of `dst` from the queue, blocking the current task whenever
    /// the queue runs empty.
    ///
    /// After every read that makes progress the producer is notified, so a
    /// producer waiting for space can continue. The task is only woken again if
    /// the producer notifies the consumer hook, which should be a [`Wakeup`]
    /// for the current task.
    ///
    /// [`Wakeup`]: crate::Wakeup
    pub fn read_blocking<S: Scheduler + ?Sized>(&self, scheduler: &S, dst: &mut [u8]) {
        let mut done = 0;
        while done < dst.len() {
            scheduler.prepare_to_block();
            let read = self.read(&mut dst[done..], false);
            if read == 0 {
                scheduler.block();
                continue;
            }
            done += read;
            self.notify_producer();
        }
    }

    /// Writes all of `src` into the queue, blocking the current task whenever
    /// the queue is full.
    ///
    /// After every write that makes progress the consumer is notified. The
    /// task is only woken again if the consumer notifies the producer hook.
    pub fn write_blocking<S: Scheduler + ?Sized>(&self, scheduler: &S, src: &[u8]) {
        let mut done = 0;
        while done < src.len() {
            scheduler.prepare_to_block();
            let written = self.write(&src[done..]);
            if written == 0 {
                scheduler.block();
                continue;
            }
            done += written;
            self.notify_consumer(false);
        }
    }

    pub fn read_char_blocking<S: Scheduler + ?Sized>(&self, scheduler: &S) -> u8 {
        let mut byte = [0u8];
        self.read_blocking(scheduler, &mut byte);
        byte[0]
    }

    pub fn write_char_blocking<S: Scheduler + ?Sized>(&self, scheduler: &S, byte: u8) {
        self.write_blocking(scheduler, &[byte]);
    }
}
