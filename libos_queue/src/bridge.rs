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

//! Moving bytes out of a queue without staging them in a linear buffer.
//!
//! The readable bytes of a queue occupy at most two contiguous runs of its
//! backing buffer. The helpers here hand those runs directly to the
//! destination, so bulk transfers copy each byte only once.

use core::cmp::min;

use crate::{CharDev, CharDevError, CharDevFlags, Queue, Scheduler};

/// Transmits up to `len` bytes from `src` to `dest` and returns how many the
/// device accepted.
///
/// Stops early when the device accepts less than a full run. An error is only
/// returned if nothing at all was transmitted; otherwise the partial count is.
/// Unless `peek` is set, `src` is advanced past the transmitted bytes after each
/// run. Consumer side of `src`.
pub fn queue_to_chardev<D: CharDev + ?Sized>(
    dest: &D,
    src: &Queue,
    len: usize,
    peek: bool,
    flags: CharDevFlags,
) -> Result<usize, CharDevError> {
    let (head, available) = src.consumer_view();
    let (first, second) = src.spans(head, min(len, available));

    let mut total = 0;
    for span in [first, second] {
        if span.is_empty() {
            break;
        }
        let wanted = span.len();
        // Safety: the run lies within the readable bytes of `src` and we are
        // its consumer.
        let bytes = unsafe { src.span(span) };
        let sent = match dest.transmit(bytes, flags) {
            Ok(sent) => min(sent, wanted),
            Err(err) if total == 0 => return Err(err),
            Err(_) => break,
        };
        total += sent;
        if !peek {
            src.release_head(head, total);
        }
        if sent < wanted {
            break;
        }
    }
    Ok(total)
}

/// Moves up to `len` bytes from `src` into `dest` and returns how many were
/// moved.
///
/// Stops early when `dest` fills up. Unless `peek` is set, `src` is advanced
/// past the moved bytes. Consumer side of `src`, producer side of `dest`.
pub fn queue_to_queue(dest: &Queue, src: &Queue, len: usize, peek: bool) -> usize {
    transfer_runs(src, len, peek, |bytes| dest.write(bytes))
}

/// Like [`queue_to_queue`], but blocks the current task whenever `dest` is
/// full, so all `min(len, src.available())` bytes are moved.
pub fn queue_to_queue_blocking<S: Scheduler + ?Sized>(
    dest: &Queue,
    src: &Queue,
    len: usize,
    peek: bool,
    scheduler: &S,
) -> usize {
    transfer_runs(src, len, peek, |bytes| {
        dest.write_blocking(scheduler, bytes);
        bytes.len()
    })
}

fn transfer_runs(
    src: &Queue,
    len: usize,
    peek: bool,
    mut push: impl FnMut(&[u8]) -> usize,
) -> usize {
    let (head, available) = src.consumer_view();
    let (first, second) = src.spans(head, min(len, available));

    let mut total = 0;
    for span in [first, second] {
        if span.is_empty() {
            break;
        }
        let wanted = span.len();
        // Safety: the run lies within the readable bytes of `src` and we are
        // its consumer.
        let pushed = push(unsafe { src.span(span) });
        total += pushed;
        if !peek {
            src.release_head(head, total);
        }
        if pushed < wanted {
            break;
        }
    }
    total
}

impl Queue {
    /// Drops up to `len` unread bytes and returns how many were dropped.
    ///
    /// Consumer side.
    pub fn discard(&self, len: usize) -> usize {
        let (head, available) = self.consumer_view();
        let len = min(len, available);
        if len > 0 {
            self.release_head(head, len);
        }
        len
    }

    /// Finds the first occurrence of `value` at or after `start` bytes past
    /// `head`, and returns its offset from `head`.
    ///
    /// Consumer side.
    pub fn find_byte(&self, value: u8, start: usize) -> Option<usize> {
        let (head, available) = self.consumer_view();
        if start >= available {
            return None;
        }

        let (first, second) = self.spans(self.wrap(head + start), available - start);
        let first_len = first.len();
        // Safety: both runs lie within the readable bytes and we are the
        // consumer.
        let (first, second) = unsafe { (self.span(first), self.span(second)) };
        first
            .iter()
            .position(|&byte| byte == value)
            .or_else(|| second.iter().position(|&byte| byte == value).map(|pos| first_len + pos))
            .map(|pos| start + pos)
    }
}
