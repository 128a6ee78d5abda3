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

//! Formatted output into a queue.

use core::fmt;

use crate::{Queue, Scheduler};

/// A [`fmt::Write`] sink that never blocks.
///
/// Output that doesn't fit is dropped and formatting stops at that point.
pub struct QueueWriter<'a> {
    queue: &'a Queue,
    written: usize,
    truncated: bool,
}

impl<'a> QueueWriter<'a> {
    pub fn new(queue: &'a Queue) -> Self {
        Self { queue, written: 0, truncated: false }
    }

    /// The number of bytes that made it into the queue.
    pub fn written(&self) -> usize {
        self.written
    }

    /// Whether any output was dropped because the queue was full.
    pub fn truncated(&self) -> bool {
        self.truncated
    }
}

impl fmt::Write for QueueWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let written = self.queue.write(s.as_bytes());
        self.written += written;
        if written < s.len() {
            self.truncated = true;
            return Err(fmt::Error);
        }
        Ok(())
    }
}

/// A [`fmt::Write`] sink that blocks the current task until all output fits.
pub struct BlockingQueueWriter<'a, S: Scheduler + ?Sized> {
    queue: &'a Queue,
    scheduler: &'a S,
}

impl<'a, S: Scheduler + ?Sized> BlockingQueueWriter<'a, S> {
    pub fn new(queue: &'a Queue, scheduler: &'a S) -> Self {
        Self { queue, scheduler }
    }
}

impl<S: Scheduler + ?Sized> fmt::Write for BlockingQueueWriter<'_, S> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.queue.write_blocking(self.scheduler, s.as_bytes());
        Ok(())
    }
}

impl Queue {
    /// Formats `args` into the queue without blocking and notifies the
    /// consumer. Returns the number of bytes queued.
    pub fn write_fmt(&self, args: fmt::Arguments<'_>) -> usize {
        let mut writer = QueueWriter::new(self);
        // A full queue is the only way this fails, and that is reported through
        // the returned count.
        let _ = fmt::write(&mut writer, args);
        self.notify_consumer(false);
        writer.written()
    }

    /// Formats `args` into the queue, blocking whenever it is full.
    pub fn write_fmt_blocking<S: Scheduler + ?Sized>(
        &self,
        scheduler: &S,
        args: fmt::Arguments<'_>,
    ) -> fmt::Result {
        fmt::write(&mut BlockingQueueWriter::new(self, scheduler), args)?;
        self.notify_consumer(false);
        Ok(())
    }
}
