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

//! The guest console.
//!
//! All console output, from normal code, from interrupt handlers and from the
//! crash path, is funnelled into one [`Queue`]. Writers only ever use the
//! queue's non-blocking primitives, and a single consumer hook drains it into
//! the real output, either a character device or a further queue (for example
//! one feeding a line editor).
//!
//! The console must be set up with [`init`] before interrupts that may print
//! are enabled; until then all output is silently dropped.

#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

mod config;
mod logging;

use alloc::{boxed::Box, string::String, sync::Arc};
use core::{
    fmt,
    sync::atomic::{AtomicUsize, Ordering},
};

use anyhow::anyhow;
use libos_queue::{queue_to_chardev, queue_to_queue, CharDev, CharDevFlags, Queue, QueueError};
use once_cell::race::OnceBox;
use spinning_top::{guard::SpinlockGuard, Spinlock};

pub use config::{ConfigError, ConsoleConfig};
pub use logging::{init_logging, ConsoleLogger};

/// How many times a writer retries taking the producer role before giving up
/// on its output.
const WRITER_SPIN_LIMIT: usize = 10_000;

/// Flags for output that has to reach the device even with interrupts masked.
const SYNC_FLAGS: CharDevFlags = CharDevFlags::BLOCKING.union(CharDevFlags::POLLED);

/// Where the console queue is drained to.
enum Sink {
    Device(Arc<dyn CharDev + Send + Sync>),
    /// Another queue, written only by the drain hook.
    Queue,
}

/// The console: a queue, the sink it drains into, and the crash state.
pub struct ConsoleState {
    queue: Queue,
    sink: OnceBox<Sink>,
    /// Serialises writers, as the queue only supports a single producer.
    writer: Spinlock<()>,
    /// Nesting depth of the crash path. Not a lock.
    crashing: AtomicUsize,
    /// Number of writes that lost some or all of their output.
    dropped: AtomicUsize,
    crlf: bool,
    prefix: String,
}

impl ConsoleState {
    pub fn new(config: &ConsoleConfig) -> Result<Self, QueueError> {
        Ok(Self {
            queue: Queue::new(config.buffer_size)?,
            sink: OnceBox::new(),
            writer: Spinlock::new(()),
            crashing: AtomicUsize::new(0),
            dropped: AtomicUsize::new(0),
            crlf: config.crlf,
            prefix: config.prefix.clone(),
        })
    }

    /// The queue all console output goes through.
    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    /// The prefix the console logger puts in front of every line.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Sends console output to a character device.
    ///
    /// The console can only be attached once.
    pub fn attach_chardev(&self, device: Arc<dyn CharDev + Send + Sync>) -> Result<(), QueueError> {
        self.set_sink(Sink::Device(device.clone()))?;
        self.queue.attach_consumer(move |queue: &Queue, blocking: bool| {
            let flags = if blocking { SYNC_FLAGS } else { CharDevFlags::empty() };
            // Errors can't be reported from here: logging would end up in this
            // very queue. The output simply stays queued.
            let _ = queue_to_chardev(&*device, queue, usize::MAX, false, flags);
        })
    }

    /// Sends console output into another queue, and notifies that queue's
    /// consumer whenever something was forwarded.
    ///
    /// The console can only be attached once.
    pub fn attach_queue(&self, dest: Arc<Queue>) -> Result<(), QueueError> {
        self.set_sink(Sink::Queue)?;
        self.queue.attach_consumer(move |queue: &Queue, blocking: bool| {
            if queue_to_queue(&dest, queue, usize::MAX, false) > 0 {
                dest.notify_consumer(blocking);
            }
        })
    }

    fn set_sink(&self, sink: Sink) -> Result<(), QueueError> {
        self.sink.set(Box::new(sink)).map_err(|_| {
            log::warn!("console output is already attached");
            QueueError::AlreadyAttached
        })
    }

    /// Writes bytes to the console and returns how many were accepted.
    ///
    /// Never blocks on the output device. If the queue is full the rest of
    /// `buf` is dropped.
    pub fn write(&self, buf: &[u8]) -> usize {
        if self.crash_depth() > 0 {
            return self.write_direct(buf);
        }

        let written = match self.lock_writer() {
            Some(_writer) => self.enqueue(buf),
            None => 0,
        };
        if written < buf.len() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.queue.notify_consumer(false);
        written
    }

    /// Formats `args` onto the console and returns how many bytes of output
    /// were accepted.
    pub fn write_fmt(&self, args: fmt::Arguments<'_>) -> usize {
        if self.crash_depth() > 0 {
            let mut writer = DirectWriter { console: self, written: 0 };
            let _ = fmt::write(&mut writer, args);
            return writer.written;
        }

        let mut writer = QueueingWriter { console: self, written: 0 };
        let complete = match self.lock_writer() {
            Some(_writer) => fmt::write(&mut writer, args).is_ok(),
            None => false,
        };
        if !complete {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.queue.notify_consumer(false);
        writer.written
    }

    /// Asks the sink to drain everything that is queued before returning.
    ///
    /// Devices are driven with [`CharDevFlags::POLLED`], so this also works
    /// with interrupts masked.
    pub fn flush(&self) {
        self.queue.notify_consumer(true);
    }

    /// Number of writes that lost output because the queue was full or busy.
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Enters the crash path until the returned guard is dropped.
    ///
    /// While crashing, output to a device bypasses the writer lock and is
    /// polled out directly. On the first level anything still queued is flushed
    /// first; a fault while already crashing skips the queue altogether.
    ///
    /// A queue sink has no synchronous path, so crash output for it still goes
    /// through the console queue. That only happens on the first level, when
    /// no interrupted writer holds the queue, and is dropped otherwise.
    pub fn begin_crash(&self) -> CrashGuard<'_> {
        self.crashing.fetch_add(1, Ordering::AcqRel);
        CrashGuard { console: self }
    }

    /// Current nesting depth of the crash path.
    pub fn crash_depth(&self) -> usize {
        self.crashing.load(Ordering::Acquire)
    }

    fn lock_writer(&self) -> Option<SpinlockGuard<'_, ()>> {
        for _ in 0..WRITER_SPIN_LIMIT {
            if let Some(guard) = self.writer.try_lock() {
                return Some(guard);
            }
            core::hint::spin_loop();
        }
        None
    }

    /// Copies `buf` into the queue, translating line endings. Must hold the
    /// writer lock. Returns how many bytes of `buf` were consumed.
    fn enqueue(&self, buf: &[u8]) -> usize {
        if !self.crlf {
            return self.queue.write(buf);
        }

        let mut consumed = 0;
        for line in buf.split_inclusive(|&byte| byte == b'\n') {
            let (text, newline) = match line.split_last() {
                Some((b'\n', text)) => (text, true),
                _ => (line, false),
            };
            let written = self.queue.write(text);
            consumed += written;
            if written < text.len() {
                break;
            }
            if newline {
                // `\r\n` goes in whole or not at all. We are the only producer,
                // so the space can only grow between the check and the write.
                if self.queue.space() < 2 {
                    break;
                }
                self.queue.write(b"\r\n");
                consumed += 1;
            }
        }
        consumed
    }

    /// Sends crash output to the sink.
    fn write_direct(&self, buf: &[u8]) -> usize {
        let depth = self.crash_depth();
        let Some(Sink::Device(device)) = self.sink.get() else {
            let writer = if depth == 1 { self.writer.try_lock() } else { None };
            let written = match writer {
                Some(_writer) => self.enqueue(buf),
                None => 0,
            };
            if written < buf.len() {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            if depth == 1 {
                self.queue.notify_consumer(true);
            }
            return written;
        };

        if depth == 1 {
            self.queue.notify_consumer(true);
        }

        let mut sent = 0;
        for line in buf.split_inclusive(|&byte| byte == b'\n') {
            let (text, newline) = match line.split_last() {
                Some((b'\n', text)) if self.crlf => (text, true),
                _ => (line, false),
            };
            let Ok(count) = device.transmit(text, SYNC_FLAGS) else {
                return sent;
            };
            sent += count;
            if newline {
                if device.transmit(b"\r\n", SYNC_FLAGS).is_err() {
                    return sent;
                }
                sent += 1;
            }
        }
        sent
    }
}

impl Drop for ConsoleState {
    fn drop(&mut self) {
        self.queue.detach_consumer();
    }
}

/// Keeps the console on the crash path while alive.
pub struct CrashGuard<'a> {
    console: &'a ConsoleState,
}

impl CrashGuard<'_> {
    pub fn depth(&self) -> usize {
        self.console.crash_depth()
    }
}

impl Drop for CrashGuard<'_> {
    fn drop(&mut self) {
        self.console.crashing.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Formats into the console queue while the writer lock is held.
struct QueueingWriter<'a> {
    console: &'a ConsoleState,
    written: usize,
}

impl fmt::Write for QueueingWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let written = self.console.enqueue(s.as_bytes());
        self.written += written;
        if written < s.len() {
            return Err(fmt::Error);
        }
        Ok(())
    }
}

/// Formats straight to the sink on the crash path.
struct DirectWriter<'a> {
    console: &'a ConsoleState,
    written: usize,
}

impl fmt::Write for DirectWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.written += self.console.write_direct(s.as_bytes());
        Ok(())
    }
}

static CONSOLE: OnceBox<ConsoleState> = OnceBox::new();

/// Installs the global console.
///
/// Fails, handing the state back, if a console was already installed.
pub fn init(state: ConsoleState) -> Result<&'static ConsoleState, ConsoleState> {
    CONSOLE.set(Box::new(state)).map_err(|state| *state)?;
    Ok(CONSOLE.get().expect("console was just installed"))
}

/// Returns the global console, if it has been installed.
pub fn console() -> Option<&'static ConsoleState> {
    CONSOLE.get()
}

/// Sets up the global console and the console logger from the boot
/// arguments, and sends console output to `device`.
pub fn init_from_args(
    args: &str,
    device: Arc<dyn CharDev + Send + Sync>,
) -> anyhow::Result<&'static ConsoleState> {
    let config = ConsoleConfig::from_args(args)
        .map_err(|err| anyhow!("couldn't parse console arguments: {}", err))?;
    let state = ConsoleState::new(&config)
        .map_err(|err| anyhow!("couldn't create console queue: {}", err))?;
    state.attach_chardev(device).map_err(|err| anyhow!("couldn't attach console: {}", err))?;
    let console = init(state).map_err(|_| anyhow!("console is already initialised"))?;
    init_logging(config.log_level).map_err(|err| anyhow!("couldn't set logger: {}", err))?;
    log::info!("console initialised with a {} byte buffer", config.buffer_size);
    Ok(console)
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments<'_>) {
    if let Some(console) = console() {
        console.write_fmt(args);
    }
}

/// Prints to the global console.
#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => ($crate::_print(format_args!($($arg)*)));
}

/// Prints to the global console, with a newline.
#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => ($crate::_print(format_args!("{}\n", format_args!($($arg)*))));
}
