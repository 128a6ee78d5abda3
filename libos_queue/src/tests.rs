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

use alloc::{collections::VecDeque, sync::Arc, vec, vec::Vec};
use core::{
    fmt::Write,
    sync::atomic::{AtomicUsize, Ordering},
};
use std::thread;

use googletest::prelude::*;

use super::*;

/// Scheduler that maps tasks to host threads.
struct ThreadScheduler;

impl Scheduler for ThreadScheduler {
    type Task = thread::Thread;

    fn current_task(&self) -> Self::Task {
        thread::current()
    }

    fn prepare_to_block(&self) {}

    fn block(&self) {
        thread::park();
    }

    fn unblock(&self, task: &Self::Task) {
        task.unpark();
    }
}

/// Device that accepts at most `limit` bytes per call and records them.
struct RecordingDev {
    sent: spinning_top::Spinlock<Vec<u8>>,
    limit: usize,
    fail: bool,
}

impl RecordingDev {
    fn new(limit: usize) -> Self {
        Self { sent: spinning_top::Spinlock::new(Vec::new()), limit, fail: false }
    }

    fn failing() -> Self {
        Self { fail: true, ..Self::new(usize::MAX) }
    }

    fn sent(&self) -> Vec<u8> {
        self.sent.lock().clone()
    }
}

impl CharDev for RecordingDev {
    fn transmit(
        &self,
        buf: &[u8],
        _flags: CharDevFlags,
    ) -> core::result::Result<usize, CharDevError> {
        if self.fail {
            return Err(CharDevError::Io);
        }
        let len = core::cmp::min(buf.len(), self.limit);
        self.sent.lock().extend_from_slice(&buf[..len]);
        Ok(len)
    }

    fn receive(
        &self,
        _buf: &mut [u8],
        _flags: CharDevFlags,
    ) -> core::result::Result<usize, CharDevError> {
        Err(CharDevError::Unsupported)
    }
}

/// Moves `head` and `tail` to `offset`, as if `offset` bytes had been written
/// and read.
fn rotate(queue: &Queue, offset: usize) {
    let junk = vec![0xAAu8; offset];
    let mut sink = vec![0u8; offset];
    assert_eq!(queue.write(&junk), offset);
    assert_eq!(queue.read(&mut sink, false), offset);
}

fn xorshift(state: &mut u32) -> u32 {
    *state ^= *state << 13;
    *state ^= *state >> 17;
    *state ^= *state << 5;
    *state
}

#[googletest::test]
fn test_new_rejects_bad_sizes() {
    for size in [0usize, 1, 3, 12, 100] {
        expect_that!(Queue::new(size).err(), eq(Some(QueueError::NotPowerOfTwo(size))));
    }
}

#[googletest::test]
fn test_new_accepts_powers_of_two() {
    for shift in 1..12 {
        let queue = Queue::new(1 << shift).unwrap();
        expect_that!(queue.size(), eq(1 << shift));
        expect_that!(queue.capacity(), eq((1 << shift) - 1));
    }
}

#[googletest::test]
fn test_from_boxed_slice() {
    let buffer = vec![0x55u8; 16].into_boxed_slice();
    let queue = Queue::from_boxed_slice(buffer).unwrap();
    assert_that!(queue.is_empty(), eq(true));
    assert_that!(queue.space(), eq(15));

    let odd = vec![0u8; 10].into_boxed_slice();
    assert_that!(Queue::from_boxed_slice(odd).err(), eq(Some(QueueError::NotPowerOfTwo(10))));
}

#[googletest::test]
fn test_empty_and_full() {
    let queue = Queue::new(16).unwrap();
    expect_that!(queue.is_empty(), eq(true));
    expect_that!(queue.is_full(), eq(false));
    expect_that!(queue.available(), eq(0));

    assert_that!(queue.write(&[7u8; 15]), eq(15));
    expect_that!(queue.is_full(), eq(true));
    expect_that!(queue.space(), eq(0));
    expect_that!(queue.write_char(1), eq(Err(Busy)));

    let mut out = [0u8; 15];
    assert_that!(queue.read(&mut out, false), eq(15));
    expect_that!(queue.is_empty(), eq(true));
    expect_that!(queue.read_char(false), eq(Err(WouldBlock)));
}

#[googletest::test]
fn test_capacity_eight_scenario() {
    let queue = Queue::new(8).unwrap();
    assert_that!(queue.write(b"ABCDEFG"), eq(7));
    assert_that!(queue.is_full(), eq(true));
    assert_that!(queue.write_char(b'H'), eq(Err(Busy)));
    assert_that!(queue.read_char(false), eq(Ok(b'A')));
    assert_that!(queue.write_char(b'H'), eq(Ok(())));

    let mut out = [0u8; 7];
    assert_that!(queue.read(&mut out, false), eq(7));
    assert_that!(&out[..], eq(&b"BCDEFGH"[..]));
    assert_that!(queue.is_empty(), eq(true));
}

#[googletest::test]
fn test_zero_length_transfers() {
    let queue = Queue::new(8).unwrap();
    expect_that!(queue.write(&[]), eq(0));
    queue.write(b"abc");
    expect_that!(queue.read(&mut [], false), eq(0));
    expect_that!(queue.available(), eq(3));
}

#[googletest::test]
fn test_round_trip() {
    let queue = Queue::new(64).unwrap();
    let data = b"the quick brown fox jumps over the lazy dog";
    assert_that!(queue.write(data), eq(data.len()));

    let mut out = [0u8; 64];
    let read = queue.read(&mut out, false);
    assert_that!(&out[..read], eq(&data[..]));
    assert_that!(queue.is_empty(), eq(true));
}

#[googletest::test]
fn test_peek_is_idempotent() {
    let queue = Queue::new(16).unwrap();
    rotate(&queue, 12);
    queue.write(b"0123456789");

    let mut first = [0u8; 8];
    let mut second = [0u8; 8];
    assert_that!(queue.read(&mut first, true), eq(8));
    assert_that!(queue.read(&mut second, true), eq(8));
    expect_that!(&first[..], eq(&second[..]));
    expect_that!(&first[..], eq(&b"01234567"[..]));
    expect_that!(queue.available(), eq(10));
    expect_that!(queue.read_char(true), eq(Ok(b'0')));
    expect_that!(queue.read_char(true), eq(Ok(b'0')));
}

#[googletest::test]
fn test_wraparound_matches_fifo() {
    let queue = Queue::new(16).unwrap();
    let mut model = VecDeque::new();
    let mut state = 0x1234_5678;
    let mut next = 0u8;

    for _ in 0..2000 {
        let op = xorshift(&mut state);
        let len = (op >> 8) as usize % 20;
        if op & 1 == 0 {
            let data: Vec<u8> = (0..len)
                .map(|_| {
                    next = next.wrapping_add(1);
                    next
                })
                .collect();
            let written = queue.write(&data);
            assert_that!(written, eq(core::cmp::min(len, 15 - model.len())));
            model.extend(&data[..written]);
            // Keep the generated sequence contiguous.
            next = next.wrapping_sub((len - written) as u8);
        } else {
            let mut out = vec![0u8; len];
            let read = queue.read(&mut out, false);
            let expected: Vec<u8> = model.drain(..core::cmp::min(len, model.len())).collect();
            assert_that!(&out[..read], eq(&expected[..]));
        }
        assert_that!(queue.available(), eq(model.len()));
    }
}

#[googletest::test]
fn test_wraparound_write_read_write() {
    let queue = Queue::new(16).unwrap();
    let mut out = [0u8; 10];
    queue.write(b"abcdefghij");
    queue.read(&mut out, false);
    assert_that!(queue.write(b"klmnopqrst"), eq(10));
    assert_that!(queue.read(&mut out, false), eq(10));
    assert_that!(&out[..], eq(&b"klmnopqrst"[..]));
}

#[googletest::test]
fn test_partial_write_completes_later() {
    let queue = Queue::new(8).unwrap();
    queue.write(b"xxxx");
    let data = b"123456";
    let space = queue.space();
    let written = queue.write(data);
    assert_that!(written, eq(space));
    assert_that!(written, eq(3));

    let mut out = [0u8; 16];
    let read = queue.read(&mut out, false);
    assert_that!(&out[..read], eq(&b"xxxx123"[..]));

    assert_that!(queue.write(&data[written..]), eq(3));
    let read = queue.read(&mut out, false);
    assert_that!(&out[..read], eq(&b"456"[..]));
}

#[googletest::test]
fn test_discard() {
    let queue = Queue::new(8).unwrap();
    rotate(&queue, 6);
    queue.write(b"abcde");
    expect_that!(queue.discard(3), eq(3));
    expect_that!(queue.read_char(false), eq(Ok(b'd')));
    expect_that!(queue.discard(10), eq(1));
    expect_that!(queue.is_empty(), eq(true));
    expect_that!(queue.discard(1), eq(0));
}

#[googletest::test]
fn test_find_byte() {
    let queue = Queue::new(16).unwrap();
    queue.write(b"abc\ndef");
    expect_that!(queue.find_byte(b'\n', 0), eq(Some(3)));
    expect_that!(queue.find_byte(b'\n', 3), eq(Some(3)));
    expect_that!(queue.find_byte(b'\n', 4), eq(None));
    expect_that!(queue.find_byte(b'a', 7), eq(None));

    let queue = Queue::new(16).unwrap();
    queue.write(b"abcdef");
    expect_that!(queue.find_byte(b'\n', 0), eq(None));
}

#[googletest::test]
fn test_find_byte_across_wrap() {
    let queue = Queue::new(8).unwrap();
    rotate(&queue, 5);
    queue.write(b"abcdef");
    expect_that!(queue.find_byte(b'a', 0), eq(Some(0)));
    expect_that!(queue.find_byte(b'e', 0), eq(Some(4)));
    expect_that!(queue.find_byte(b'f', 4), eq(Some(5)));
    expect_that!(queue.find_byte(b'b', 2), eq(None));
}

#[googletest::test]
fn test_queue_to_queue_matches_read_then_write() {
    for src_offset in 0..16 {
        for dest_offset in 0..16 {
            let src = Queue::new(16).unwrap();
            let dest = Queue::new(16).unwrap();
            let reference_src = Queue::new(16).unwrap();
            let reference_dest = Queue::new(16).unwrap();
            for (queue, offset) in [
                (&src, src_offset),
                (&dest, dest_offset),
                (&reference_src, src_offset),
                (&reference_dest, dest_offset),
            ] {
                rotate(queue, offset);
            }
            src.write(b"0123456789abc");
            reference_src.write(b"0123456789abc");

            let moved = queue_to_queue(&dest, &src, 11, false);
            let mut staging = [0u8; 11];
            let staged = reference_src.read(&mut staging, false);
            reference_dest.write(&staging[..staged]);

            assert_that!(moved, eq(staged));
            let mut out = [0u8; 16];
            let mut expected = [0u8; 16];
            let read = dest.read(&mut out, false);
            let expected_read = reference_dest.read(&mut expected, false);
            assert_that!(&out[..read], eq(&expected[..expected_read]));
            assert_that!(src.available(), eq(reference_src.available()));
        }
    }
}

#[googletest::test]
fn test_queue_to_queue_stops_when_dest_full() {
    let src = Queue::new(16).unwrap();
    let dest = Queue::new(4).unwrap();
    rotate(&src, 12);
    src.write(b"abcdefgh");

    expect_that!(queue_to_queue(&dest, &src, 8, false), eq(3));
    expect_that!(src.available(), eq(5));
    expect_that!(src.read_char(true), eq(Ok(b'd')));
}

#[googletest::test]
fn test_queue_to_queue_peek() {
    let src = Queue::new(16).unwrap();
    let dest = Queue::new(16).unwrap();
    rotate(&src, 10);
    src.write(b"abcdefgh");

    expect_that!(queue_to_queue(&dest, &src, 100, true), eq(8));
    expect_that!(src.available(), eq(8));
    expect_that!(dest.available(), eq(8));
}

#[googletest::test]
fn test_queue_to_chardev_wrapped() {
    let src = Queue::new(16).unwrap();
    rotate(&src, 13);
    src.write(b"hello world");
    let dev = RecordingDev::new(usize::MAX);

    let sent = queue_to_chardev(&dev, &src, 64, false, CharDevFlags::empty());
    assert_that!(sent, eq(Ok(11)));
    assert_that!(&dev.sent()[..], eq(&b"hello world"[..]));
    assert_that!(src.is_empty(), eq(true));
}

#[googletest::test]
fn test_queue_to_chardev_partial() {
    let src = Queue::new(16).unwrap();
    src.write(b"hello world");
    let dev = RecordingDev::new(4);

    assert_that!(queue_to_chardev(&dev, &src, 64, false, CharDevFlags::empty()), eq(Ok(4)));
    assert_that!(src.available(), eq(7));
    assert_that!(src.read_char(true), eq(Ok(b'o')));
}

#[googletest::test]
fn test_queue_to_chardev_peek_and_len() {
    let src = Queue::new(16).unwrap();
    rotate(&src, 14);
    src.write(b"abcdef");
    let dev = RecordingDev::new(usize::MAX);

    assert_that!(queue_to_chardev(&dev, &src, 4, true, CharDevFlags::BLOCKING), eq(Ok(4)));
    assert_that!(&dev.sent()[..], eq(&b"abcd"[..]));
    assert_that!(src.available(), eq(6));
}

#[googletest::test]
fn test_queue_to_chardev_error() {
    let src = Queue::new(16).unwrap();
    src.write(b"abc");
    let dev = RecordingDev::failing();

    assert_that!(
        queue_to_chardev(&dev, &src, 3, false, CharDevFlags::empty()),
        eq(Err(CharDevError::Io))
    );
    assert_that!(src.available(), eq(3));
}

#[googletest::test]
fn test_notify_without_hooks_is_noop() {
    let queue = Queue::new(8).unwrap();
    queue.notify_consumer(true);
    queue.notify_producer();
    assert_that!(queue.is_empty(), eq(true));
}

#[googletest::test]
fn test_consumer_hook_drains() {
    let queue = Arc::new(Queue::new(16).unwrap());
    let dev = Arc::new(RecordingDev::new(usize::MAX));
    let sink = dev.clone();
    queue
        .attach_consumer(move |queue: &Queue, _blocking: bool| {
            queue_to_chardev(&*sink, queue, usize::MAX, false, CharDevFlags::empty()).unwrap();
        })
        .unwrap();

    queue.write(b"ping");
    queue.notify_consumer(false);
    expect_that!(&dev.sent()[..], eq(&b"ping"[..]));
    expect_that!(queue.is_empty(), eq(true));

    assert!(queue.detach_consumer().is_some());
    queue.write(b"pong");
    queue.notify_consumer(false);
    expect_that!(&dev.sent()[..], eq(&b"ping"[..]));
}

#[googletest::test]
fn test_double_attach_keeps_first_hook() {
    let queue = Queue::new(8).unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let first = calls.clone();
    queue
        .attach_producer(move |_: &Queue| {
            first.fetch_add(1, Ordering::Relaxed);
        })
        .unwrap();

    let result = queue.attach_producer(|_: &Queue| panic!("second producer must not run"));
    expect_that!(result, eq(Err(QueueError::AlreadyAttached)));

    queue.notify_producer();
    expect_that!(calls.load(Ordering::Relaxed), eq(1));
    assert!(queue.detach_producer().is_some());
    assert!(queue.detach_producer().is_none());
}

#[googletest::test]
fn test_hook_never_nests() {
    let queue = Queue::new(8).unwrap();
    let depth = Arc::new(AtomicUsize::new(0));
    let calls = Arc::new(AtomicUsize::new(0));
    let (hook_depth, hook_calls) = (depth.clone(), calls.clone());
    queue
        .attach_consumer(move |queue: &Queue, _blocking: bool| {
            assert_eq!(hook_depth.fetch_add(1, Ordering::SeqCst), 0);
            // Only re-notify on the first run, otherwise this never settles.
            if hook_calls.fetch_add(1, Ordering::SeqCst) == 0 {
                queue.notify_consumer(false);
            }
            hook_depth.fetch_sub(1, Ordering::SeqCst);
        })
        .unwrap();

    queue.notify_consumer(false);
    // The nested notification is deferred and replayed once.
    expect_that!(calls.load(Ordering::SeqCst), eq(2));
    queue.detach_consumer();
}

#[googletest::test]
fn test_write_fmt() {
    let queue = Queue::new(32).unwrap();
    let written = queue.write_fmt(format_args!("{}-{:02x}", "id", 10));
    expect_that!(written, eq(5));
    let mut out = [0u8; 8];
    let read = queue.read(&mut out, false);
    expect_that!(&out[..read], eq(&b"id-0a"[..]));
}

#[googletest::test]
fn test_queue_writer_truncates() {
    let queue = Queue::new(8).unwrap();
    let mut writer = QueueWriter::new(&queue);
    let result = write!(writer, "{}", "0123456789");
    expect_that!(result.is_err(), eq(true));
    expect_that!(writer.truncated(), eq(true));
    expect_that!(writer.written(), eq(7));
    expect_that!(queue.is_full(), eq(true));
}

#[googletest::test]
fn test_blocking_transfer_between_threads() {
    const LEN: usize = 10_000;
    let scheduler = Arc::new(ThreadScheduler);
    let queue = Arc::new(Queue::new(16).unwrap());
    let data: Vec<u8> = (0..LEN).map(|i| (i * 7 % 251) as u8).collect();

    // Register the reader as consumer before anything is written, so no
    // notification can be missed.
    let (ready_tx, ready_rx) = std::sync::mpsc::channel();
    let reader = {
        let queue = queue.clone();
        let scheduler = scheduler.clone();
        thread::spawn(move || {
            queue.attach_consumer(Wakeup::current(scheduler.clone())).unwrap();
            ready_tx.send(()).unwrap();
            let mut out = vec![0u8; LEN];
            queue.read_blocking(&*scheduler, &mut out);
            out
        })
    };
    ready_rx.recv().unwrap();

    queue.attach_producer(Wakeup::current(scheduler.clone())).unwrap();
    for chunk in data.chunks(37) {
        queue.write_blocking(&*scheduler, chunk);
    }

    let out = reader.join().unwrap();
    queue.detach_producer();
    queue.detach_consumer();
    assert_that!(&out[..], eq(&data[..]));
    assert_that!(queue.is_empty(), eq(true));
}

#[googletest::test]
fn test_blocking_char_primitives() {
    let scheduler = Arc::new(ThreadScheduler);
    let queue = Arc::new(Queue::new(2).unwrap());
    let (ready_tx, ready_rx) = std::sync::mpsc::channel();

    let writer = {
        let queue = queue.clone();
        let scheduler = scheduler.clone();
        thread::spawn(move || {
            queue.attach_producer(Wakeup::current(scheduler.clone())).unwrap();
            ready_tx.send(()).unwrap();
            for byte in b"xyz" {
                queue.write_char_blocking(&*scheduler, *byte);
            }
        })
    };
    ready_rx.recv().unwrap();

    queue.attach_consumer(Wakeup::current(scheduler.clone())).unwrap();
    let mut out = Vec::new();
    for _ in 0..3 {
        out.push(queue.read_char_blocking(&*scheduler));
    }
    writer.join().unwrap();
    queue.detach_producer();
    queue.detach_consumer();
    assert_that!(&out[..], eq(&b"xyz"[..]));
}

#[googletest::test]
fn test_queue_to_queue_blocking() {
    let scheduler = Arc::new(ThreadScheduler);
    let src = Arc::new(Queue::new(64).unwrap());
    let dest = Arc::new(Queue::new(4).unwrap());
    src.write(b"forty-two bytes of payload for the bridge");
    let expected = src.available();
    let (ready_tx, ready_rx) = std::sync::mpsc::channel();

    let reader = {
        let dest = dest.clone();
        let scheduler = scheduler.clone();
        thread::spawn(move || {
            dest.attach_consumer(Wakeup::current(scheduler.clone())).unwrap();
            ready_tx.send(()).unwrap();
            let mut out = vec![0u8; expected];
            dest.read_blocking(&*scheduler, &mut out);
            out
        })
    };
    ready_rx.recv().unwrap();

    dest.attach_producer(Wakeup::current(scheduler.clone())).unwrap();
    let moved = queue_to_queue_blocking(&dest, &src, usize::MAX, false, &*scheduler);
    let out = reader.join().unwrap();
    dest.detach_producer();
    dest.detach_consumer();

    assert_that!(moved, eq(expected));
    assert_that!(&out[..], eq(&b"forty-two bytes of payload for the bridge"[..]));
    assert_that!(src.is_empty(), eq(true));
}

#[googletest::test]
fn test_spsc_stress() {
    const LEN: usize = 200_000;
    let queue = Arc::new(Queue::new(64).unwrap());

    let producer = {
        let queue = queue.clone();
        thread::spawn(move || {
            let mut next = 0usize;
            while next < LEN {
                let end = core::cmp::min(next + 13, LEN);
                let chunk: Vec<u8> = (next..end).map(|i| i as u8).collect();
                next += queue.write(&chunk);
                core::hint::spin_loop();
            }
        })
    };

    let mut received = 0usize;
    let mut buf = [0u8; 29];
    while received < LEN {
        let read = queue.read(&mut buf, false);
        for (i, byte) in buf[..read].iter().enumerate() {
            assert_eq!(*byte, (received + i) as u8);
        }
        received += read;
    }
    producer.join().unwrap();
    assert_that!(queue.is_empty(), eq(true));
}

#[googletest::test]
fn test_concurrent_notifications_are_not_lost() {
    const PER_THREAD: usize = 20_000;
    let queue = Arc::new(Queue::new(8).unwrap());
    let issued = Arc::new(AtomicUsize::new(0));
    let seen = Arc::new(AtomicUsize::new(0));
    let (hook_issued, hook_seen) = (issued.clone(), seen.clone());
    queue
        .attach_consumer(move |_: &Queue, _blocking: bool| {
            hook_seen.fetch_max(hook_issued.load(Ordering::SeqCst), Ordering::SeqCst);
            core::hint::spin_loop();
        })
        .unwrap();

    let notifiers: Vec<_> = (0..4)
        .map(|_| {
            let queue = queue.clone();
            let issued = issued.clone();
            thread::spawn(move || {
                for _ in 0..PER_THREAD {
                    issued.fetch_add(1, Ordering::SeqCst);
                    queue.notify_consumer(false);
                }
            })
        })
        .collect();
    for notifier in notifiers {
        notifier.join().unwrap();
    }

    // The last notification either ran the hook itself or left it pending for
    // whoever was running it, so the hook saw every notification.
    expect_that!(seen.load(Ordering::SeqCst), eq(4 * PER_THREAD));
    queue.detach_consumer();
}

#[googletest::test]
fn test_write_fmt_blocking_waits_for_space() {
    let scheduler = Arc::new(ThreadScheduler);
    let queue = Arc::new(Queue::new(8).unwrap());
    let expected = std::format!("{:>60}|{}\nsecond line {:04}\n", "right", 42, 7);

    let (ready_tx, ready_rx) = std::sync::mpsc::channel();
    let reader = {
        let queue = queue.clone();
        let scheduler = scheduler.clone();
        let len = expected.len();
        thread::spawn(move || {
            queue.attach_consumer(Wakeup::current(scheduler.clone())).unwrap();
            ready_tx.send(()).unwrap();
            let mut out = vec![0u8; len];
            queue.read_blocking(&*scheduler, &mut out);
            out
        })
    };
    ready_rx.recv().unwrap();

    queue.attach_producer(Wakeup::current(scheduler.clone())).unwrap();
    let formatted = queue.write_fmt_blocking(&*scheduler, format_args!("{:>60}|{}\n", "right", 42));
    expect_that!(formatted.is_ok(), eq(true));
    let mut writer = BlockingQueueWriter::new(&queue, &*scheduler);
    expect_that!(write!(writer, "second line {:04}\n", 7).is_ok(), eq(true));

    let out = reader.join().unwrap();
    queue.detach_producer();
    queue.detach_consumer();
    expect_that!(&out[..], eq(expected.as_bytes()));
}
