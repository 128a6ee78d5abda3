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

//! Interrupt-driven NS16550 UART exposed as a [`CharDev`].
//!
//! Transmitted bytes are queued on a TX [`Queue`] and moved into the
//! transmitter FIFO by the interrupt handler; received bytes are moved by the
//! interrupt handler into an RX queue. The handler is the only consumer of the
//! TX queue and the only producer of the RX queue.
//!
//! A transmit with [`CharDevFlags::POLLED`] skips the TX queue and feeds the
//! transmitter directly, which is what crash output needs.

#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod regs;

use alloc::sync::Arc;
use core::sync::atomic::{fence, AtomicU8, AtomicUsize, Ordering};

use anyhow::anyhow;
use libos_queue::{CharDev, CharDevError, CharDevFlags, Queue};

use crate::regs::{
    InterruptEnable, LineStatus, UartRegisters, DATA, DIVISOR_LATCH_ACCESS, DTR_RTS_OUT2,
    FIFO_CONTROL, FIFO_ENABLE_AND_CLEAR, INTERRUPT_ENABLE, INTERRUPT_ID, LINE_CONTROL,
    LINE_CONTROL_8N1, LINE_STATUS, MODEM_CONTROL, NO_INTERRUPT_PENDING, TX_FIFO_DEPTH,
};
pub use crate::regs::MmioRegisters;

pub struct Ns16550<R: UartRegisters> {
    regs: R,
    tx: Arc<Queue>,
    rx: Arc<Queue>,
    /// Shadow of the interrupt enable register.
    ier: AtomicU8,
    /// Received bytes lost because the RX queue or the hardware FIFO was full.
    overruns: AtomicUsize,
    /// Value of `overruns` at the last report.
    reported: AtomicUsize,
}

impl<R: UartRegisters> Ns16550<R> {
    /// Wraps a UART with the given queues. The device stays untouched until
    /// [`Ns16550::init`] is called.
    pub fn new(regs: R, tx: Arc<Queue>, rx: Arc<Queue>) -> Self {
        Self {
            regs,
            tx,
            rx,
            ier: AtomicU8::new(0),
            overruns: AtomicUsize::new(0),
            reported: AtomicUsize::new(0),
        }
    }

    /// Creates TX and RX queues of `queue_size` bytes and initialises the UART
    /// with the baud rate `divisor`.
    pub fn open(regs: R, queue_size: usize, divisor: u16) -> anyhow::Result<Self> {
        let tx =
            Queue::new(queue_size).map_err(|err| anyhow!("couldn't create TX queue: {}", err))?;
        let rx =
            Queue::new(queue_size).map_err(|err| anyhow!("couldn't create RX queue: {}", err))?;
        let uart = Self::new(regs, Arc::new(tx), Arc::new(rx));
        uart.init(divisor);
        log::info!("ns16550 initialised with divisor {}", divisor);
        Ok(uart)
    }

    /// Programs the UART for 8N1 at the baud rate `divisor`, enables the FIFOs
    /// and the receive interrupt.
    pub fn init(&self, divisor: u16) {
        let [low, high] = divisor.to_le_bytes();
        self.regs.write(INTERRUPT_ENABLE, 0);
        self.regs.write(LINE_CONTROL, DIVISOR_LATCH_ACCESS);
        self.regs.write(DATA, low);
        self.regs.write(INTERRUPT_ENABLE, high);
        self.regs.write(LINE_CONTROL, LINE_CONTROL_8N1);
        self.regs.write(FIFO_CONTROL, FIFO_ENABLE_AND_CLEAR);
        self.regs.write(MODEM_CONTROL, DTR_RTS_OUT2);
        self.ier.store(InterruptEnable::RX_DATA.bits(), Ordering::Release);
        self.regs.write(INTERRUPT_ENABLE, InterruptEnable::RX_DATA.bits());
    }

    /// Bytes waiting to be transmitted.
    pub fn tx_queue(&self) -> &Arc<Queue> {
        &self.tx
    }

    /// Bytes received and not yet read.
    pub fn rx_queue(&self) -> &Arc<Queue> {
        &self.rx
    }

    /// Number of received bytes lost so far.
    pub fn overruns(&self) -> usize {
        self.overruns.load(Ordering::Relaxed)
    }

    /// Logs how many received bytes were lost since the last report.
    ///
    /// Not for interrupt context: the log output may well go through this very
    /// UART.
    pub fn report_overruns(&self) {
        let total = self.overruns();
        let previous = self.reported.swap(total, Ordering::Relaxed);
        if total > previous {
            log::warn!("ns16550: lost {} received bytes", total - previous);
        }
    }

    /// Services the UART. Returns whether the UART had an interrupt pending.
    pub fn interrupt(&self) -> bool {
        if self.regs.read(INTERRUPT_ID) & NO_INTERRUPT_PENDING != 0 {
            return false;
        }

        let status = self.line_status();
        self.receive_fifo(status);
        if status.contains(LineStatus::THR_EMPTY)
            && self.interrupts().contains(InterruptEnable::THR_EMPTY)
        {
            self.refill_fifo();
        }
        true
    }

    fn line_status(&self) -> LineStatus {
        LineStatus::from_bits_truncate(self.regs.read(LINE_STATUS))
    }

    fn interrupts(&self) -> InterruptEnable {
        InterruptEnable::from_bits_truncate(self.ier.load(Ordering::Acquire))
    }

    fn receive_fifo(&self, mut status: LineStatus) {
        let mut received = false;
        while status.contains(LineStatus::DATA_READY) {
            if status.contains(LineStatus::OVERRUN_ERROR) {
                self.overruns.fetch_add(1, Ordering::Relaxed);
            }
            let byte = self.regs.read(DATA);
            if self.rx.write_char(byte).is_err() {
                self.overruns.fetch_add(1, Ordering::Relaxed);
            }
            received = true;
            status = self.line_status();
        }
        if received {
            self.rx.notify_consumer(false);
        }
    }

    fn refill_fifo(&self) {
        let mut sent = 0;
        while sent < TX_FIFO_DEPTH {
            let Ok(byte) = self.tx.read_char(false) else {
                break;
            };
            self.regs.write(DATA, byte);
            sent += 1;
        }

        if self.tx.is_empty() {
            self.update_interrupts(|ier| ier - InterruptEnable::THR_EMPTY);
            // A transmit may have queued bytes after we found the queue empty,
            // and seen the interrupt still enabled.
            fence(Ordering::SeqCst);
            if !self.tx.is_empty() {
                self.update_interrupts(|ier| ier | InterruptEnable::THR_EMPTY);
            }
        }
        if sent > 0 {
            self.tx.notify_producer();
        }
    }

    /// Writes `buf` straight to the transmitter, bypassing the TX queue.
    ///
    /// Works with interrupts masked. Bytes still sitting in the TX queue go
    /// out after these.
    fn transmit_polled(&self, buf: &[u8]) {
        for &byte in buf {
            while !self.line_status().contains(LineStatus::THR_EMPTY) {
                core::hint::spin_loop();
            }
            self.regs.write(DATA, byte);
        }
    }

    fn update_interrupts(&self, update: impl Fn(InterruptEnable) -> InterruptEnable) {
        let mut current = self.ier.load(Ordering::Acquire);
        loop {
            let new = update(InterruptEnable::from_bits_truncate(current)).bits();
            match self.ier.compare_exchange_weak(current, new, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => {
                    self.regs.write(INTERRUPT_ENABLE, new);
                    return;
                }
                Err(actual) => current = actual,
            }
        }
    }
}

impl<R: UartRegisters> CharDev for Ns16550<R> {
    fn transmit(&self, buf: &[u8], flags: CharDevFlags) -> Result<usize, CharDevError> {
        if self.interrupts().is_empty() {
            return Err(CharDevError::NotReady);
        }
        if flags.contains(CharDevFlags::POLLED) {
            self.transmit_polled(buf);
            return Ok(buf.len());
        }

        let mut sent = 0;
        loop {
            let written = self.tx.write(&buf[sent..]);
            sent += written;
            fence(Ordering::SeqCst);
            if written > 0 && !self.interrupts().contains(InterruptEnable::THR_EMPTY) {
                // Enabling the interrupt with the FIFO empty raises it at once.
                self.update_interrupts(|ier| ier | InterruptEnable::THR_EMPTY);
            }
            if sent == buf.len() || !flags.contains(CharDevFlags::BLOCKING) {
                return Ok(sent);
            }
            core::hint::spin_loop();
        }
    }

    fn receive(&self, buf: &mut [u8], flags: CharDevFlags) -> Result<usize, CharDevError> {
        if self.interrupts().is_empty() {
            return Err(CharDevError::NotReady);
        }

        loop {
            let received = self.rx.read(buf, false);
            if received > 0 || buf.is_empty() || !flags.contains(CharDevFlags::BLOCKING) {
                return Ok(received);
            }
            core::hint::spin_loop();
        }
    }
}
