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

//! NS16550 register layout and access.

use bitflags::bitflags;

/// The offset of the receive buffer register (read) and the transmit holding
/// register (write). With DLAB set, the low byte of the divisor latch.
pub const DATA: usize = 0;
/// The offset of the interrupt enable register. With DLAB set, the high byte
/// of the divisor latch.
pub const INTERRUPT_ENABLE: usize = 1;
/// The offset of the interrupt identification register (read) and the FIFO
/// control register (write).
pub const INTERRUPT_ID: usize = 2;
/// The offset of the FIFO control register.
pub const FIFO_CONTROL: usize = 2;
/// The offset of the line control register.
pub const LINE_CONTROL: usize = 3;
/// The offset of the modem control register.
pub const MODEM_CONTROL: usize = 4;
/// The offset of the line status register.
pub const LINE_STATUS: usize = 5;

/// Value of the line control register for 8 data bits, no parity and 1 stop
/// bit.
///
/// See <https://en.wikipedia.org/wiki/8-N-1>.
pub const LINE_CONTROL_8N1: u8 = 3;

/// Line control bit that maps the divisor latch over the first two registers.
pub const DIVISOR_LATCH_ACCESS: u8 = 1 << 7;

/// Value of the FIFO control register to enable and clear both FIFOs.
pub const FIFO_ENABLE_AND_CLEAR: u8 = 0b111;

/// Value of the modem control register to mark the data terminal ready,
/// request to send, and route the interrupt line out of the chip.
pub const DTR_RTS_OUT2: u8 = 0b1011;

/// Interrupt identification bit that is set when no interrupt is pending.
pub const NO_INTERRUPT_PENDING: u8 = 1;

/// Bytes the transmitter FIFO can take once it reports empty.
pub const TX_FIFO_DEPTH: usize = 16;

bitflags! {
    /// Line status register.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct LineStatus: u8 {
        const DATA_READY = 1 << 0;
        const OVERRUN_ERROR = 1 << 1;
        const PARITY_ERROR = 1 << 2;
        const FRAMING_ERROR = 1 << 3;
        const BREAK = 1 << 4;
        const THR_EMPTY = 1 << 5;
        const TRANSMITTER_EMPTY = 1 << 6;
        const RX_FIFO_ERROR = 1 << 7;
    }

    /// Interrupt enable register.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct InterruptEnable: u8 {
        const RX_DATA = 1 << 0;
        const THR_EMPTY = 1 << 1;
        const LINE_STATUS = 1 << 2;
        const MODEM_STATUS = 1 << 3;
    }
}

/// Access to the byte-wide registers of a UART.
pub trait UartRegisters: Send + Sync {
    fn read(&self, offset: usize) -> u8;
    fn write(&self, offset: usize, value: u8);
}

/// Memory-mapped registers, `stride` bytes apart.
pub struct MmioRegisters {
    base: usize,
    stride: usize,
}

impl MmioRegisters {
    /// # Safety
    ///
    /// `base` must be the virtual address of a mapped 16550-compatible UART,
    /// with its registers `stride` bytes apart, that nothing else accesses.
    pub unsafe fn new(base: usize, stride: usize) -> Self {
        Self { base, stride }
    }

    fn register(&self, offset: usize) -> *mut u8 {
        (self.base + offset * self.stride) as *mut u8
    }
}

impl UartRegisters for MmioRegisters {
    fn read(&self, offset: usize) -> u8 {
        // Safety: the register lies within the device passed to `new`.
        unsafe { self.register(offset).read_volatile() }
    }

    fn write(&self, offset: usize, value: u8) {
        // Safety: the register lies within the device passed to `new`.
        unsafe { self.register(offset).write_volatile(value) }
    }
}
