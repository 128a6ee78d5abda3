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

use alloc::{boxed::Box, sync::Arc};

use bitflags::bitflags;
use strum::Display;

bitflags! {
    /// Flags for a character device transfer.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct CharDevFlags: u32 {
        /// Wait until the whole buffer has been transferred.
        const BLOCKING = 1 << 0;
        /// Transfer synchronously without relying on interrupts or on any
        /// queue the device drains from interrupt context. Used for crash
        /// output. Devices without a polled mode may ignore it.
        const POLLED = 1 << 1;
    }
}

/// Errors reported by a character device.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
#[non_exhaustive]
pub enum CharDevError {
    /// The device has not been initialised.
    #[strum(to_string = "device not ready")]
    NotReady,
    /// The device doesn't support this direction of transfer.
    #[strum(to_string = "operation not supported by device")]
    Unsupported,
    /// The hardware reported an error.
    #[strum(to_string = "device i/o error")]
    Io,
}

impl core::error::Error for CharDevError {}

/// A byte-oriented device such as a UART or a hypervisor byte channel.
///
/// Without [`CharDevFlags::BLOCKING`] both operations transfer what they can
/// right away and return the count, which may be zero.
pub trait CharDev {
    fn transmit(&self, buf: &[u8], flags: CharDevFlags) -> Result<usize, CharDevError>;
    fn receive(&self, buf: &mut [u8], flags: CharDevFlags) -> Result<usize, CharDevError>;
}

impl<T: CharDev + ?Sized> CharDev for &T {
    fn transmit(&self, buf: &[u8], flags: CharDevFlags) -> Result<usize, CharDevError> {
        (**self).transmit(buf, flags)
    }

    fn receive(&self, buf: &mut [u8], flags: CharDevFlags) -> Result<usize, CharDevError> {
        (**self).receive(buf, flags)
    }
}

impl<T: CharDev + ?Sized> CharDev for Box<T> {
    fn transmit(&self, buf: &[u8], flags: CharDevFlags) -> Result<usize, CharDevError> {
        (**self).transmit(buf, flags)
    }

    fn receive(&self, buf: &mut [u8], flags: CharDevFlags) -> Result<usize, CharDevError> {
        (**self).receive(buf, flags)
    }
}

impl<T: CharDev + ?Sized> CharDev for Arc<T> {
    fn transmit(&self, buf: &[u8], flags: CharDevFlags) -> Result<usize, CharDevError> {
        (**self).transmit(buf, flags)
    }

    fn receive(&self, buf: &mut [u8], flags: CharDevFlags) -> Result<usize, CharDevError> {
        (**self).receive(buf, flags)
    }
}
