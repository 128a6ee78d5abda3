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

use core::fmt;

use strum::Display;

/// Errors returned when constructing a queue or registering its hooks.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
#[non_exhaustive]
pub enum QueueError {
    /// The requested size is not a power of two, or is smaller than 2.
    #[strum(to_string = "queue size is not a power of two")]
    NotPowerOfTwo(usize),
    /// The backing buffer couldn't be allocated.
    #[strum(to_string = "couldn't allocate queue buffer")]
    OutOfMemory(usize),
    /// A producer or consumer hook is already attached to the queue.
    #[strum(to_string = "queue role already attached")]
    AlreadyAttached,
}

impl core::error::Error for QueueError {}

/// The queue was empty, so nothing could be read.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WouldBlock;

impl fmt::Display for WouldBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("queue is empty")
    }
}

impl core::error::Error for WouldBlock {}

/// The queue was full, so nothing could be written.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Busy;

impl fmt::Display for Busy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("queue is full")
    }
}

impl core::error::Error for Busy {}
