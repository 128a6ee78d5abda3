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

//! Console configuration from the guest's boot arguments.

use alloc::{
    collections::btree_map::BTreeMap,
    string::{String, ToString},
};
use core::str::FromStr;

use log::LevelFilter;
use strum::Display;

const DEFAULT_BUFFER_SIZE: usize = 4096;
const DEFAULT_PREFIX: &str = "libos";

/// Errors in the console arguments.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum ConfigError {
    #[strum(to_string = "console.bufsize must be a power of two of at least 2")]
    InvalidBufferSize,
    #[strum(to_string = "console.crlf must be 0 or 1")]
    InvalidCrlf,
    #[strum(to_string = "loglevel must be one of off, error, warn, info, debug, trace")]
    InvalidLogLevel,
}

impl core::error::Error for ConfigError {}

/// Settings for the console.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConsoleConfig {
    /// Size of the console queue in bytes. A power of two.
    pub buffer_size: usize,
    /// Whether `\n` is sent to the device as `\r\n`.
    pub crlf: bool,
    /// Maximum level passed through by the console logger.
    pub log_level: LevelFilter,
    /// Prefix put in front of every log line.
    pub prefix: String,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            crlf: true,
            log_level: LevelFilter::Info,
            prefix: DEFAULT_PREFIX.to_string(),
        }
    }
}

impl ConsoleConfig {
    /// Parses the console settings out of a boot argument string.
    ///
    /// The pattern for arguments is "key1 key2=val2 key3=val3". Keys that
    /// don't concern the console are ignored, and missing keys keep their
    /// default values.
    pub fn from_args(args: &str) -> Result<Self, ConfigError> {
        let args = split_args(args);
        let mut config = Self::default();

        if let Some(size) = args.get("console.bufsize") {
            config.buffer_size = usize::from_str(size)
                .ok()
                .filter(|size| *size >= 2 && size.is_power_of_two())
                .ok_or(ConfigError::InvalidBufferSize)?;
        }
        if let Some(crlf) = args.get("console.crlf") {
            config.crlf = match *crlf {
                "0" => false,
                "1" | "" => true,
                _ => return Err(ConfigError::InvalidCrlf),
            };
        }
        if let Some(level) = args.get("loglevel") {
            config.log_level =
                LevelFilter::from_str(level).map_err(|_| ConfigError::InvalidLogLevel)?;
        }
        if let Some(prefix) = args.get("console.prefix") {
            config.prefix = prefix.to_string();
        }

        Ok(config)
    }
}

fn split_args(args: &str) -> BTreeMap<&str, &str> {
    args.split_whitespace().map(|arg| arg.split_once('=').unwrap_or((arg, ""))).collect()
}
