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

use log::{LevelFilter, Log, Metadata, Record};

use crate::{console, ConsoleState};

/// Logs to the global console as `"<prefix> <level>: <message>"`.
///
/// Records logged before the console is installed are lost.
pub struct ConsoleLogger {}

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        if let Some(console) = console() {
            write_record(console, record);
        }
    }

    fn flush(&self) {
        if let Some(console) = console() {
            console.flush();
        }
    }
}

pub(crate) fn write_record(console: &ConsoleState, record: &Record) -> usize {
    console.write_fmt(format_args!(
        "{} {}: {}\n",
        console.prefix(),
        record.level(),
        record.args()
    ))
}

static LOGGER: ConsoleLogger = ConsoleLogger {};

/// Installs [`ConsoleLogger`] as the global logger.
pub fn init_logging(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    log::set_logger(&LOGGER)?;
    log::set_max_level(level);
    Ok(())
}
