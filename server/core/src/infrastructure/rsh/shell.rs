// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! RSH Command Interpreter
//!
//! The per-connection shell state and the fixed command vocabulary.
//! Commands in a batch are separated by `;`, arguments by whitespace;
//! output accumulates across the batch and a failing command simply
//! contributes nothing. The working directory set by `cd` persists for
//! the life of the connection.

use std::sync::Arc;

use chrono::Utc;
use tracing::warn;

use super::tar_export;
use crate::domain::store::AssetStore;

/// Shell state for one accepted connection.
pub struct ShellSession {
    store: Arc<dyn AssetStore>,
    workdir: String,
}

impl ShellSession {
    /// Create a session with an empty working directory.
    pub fn new(store: Arc<dyn AssetStore>) -> Self {
        Self {
            store,
            workdir: String::new(),
        }
    }

    /// Current working directory (trailing slash included once set).
    pub fn workdir(&self) -> &str {
        &self.workdir
    }

    /// Run one command batch, returning its accumulated output.
    pub async fn run_batch(&mut self, command_line: &str) -> Vec<u8> {
        let mut output = Vec::new();

        for command in command_line.split(';') {
            let args: Vec<&str> = command.split_whitespace().collect();
            let Some(&name) = args.first() else {
                continue;
            };

            match name {
                "cat" => self.cat(&args, &mut output).await,
                "cd" => self.cd(&args),
                "date" => output.extend_from_slice(date_line().as_bytes()),
                "grep" => self.grep(&args, &mut output).await,
                "tar" => self.tar(&args, &mut output).await,
                other => warn!(command = %other, "rsh: unhandled command"),
            }
        }

        output
    }

    async fn cat(&self, args: &[&str], output: &mut Vec<u8>) {
        let Some(path) = args.get(1) else {
            warn!("rsh: cat without a path");
            return;
        };
        let logical = format!("{}{}", self.workdir, path);
        match self.store.lookup(&logical).await {
            Ok(data) => output.extend_from_slice(&data),
            Err(e) => warn!(file = %logical, error = %e, "rsh: cat failed"),
        }
    }

    fn cd(&mut self, args: &[&str]) {
        let Some(dir) = args.get(1) else {
            warn!("rsh: cd without a directory");
            return;
        };
        self.workdir = format!("{dir}/");
    }

    async fn grep(&self, args: &[&str], output: &mut Vec<u8>) {
        let (Some(pattern), Some(path)) = (args.get(1), args.get(2)) else {
            warn!("rsh: grep needs a pattern and a path");
            return;
        };

        // anchor at line start, matching the installer's `grep ^...` use
        let regex = match regex::bytes::Regex::new(&format!(r"\A(?:{pattern})")) {
            Ok(regex) => regex,
            Err(e) => {
                warn!(pattern = %pattern, error = %e, "rsh: bad grep pattern");
                return;
            }
        };

        let logical = format!("{}{}", self.workdir, path);
        let data = match self.store.lookup(&logical).await {
            Ok(data) => data,
            Err(e) => {
                warn!(file = %logical, error = %e, "rsh: grep failed");
                return;
            }
        };

        for line in data.split_inclusive(|&b| b == b'\n') {
            if regex.is_match(line) {
                output.extend_from_slice(line);
            }
        }
    }

    async fn tar(&self, args: &[&str], output: &mut Vec<u8>) {
        if args.get(1) != Some(&"cf") || args.get(2) != Some(&"-") {
            warn!(args = ?args, "rsh: unhandled tar invocation");
            return;
        }
        match tar_export::build_archive(self.store.as_ref(), &self.workdir, &args[3..]).await {
            Ok(archive) => output.extend_from_slice(&archive),
            Err(e) => warn!(error = %e, "rsh: tar failed"),
        }
    }
}

/// The `date` command's output: `Www Mon DD HH:MM:SS ZZZ YYYY`.
fn date_line() -> String {
    Utc::now().format("%a %b %d %H:%M:%S %Z %Y").to_string()
}
