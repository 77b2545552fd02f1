// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Tokio based command execution for blob-browser.
//!
//! The local identity chain falls back to the Azure CLI session of whoever
//! runs the server, which means spawning `az` and reading its JSON output.
//!
//! ```no_run
//! use blob_browser_core::Context;
//! use blob_browser_command_execute_tokio::TokioCommandExecute;
//!
//! # async fn example() -> blob_browser_core::Result<()> {
//! let ctx = Context::new().with_command_execute(TokioCommandExecute);
//! let output = ctx.command_execute("az", &["account", "show"]).await?;
//! if output.success() {
//!     println!("{}", String::from_utf8_lossy(&output.stdout));
//! }
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use blob_browser_core::{CommandExecute, CommandOutput, Error, Result};
use std::process::Stdio;
use tokio::process::Command;

/// Tokio-based implementation of the `CommandExecute` trait.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioCommandExecute;

#[async_trait]
impl CommandExecute for TokioCommandExecute {
    async fn command_execute(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        log::debug!("executing command: {program} {}", args.join(" "));

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                Error::unexpected(format!("failed to execute command '{program}'")).with_source(e)
            })?;

        Ok(CommandOutput {
            // Killed by a signal.
            status: output.status.code().unwrap_or(-1),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}
