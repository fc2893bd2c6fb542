//! Subprocess execution with cancellation.

use crate::error::{Error, Result};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Renders a command as `program arg1 arg2` for logs and errors.
#[must_use]
pub fn display(command: &Command) -> String {
    let std = command.as_std();
    std::iter::once(std.get_program())
        .chain(std.get_args())
        .map(|part| part.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Runs `command` to completion and returns its stdout.
///
/// The child is killed if `cancel` fires before it exits. A non-zero exit
/// status yields [`Error::Process`] carrying stdout and stderr combined.
///
/// # Errors
///
/// Returns an error if the process cannot be spawned, exits unsuccessfully
/// or the run is cancelled.
pub async fn output(mut command: Command, cancel: &CancellationToken) -> Result<String> {
    let rendered = display(&command);
    tracing::debug!(command = %rendered, "running");
    command.kill_on_drop(true);

    let output = tokio::select! {
        () = cancel.cancelled() => return Err(Error::Cancelled),
        output = command.output() => output.map_err(|e| Error::Process {
            command: rendered.clone(),
            output: e.to_string(),
        })?,
    };

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if output.status.success() {
        return Ok(stdout);
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    let combined = format!("{stdout}{stderr}").trim().to_string();
    tracing::debug!(
        command = %rendered,
        status = %output.status,
        output = %combined,
        "command failed"
    );
    Err(Error::Process {
        command: rendered,
        output: combined,
    })
}
