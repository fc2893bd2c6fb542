//! Cancellation on signals and timeouts.
//!
//! Both paths cancel the run's [`CancellationToken`]. The pipeline checks it
//! between stages and every running subprocess is killed when it fires.

use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Cancels `token` on SIGINT or SIGTERM (Ctrl+C or Ctrl+Break on Windows).
pub fn install_signal_handlers(token: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};

            let (Ok(mut sigterm), Ok(mut sigint)) = (
                signal(SignalKind::terminate()),
                signal(SignalKind::interrupt()),
            ) else {
                warn!("failed to install signal handlers");
                return;
            };

            tokio::select! {
                _ = sigterm.recv() => info!("received SIGTERM, cancelling release"),
                _ = sigint.recv() => info!("received SIGINT, cancelling release"),
                () = token.cancelled() => return,
            }
        }

        #[cfg(windows)]
        {
            use tokio::signal::windows;

            let (Ok(mut ctrl_c), Ok(mut ctrl_break)) = (windows::ctrl_c(), windows::ctrl_break())
            else {
                warn!("failed to install signal handlers");
                return;
            };

            tokio::select! {
                _ = ctrl_c.recv() => info!("received Ctrl+C, cancelling release"),
                _ = ctrl_break.recv() => info!("received Ctrl+Break, cancelling release"),
                () = token.cancelled() => return,
            }
        }

        token.cancel();
    });
}

/// Cancels `token` once `timeout` elapses.
pub fn cancel_after(token: CancellationToken, timeout: Duration) {
    tokio::spawn(async move {
        tokio::select! {
            () = tokio::time::sleep(timeout) => {
                warn!(timeout = ?timeout, "release timed out");
                token.cancel();
            }
            () = token.cancelled() => {}
        }
    });
}

/// Parses durations such as `90s`, `30m`, `1h` or a bare number of seconds.
pub fn parse_duration(value: &str) -> Result<Duration, String> {
    let value = value.trim();
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (number, unit) = value.split_at(split);
    let number: u64 = number
        .parse()
        .map_err(|_| format!("invalid duration \"{value}\""))?;
    let seconds = match unit {
        "" | "s" => number,
        "m" => number * 60,
        "h" => number * 3600,
        _ => return Err(format!("invalid duration unit in \"{value}\", use s, m or h")),
    };
    Ok(Duration::from_secs(seconds))
}
