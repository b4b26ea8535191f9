//! External command file reader
//!
//! Follows the command file like `tail -f`: complete lines are queued on the
//! engine and a trailing partial line waits for its newline. Named pipes
//! behave the same way once opened.

use anyhow::Context;
use std::path::Path;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use watchkeeper_core::engine::EngineHandle;

/// Delay between reads once the end of the file is reached
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Queue every line written to `path` until the engine stops
pub async fn follow(
    path: impl AsRef<Path>,
    engine: EngineHandle,
    poll_interval: Duration,
) -> anyhow::Result<()> {
    let path = path.as_ref();
    let file = File::open(path)
        .await
        .with_context(|| format!("Failed to open command file {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut pending = Vec::new();

    tracing::info!(path = %path.display(), "Following command file");
    loop {
        let read = reader.read_until(b'\n', &mut pending).await?;
        if read == 0 {
            tokio::time::sleep(poll_interval).await;
            continue;
        }
        if pending.last() != Some(&b'\n') {
            continue;
        }

        let line = String::from_utf8_lossy(&pending).trim().to_string();
        pending.clear();
        if line.is_empty() {
            continue;
        }
        if engine.enqueue_command(line).await.is_err() {
            tracing::info!("Engine stopped, closing command file");
            return Ok(());
        }
    }
}
