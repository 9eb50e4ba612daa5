//! NDJSON input feed: one record per line from a file or stdin.

use super::InboundRecord;
use std::path::Path;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("reading input feed: {0}")]
    Io(#[from] std::io::Error),
}

/// Open the configured source (stdin when `None`) and stream parsed records into
/// a bounded channel. Unparseable lines are logged and passed on as
/// [`InboundRecord::Unreadable`] so they can be counted. Per-line order is
/// preserved, which is all the coordinator needs for per-account ordering.
pub async fn read_records(
    source: Option<&Path>,
    capacity: usize,
) -> Result<mpsc::Receiver<InboundRecord>, ReadError> {
    let (tx, rx) = mpsc::channel(capacity);
    match source {
        Some(path) => {
            let file = tokio::fs::File::open(path).await?;
            tokio::spawn(pump(BufReader::new(file), tx));
        }
        None => {
            tokio::spawn(pump(BufReader::new(tokio::io::stdin()), tx));
        }
    }
    Ok(rx)
}

async fn pump<R: AsyncBufRead + Unpin>(reader: R, tx: mpsc::Sender<InboundRecord>) {
    let mut lines = reader.lines();
    let mut line_no: u64 = 0;
    loop {
        let line = match lines.next_line().await {
            Ok(Some(l)) => l,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "input feed read failed");
                break;
            }
        };
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str::<InboundRecord>(&line).unwrap_or_else(|e| {
            warn!(line = line_no, error = %e, "unparseable input line");
            InboundRecord::Unreadable {
                line: line_no,
                error: e.to_string(),
            }
        });
        if tx.send(record).await.is_err() {
            break;
        }
    }
}
