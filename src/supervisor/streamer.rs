//! Batched log streaming.
//!
//! Reader tasks pull newline-delimited lines from the worker's output
//! pipes into a bounded queue; a batcher task mirrors each line to the
//! optional log file, groups lines into batches, and emits them to the
//! observer either when a batch fills or on a periodic flush tick. The
//! bounded queue gives natural backpressure: a slow observer stalls the
//! readers, which stalls the worker's pipes.

use std::fs::File;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::events::{CoreEvent, EventSink};

/// Capacity of the line queue between readers and batcher.
pub const LINE_QUEUE_CAPACITY: usize = 1000;

/// Lines per batch before an immediate flush.
pub const BATCH_CAPACITY: usize = 50;

/// Worst-case latency between a line arriving and its batch being
/// emitted under low line rates.
pub const FLUSH_INTERVAL: Duration = Duration::from_millis(200);

/// Start streaming the worker's combined output.
///
/// `stdout` and `stderr` are merged into one ordered line stream. The
/// returned handle completes once both pipes have closed and the final
/// partial batch has been flushed.
pub(crate) fn spawn<O, E>(
    stdout: O,
    stderr: E,
    log_file: Option<File>,
    ready_keyword: Option<String>,
    sink: Arc<dyn EventSink>,
) -> JoinHandle<()>
where
    O: AsyncRead + Unpin + Send + 'static,
    E: AsyncRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(LINE_QUEUE_CAPACITY);
    tokio::spawn(read_lines(stdout, tx.clone()));
    tokio::spawn(read_lines(stderr, tx));
    tokio::spawn(batch_loop(rx, log_file, ready_keyword, sink))
}

/// Pull lines from one pipe into the shared queue until the pipe closes
/// or the batcher goes away.
async fn read_lines<R>(stream: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if tx.send(line).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(error = %e, "Output pipe read ended");
                break;
            }
        }
    }
}

/// Consume the line queue, mirroring, batching, and emitting.
async fn batch_loop(
    mut rx: mpsc::Receiver<String>,
    mut log_file: Option<File>,
    ready_keyword: Option<String>,
    sink: Arc<dyn EventSink>,
) {
    let mut batch: Vec<String> = Vec::with_capacity(BATCH_CAPACITY);
    let mut ready_seen = false;
    let mut ticker = tokio::time::interval(FLUSH_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            line = rx.recv() => {
                let Some(line) = line else {
                    // Queue closed: worker exited or pipes closed.
                    flush(&mut batch, sink.as_ref());
                    break;
                };

                if let Some(file) = log_file.as_mut() {
                    if let Err(e) = writeln!(file, "{line}") {
                        tracing::warn!(error = %e, "Log file write failed, disabling mirror");
                        log_file = None;
                    }
                }

                if !ready_seen {
                    if let Some(keyword) = ready_keyword.as_deref() {
                        if !keyword.is_empty() && line.contains(keyword) {
                            sink.emit(CoreEvent::Ready);
                            ready_seen = true;
                        }
                    }
                }

                batch.push(line);
                if batch.len() >= BATCH_CAPACITY {
                    flush(&mut batch, sink.as_ref());
                }
            }
            _ = ticker.tick() => {
                if !batch.is_empty() {
                    flush(&mut batch, sink.as_ref());
                }
            }
        }
    }
}

fn flush(batch: &mut Vec<String>, sink: &dyn EventSink) {
    if batch.is_empty() {
        return;
    }
    sink.emit(CoreEvent::LogBatch(batch.join("\n")));
    batch.clear();
}
