use chrono::Local;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

/// Timestamp prepended to every log line
pub const LINE_PREFIX_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f | ";

/// Single writer of one log file.
///
/// Appends every queued line, prefixed with a timestamp, until the channel
/// closes or `cancel` fires. On cancellation the lines already queued are
/// still written before the file is flushed.
pub(crate) async fn copy_lines(
    mut rx: UnboundedReceiver<String>,
    file: File,
    cancel: CancellationToken,
    echo: Option<Arc<AtomicBool>>,
) {
    let mut out = LogWriter {
        file: BufWriter::new(file),
        echo,
        broken: false,
    };

    loop {
        tokio::select! {
            biased;
            line = rx.recv() => match line {
                Some(line) => {
                    out.write(&line).await;
                    if rx.is_empty() {
                        out.flush().await;
                    }
                }
                None => break,
            },
            () = cancel.cancelled() => {
                while let Ok(line) = rx.try_recv() {
                    out.write(&line).await;
                }
                break;
            }
        }
    }
    out.flush().await;
}

struct LogWriter {
    file: BufWriter<File>,
    echo: Option<Arc<AtomicBool>>,
    broken: bool,
}

impl LogWriter {
    async fn write(&mut self, line: &str) {
        if self
            .echo
            .as_ref()
            .is_some_and(|trace| trace.load(Ordering::Relaxed))
        {
            let mut stdout = std::io::stdout().lock();
            let _ = writeln!(stdout, "{line}");
        }

        if self.broken {
            return;
        }
        let stamped = format!("{}{line}\n", Local::now().format(LINE_PREFIX_FORMAT));
        if let Err(e) = self.file.write_all(stamped.as_bytes()).await {
            // Reporting through tracing would feed this same file.
            self.broken = true;
            eprintln!("stackrun: log write failed, further lines are dropped: {e}");
        }
    }

    async fn flush(&mut self) {
        if !self.broken {
            let _ = self.file.flush().await;
        }
    }
}
