use std::io;
use tokio::sync::mpsc;
use tracing_subscriber::fmt::MakeWriter;

/// Write end of a log stream.
///
/// Each log file has exactly one stream-copier draining the matching
/// receiver, so any number of `LineSink` clones can feed it without locking.
#[derive(Debug, Clone)]
pub struct LineSink {
    tx: mpsc::UnboundedSender<String>,
}

impl LineSink {
    /// Create a sink and the receiver its copier will drain.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue one line. Returns false once the copier has gone away.
    pub fn line(&self, line: impl Into<String>) -> bool {
        self.tx.send(line.into()).is_ok()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Buffers one formatted tracing event and queues it line by line on drop.
#[derive(Debug)]
pub struct SinkWriter {
    sink: LineSink,
    buf: Vec<u8>,
}

impl io::Write for SinkWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for SinkWriter {
    fn drop(&mut self) {
        if self.buf.is_empty() {
            return;
        }
        let text = String::from_utf8_lossy(&self.buf);
        for line in text.lines() {
            self.sink.line(line);
        }
    }
}

impl<'a> MakeWriter<'a> for LineSink {
    type Writer = SinkWriter;

    fn make_writer(&'a self) -> Self::Writer {
        SinkWriter {
            sink: self.clone(),
            buf: Vec::new(),
        }
    }
}
