use crate::line_protocol::LineProtocol;
use crate::metric::Metric;
use futures::SinkExt;
use shim_error::{Result, ShimError};
use std::sync::Arc;
use tokio::io::AsyncWrite;
use tokio::sync::Mutex;
use tokio_util::codec::FramedWrite;
use tokio_util::sync::CancellationToken;
use tracing::error;

type Sink = FramedWrite<Box<dyn AsyncWrite + Send + Unpin>, LineProtocol>;

/// Records the first unrecoverable write failure and wakes whoever waits
/// for it.
#[derive(Default)]
struct Fault {
    token: CancellationToken,
    reason: parking_lot::Mutex<Option<String>>,
}

/// Shared, line-atomic writer for the output stream
///
/// Every clone appends to the same sink. A metric is encoded and appended
/// while the sink lock is held, and the sink is flushed before the lock is
/// released, so lines from concurrent writers never interleave and every
/// point reaches the host as soon as it is produced.
///
/// The first I/O failure faults the writer permanently: the failure is
/// recorded, [`OutputWriter::faulted`] is cancelled and every later write
/// fails with [`ShimError::Stream`].
#[derive(Clone)]
pub struct OutputWriter {
    sink: Arc<Mutex<Sink>>,
    fault: Arc<Fault>,
}

impl OutputWriter {
    pub fn new<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let writer: Box<dyn AsyncWrite + Send + Unpin> = Box::new(writer);

        Self {
            sink: Arc::new(Mutex::new(FramedWrite::new(writer, LineProtocol))),
            fault: Arc::new(Fault::default()),
        }
    }

    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }

    /// Encode one metric and append it to the output stream.
    ///
    /// Returns [`ShimError::Encoding`] if the metric was dropped, in which
    /// case the stream is untouched and the writer stays usable.
    pub async fn write(&self, metric: &Metric) -> Result<()> {
        if let Some(err) = self.fault() {
            return Err(err);
        }

        let mut sink = self.sink.lock().await;
        match sink.send(metric).await {
            Ok(()) => Ok(()),
            Err(e @ ShimError::Encoding { .. }) => Err(e),
            Err(e) => Err(self.mark_faulted(e)),
        }
    }

    /// Flush whatever is buffered and shut the output stream down.
    pub async fn close(&self) -> Result<()> {
        if let Some(err) = self.fault() {
            return Err(err);
        }

        let mut sink = self.sink.lock().await;
        SinkExt::<&Metric>::close(&mut *sink)
            .await
            .map_err(|e| self.mark_faulted(e))
    }

    /// Token cancelled once the writer has faulted
    pub fn faulted(&self) -> CancellationToken {
        self.fault.token.clone()
    }

    /// The recorded fault, if any
    pub fn fault(&self) -> Option<ShimError> {
        self.fault
            .reason
            .lock()
            .as_ref()
            .map(|reason| ShimError::stream(reason.clone()))
    }

    fn mark_faulted(&self, err: ShimError) -> ShimError {
        let mut reason = self.fault.reason.lock();
        if reason.is_none() {
            error!("Output stream is no longer writable: {}", err);
            *reason = Some(format!("output stream unwritable: {}", err));
            self.fault.token.cancel();
        }
        ShimError::stream(reason.clone().unwrap_or_default())
    }
}
