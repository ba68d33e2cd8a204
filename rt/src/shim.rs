use crate::accumulator::Accumulator;
use crate::mux::{Event, TriggerMux};
use crate::plugin::Plugin;
use shim_error::{Result, ShimError};
use shim_protocol::OutputWriter;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Counters for one run of the collection loop
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Triggers taken off the queue
    pub triggers: u64,
    /// Individual plugin collection calls
    pub collections: u64,
    /// Collection calls that failed
    pub collection_errors: u64,
}

/// Drives registered plugins from a separate process
///
/// Collections are requested by a periodic timer and by lines arriving on
/// the input stream; data points go to the output stream in line protocol.
/// Exactly one collection runs at a time. End-of-stream on the input is the
/// normal shutdown request.
pub struct Shim {
    input: Box<dyn AsyncRead + Send + Unpin>,
    writer: OutputWriter,
    plugins: Vec<Plugin>,
}

impl Shim {
    pub fn new<R, W>(input: R, output: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: tokio::io::AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            input: Box::new(input),
            writer: OutputWriter::new(output),
            plugins: Vec::new(),
        }
    }

    /// Shim wired to the process's stdin and stdout
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }

    /// Initialize a plugin and add it to the collection order.
    pub async fn register(&mut self, mut plugin: Plugin) -> Result<()> {
        if let Err(e) = plugin.init().await {
            return Err(ShimError::configuration(format!(
                "plugin '{}' failed to initialize: {}",
                plugin.name(),
                e
            )));
        }

        info!("Registered {:?} plugin", plugin);
        self.plugins.push(plugin);
        Ok(())
    }

    /// Run until the input stream is closed, collecting every `interval` and
    /// on every input line.
    pub async fn run(self, interval: Duration) -> Result<()> {
        self.drive(Some(interval)).await.map(|_| ())
    }

    /// Run until the input stream is closed, collecting only on input lines.
    pub async fn run_on_signal(self) -> Result<()> {
        self.drive(None).await.map(|_| ())
    }

    /// Like [`Shim::run`], returning the loop counters.
    pub async fn run_with_summary(self, interval: Duration) -> Result<RunSummary> {
        self.drive(Some(interval)).await
    }

    async fn drive(self, interval: Option<Duration>) -> Result<RunSummary> {
        if interval.is_some_and(|i| i.is_zero()) {
            return Err(ShimError::configuration(
                "collection interval must be strictly positive",
            ));
        }
        if self.plugins.is_empty() {
            return Err(ShimError::configuration("no plugins registered"));
        }

        let Shim {
            input,
            writer,
            mut plugins,
        } = self;

        let accumulators: Vec<Accumulator> = plugins
            .iter()
            .map(|p| Accumulator::new(p.name(), writer.clone()))
            .collect();

        for idx in 0..plugins.len() {
            let Plugin::Service(service) = &mut plugins[idx] else {
                continue;
            };

            info!("Starting service plugin {}", service.name());
            if let Err(e) = service.start(accumulators[idx].clone()).await {
                let err = ShimError::configuration(format!(
                    "plugin '{}' failed to start: {}",
                    service.name(),
                    e
                ));
                stop_services(&mut plugins[..idx]).await;
                let _ = writer.close().await;
                return Err(err);
            }
        }

        match interval {
            Some(period) => info!("Starting collection loop, interval {:?}", period),
            None => info!("Starting collection loop, input signals only"),
        }

        let mut mux = TriggerMux::spawn(input, interval);
        let faulted = writer.faulted();
        let mut summary = RunSummary::default();

        let outcome = loop {
            let event = tokio::select! {
                biased;
                _ = faulted.cancelled() => {
                    break Err(writer
                        .fault()
                        .unwrap_or_else(|| ShimError::stream("output stream faulted")));
                }
                event = mux.next() => event,
            };

            match event {
                Event::Trigger(trigger) => {
                    summary.triggers += 1;
                    debug!(?trigger, "Collecting");

                    collect(&mut plugins, &accumulators, &faulted, &mut summary).await;

                    debug!(
                        triggers = summary.triggers,
                        collections = summary.collections,
                        errors = summary.collection_errors,
                        "Collection cycle done"
                    );
                }
                Event::Closed => {
                    info!("Input stream closed, shutting down");
                    break Ok(());
                }
                Event::Failed(e) => {
                    break Err(ShimError::stream(format!("input stream failed: {}", e)));
                }
            }
        };

        mux.shutdown().await;
        stop_services(&mut plugins).await;
        let closed = writer.close().await;

        info!(
            triggers = summary.triggers,
            collections = summary.collections,
            errors = summary.collection_errors,
            "Shim stopped"
        );

        match outcome {
            Ok(()) => closed.map(|_| summary),
            Err(e) => {
                error!("Shim terminated: {}", e);
                if let Err(close_err) = closed {
                    warn!("Failed to close output stream: {}", close_err);
                }
                Err(e)
            }
        }
    }
}

/// Run one collection of every plugin, in registration order.
///
/// Once the output stream has faulted the cycle is abandoned: the fault is
/// reported by the collection loop, not as a failure of the plugin that hit
/// it.
async fn collect(
    plugins: &mut [Plugin],
    accumulators: &[Accumulator],
    faulted: &CancellationToken,
    summary: &mut RunSummary,
) {
    for (plugin, acc) in plugins.iter_mut().zip(accumulators) {
        summary.collections += 1;

        let err = match plugin.gather(acc).await {
            Ok(()) => continue,
            Err(e) if e.is_fatal() && faulted.is_cancelled() => {
                debug!(
                    "Output stream faulted during collection of {}",
                    plugin.name()
                );
                return;
            }
            Err(e @ ShimError::Collection { .. }) => e,
            Err(e) => ShimError::collection(plugin.name(), e.to_string()),
        };

        summary.collection_errors += 1;
        acc.add_error(&err);
    }
}

/// Stop every service plugin, in registration order
async fn stop_services(plugins: &mut [Plugin]) {
    for plugin in plugins.iter_mut() {
        if let Plugin::Service(service) = plugin {
            info!("Stopping service plugin {}", service.name());
            service.stop().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::Input;
    use async_trait::async_trait;
    use shim_protocol::Metric;
    use std::pin::Pin;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::task::{Context, Poll};
    use tokio::io::AsyncWrite;

    struct BrokenPipe;

    impl AsyncWrite for BrokenPipe {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            Poll::Ready(Err(std::io::ErrorKind::BrokenPipe.into()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    struct Writes;

    #[async_trait]
    impl Input for Writes {
        fn name(&self) -> &str {
            "writes"
        }

        async fn gather(&mut self, acc: &Accumulator) -> Result<()> {
            acc.add_metric(Metric::new("m").field("v", 1i64)).await
        }
    }

    struct Fails(std::io::ErrorKind);

    #[async_trait]
    impl Input for Fails {
        fn name(&self) -> &str {
            "fails"
        }

        async fn gather(&mut self, _acc: &Accumulator) -> Result<()> {
            Err(std::io::Error::from(self.0).into())
        }
    }

    struct Counts(Arc<AtomicUsize>);

    #[async_trait]
    impl Input for Counts {
        fn name(&self) -> &str {
            "counts"
        }

        async fn gather(&mut self, _acc: &Accumulator) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn accumulators(plugins: &[Plugin], writer: &OutputWriter) -> Vec<Accumulator> {
        plugins
            .iter()
            .map(|p| Accumulator::new(p.name(), writer.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_output_fault_is_not_a_collection_error() {
        let writer = OutputWriter::new(BrokenPipe);
        let calls = Arc::new(AtomicUsize::new(0));
        let mut plugins = vec![
            Plugin::polling(Writes),
            Plugin::polling(Counts(calls.clone())),
        ];
        let accs = accumulators(&plugins, &writer);
        let mut summary = RunSummary::default();

        collect(&mut plugins, &accs, &writer.faulted(), &mut summary).await;

        assert!(writer.fault().is_some());
        assert_eq!(summary.collections, 1);
        assert_eq!(summary.collection_errors, 0);
        assert!(accs.iter().all(|acc| acc.error_count() == 0));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_plugin_errors_are_reported_as_collection_errors() {
        let (tx, _rx) = tokio::io::duplex(1024);
        let writer = OutputWriter::new(tx);
        let calls = Arc::new(AtomicUsize::new(0));
        let mut plugins = vec![
            Plugin::polling(Fails(std::io::ErrorKind::NotFound)),
            Plugin::polling(Counts(calls.clone())),
        ];
        let accs = accumulators(&plugins, &writer);
        let mut summary = RunSummary::default();

        collect(&mut plugins, &accs, &writer.faulted(), &mut summary).await;

        assert_eq!(summary.collections, 2);
        assert_eq!(summary.collection_errors, 1);
        assert_eq!(accs[0].error_count(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
