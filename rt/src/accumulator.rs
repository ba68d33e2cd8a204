use shim_error::{Result, ShimError};
use shim_protocol::{FieldValue, Metric, OutputWriter};
use std::fmt::Display;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::error;

/// The sink a plugin writes its data points into
///
/// Every point is encoded and appended to the output stream right away.
/// Clones share the same output and error counter, so a service plugin can
/// hand a clone to its background task.
#[derive(Clone)]
pub struct Accumulator {
    plugin: Arc<str>,
    writer: OutputWriter,
    errors: Arc<AtomicU64>,
}

impl Accumulator {
    pub fn new(plugin: &str, writer: OutputWriter) -> Self {
        Self {
            plugin: Arc::from(plugin),
            writer,
            errors: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Name of the plugin this accumulator reports for
    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    /// Append a metric to the output stream.
    ///
    /// A metric that cannot be encoded is dropped and reported through
    /// [`Accumulator::add_error`]. Only a failing output stream is returned
    /// as an error.
    pub async fn add_metric(&self, metric: Metric) -> Result<()> {
        match self.writer.write(&metric).await {
            Ok(()) => Ok(()),
            Err(e @ ShimError::Encoding { .. }) => {
                self.add_error(&e);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Build a metric from its parts and append it.
    ///
    /// Without a timestamp the metric is stamped with the current time.
    pub async fn add_fields<T, K, V, F, FK, FV>(
        &self,
        name: &str,
        tags: T,
        fields: F,
        timestamp: Option<i64>,
    ) -> Result<()>
    where
        T: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
        F: IntoIterator<Item = (FK, FV)>,
        FK: Into<String>,
        FV: Into<FieldValue>,
    {
        let mut metric = Metric::new(name);
        for (k, v) in tags {
            metric = metric.tag(k, v);
        }
        for (k, v) in fields {
            metric = metric.field(k, v);
        }
        if let Some(ts) = timestamp {
            metric = metric.timestamp(ts);
        }

        self.add_metric(metric).await
    }

    /// Report a recoverable error on the plugin's error channel (stderr).
    pub fn add_error(&self, err: &dyn Display) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        error!(plugin = %self.plugin, "Error in plugin: {}", err);
    }

    /// Number of errors reported through this accumulator and its clones
    pub fn error_count(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }
}
