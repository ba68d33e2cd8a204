//! Out-of-process plugin runtime
//!
//! A [`Shim`] lets a data-source plugin run in its own process while the host
//! agent drives it like an in-process one: the host writes a line to the
//! shim's stdin to request a collection, reads line-protocol metrics from its
//! stdout, and closes stdin to shut it down. A periodic timer requests
//! collections as well.
//!
//! ```no_run
//! use async_trait::async_trait;
//! use shim_rt::{Accumulator, Input, Metric, Plugin, Result, Shim};
//! use std::time::Duration;
//!
//! struct Uptime;
//!
//! #[async_trait]
//! impl Input for Uptime {
//!     fn name(&self) -> &str {
//!         "uptime"
//!     }
//!
//!     async fn gather(&mut self, acc: &Accumulator) -> Result<()> {
//!         acc.add_metric(Metric::new("uptime").field("seconds", 42i64)).await
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let mut shim = Shim::stdio();
//!     shim.register(Plugin::polling(Uptime)).await?;
//!     shim.run(Duration::from_secs(10)).await
//! }
//! ```

mod accumulator;
mod mux;
mod plugin;
mod shim;

pub use accumulator::Accumulator;
pub use mux::{Event, Trigger, TriggerMux};
pub use plugin::{Input, Plugin, ServiceInput};
pub use shim::{RunSummary, Shim};

pub use shim_error::{Result, ShimError};
pub use shim_protocol::{FieldValue, Metric, OutputWriter};
