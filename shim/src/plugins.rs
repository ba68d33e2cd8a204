//! Plugins built into the `execd-shim` binary

use async_trait::async_trait;
use serde::Deserialize;
use shim_config::PluginRegistry;
use shim_error::{Result, ShimError};
use shim_rt::{Accumulator, Input, Metric, Plugin, ServiceInput};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

fn default_counter_measurement() -> String {
    String::from("counter")
}

fn default_step() -> i64 {
    1
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CounterConfig {
    #[serde(default = "default_counter_measurement")]
    pub measurement: String,

    /// Added to the counter on every collection
    #[serde(default = "default_step")]
    pub step: i64,
}

/// Polling plugin that reports a running count, one point per collection
pub struct Counter {
    config: CounterConfig,
    value: i64,
}

impl Counter {
    pub fn new(config: CounterConfig) -> Self {
        Self { config, value: 0 }
    }
}

#[async_trait]
impl Input for Counter {
    fn name(&self) -> &str {
        "counter"
    }

    async fn init(&mut self) -> Result<()> {
        if self.config.measurement.is_empty() {
            return Err(ShimError::configuration("measurement must not be empty"));
        }
        Ok(())
    }

    async fn gather(&mut self, acc: &Accumulator) -> Result<()> {
        self.value = self.value.checked_add(self.config.step).ok_or_else(|| {
            ShimError::collection(self.name(), format!("counter overflowed at {}", self.value))
        })?;

        acc.add_metric(Metric::new(&self.config.measurement).field("value", self.value))
            .await
    }
}

fn default_heartbeat_measurement() -> String {
    String::from("heartbeat")
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeartbeatConfig {
    #[serde(default = "default_heartbeat_measurement")]
    pub measurement: String,

    /// Value of the `service` tag
    pub service_name: String,

    /// Time between beats, e.g. "10s"
    pub period: String,
}

/// Service plugin that emits a beat on its own schedule, independent of the
/// shim's triggers
pub struct Heartbeat {
    measurement: String,
    service_name: String,
    period: Duration,
    running: Option<(CancellationToken, JoinHandle<()>)>,
}

impl Heartbeat {
    pub fn new(config: HeartbeatConfig) -> Result<Self> {
        let period = humantime::parse_duration(&config.period).map_err(|e| {
            ShimError::configuration(format!("invalid period '{}': {}", config.period, e))
        })?;
        if period.is_zero() {
            return Err(ShimError::configuration("period must be greater than 0"));
        }

        Ok(Self {
            measurement: config.measurement,
            service_name: config.service_name,
            period,
            running: None,
        })
    }
}

#[async_trait]
impl ServiceInput for Heartbeat {
    fn name(&self) -> &str {
        "heartbeat"
    }

    async fn start(&mut self, acc: Accumulator) -> Result<()> {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let measurement = self.measurement.clone();
        let service_name = self.service_name.clone();
        let period = self.period;

        let handle = tokio::spawn(async move {
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut beats: u64 = 0;

            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                beats += 1;
                let metric = Metric::new(&measurement)
                    .tag("service", service_name.as_str())
                    .field("beats", beats);
                if let Err(e) = acc.add_metric(metric).await {
                    // The shim sees the same fault and shuts down
                    debug!("Heartbeat output failed: {}", e);
                    break;
                }
            }
        });

        info!("Heartbeat started, period {:?}", self.period);
        self.running = Some((token, handle));
        Ok(())
    }

    async fn stop(&mut self) {
        let Some((token, handle)) = self.running.take() else {
            return;
        };

        token.cancel();
        let _ = handle.await;
        info!("Heartbeat stopped");
    }
}

/// Registry of every plugin this binary can run
pub fn registry() -> PluginRegistry {
    let mut registry = PluginRegistry::new();
    registry
        .register("counter", |config: CounterConfig| {
            Ok(Plugin::polling(Counter::new(config)))
        })
        .register("heartbeat", |config: HeartbeatConfig| {
            Ok(Plugin::service(Heartbeat::new(config)?))
        });
    registry
}
