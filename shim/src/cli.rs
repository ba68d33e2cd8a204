use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "execd-shim")]
#[command(about = "Run an input plugin as an external process of a host agent")]
#[command(version)]
pub struct CliArgs {
    /// Path to the plugin configuration file
    #[arg(long = "config")]
    pub config: PathBuf,

    /// How often to collect without being asked, e.g. "1s" or "500ms"
    #[arg(long = "poll-interval", default_value = "1s", value_parser = parse_interval)]
    pub poll_interval: Duration,

    /// Collect only when a line arrives on stdin
    #[arg(long = "poll-interval-disabled")]
    pub poll_interval_disabled: bool,
}

impl CliArgs {
    /// Interval for the collection timer, `None` when polling is disabled
    pub fn interval(&self) -> Option<Duration> {
        (!self.poll_interval_disabled).then_some(self.poll_interval)
    }
}

fn parse_interval(s: &str) -> Result<Duration, String> {
    let interval = humantime::parse_duration(s).map_err(|e| e.to_string())?;
    if interval.is_zero() {
        return Err("interval must be greater than 0".to_string());
    }
    Ok(interval)
}
