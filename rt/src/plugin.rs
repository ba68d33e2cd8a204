use crate::accumulator::Accumulator;
use async_trait::async_trait;
use shim_error::Result;

/// A data source collected by periodic invocation
#[async_trait]
pub trait Input: Send + 'static {
    /// Name used to attribute reported errors
    fn name(&self) -> &str;

    /// Called once when the plugin is registered with the shim
    async fn init(&mut self) -> Result<()> {
        Ok(())
    }

    /// Collect once, writing every data point into `acc`
    async fn gather(&mut self, acc: &Accumulator) -> Result<()>;
}

/// A data source that runs its own background collection and pushes data
/// through the accumulator it was started with.
///
/// State the background work needs belongs to the plugin and its own tasks;
/// the shim only ever sees what is written through the accumulator.
#[async_trait]
pub trait ServiceInput: Send + 'static {
    fn name(&self) -> &str;

    async fn init(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called once, before the first trigger
    async fn start(&mut self, acc: Accumulator) -> Result<()>;

    /// Called on every trigger. Services do not need triggers to produce
    /// data, so the default does nothing.
    async fn gather(&mut self, _acc: &Accumulator) -> Result<()> {
        Ok(())
    }

    /// Called exactly once during shutdown. Background work started in
    /// [`ServiceInput::start`] must be finished when this returns.
    async fn stop(&mut self);
}

/// A plugin tagged with the capability it is driven through
pub enum Plugin {
    Polling(Box<dyn Input>),
    Service(Box<dyn ServiceInput>),
}

impl Plugin {
    pub fn polling(input: impl Input) -> Self {
        Plugin::Polling(Box::new(input))
    }

    pub fn service(input: impl ServiceInput) -> Self {
        Plugin::Service(Box::new(input))
    }

    pub fn name(&self) -> &str {
        match self {
            Plugin::Polling(input) => input.name(),
            Plugin::Service(service) => service.name(),
        }
    }

    pub fn is_service(&self) -> bool {
        matches!(self, Plugin::Service(_))
    }

    pub(crate) async fn init(&mut self) -> Result<()> {
        match self {
            Plugin::Polling(input) => input.init().await,
            Plugin::Service(service) => service.init().await,
        }
    }

    pub(crate) async fn gather(&mut self, acc: &Accumulator) -> Result<()> {
        match self {
            Plugin::Polling(input) => input.gather(acc).await,
            Plugin::Service(service) => service.gather(acc).await,
        }
    }
}

impl std::fmt::Debug for Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = if self.is_service() {
            "Service"
        } else {
            "Polling"
        };
        f.debug_tuple(kind).field(&self.name()).finish()
    }
}
