use futures::StreamExt;
use shim_protocol::SignalDecoder;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

const QUEUE_CAPACITY: usize = 64;

/// Where a collection request came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Timer,
    Signal,
}

/// What the multiplexer hands to the collection loop
#[derive(Debug)]
pub enum Event {
    Trigger(Trigger),
    /// The input stream reached end-of-stream
    Closed,
    /// Reading the input stream failed
    Failed(std::io::Error),
}

/// Merges timer ticks and input-stream lines into one ordered queue
///
/// Each producer runs in its own task and both feed the same channel, so
/// events are delivered in the order they were produced, one at a time.
/// Signals are never dropped. A tick is only enqueued when no timer trigger
/// is already waiting, which keeps a slow consumer from finding a burst of
/// stale ticks when it comes back.
pub struct TriggerMux {
    rx: mpsc::Receiver<Event>,
    timer_pending: Arc<AtomicBool>,
    shutdown: CancellationToken,
    tasks: JoinSet<()>,
}

impl TriggerMux {
    /// Start the producers. Without an interval only input lines trigger
    /// collections.
    pub fn spawn<R>(input: R, interval: Option<Duration>) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let timer_pending = Arc::new(AtomicBool::new(false));
        let shutdown = CancellationToken::new();
        let mut tasks = JoinSet::new();

        if let Some(period) = interval {
            tasks.spawn(tick(
                period,
                tx.clone(),
                timer_pending.clone(),
                shutdown.clone(),
            ));
        }
        tasks.spawn(read_signals(input, tx, shutdown.clone()));

        Self {
            rx,
            timer_pending,
            shutdown,
            tasks,
        }
    }

    /// Wait for the next event
    pub async fn next(&mut self) -> Event {
        match self.rx.recv().await {
            Some(Event::Trigger(Trigger::Timer)) => {
                self.timer_pending.store(false, Ordering::Release);
                Event::Trigger(Trigger::Timer)
            }
            Some(event) => event,
            // Both producers are gone without saying why
            None => Event::Closed,
        }
    }

    /// Stop both producers and wait for their tasks to finish
    pub async fn shutdown(self) {
        let TriggerMux {
            rx,
            shutdown,
            mut tasks,
            ..
        } = self;

        shutdown.cancel();
        // Unblocks producers waiting for queue capacity
        drop(rx);

        while let Some(res) = tasks.join_next().await {
            if let Err(e) = res {
                error!("Trigger producer failed: {}", e);
            }
        }
        debug!("Trigger producers stopped");
    }
}

async fn tick(
    period: Duration,
    tx: mpsc::Sender<Event>,
    pending: Arc<AtomicBool>,
    shutdown: CancellationToken,
) {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {
                if pending.swap(true, Ordering::AcqRel) {
                    trace!("Timer trigger already pending, coalescing tick");
                    continue;
                }
                if tx.send(Event::Trigger(Trigger::Timer)).await.is_err() {
                    break;
                }
            }
        }
    }
}

async fn read_signals<R>(input: R, tx: mpsc::Sender<Event>, shutdown: CancellationToken)
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let mut reader = FramedRead::new(input, SignalDecoder);

    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => return,
            next = reader.next() => next,
        };

        let event = match next {
            Some(Ok(_)) => Event::Trigger(Trigger::Signal),
            Some(Err(e)) => {
                error!("Failed to read input stream: {}", e);
                let _ = tx.send(Event::Failed(e)).await;
                return;
            }
            None => {
                info!("Input stream ended");
                let _ = tx.send(Event::Closed).await;
                return;
            }
        };

        if tx.send(event).await.is_err() {
            return;
        }
    }
}
