//! Bounded worker pool between the event source and the command handler
//!
//! Events wait in a fixed-capacity queue; a full queue pushes back on the
//! reader instead of spawning work without limit. Game timers run on their
//! own tasks, so a slow command never delays a round's resolution.

use crate::{
    config::DispatchConfig,
    errors::{BotError, BotResult},
    events::{ChatEvent, EventSource},
    handler::CommandHandler,
    metrics::GameMetrics,
};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct Dispatcher {
    sender: mpsc::Sender<ChatEvent>,
    workers: Vec<JoinHandle<()>>,
    metrics: GameMetrics,
}

impl Dispatcher {
    pub fn start(handler: CommandHandler, metrics: GameMetrics, config: &DispatchConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..config.workers.max(1))
            .map(|worker| {
                let receiver = receiver.clone();
                let handler = handler.clone();
                let metrics = metrics.clone();
                tokio::spawn(async move {
                    loop {
                        // the lock is held only while waiting for the next event
                        let event = receiver.lock().await.recv().await;
                        let Some(event) = event else {
                            break;
                        };
                        metrics.event_dequeued();
                        let disposition = handler.handle(&event).await;
                        debug!(worker, scope = event.peer_id, user = event.from_id, ?disposition, "Event handled");
                    }
                    debug!(worker, "Dispatch worker stopped");
                })
            })
            .collect();

        info!(workers = config.workers, capacity = config.queue_capacity, "Dispatcher started");
        Self {
            sender,
            workers,
            metrics,
        }
    }

    /// Queue an event, waiting while the queue is full
    pub async fn submit(&self, event: ChatEvent) -> BotResult<()> {
        self.sender
            .send(event)
            .await
            .map_err(|_| BotError::Dispatch("workers have stopped".to_string()))?;
        self.metrics.event_queued();
        Ok(())
    }

    /// Queue an event, dropping it when the queue is full
    pub fn try_submit(&self, event: ChatEvent) -> BotResult<()> {
        match self.sender.try_send(event) {
            Ok(()) => {
                self.metrics.event_queued();
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(event)) => {
                self.metrics.event_dropped("queue_full");
                warn!(scope = event.peer_id, user = event.from_id, "Event queue full, dropping event");
                Err(BotError::Dispatch("event queue is full".to_string()))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(BotError::Dispatch("workers have stopped".to_string()))
            }
        }
    }

    /// Feed every event of `source` into the queue until it runs dry
    pub async fn pump(&self, source: &mut dyn EventSource) -> BotResult<usize> {
        let mut count = 0;
        while let Some(event) = source.next_event().await? {
            self.submit(event).await?;
            count += 1;
        }
        Ok(count)
    }

    /// Stop accepting events and wait for queued ones to finish
    pub async fn shutdown(self) {
        drop(self.sender);
        for worker in self.workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "Dispatch worker panicked");
            }
        }
        info!("Dispatcher drained");
    }
}
