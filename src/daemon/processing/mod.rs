use std::time::Duration;

use anyhow::Result;
use module::EventProcessor;
use tokio::sync::mpsc::Receiver;
use tracing::{debug, error, info};

use crate::utils::clock::Clock;

use super::event::TrackerEvent;

pub mod module;
pub mod tracking;

/// Owner of the tracker task. Events are handled one at a time, in between them the processor is
/// ticked every `tick_interval`. The module finishes once every sender is dropped.
pub struct ProcessingModule<Processor> {
    receiver: Receiver<TrackerEvent>,
    processor: Processor,
    tick_interval: Duration,
    time_provider: Box<dyn Clock>,
}

impl<P: EventProcessor> ProcessingModule<P> {
    pub fn new(
        receiver: Receiver<TrackerEvent>,
        processor: P,
        tick_interval: Duration,
        time_provider: Box<dyn Clock>,
    ) -> Self {
        Self {
            receiver,
            processor,
            tick_interval,
            time_provider,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        let mut tick_point = self.time_provider.instant() + self.tick_interval;
        loop {
            tokio::select! {
                event = self.receiver.recv() => {
                    let Some(event) = event else {
                        break;
                    };
                    debug!("Processing event {:?}", event);
                    match self.processor.process_next(event.clone()).await {
                        Ok(_) => {
                            info!("Processed event {:?}", event)
                        }
                        Err(e) => {
                            error!("Error processing event {:?}: {e:?}", event)
                        }
                    }
                }
                _ = self.time_provider.sleep_until(tick_point) => {
                    tick_point += self.tick_interval;
                    if let Err(e) = self.processor.tick().await {
                        error!("Error during tick {e:?}");
                    }
                }
            }
        }

        let result = self.processor.finalize().await;
        self.receiver.close();
        result
    }
}
