use std::future::Future;

use anyhow::Result;

use crate::daemon::event::TrackerEvent;

/// Represents an event processor. It reacts to events coming from the watcher and the signal
/// handlers, and to the periodic tick of [ProcessingModule](super::ProcessingModule).
pub trait EventProcessor {
    fn process_next(&mut self, message: TrackerEvent) -> impl Future<Output = Result<()>>;

    fn tick(&mut self) -> impl Future<Output = Result<()>>;

    fn finalize(&mut self) -> impl Future<Output = Result<()>>;
}
