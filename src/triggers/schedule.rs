use super::{SyncRequest, Trigger, TriggerError};
use crate::repository::Repository;
use duration_string::DurationString;
use log::debug;
use std::{
    sync::{mpsc::Sender, Arc},
    thread::sleep,
    time::Duration,
};
use thiserror::Error;

const TRIGGER_NAME: &str = "SCHEDULE";

/// A trigger that pulls one repository periodically.
///
/// This is running in an infinite loop. The first pull is done at startup,
/// so it waits the interval before every request.
pub struct ScheduleTrigger {
    repository: Arc<Repository>,
    duration: Duration,
}

/// Custom error describing the error cases for the ScheduleTrigger.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// Cannot send trigger with Sender. This usually because the receiver is dropped.
    #[error("cannot trigger changes, receiver hang up")]
    ReceiverHangup(#[from] std::sync::mpsc::SendError<Option<SyncRequest>>),
}

impl From<ScheduleError> for TriggerError {
    fn from(value: ScheduleError) -> Self {
        match value {
            ScheduleError::ReceiverHangup(s) => TriggerError::ReceiverHangup(s),
        }
    }
}

impl ScheduleTrigger {
    /// Creates a new ScheduleTrigger with the interval of the repository.
    pub fn new(repository: Arc<Repository>) -> Self {
        let duration = repository.interval;
        Self {
            repository,
            duration,
        }
    }

    /// Waits the interval, then requests a pull of the repository.
    pub fn step(&self, tx: &Sender<Option<SyncRequest>>) -> Result<(), ScheduleError> {
        sleep(self.duration);
        tx.send(Some(SyncRequest::new(
            Arc::clone(&self.repository),
            TRIGGER_NAME,
        )))?;
        Ok(())
    }
}

impl Trigger for ScheduleTrigger {
    /// Requests pulls in a loop until the main loop stops listening.
    fn listen(&self, tx: Sender<Option<SyncRequest>>) -> Result<(), TriggerError> {
        debug!(
            "Starting schedule in every {} for {}.",
            DurationString::new(self.duration),
            self.repository
        );

        loop {
            self.step(&tx)?;
        }
    }
}
