use crate::{context::Context, repository::Repository};
use mockall::automock;
use std::sync::{mpsc::Sender, Arc};
use thiserror::Error;

/// A trigger that runs an HTTP server for the webhooks.
pub mod http;
/// A trigger that pulls a repository periodically.
pub mod schedule;
/// A trigger that terminates the program on a signal.
pub mod signal;

/// A request to synchronize one repository.
#[derive(Debug)]
pub struct SyncRequest {
    /// The repository to pull.
    pub repository: Arc<Repository>,
    /// Data from the trigger (e.g. its name), passed on to the actions.
    pub context: Context,
}

impl SyncRequest {
    pub fn new(repository: Arc<Repository>, trigger_name: &str) -> Self {
        SyncRequest {
            repository,
            context: Context::from([("TRIGGER_NAME".to_string(), trigger_name.to_string())]),
        }
    }
}

/// A custom error for describing the error cases for triggers
#[derive(Debug, Error)]
pub enum TriggerError {
    /// Cannot initialize trigger, because it has a misconfiguration.
    #[error("not configured correctly: {0}")]
    Misconfigured(String),
    /// Cannot send trigger with Sender. This usually because the receiver is dropped.
    #[error("cannot trigger changes, receiver hang up")]
    ReceiverHangup(#[from] std::sync::mpsc::SendError<Option<SyncRequest>>),
}

/// A trigger is a long running background process, which requests synchronizations.
///
/// Sending `None` on the channel stops the main loop.
///
/// Triggers may include:
///   - schedules ([schedule::ScheduleTrigger])
///   - HTTP servers for webhooks ([http::HttpTrigger])
///   - signals ([signal::SignalTrigger])
#[automock]
pub trait Trigger: Sync + Send {
    /// Start the trigger process.
    fn listen(&self, tx: Sender<Option<SyncRequest>>) -> Result<(), TriggerError>;
}
