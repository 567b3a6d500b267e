use super::{SyncRequest, Trigger, TriggerError};
use crate::repository::Repository;
use log::{debug, info, warn};
use std::sync::{mpsc::Sender, Arc, Mutex, PoisonError};

/// The repository that the main loop is synchronizing right now.
///
/// Cloning shares the same slot, so the main loop can mark its work while the
/// signal trigger reports it.
#[derive(Clone, Debug, Default)]
pub struct InFlight(Arc<Mutex<Option<String>>>);

/// Clears the in-flight repository when the synchronization ends.
pub struct InFlightGuard<'a>(&'a InFlight);

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the repository as being synchronized until the guard is dropped.
    pub fn enter(&self, repository: &Repository) -> InFlightGuard<'_> {
        self.set(Some(repository.to_string()));
        InFlightGuard(self)
    }

    pub fn current(&self) -> Option<String> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn set(&self, repository: Option<String>) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = repository;
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.set(None);
    }
}

/// A trigger that stops the program on a signal.
///
/// The first signal lets the running synchronization and its commands finish,
/// the second one exits immediately.
pub struct SignalTrigger {
    in_flight: InFlight,
}

impl SignalTrigger {
    pub fn new(in_flight: InFlight) -> SignalTrigger {
        SignalTrigger { in_flight }
    }

    /// Handle the signal received after `previous` other ones.
    ///
    /// Returns the exit code if the program has to stop right now.
    fn handle(
        &self,
        previous: usize,
        signal: i32,
        tx: &Sender<Option<SyncRequest>>,
    ) -> Option<i32> {
        let running = self.in_flight.current();
        if previous > 0 {
            match running {
                Some(repository) => warn!(
                    "Got signal {signal} again, abandoning the synchronization of {repository}."
                ),
                None => debug!("Got signal {signal} again, terminating right now."),
            }
            return Some(signal);
        }

        match running {
            Some(repository) => info!(
                "Got signal {signal}, stopping after the synchronization of {repository}."
            ),
            None => info!("Got signal {signal}, stopping."),
        }
        if tx.send(None).is_err() {
            debug!("The main loop has already stopped.");
        }
        None
    }

    #[cfg(unix)]
    fn listen_inner<I>(&self, tx: Sender<Option<SyncRequest>>, signals: I)
    where
        I: IntoIterator<Item = i32>,
    {
        use std::{process, thread::sleep, time::Duration};
        for (previous, signal) in signals.into_iter().enumerate() {
            if let Some(code) = self.handle(previous, signal, &tx) {
                // Let the logs flush before leaving.
                sleep(Duration::from_millis(100));
                process::exit(code);
            }
        }
    }
}

impl Trigger for SignalTrigger {
    /// Iterates over the termination signals until the program exits.
    #[cfg(unix)]
    fn listen(&self, tx: Sender<Option<SyncRequest>>) -> Result<(), TriggerError> {
        use signal_hook::{
            consts::TERM_SIGNALS,
            iterator::{exfiltrator::SignalOnly, SignalsInfo},
        };
        match SignalsInfo::<SignalOnly>::new(TERM_SIGNALS) {
            Ok(mut signals) => self.listen_inner(tx, &mut signals),
            Err(err) => warn!("Cannot listen to signals: {err}."),
        }

        Ok(())
    }

    #[cfg(not(unix))]
    fn listen(&self, _tx: Sender<Option<SyncRequest>>) -> Result<(), TriggerError> {
        debug!("Signal handlers are not supported on non-unix systems.");

        Ok(())
    }
}
