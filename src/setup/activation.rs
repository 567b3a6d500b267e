use crate::repository::{Repository, SyncMode};
use std::{
    collections::HashSet,
    sync::{Arc, Mutex, PoisonError},
};

/// A synchronization to run at startup, before the triggers are listening.
#[derive(Clone, Debug, PartialEq)]
pub struct StartupAction {
    pub repository: Arc<Repository>,
    /// Polling repositories also start their schedule.
    pub mode: SyncMode,
}

/// Split the repositories into startup actions and the ones the webhook serves.
///
/// Every repository is pulled once at startup, the webhook repositories are
/// pulled on requests afterwards.
pub fn plan(repositories: Vec<Repository>) -> (Vec<StartupAction>, Vec<Arc<Repository>>) {
    let mut actions = vec![];
    let mut webhook_targets = vec![];

    for repository in repositories {
        let repository = Arc::new(repository);
        let mode = repository.mode();
        if mode == SyncMode::Webhook {
            webhook_targets.push(Arc::clone(&repository));
        }
        actions.push(StartupAction { repository, mode });
    }

    (actions, webhook_targets)
}

#[derive(Debug, Default)]
struct RegistryState {
    server_blocks: HashSet<usize>,
    actions: Vec<StartupAction>,
}

/// The startup actions of every server block.
///
/// A server block with multiple keys is set up once for each key, but its
/// actions must only run once.
#[derive(Debug, Default)]
pub struct StartupRegistry {
    state: Mutex<RegistryState>,
}

impl StartupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the actions if it is the first time for the server block.
    /// Returns true if the actions were registered.
    pub fn once_per_server_block(&self, server_block: usize, actions: Vec<StartupAction>) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.server_blocks.insert(server_block) {
            return false;
        }
        state.actions.extend(actions);
        true
    }

    /// Take the registered actions in the order of registration.
    pub fn take_actions(&self) -> Vec<StartupAction> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut state.actions)
    }
}
