use crate::{
    actions::Action,
    checks::{Check, CheckError},
    context::Context,
    repository::{Repository, SyncMode},
    setup::activation::StartupAction,
    triggers::{schedule::ScheduleTrigger, signal::InFlight, SyncRequest, Trigger},
};
use log::{debug, error, info};
use std::{
    sync::{
        mpsc::{self, Sender},
        Arc,
    },
    thread,
};
use thiserror::Error;

const STARTUP_TRIGGER_NAME: &str = "STARTUP";

/// A custom error implementation for the start function
#[derive(Debug, Error)]
pub enum StartError {
    #[error("Cannot synchronize {0} at startup: {1}.")]
    FailedStartup(String, CheckError),
}

/// The main program loop.
///
/// First the startup actions are run in order: polling repositories start their
/// schedule and every repository is pulled once. A failed startup pull stops
/// everything. If `once` is set, it returns after the startup pulls without
/// starting any trigger.
///
/// Afterwards the triggers are started and the requested pulls are run one at
/// a time, until a trigger sends `None` or every trigger has stopped. The
/// repository being synchronized is marked in `in_flight`.
pub fn start(
    startup: Vec<StartupAction>,
    triggers: Vec<Box<dyn Trigger>>,
    check: &dyn Check,
    in_flight: &InFlight,
    once: bool,
) -> Result<(), StartError> {
    let (tx, rx) = mpsc::channel::<Option<SyncRequest>>();

    for action in startup {
        if !once && matches!(action.mode, SyncMode::Polling(_)) {
            spawn_trigger(
                Box::new(ScheduleTrigger::new(Arc::clone(&action.repository))),
                &tx,
            );
        }

        let mut request = SyncRequest::new(action.repository, STARTUP_TRIGGER_NAME);
        let _syncing = in_flight.enter(&request.repository);
        sync(check, &request.repository, &mut request.context).map_err(|err| {
            StartError::FailedStartup(request.repository.to_string(), err)
        })?;
    }

    if once {
        debug!("Every repository is synchronized, stopping.");
        return Ok(());
    }

    for trigger in triggers {
        spawn_trigger(trigger, &tx);
    }
    drop(tx);

    debug!("Waiting on triggers.");
    while let Ok(Some(mut request)) = rx.recv() {
        let _syncing = in_flight.enter(&request.repository);
        if let Err(err) = sync(check, &request.repository, &mut request.context) {
            error!("Synchronizing {} failed: {err}.", request.repository);
        }
    }

    debug!("Finished running.");

    Ok(())
}

fn spawn_trigger(trigger: Box<dyn Trigger>, tx: &Sender<Option<SyncRequest>>) {
    let tx = tx.clone();
    thread::spawn(move || {
        let result = trigger.listen(tx);
        if let Err(err) = result {
            error!("Trigger failed: {err}.");
        }
    });
}

/// Pull the repository and run its commands if it changed.
///
/// Failed commands are logged and stop the following ones, but the
/// synchronization itself succeeded.
fn sync(
    check: &dyn Check,
    repository: &Repository,
    context: &mut Context,
) -> Result<bool, CheckError> {
    let changed = check.check(repository, context)?;
    if !changed {
        debug!("There are no updates in {repository}.");
        return Ok(false);
    }

    info!(
        "There are updates in {repository}, {}.",
        if repository.then.is_empty() {
            "pulled"
        } else {
            "running commands"
        }
    );
    for action in repository.then.iter() {
        if let Err(err) = action.run(&repository.path, context) {
            error!("Command failed, we will not continue: {err}.");
            break;
        }
    }

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        actions::then::ThenAction,
        checks::MockCheck,
        setup::activation::plan,
        triggers::MockTrigger,
    };
    use log::Level;
    use std::time::Duration;

    fn repository(hook_url: &str) -> Repository {
        let mut repository = Repository::new(".");
        repository.url = String::from("https://github.com/org/repo.git");
        repository.host = String::from("github.com");
        repository.hook.url = String::from(hook_url);
        repository
    }

    fn webhook_startup() -> Vec<StartupAction> {
        let (actions, _) = plan(vec![repository("/webhook")]);
        actions
    }

    fn trigger_once(repository: Arc<Repository>) -> Box<dyn Trigger> {
        let mut mock_trigger = MockTrigger::new();
        mock_trigger.expect_listen().returning(move |tx| {
            tx.send(Some(SyncRequest::new(Arc::clone(&repository), "TEST")))?;
            tx.send(None)?;
            Ok(())
        });
        Box::new(mock_trigger)
    }

    #[test]
    fn it_should_pull_at_startup_and_on_triggers() {
        let startup = webhook_startup();
        let triggers = vec![trigger_once(Arc::clone(&startup[0].repository))];

        let mut mock_check = MockCheck::new();
        mock_check
            .expect_check()
            .withf(|_, context| context.get("TRIGGER_NAME").unwrap() == "STARTUP")
            .times(1)
            .returning(|_, _| Ok(true));
        mock_check
            .expect_check()
            .withf(|_, context| context.get("TRIGGER_NAME").unwrap() == "TEST")
            .times(1)
            .returning(|_, _| Ok(false));

        let result = start(startup, triggers, &mock_check, &InFlight::new(), false);
        assert!(result.is_ok(), "{result:?} should be ok");
    }

    #[test]
    fn it_should_only_pull_at_startup_once() {
        let (startup, _) = plan(vec![repository(""), repository("/webhook")]);

        let mut mock_trigger = MockTrigger::new();
        mock_trigger.expect_listen().times(0);
        let triggers: Vec<Box<dyn Trigger>> = vec![Box::new(mock_trigger)];

        let mut mock_check = MockCheck::new();
        mock_check.expect_check().times(2).returning(|_, _| Ok(true));

        let result = start(startup, triggers, &mock_check, &InFlight::new(), true);
        assert!(result.is_ok(), "{result:?} should be ok");
    }

    #[test]
    fn it_should_mark_the_running_synchronization() {
        let startup = webhook_startup();
        let expected = startup[0].repository.to_string();
        let triggers = vec![trigger_once(Arc::clone(&startup[0].repository))];
        let in_flight = InFlight::new();

        let seen = in_flight.clone();
        let mut mock_check = MockCheck::new();
        mock_check.expect_check().times(2).returning(move |_, _| {
            assert_eq!(Some(expected.clone()), seen.current());
            Ok(false)
        });

        let result = start(startup, triggers, &mock_check, &in_flight, false);
        assert!(result.is_ok(), "{result:?} should be ok");
        assert_eq!(None, in_flight.current());
    }

    #[test]
    fn it_should_stop_on_a_failed_startup_pull() {
        let (startup, _) = plan(vec![repository("/first"), repository("/second")]);

        let mut mock_trigger = MockTrigger::new();
        mock_trigger.expect_listen().times(0);
        let triggers: Vec<Box<dyn Trigger>> = vec![Box::new(mock_trigger)];

        let mut mock_check = MockCheck::new();
        mock_check
            .expect_check()
            .times(1)
            .returning(|_, _| Err(CheckError::Conflict(String::from("Testing purposes."))));

        let result = start(startup, triggers, &mock_check, &InFlight::new(), false);
        assert!(
            matches!(result, Err(StartError::FailedStartup(_, CheckError::Conflict(_)))),
            "{result:?} should be FailedStartup"
        );
    }

    #[test]
    fn it_should_continue_after_a_failed_pull() {
        let startup = webhook_startup();
        let repository = Arc::clone(&startup[0].repository);

        let mut mock_trigger = MockTrigger::new();
        mock_trigger.expect_listen().returning(move |tx| {
            tx.send(Some(SyncRequest::new(Arc::clone(&repository), "TEST")))?;
            tx.send(Some(SyncRequest::new(Arc::clone(&repository), "TEST")))?;
            tx.send(None)?;
            Ok(())
        });
        let triggers: Vec<Box<dyn Trigger>> = vec![Box::new(mock_trigger)];

        let mut mock_check = MockCheck::new();
        mock_check
            .expect_check()
            .withf(|_, context| context.get("TRIGGER_NAME").unwrap() == "STARTUP")
            .times(1)
            .returning(|_, _| Ok(false));
        mock_check
            .expect_check()
            .withf(|_, context| context.get("TRIGGER_NAME").unwrap() == "TEST")
            .times(2)
            .returning(|_, _| Err(CheckError::FailedUpdate(String::from("Testing purposes."))));

        let result = start(startup, triggers, &mock_check, &InFlight::new(), false);
        assert!(result.is_ok(), "{result:?} should be ok");
    }

    #[test]
    fn it_should_schedule_polling_repositories() {
        let mut polling = repository("");
        polling.interval = Duration::from_millis(50);
        let (startup, _) = plan(vec![polling]);

        // Stop the loop after the schedule triggered a few times.
        let mut mock_trigger = MockTrigger::new();
        mock_trigger.expect_listen().returning(|tx| {
            thread::sleep(Duration::from_millis(175));
            tx.send(None)?;
            Ok(())
        });
        let triggers: Vec<Box<dyn Trigger>> = vec![Box::new(mock_trigger)];

        let mut mock_check = MockCheck::new();
        mock_check
            .expect_check()
            .withf(|_, context| context.get("TRIGGER_NAME").unwrap() == "STARTUP")
            .times(1)
            .returning(|_, _| Ok(false));
        mock_check
            .expect_check()
            .withf(|_, context| context.get("TRIGGER_NAME").unwrap() == "SCHEDULE")
            .times(2..=4)
            .returning(|_, _| Ok(false));

        let result = start(startup, triggers, &mock_check, &InFlight::new(), false);
        assert!(result.is_ok(), "{result:?} should be ok");
    }

    #[test]
    fn it_should_log_failed_commands() {
        testing_logger::setup();

        let mut failing = repository("/webhook");
        failing.then = vec![
            ThenAction::new("false", vec![]),
            ThenAction::new("true", vec![]),
        ];

        let mut mock_check = MockCheck::new();
        mock_check.expect_check().times(1).returning(|_, _| Ok(true));

        let result = sync(&mock_check, &failing, &mut Context::new());
        assert!(matches!(result, Ok(true)), "{result:?} should be Ok(true)");

        testing_logger::validate(|captured_logs| {
            let errors: Vec<_> = captured_logs
                .iter()
                .filter(|log| log.level == Level::Error)
                .collect();
            assert_eq!(2, errors.len());
            assert!(errors[1].body.starts_with("Command failed"));

            // The second command is skipped.
            assert!(!captured_logs
                .iter()
                .any(|log| log.body.starts_with("Running command: true")));
        });
    }
}
