//! Keep local git checkouts in sync with their remotes and run commands on changes.
//!
//! ## How it works
//!
//! The repositories are read from the `git` directives of a `Gitfile`, where
//! server blocks group them under the addresses their webhooks listen on.
//! Every repository is pulled once at startup, then either on a schedule or on
//! webhook requests from the git host.
//!
//! `gitwatch` is built up from **triggers**, **checks** and **actions**.
//! Triggers are long running background processes that request synchronizations
//! (schedules, the webhook server). The check clones or pulls the repository
//! and the actions are the commands that run if the checkout changed.
//!
//! ```ignore
//! +---------+       +--------+       +--------+
//! | trigger | ----> | checks | ----> | action |
//! +---------+       +--------+       +--------+
//! ```
//!

/// An action is a process that runs if any changes occured (e.g. [running commands](actions::then::ThenAction)).
pub mod actions;
/// A check is a process that tests if there are any changes and updates it.
pub mod checks;
/// The server blocks of the configuration file.
pub mod config;
/// The repositories to keep in sync.
pub mod repository;
/// Setting up the `git` directives: parsing, preparation and startup planning.
pub mod setup;
/// A trigger is a long running background process, which requests synchronizations
/// (e.g. [on a schedule](triggers::schedule::ScheduleTrigger) or [on HTTP request](triggers::http::HttpTrigger)).
pub mod triggers;
/// Handling webhook requests of the git hosts.
pub mod webhook;

/// The main program loop, that runs the startup pulls and the triggers.
pub mod start;

/// The context which can share data between the different steps.
pub mod context;
