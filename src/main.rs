use args::{parse_args, Args};
use gitwatch_bin::{
    checks::git::{GitCheck, GitEnvironment},
    config::{parse_config, ConfigError},
    setup::{activation::StartupRegistry, setup, Controller, SetupError},
    start::{start, StartError},
    triggers::{
        http::{chain, listen_address, HttpTrigger, Middleware},
        signal::{InFlight, SignalTrigger},
        Trigger,
    },
};
use log::debug;
use logger::init_logger;
use std::{
    env, fs,
    io::{self, Write},
    path::PathBuf,
    process,
};
use thiserror::Error;

mod args;
mod logger;

const DEFAULT_CONFIG: &str = "Gitfile";

/// A custom error for everything that can stop the program.
#[derive(Debug, Error)]
pub enum MainError {
    #[error("Cannot read {0}: {1}.")]
    FailedReadingConfig(String, std::io::Error),
    #[error("Invalid configuration in {0}, {1}.")]
    InvalidConfig(String, ConfigError),
    #[error("Cannot set up {0}, {1}.")]
    FailedSetup(String, SetupError),
    #[error("Cannot find the current directory: {0}.")]
    NoCurrentDirectory(std::io::Error),
    #[error("Cannot determine the local timezone for the logs.")]
    FailedLoggerTimezones,
    #[error("Cannot set up logging: {0}.")]
    FailedLogger(#[from] log::SetLoggerError),
    #[error("{0}")]
    FailedStart(#[from] StartError),
}

fn main() {
    let args = parse_args();
    if args.version {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return;
    }

    if let Err(err) = run(args) {
        report(&err, &mut io::stderr());
        process::exit(1);
    }
}

/// Print the error that stopped the program, the logger is not used for it.
fn report(err: &MainError, out: &mut impl Write) {
    let _ = writeln!(out, "{err}");
}

fn run(args: Args) -> Result<(), MainError> {
    init_logger(&args)?;

    let config = args.config.as_deref().unwrap_or(DEFAULT_CONFIG);
    let input = fs::read_to_string(config)
        .map_err(|err| MainError::FailedReadingConfig(config.to_string(), err))?;
    let blocks =
        parse_config(&input).map_err(|err| MainError::InvalidConfig(config.to_string(), err))?;

    let default_root = match args.root {
        Some(root) => PathBuf::from(root),
        None => env::current_dir().map_err(MainError::NoCurrentDirectory)?,
    };

    // Setup every key of every server block, the startup pulls are only registered once.
    let environment = GitEnvironment::new();
    let registry = StartupRegistry::new();
    let mut servers: Vec<(String, Vec<Middleware>)> = vec![];
    for (index, block) in blocks.iter().enumerate() {
        let root = block
            .root(&default_root)
            .map_err(|err| MainError::InvalidConfig(config.to_string(), err))?;
        for key in block.keys.iter() {
            let mut controller = Controller {
                dispenser: block.dispenser("git"),
                root: root.clone(),
                server_block: index,
                key: key.clone(),
                environment: &environment,
                registry: &registry,
            };
            let middleware = setup(&mut controller)
                .map_err(|err| MainError::FailedSetup(key.clone(), err))?;

            if let Some(middleware) = middleware {
                let address = listen_address(key);
                match servers.iter_mut().find(|(server, _)| *server == address) {
                    Some((_, middlewares)) => middlewares.push(middleware),
                    None => servers.push((address, vec![middleware])),
                }
            }
        }
    }

    // Setup triggers.
    let in_flight = InFlight::new();
    let mut triggers: Vec<Box<dyn Trigger>> =
        vec![Box::new(SignalTrigger::new(in_flight.clone()))];
    for (address, middlewares) in servers {
        debug!("Serving webhooks on {address}.");
        triggers.push(Box::new(HttpTrigger::new(address, chain(middlewares))));
    }

    // Start the main loop.
    start(
        registry.take_actions(),
        triggers,
        &GitCheck,
        &in_flight,
        args.once,
    )?;

    Ok(())
}
