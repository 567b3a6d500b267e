use gumdrop::Options;

/// Keep git repositories in sync with their remotes and run commands when they change.
#[derive(Debug, Options)]
pub struct Args {
    /// The configuration file with the repositories (default: Gitfile).
    #[options(free)]
    pub config: Option<String>,

    /// The site root of the server blocks without a root directive
    /// (default: the current directory).
    #[options(meta = "DIR")]
    pub root: Option<String>,

    /// Pull every repository once and exit. Useful for cronjobs.
    #[options(no_short)]
    pub once: bool,

    /// Increase verbosity, can be set multiple times (-v debug, -vv tracing)
    #[options(count)]
    pub verbose: u8,

    /// Only print error messages.
    #[options()]
    pub quiet: bool,

    /// Print the current version.
    #[options(short = "V")]
    pub version: bool,

    /// Print this help.
    #[options()]
    pub help: bool,
}

pub fn parse_args() -> Args {
    Args::parse_args_default_or_exit()
}
