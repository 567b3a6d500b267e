use std::collections::HashMap;

/// Key-value data collected by the triggers and checks, passed to the actions
/// as environment variables (prefixed with `GITWATCH_`).
pub type Context = HashMap<String, String>;
