//! Static command table of the command socket

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Get,
    Set,
    List,
    Rlist,
    Validate,
    Add,
    Del,
    Download,
    Wakeup,
    Completions,
    Help,
    Quit,
    QuitQuitQuit,
}

/// One entry of the dispatch table
#[derive(Debug)]
pub struct CommandSpec {
    pub name: &'static str,
    pub kind: CommandKind,
    pub usage: &'static str,
    pub help: &'static str,
    pub min_args: usize,
    /// `None` for variadic commands
    pub max_args: Option<usize>,
}

impl CommandSpec {
    const fn new(
        name: &'static str,
        kind: CommandKind,
        usage: &'static str,
        help: &'static str,
        min_args: usize,
        max_args: Option<usize>,
    ) -> Self {
        Self {
            name,
            kind,
            usage,
            help,
            min_args,
            max_args,
        }
    }

    /// Check the argument count (command word excluded)
    pub fn check_args(&self, args: &[String]) -> Result<()> {
        let count_ok = args.len() >= self.min_args && self.max_args.map_or(true, |m| args.len() <= m);
        let shape_ok = self.kind != CommandKind::Set || args.len() % 2 == 0;
        if count_ok && shape_ok {
            Ok(())
        } else {
            Err(Error::Dispatch(format!("usage: {}", self.usage)))
        }
    }
}

use CommandKind::*;

/// Every command, sorted by name. `ls` is an alias of `list`.
pub static COMMANDS: &[CommandSpec] = &[
    CommandSpec::new(
        "add",
        Add,
        "add name [idx]",
        "Add a sub-object to the given list with the given (optional) index.",
        1,
        Some(2),
    ),
    CommandSpec::new(
        "completions",
        Completions,
        "completions prefix",
        "Return possible completions for the given name prefix.",
        1,
        Some(1),
    ),
    CommandSpec::new(
        "del",
        Del,
        "del name idx [idx ...]",
        "Delete one or more sub-objects from the given list.",
        2,
        None,
    ),
    CommandSpec::new(
        "download",
        Download,
        "download url",
        "Download a system image, install it, and reboot.",
        1,
        Some(1),
    ),
    CommandSpec::new(
        "get",
        Get,
        "get name",
        "Get the value of the given parameter.",
        1,
        Some(1),
    ),
    CommandSpec::new(
        "help",
        Help,
        "help",
        "Return a list of available commands.",
        0,
        Some(0),
    ),
    CommandSpec::new(
        "list",
        List,
        "list [name]",
        "Return a list of objects, non-recursively starting at the given name.",
        0,
        Some(1),
    ),
    CommandSpec::new(
        "ls",
        List,
        "ls [name]",
        "Return a list of objects, non-recursively starting at the given name.",
        0,
        Some(1),
    ),
    CommandSpec::new(
        "quit",
        Quit,
        "quit",
        "Close the current connection.",
        0,
        Some(0),
    ),
    CommandSpec::new(
        "quitquitquit",
        QuitQuitQuit,
        "quitquitquit",
        "Shut down the server entirely.",
        0,
        Some(0),
    ),
    CommandSpec::new(
        "rlist",
        Rlist,
        "rlist [name]",
        "Return a list of objects, recursively starting at the given name.",
        0,
        Some(1),
    ),
    CommandSpec::new(
        "set",
        Set,
        "set name value [name value ...]",
        "Set the given parameter(s) to the given value(s).",
        2,
        None,
    ),
    CommandSpec::new(
        "validate",
        Validate,
        "validate [name]",
        "Validate the schema of an object and its children.",
        0,
        Some(1),
    ),
    CommandSpec::new(
        "wakeup",
        Wakeup,
        "wakeup",
        "Trigger an ACS session.",
        0,
        Some(0),
    ),
];

/// Find a command by its exact name
pub fn lookup(name: &str) -> Result<&'static CommandSpec> {
    COMMANDS
        .iter()
        .find(|c| c.name == name)
        .ok_or_else(|| Error::UnknownCommand(name.to_string()))
}
