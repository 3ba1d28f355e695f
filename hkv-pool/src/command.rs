//! Owned commands for pipelines and deferred execution.

use bytes::Bytes;

/// One command name plus its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    name: String,
    args: Vec<Bytes>,
}

impl Command {
    pub fn new(name: impl Into<String>) -> Self {
        Command {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl AsRef<[u8]>) -> Self {
        self.args.push(Bytes::copy_from_slice(arg.as_ref()));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[Bytes] {
        &self.args
    }

    /// First argument, used as the routing key by `ShardedPool`.
    pub fn key(&self) -> Option<&[u8]> {
        self.args.first().map(|arg| arg.as_ref())
    }

    pub(crate) fn arg_slices(&self) -> Vec<&[u8]> {
        self.args.iter().map(|arg| arg.as_ref()).collect()
    }
}

/// Ordered batch of commands, sent as one pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Commands {
    commands: Vec<Command>,
}

impl Commands {
    pub fn new() -> Self {
        Commands::default()
    }

    pub fn push(mut self, command: Command) -> Self {
        self.commands.push(command);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &Command> {
        self.commands.iter()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl FromIterator<Command> for Commands {
    fn from_iter<I: IntoIterator<Item = Command>>(iter: I) -> Self {
        Commands {
            commands: iter.into_iter().collect(),
        }
    }
}
