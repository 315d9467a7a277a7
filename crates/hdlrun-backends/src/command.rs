//! Command sequences produced by backends

use crate::{BackendError, BackendResult};
use serde::Serialize;
use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};

/// One external process invocation: a program and its argument vector
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl SimCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Whether the program is looked up on `PATH` rather than given as a path
    pub fn is_bare_program(&self) -> bool {
        !self.program.contains('/') && !self.program.contains('\\')
    }
}

impl fmt::Display for SimCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Ordered list of invocations; each one depends on the side effects of the
/// ones before it, so they must run strictly in order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CommandSequence {
    commands: Vec<SimCommand>,
}

impl CommandSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: SimCommand) {
        self.commands.push(command);
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SimCommand> {
        self.commands.iter()
    }

    pub fn as_slice(&self) -> &[SimCommand] {
        &self.commands
    }

    /// Resolve every bare program name against `search_path`, failing on the
    /// first one that cannot be found. Programs given as paths are produced
    /// by earlier commands and are not checked.
    pub fn check_executables(&self, search_path: Option<&OsStr>) -> BackendResult<()> {
        for command in &self.commands {
            if command.is_bare_program()
                && find_executable(&command.program, search_path).is_none()
            {
                return Err(BackendError::MissingExecutable(command.program.clone()));
            }
        }
        Ok(())
    }
}

impl From<Vec<SimCommand>> for CommandSequence {
    fn from(commands: Vec<SimCommand>) -> Self {
        Self { commands }
    }
}

impl IntoIterator for CommandSequence {
    type Item = SimCommand;
    type IntoIter = std::vec::IntoIter<SimCommand>;

    fn into_iter(self) -> Self::IntoIter {
        self.commands.into_iter()
    }
}

impl<'a> IntoIterator for &'a CommandSequence {
    type Item = &'a SimCommand;
    type IntoIter = std::slice::Iter<'a, SimCommand>;

    fn into_iter(self) -> Self::IntoIter {
        self.commands.iter()
    }
}

/// Find `name` in the directories of `search_path` (a `PATH`-style list)
pub fn find_executable(name: &str, search_path: Option<&OsStr>) -> Option<PathBuf> {
    let search_path = search_path?;
    for dir in std::env::split_paths(search_path) {
        let candidate = dir.join(name);
        if is_executable(&candidate) {
            return Some(candidate);
        }
        if cfg!(windows) {
            let candidate = dir.join(format!("{}.exe", name));
            if is_executable(&candidate) {
                return Some(candidate);
            }
        }
    }
    None
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    match std::fs::metadata(path) {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
