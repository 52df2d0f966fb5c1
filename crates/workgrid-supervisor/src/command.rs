use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;

/// How to invoke the runtime: `<program> <args...> <config> <extra_args...>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeCommand {
    pub program: String,
    pub args: Vec<String>,
    pub extra_args: Vec<String>,
}

impl RuntimeCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            extra_args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_extra_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn argv(&self, config_path: &Path) -> Vec<OsString> {
        self.args
            .iter()
            .map(OsString::from)
            .chain(std::iter::once(config_path.as_os_str().to_owned()))
            .chain(self.extra_args.iter().map(OsString::from))
            .collect()
    }

    /// Command with piped output and no stdin. The child is killed if its
    /// handle is dropped.
    pub(crate) fn command(&self, config_path: &Path) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(self.argv(config_path))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}
