//! Shell execution: the single chokepoint for every external tool.
//!
//! Command lines are built from a trusted [`CommandTemplate`] with `{name}`
//! placeholders. Each argument is escaped on its own before substitution, so
//! a source filename full of quotes, pipes and semicolons still reaches the
//! tool as one literal word. Nothing else in the crate builds a command line.

use crate::error::ToolError;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::process::Command;
use std::sync::Arc;
use tracing::{debug, warn};

static RE_PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{([a-z_]+)\}").unwrap());

/// Escape `arg` so a POSIX shell reads it back as exactly one literal word.
///
/// Every character outside `[A-Za-z0-9_\-.,:+/@]` gets a backslash; a newline
/// becomes `'\n'` (a backslash-newline would be a line continuation) and the
/// empty string becomes `''`.
pub fn escape(arg: &str) -> String {
    if arg.is_empty() {
        return "''".to_string();
    }

    let mut out = String::with_capacity(arg.len() * 2);
    for c in arg.chars() {
        match c {
            '\n' => out.push_str("'\n'"),
            c if c.is_ascii_alphanumeric() => out.push(c),
            '_' | '-' | '.' | ',' | ':' | '+' | '/' | '@' => out.push(c),
            c => {
                out.push('\\');
                out.push(c);
            }
        }
    }
    out
}

/// Inverse of [`escape`].
pub fn unescape(escaped: &str) -> String {
    if escaped == "''" {
        return String::new();
    }

    let mut out = String::with_capacity(escaped.len());
    let mut rest = escaped;
    while !rest.is_empty() {
        if let Some(tail) = rest.strip_prefix("'\n'") {
            out.push('\n');
            rest = tail;
            continue;
        }
        let mut chars = rest.chars();
        match chars.next() {
            Some('\\') => {
                if let Some(c) = chars.next() {
                    out.push(c);
                }
            }
            Some(c) => out.push(c),
            None => break,
        }
        rest = chars.as_str();
    }
    out
}

/// A trusted command line with `{name}` placeholders for untrusted arguments.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandTemplate(String);

impl CommandTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Placeholder names in order of first appearance.
    pub fn placeholders(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for caps in RE_PLACEHOLDER.captures_iter(&self.0) {
            if let Some(m) = caps.get(1) {
                if !names.contains(&m.as_str()) {
                    names.push(m.as_str());
                }
            }
        }
        names
    }

    /// Substitute every placeholder with its escaped argument.
    ///
    /// Arguments the template does not mention are ignored; a placeholder
    /// without an argument is an error.
    pub fn render(&self, args: &[(&str, &str)]) -> Result<String, ToolError> {
        if let Some(missing) = self
            .placeholders()
            .into_iter()
            .find(|name| !args.iter().any(|(k, _)| k == name))
        {
            return Err(ToolError::UnboundPlaceholder {
                template: self.0.clone(),
                name: missing.to_string(),
            });
        }

        let rendered = RE_PLACEHOLDER.replace_all(&self.0, |caps: &Captures<'_>| {
            let name = &caps[1];
            args.iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| escape(v))
                .unwrap_or_default()
        });
        Ok(rendered.into_owned())
    }
}

impl fmt::Debug for CommandTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl From<&str> for CommandTemplate {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for CommandTemplate {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Captured output of a successful command.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs a fully rendered command line.
///
/// Implementations must be `Send + Sync`; PDF pages run on several blocking
/// threads at once.
pub trait Executor: Send + Sync {
    fn execute(&self, command: &str) -> Result<ToolOutput, ToolError>;
}

/// Executes commands with `sh -c`, blocking until they exit.
#[derive(Debug, Clone)]
pub struct SystemShell {
    program: String,
}

impl SystemShell {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for SystemShell {
    fn default() -> Self {
        Self::new("sh")
    }
}

impl Executor for SystemShell {
    fn execute(&self, command: &str) -> Result<ToolOutput, ToolError> {
        let output = Command::new(&self.program)
            .arg("-c")
            .arg(command)
            .output()
            .map_err(|source| ToolError::Spawn {
                command: command.to_string(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(ToolError::NonZeroExit {
                command: command.to_string(),
                code: output.status.code(),
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(ToolOutput { stdout, stderr })
    }
}

/// Cloneable handle to the executor every pipeline step goes through.
#[derive(Clone)]
pub struct Shell {
    executor: Arc<dyn Executor>,
}

impl Shell {
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self { executor }
    }

    /// A shell backed by [`SystemShell`].
    pub fn system() -> Self {
        Self::new(Arc::new(SystemShell::default()))
    }

    /// Render `template` with `args` and run it.
    pub fn run(
        &self,
        template: &CommandTemplate,
        args: &[(&str, &str)],
    ) -> Result<ToolOutput, ToolError> {
        let command = template.render(args)?;
        debug!("exec: {}", command);
        self.executor.execute(&command).inspect_err(|e| {
            warn!("command failed: {}", e);
        })
    }
}

impl Default for Shell {
    fn default() -> Self {
        Self::system()
    }
}

impl fmt::Debug for Shell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shell")
            .field("executor", &"<dyn Executor>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingExecutor;

    #[test]
    fn escape_leaves_plain_paths_alone() {
        assert_eq!(escape("/tmp/foo-1.2_x.bmp"), "/tmp/foo-1.2_x.bmp");
        assert_eq!(escape("user@host:8080,a+b"), "user@host:8080,a+b");
    }

    #[test]
    fn escape_quotes_and_pipes() {
        assert_eq!(escape("foo\"bar"), "foo\\\"bar");
        assert_eq!(escape("baz || exit 1"), "baz\\ \\|\\|\\ exit\\ 1");
        assert_eq!(escape("a;b"), "a\\;b");
        assert_eq!(escape("$(rm -rf x)"), "\\$\\(rm\\ -rf\\ x\\)");
        assert_eq!(escape("doc.pdf[4]"), "doc.pdf\\[4\\]");
    }

    #[test]
    fn escape_empty_and_newline() {
        assert_eq!(escape(""), "''");
        assert_eq!(escape("a\nb"), "a'\n'b");
    }

    #[test]
    fn unescape_round_trips() {
        let samples = [
            "",
            "plain",
            "foo\"bar",
            "baz || exit 1",
            "it's a \\ backslash",
            "line\nbreak",
            "'\n'",
            "ünïcødé path/ok",
            "tab\tand $HOME `cmd` *glob?",
            "''",
        ];
        for s in samples {
            assert_eq!(unescape(&escape(s)), s, "round trip of {s:?}");
        }
    }

    #[test]
    fn template_lists_placeholders_once() {
        let t = CommandTemplate::new("tool {input} -o {output} --again {input}");
        assert_eq!(t.placeholders(), vec!["input", "output"]);
    }

    #[test]
    fn template_escapes_each_argument() {
        let t = CommandTemplate::new("tool -i {input} -o {output}");
        let cmd = t
            .render(&[("input", "foo\"bar"), ("output", "baz || exit 1")])
            .unwrap();
        assert_eq!(cmd, "tool -i foo\\\"bar -o baz\\ \\|\\|\\ exit\\ 1");
    }

    #[test]
    fn template_rejects_unbound_placeholder() {
        let t = CommandTemplate::new("tool {input} {output}");
        let err = t.render(&[("input", "a")]).unwrap_err();
        assert!(matches!(err, ToolError::UnboundPlaceholder { ref name, .. } if name == "output"));
    }

    #[test]
    fn template_from_formatted_string() {
        let pages = 3;
        let t: CommandTemplate = format!("echo 'Pages: {pages}' {{input}}").into();
        assert_eq!(t.placeholders(), vec!["input"]);
        assert_eq!(t.render(&[("input", "a.pdf")]).unwrap(), "echo 'Pages: 3' a.pdf");
    }

    #[test]
    fn template_ignores_extra_arguments() {
        let t = CommandTemplate::new("touch {output}");
        let cmd = t.render(&[("input", "x"), ("output", "y")]).unwrap();
        assert_eq!(cmd, "touch y");
    }

    #[test]
    fn shell_passes_rendered_command_to_executor() {
        let exec = RecordingExecutor::new();
        let shell = Shell::new(exec.clone());
        shell
            .run(&"tool -i {input}".into(), &[("input", "a b")])
            .unwrap();
        assert_eq!(exec.commands(), vec!["tool -i a\\ b".to_string()]);
    }

    #[test]
    fn system_shell_reports_non_zero_exit() {
        let err = SystemShell::default()
            .execute("echo nope >&2; exit 7")
            .unwrap_err();
        match err {
            ToolError::NonZeroExit { code, stderr, .. } => {
                assert_eq!(code, Some(7));
                assert_eq!(stderr, "nope");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn system_shell_treats_escaped_metacharacters_literally() {
        let dir = tempfile::TempDir::new().unwrap();
        let sentinel = dir.path().join("pwned");
        let hostile = format!("x; touch {}", sentinel.display());

        let shell = Shell::system();
        let out = shell
            .run(&"printf %s {arg}".into(), &[("arg", hostile.as_str())])
            .unwrap();

        assert_eq!(out.stdout, hostile);
        assert!(!sentinel.exists(), "metacharacters must not execute");
    }
}
