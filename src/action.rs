//! Build actions: the external work behind a unit build.
//!
//! The core only looks at [`ActionOutcome::success`] and the duration;
//! tool output is passed through for logging.
//!
//! # Placeholders
//!
//! | Placeholder | Value                                 |
//! |-------------|---------------------------------------|
//! | `{input}`   | unit input (entry file, `block.json`) |
//! | `{output}`  | unit output (file or directory)       |
//! | `{dir}`     | directory containing the input        |
//! | `{name}`    | unit name                             |
//! | `{root}`    | theme root                            |

use crate::component::{BoxFuture, BuildUnit};
use regex::Regex;
use std::{
    borrow::Cow,
    ffi::OsString,
    fs, io,
    path::{Path, PathBuf},
    process::Output,
    sync::LazyLock,
    time::{Duration, Instant},
};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("no command configured")]
    EmptyCommand,

    #[error("failed to execute `{program}`")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("command `{program}` failed with {status}")]
    Failed { program: String, status: String },

    #[error("failed to copy `{}`", path.display())]
    Copy {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Result of one action run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionOutcome {
    pub success: bool,
    pub duration: Duration,
    /// Tool diagnostics worth showing on success (warnings).
    pub output: Option<String>,
    pub error: Option<String>,
}

impl ActionOutcome {
    fn ok(started: Instant, output: Option<String>) -> Self {
        Self {
            success: true,
            duration: started.elapsed(),
            output,
            error: None,
        }
    }

    fn failed(started: Instant, error: impl Into<String>) -> Self {
        Self {
            success: false,
            duration: started.elapsed(),
            output: None,
            error: Some(error.into()),
        }
    }
}

pub trait BuildAction: Send + Sync {
    fn run<'a>(&'a self, unit: &'a BuildUnit) -> BoxFuture<'a, ActionOutcome>;
}

// ============================================================================
// Command
// ============================================================================

/// Runs a configured argv in the theme root.
#[derive(Debug, Clone)]
pub struct CommandAction {
    argv: Vec<String>,
    root: PathBuf,
}

impl CommandAction {
    pub fn new(argv: &[String], root: &Path) -> Self {
        Self {
            argv: argv.to_vec(),
            root: root.to_path_buf(),
        }
    }

    pub fn program(&self) -> Option<&str> {
        self.argv.first().map(String::as_str)
    }

    /// Argv with placeholders replaced; empty arguments are dropped.
    pub fn expand(&self, unit: &BuildUnit) -> Vec<OsString> {
        let dir = unit.input.parent().unwrap_or(&self.root);
        let vars: [(&str, Cow<str>); 5] = [
            ("{input}", unit.input.to_string_lossy()),
            ("{output}", unit.output.to_string_lossy()),
            ("{dir}", dir.to_string_lossy()),
            ("{name}", Cow::Borrowed(unit.name.as_str())),
            ("{root}", self.root.to_string_lossy()),
        ];

        self.argv
            .iter()
            .map(|arg| {
                vars.iter()
                    .fold(arg.clone(), |acc, (key, value)| acc.replace(key, value))
            })
            .filter(|arg| !arg.is_empty())
            .map(OsString::from)
            .collect()
    }

    async fn execute(&self, unit: &BuildUnit) -> Result<Output, ActionError> {
        let argv = self.expand(unit);
        let Some((program, args)) = argv.split_first() else {
            return Err(ActionError::EmptyCommand);
        };
        let name = program.to_string_lossy().into_owned();

        // Tools rarely create missing output directories themselves
        if unit.output != unit.input
            && let Some(parent) = unit.output.parent()
        {
            let _ = tokio::fs::create_dir_all(parent).await;
        }

        tokio::process::Command::new(program)
            .args(args)
            .current_dir(&self.root)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ActionError::Spawn {
                program: name,
                source,
            })
    }
}

impl BuildAction for CommandAction {
    fn run<'a>(&'a self, unit: &'a BuildUnit) -> BoxFuture<'a, ActionOutcome> {
        Box::pin(async move {
            let started = Instant::now();
            let program = self.program().unwrap_or_default().to_string();

            match self.execute(unit).await {
                Err(e) => ActionOutcome::failed(started, error_chain(&e)),
                Ok(output) if !output.status.success() => {
                    ActionOutcome::failed(started, format_error(&program, &output))
                }
                Ok(output) => {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    ActionOutcome::ok(started, filter_noise(&stderr))
                }
            }
        })
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut msg = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        msg.push_str(": ");
        msg.push_str(&cause.to_string());
        source = cause.source();
    }
    msg
}

fn strip_ansi(s: &str) -> Cow<'_, str> {
    static RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*m").expect("valid ansi regex"));
    RE.replace_all(s, "")
}

/// Non-empty, ANSI-free lines, `None` when nothing is left.
fn filter_noise(output: &str) -> Option<String> {
    let lines: Vec<String> = output
        .lines()
        .map(|line| strip_ansi(line).trim_end().to_string())
        .filter(|line| !line.trim().is_empty())
        .collect();
    (!lines.is_empty()).then(|| lines.join("\n"))
}

/// Failure message: status line, then stderr, then stdout unless it is markup.
fn format_error(program: &str, output: &Output) -> String {
    let mut msg = ActionError::Failed {
        program: program.to_string(),
        status: output.status.to_string(),
    }
    .to_string();

    if let Some(stderr) = filter_noise(&String::from_utf8_lossy(&output.stderr)) {
        msg.push('\n');
        msg.push_str(&stderr);
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stdout = stdout.trim();
    if !stdout.is_empty() && !stdout.starts_with("<!DOCTYPE") && !stdout.starts_with('{') {
        msg.push_str("\nStdout:\n");
        msg.push_str(stdout);
    }
    msg
}

// ============================================================================
// Copy
// ============================================================================

/// What [`CopyAction`] copies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CopyFrom {
    /// The unit input itself, file or directory.
    #[default]
    Input,
    /// The directory containing the input (`block.json` → whole block).
    InputDir,
}

/// Native copy of a file, or of a directory tree.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyAction {
    from: CopyFrom,
}

impl CopyAction {
    pub const fn new(from: CopyFrom) -> Self {
        Self { from }
    }
}

impl BuildAction for CopyAction {
    fn run<'a>(&'a self, unit: &'a BuildUnit) -> BoxFuture<'a, ActionOutcome> {
        Box::pin(async move {
            let started = Instant::now();
            let input = match self.from {
                CopyFrom::Input => unit.input.clone(),
                CopyFrom::InputDir => unit.input.parent().unwrap_or(&unit.input).to_path_buf(),
            };
            let output = unit.output.clone();

            let copied = tokio::task::spawn_blocking(move || copy_path(&input, &output)).await;
            match copied {
                Ok(Ok(())) => ActionOutcome::ok(started, None),
                Ok(Err(e)) => ActionOutcome::failed(started, error_chain(&e)),
                Err(e) => ActionOutcome::failed(started, e.to_string()),
            }
        })
    }
}

/// Copy `from` to `to`, recursing into directories.
pub fn copy_path(from: &Path, to: &Path) -> Result<(), ActionError> {
    let copy_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source: io::Error| ActionError::Copy { path, source }
    };

    if from.is_file() {
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).map_err(copy_err(parent))?;
        }
        fs::copy(from, to).map_err(copy_err(from))?;
        return Ok(());
    }

    for entry in WalkDir::new(from).follow_links(true) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(from).to_path_buf();
            ActionError::Copy {
                path,
                source: e.into(),
            }
        })?;
        let Ok(rel) = entry.path().strip_prefix(from) else {
            continue;
        };
        let target = to.join(rel);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(copy_err(&target))?;
        } else {
            fs::copy(entry.path(), &target).map_err(copy_err(entry.path()))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn unit(name: &str, input: &Path, output: &Path) -> BuildUnit {
        BuildUnit::new(name, input, output)
    }

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_expand_placeholders() {
        let action = CommandAction::new(
            &argv(&["sass", "{input}", "{output}", "--name={name}", "{root}/x", "{dir}"]),
            Path::new("/theme"),
        );
        let u = unit(
            "main",
            Path::new("/theme/src/main.scss"),
            Path::new("/theme/dist/main.css"),
        );
        assert_eq!(
            action.expand(&u),
            vec![
                OsString::from("sass"),
                "/theme/src/main.scss".into(),
                "/theme/dist/main.css".into(),
                "--name=main".into(),
                "/theme/x".into(),
                "/theme/src".into(),
            ]
        );
    }

    #[test]
    fn test_filter_noise() {
        assert_eq!(filter_noise("\n  \n"), None);
        assert_eq!(
            filter_noise("\x1b[33mWarning\x1b[0m: deprecated\n\n"),
            Some("Warning: deprecated".into())
        );
    }

    #[test]
    fn test_strip_ansi() {
        assert_eq!(strip_ansi("\x1b[31mRed\x1b[0m"), "Red");
        assert_eq!(strip_ansi("Plain text"), "Plain text");
    }

    #[tokio::test]
    async fn test_empty_command_fails() {
        let action = CommandAction::new(&[], Path::new("/"));
        let u = unit("x", Path::new("/a"), Path::new("/b"));
        let outcome = action.run(&u).await;
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("no command configured"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_success_and_failure() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("a.txt");
        let output = dir.path().join("out/a.txt");
        fs::write(&input, "hi").unwrap();
        let u = unit("a", &input, &output);

        let ok = CommandAction::new(&argv(&["cp", "{input}", "{output}"]), dir.path());
        let outcome = ok.run(&u).await;
        assert!(outcome.success, "{:?}", outcome.error);
        assert_eq!(fs::read_to_string(&output).unwrap(), "hi");

        let fail = CommandAction::new(&argv(&["false"]), dir.path());
        let outcome = fail.run(&u).await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("command `false` failed"));
    }

    #[tokio::test]
    async fn test_missing_program_reports_spawn_error() {
        let dir = TempDir::new().unwrap();
        let action = CommandAction::new(&argv(&["themewright-no-such-tool"]), dir.path());
        let u = unit("x", &dir.path().join("a"), &dir.path().join("b"));
        let outcome = action.run(&u).await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().starts_with("failed to execute"));
    }

    #[tokio::test]
    async fn test_copy_file_and_tree() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("fonts");
        fs::create_dir_all(src.join("inter")).unwrap();
        fs::write(src.join("inter/inter.woff2"), "font").unwrap();
        fs::write(src.join("license.txt"), "ofl").unwrap();

        let tree = unit("fonts", &src, &dir.path().join("dist/fonts"));
        assert!(CopyAction::default().run(&tree).await.success);
        assert!(dir.path().join("dist/fonts/inter/inter.woff2").is_file());

        let block = unit(
            "inter",
            &src.join("inter/inter.woff2"),
            &dir.path().join("dist/blocks/inter"),
        );
        assert!(CopyAction::new(CopyFrom::InputDir).run(&block).await.success);
        assert!(dir.path().join("dist/blocks/inter/inter.woff2").is_file());

        let single = unit(
            "license.txt",
            &src.join("license.txt"),
            &dir.path().join("dist/x/license.txt"),
        );
        assert!(CopyAction::default().run(&single).await.success);
        assert_eq!(
            fs::read_to_string(dir.path().join("dist/x/license.txt")).unwrap(),
            "ofl"
        );
    }
}
