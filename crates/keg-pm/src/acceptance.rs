//! Post-install acceptance check.
//!
//! Runs the formula's test command against the installed prefix with a minimal
//! environment, so that a tool of the same name elsewhere on the machine cannot
//! make a broken install look healthy.

use std::path::{Component, Path};
use std::time::Duration;
use tokio::process::Command;

use crate::environment::EnvironmentHandle;
use crate::formula::FormulaTest;
use crate::process::{self, CommandOutput, ProcessError};
use crate::{KegError, Result};

const SYSTEM_PATH: &str = "/usr/bin:/bin";
const OUTPUT_EXCERPT_CHARS: usize = 400;

#[derive(Debug, Clone, Default)]
pub struct AcceptanceRunner {
    timeout: Option<Duration>,
}

impl AcceptanceRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replace `#{bin}`, `#{prefix}` and `#{libexec}` with shell-quoted prefix paths
    pub fn interpolate(command: &str, env: &EnvironmentHandle) -> String {
        substitute(command, env, |path| shell_quote(&path.to_string_lossy()))
    }

    /// Run `test` in `env` and check its output and exit status
    pub async fn accept(&self, env: &EnvironmentHandle, test: &FormulaTest) -> Result<CommandOutput> {
        check_program_is_installed(&test.command, env)?;
        let command_line = Self::interpolate(&test.command, env);

        log::info!("Running acceptance check: {}", command_line);

        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(&command_line)
            .current_dir(env.prefix())
            .env_clear()
            .env("PATH", search_path(env))
            .env("HOME", home_dir(env))
            .env("LANG", "C");

        let output = process::run(command, self.timeout).await.map_err(|e| match e {
            ProcessError::TimedOut { timeout, .. } => KegError::Acceptance(format!(
                "`{}` timed out after {}s",
                command_line,
                timeout.as_secs()
            )),
            other => KegError::Acceptance(format!("`{}` could not run: {}", command_line, other)),
        })?;

        if output.status != Some(test.status) {
            return Err(KegError::Acceptance(format!(
                "`{}` finished with {}, expected exit status {}\n{}",
                command_line,
                output.describe_status(),
                test.status,
                excerpt(&output.combined())
            )));
        }

        if !output.combined().contains(&test.expected) {
            return Err(KegError::Acceptance(format!(
                "output of `{}` does not contain \"{}\"\n{}",
                command_line,
                test.expected,
                excerpt(&output.combined())
            )));
        }

        log::debug!("Acceptance check passed for {}", env.prefix().display());
        Ok(output)
    }
}

fn substitute(command: &str, env: &EnvironmentHandle, render: impl Fn(&Path) -> String) -> String {
    command
        .replace("#{bin}", &render(&env.bin_dir()))
        .replace("#{libexec}", &render(&env.libexec_dir()))
        .replace("#{prefix}", &render(env.prefix()))
}

/// `'...'` quoting for `sh`; embedded single quotes become `'\''`
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// The program a test runs must live in the prefix, not on the host
fn check_program_is_installed(command: &str, env: &EnvironmentHandle) -> Result<()> {
    let Some(word) = command.split_whitespace().next() else {
        return Err(KegError::Acceptance("test command is empty".to_string()));
    };
    let program = substitute(word, env, |path| path.to_string_lossy().into_owned());

    if !program.contains('/') {
        return if env.bin_dir().join(&program).exists() {
            Ok(())
        } else {
            Err(KegError::Acceptance(format!(
                "`{}` is not installed in {}",
                program,
                env.bin_dir().display()
            )))
        };
    }

    let path = Path::new(&program);
    let escapes = path.components().any(|c| c == Component::ParentDir);
    if escapes || (path.is_absolute() && !path.starts_with(env.prefix())) {
        return Err(KegError::Acceptance(format!(
            "`{}` is outside the install prefix {}",
            program,
            env.prefix().display()
        )));
    }
    Ok(())
}

fn search_path(env: &EnvironmentHandle) -> String {
    format!(
        "{}:{}:{}",
        env.bin_dir().display(),
        env.libexec_dir().join("bin").display(),
        SYSTEM_PATH
    )
}

fn home_dir(env: &EnvironmentHandle) -> std::ffi::OsString {
    std::env::var_os("HOME").unwrap_or_else(|| env.prefix().as_os_str().to_os_string())
}

fn excerpt(output: &str) -> String {
    let trimmed = output.trim_end();
    if trimmed.chars().count() <= OUTPUT_EXCERPT_CHARS {
        return trimmed.to_string();
    }
    let tail: String = trimmed
        .chars()
        .rev()
        .take(OUTPUT_EXCERPT_CHARS)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("...{}", tail)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::environment::EnvironmentProvisioner;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn installed(script: &str) -> (TempDir, EnvironmentHandle) {
        let temp = TempDir::new().unwrap();
        let env = EnvironmentProvisioner::new("demo", "1.0")
            .provision(&temp.path().join("prefix"))
            .unwrap();
        let bin = env.bin_dir().join("demo");
        std::fs::write(&bin, script).unwrap();
        std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).unwrap();
        (temp, env)
    }

    fn test(command: &str, expected: &str) -> FormulaTest {
        FormulaTest {
            command: command.to_string(),
            expected: expected.to_string(),
            status: 0,
        }
    }

    #[test]
    fn test_interpolate() {
        let (_temp, env) = installed("#!/bin/sh\n");
        let line = AcceptanceRunner::interpolate("#{bin}/demo --root #{prefix} #{libexec}", &env);
        assert_eq!(
            line,
            format!(
                "'{}'/demo --root '{}' '{}'",
                env.bin_dir().display(),
                env.prefix().display(),
                env.libexec_dir().display()
            )
        );
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("/opt/keg"), "'/opt/keg'");
        assert_eq!(shell_quote("/Application Support"), "'/Application Support'");
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
    }

    #[tokio::test]
    async fn test_prefix_with_spaces_and_quotes() {
        let temp = TempDir::new().unwrap();
        let env = EnvironmentProvisioner::new("demo", "1.0")
            .provision(&temp.path().join("Application Support/it's/demo/1.0"))
            .unwrap();
        let bin = env.bin_dir().join("demo");
        std::fs::write(&bin, "#!/bin/sh\necho 'Usage: demo'\n").unwrap();
        std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).unwrap();

        let output = AcceptanceRunner::new()
            .accept(&env, &test("#{bin}/demo --help", "Usage: demo"))
            .await
            .unwrap();
        assert!(output.stdout.contains("Usage: demo"));
    }

    #[tokio::test]
    async fn test_absolute_program_outside_prefix_is_rejected() {
        let (_temp, env) = installed("#!/bin/sh\necho demo\n");

        for command in ["/bin/echo demo", "#{bin}/../../../bin/echo demo"] {
            let err = AcceptanceRunner::new()
                .accept(&env, &test(command, "demo"))
                .await
                .unwrap_err();
            assert!(err.to_string().contains("outside the install prefix"), "{}", command);
        }

        let absolute = format!("{}/demo", env.bin_dir().display());
        AcceptanceRunner::new()
            .accept(&env, &test(&absolute, "demo"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_accepts_matching_output() {
        let (_temp, env) = installed("#!/bin/sh\necho 'Usage: demo [OPTIONS]'\n");

        let output = AcceptanceRunner::new()
            .accept(&env, &test("#{bin}/demo --help", "Usage: demo"))
            .await
            .unwrap();
        assert!(output.stdout.contains("Usage"));
    }

    #[tokio::test]
    async fn test_expected_text_may_come_from_stderr() {
        let (_temp, env) = installed("#!/bin/sh\necho 'demo 1.0' >&2\n");

        AcceptanceRunner::new()
            .accept(&env, &test("demo --version", "demo 1.0"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_missing_substring_fails() {
        let (_temp, env) = installed("#!/bin/sh\necho 'something else'\n");

        let err = AcceptanceRunner::new()
            .accept(&env, &test("#{bin}/demo --help", "polar"))
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), 3);
        assert!(err.to_string().contains("does not contain \"polar\""));
    }

    #[tokio::test]
    async fn test_unexpected_status_fails() {
        let (_temp, env) = installed("#!/bin/sh\necho demo\nexit 2\n");

        let err = AcceptanceRunner::new()
            .accept(&env, &test("#{bin}/demo", "demo"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("exit status 2"));

        let mut expecting_two = test("#{bin}/demo", "demo");
        expecting_two.status = 2;
        AcceptanceRunner::new().accept(&env, &expecting_two).await.unwrap();
    }

    #[tokio::test]
    async fn test_bare_program_must_be_in_prefix() {
        let (_temp, env) = installed("#!/bin/sh\necho demo\n");

        let err = AcceptanceRunner::new()
            .accept(&env, &test("ls --help", "ls"))
            .await
            .unwrap_err();
        assert!(matches!(err, KegError::Acceptance(_)));
        assert!(err.to_string().contains("not installed"));
    }

    #[tokio::test]
    async fn test_timeout() {
        let (_temp, env) = installed("#!/bin/sh\nsleep 5\n");

        let err = AcceptanceRunner::new()
            .with_timeout(Some(Duration::from_millis(100)))
            .accept(&env, &test("demo", "demo"))
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), 3);
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn test_excerpt_keeps_tail() {
        let long = "x".repeat(1000) + "END";
        let short = excerpt(&long);
        assert!(short.starts_with("..."));
        assert!(short.ends_with("END"));
        assert_eq!(short.chars().count(), OUTPUT_EXCERPT_CHARS + 3);
    }
}
