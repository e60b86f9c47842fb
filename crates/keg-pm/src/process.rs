//! Child process execution with captured output and an optional timeout.

use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Captured result of a finished child process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when the child was terminated by a signal
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// Stdout followed by stderr
    pub fn combined(&self) -> String {
        let mut combined = self.stdout.clone();
        combined.push_str(&self.stderr);
        combined
    }

    /// Last `lines` lines of stderr, for error messages
    pub fn stderr_tail(&self, lines: usize) -> String {
        let all: Vec<&str> = self.stderr.trim_end().lines().collect();
        let start = all.len().saturating_sub(lines);
        all[start..].join("\n")
    }

    pub fn describe_status(&self) -> String {
        match self.status {
            Some(code) => format!("exit status {}", code),
            None => "terminated by signal".to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to wait for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {}s", .timeout.as_secs())]
    TimedOut { program: String, timeout: Duration },
}

/// Run `command` to completion, killing it if `timeout` elapses first.
pub async fn run(mut command: Command, timeout: Option<Duration>) -> Result<CommandOutput, ProcessError> {
    let program = command.as_std().get_program().to_string_lossy().to_string();

    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    log::debug!("Running {:?}", command.as_std());

    let child = command.spawn().map_err(|source| ProcessError::Spawn {
        program: program.clone(),
        source,
    })?;

    // Dropping the wait future drops the child, which kills it.
    let output = match timeout {
        Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
            Ok(result) => result,
            Err(_) => {
                log::warn!("{} exceeded {}s, killed", program, limit.as_secs());
                return Err(ProcessError::TimedOut {
                    program,
                    timeout: limit,
                });
            }
        },
        None => child.wait_with_output().await,
    }
    .map_err(|source| ProcessError::Wait {
        program: program.clone(),
        source,
    })?;

    Ok(CommandOutput {
        status: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut command = Command::new("sh");
        command.arg("-c").arg(script);
        command
    }

    #[tokio::test]
    async fn test_captures_output_and_status() {
        let output = run(sh("echo out; echo err >&2; exit 4"), None).await.unwrap();

        assert_eq!(output.status, Some(4));
        assert!(!output.success());
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
        assert_eq!(output.combined(), "out\nerr\n");
    }

    #[tokio::test]
    async fn test_timeout_kills_child() {
        let err = run(sh("sleep 5"), Some(Duration::from_millis(100)))
            .await
            .unwrap_err();

        assert!(matches!(err, ProcessError::TimedOut { .. }));
        assert_eq!(err.to_string(), "sh timed out after 0s");
    }

    #[tokio::test]
    async fn test_missing_program() {
        let err = run(Command::new("/nonexistent/keg-test-binary"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::Spawn { .. }));
    }

    #[test]
    fn test_stderr_tail() {
        let output = CommandOutput {
            status: Some(1),
            stdout: String::new(),
            stderr: "a\nb\nc\nd\n".to_string(),
        };
        assert_eq!(output.stderr_tail(2), "c\nd");
        assert_eq!(output.stderr_tail(10), "a\nb\nc\nd");
    }
}
