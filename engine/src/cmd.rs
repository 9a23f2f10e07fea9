use anyhow::{anyhow, Context, Result};
use std::process::Stdio;

pub struct CommandResult {
    pub stdout: Vec<u8>,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs the command to completion, capturing both streams. A non-zero exit is not an error here.
pub async fn run_command(exec: &mut tokio::process::Command) -> Result<CommandResult> {
    let program = format!("{:?}", exec.as_std().get_program());
    let output = exec
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .with_context(|| format!("Failed to start {}", program))?;

    Ok(CommandResult {
        stdout: output.stdout,
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        exit_code: output.status.code(),
    })
}

/// Like `run_command` but turns a non-zero exit into an error carrying stderr.
pub async fn run_checked(exec: &mut tokio::process::Command) -> Result<Vec<u8>> {
    let program = format!("{:?}", exec.as_std().get_program());
    let result = run_command(exec).await?;
    if !result.success() {
        return Err(anyhow!(
            "{} exited with {}: {}",
            program,
            result
                .exit_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string()),
            result.stderr
        ));
    }
    Ok(result.stdout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_run_command_captures_output() {
        let mut exec = tokio::process::Command::new("sh");
        exec.arg("-c").arg("echo out; echo err 1>&2; exit 3");
        let result = run_command(&mut exec).await.unwrap();
        assert_eq!(String::from_utf8_lossy(&result.stdout), "out\n");
        assert_eq!(result.stderr, "err");
        assert_eq!(result.exit_code, Some(3));
        assert_eq!(result.success(), false);
    }

    #[tokio::test]
    async fn test_run_checked_fails_on_non_zero() {
        let mut exec = tokio::process::Command::new("sh");
        exec.arg("-c").arg("echo broken 1>&2; exit 1");
        let err = run_checked(&mut exec).await.unwrap_err();
        assert!(err.to_string().contains("broken"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_an_error() {
        let mut exec = tokio::process::Command::new("definitely-not-a-real-binary-xyz");
        assert!(run_command(&mut exec).await.is_err());
    }
}
