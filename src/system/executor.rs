// src/system/executor.rs

use std::path::Path;
use std::process::{Command as StdCommand, Stdio};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Script '{script}' could not be executed: {source}")]
    SpawnFailed {
        script: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Script '{0}' exited with a non-zero return code.")]
    NonZeroExitStatus(String),
    #[error("Script '{script}' produced output that was not valid UTF-8")]
    InvalidUtf8Output {
        script: String,
        #[source]
        source: std::string::FromUtf8Error,
    },
}

/// Runs one script through the configured interpreter and captures its
/// standard output. Stderr is passed through to the user's terminal. This
/// blocks until the script finishes; scripts are expected to be short
/// helpers whose output feeds back into evaluation.
pub fn run_script_and_capture_output(
    interpreter: &Path,
    script: &Path,
    args: &[String],
    cwd: &Path,
) -> Result<String, ExecutionError> {
    let script_display = script.display().to_string();
    let clean_cwd = dunce::simplified(cwd);

    log::debug!(
        "running script {} {} (cwd {})",
        interpreter.display(),
        script_display,
        clean_cwd.display()
    );

    let output = StdCommand::new(interpreter)
        .arg(script)
        .args(args)
        .current_dir(clean_cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .output()
        .map_err(|e| ExecutionError::SpawnFailed {
            script: script_display.clone(),
            source: e,
        })?;

    if !output.status.success() {
        return Err(ExecutionError::NonZeroExitStatus(script_display));
    }

    String::from_utf8(output.stdout).map_err(|e| ExecutionError::InvalidUtf8Output {
        script: script_display,
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[cfg(unix)]
    #[test]
    fn captures_stdout_of_a_successful_script() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("hello.sh");
        let mut f = std::fs::File::create(&script).unwrap();
        writeln!(f, "echo hello").unwrap();

        let out = run_script_and_capture_output(
            Path::new("/bin/sh"),
            &script,
            &[],
            dir.path(),
        )
        .unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fail.sh");
        let mut f = std::fs::File::create(&script).unwrap();
        writeln!(f, "exit 3").unwrap();

        let err = run_script_and_capture_output(
            Path::new("/bin/sh"),
            &script,
            &[],
            dir.path(),
        )
        .unwrap_err();
        assert!(matches!(err, ExecutionError::NonZeroExitStatus(_)));
    }

    #[test]
    fn missing_interpreter_fails_to_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_script_and_capture_output(
            Path::new("/no/such/interpreter"),
            Path::new("script"),
            &[],
            dir.path(),
        )
        .unwrap_err();
        assert!(matches!(err, ExecutionError::SpawnFailed { .. }));
    }
}
