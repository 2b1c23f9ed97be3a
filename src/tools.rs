use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use crate::error::PrepError;

/// Runs an external program to completion, mapping failure through `on_fail`.
///
/// External invocations are the suspension points of the pipeline; a
/// caller-supplied timeout bounds how long each may block. On timeout the
/// child is killed and the invocation is treated as failed, never retried.
pub fn run_command<F>(
    program: &Path,
    args: &[String],
    cwd: Option<&Path>,
    timeout: Option<Duration>,
    on_fail: F,
) -> Result<(), PrepError>
where
    F: Fn(String) -> PrepError,
{
    let mut cmd = Command::new(program);
    cmd.args(args).stdout(Stdio::null()).stderr(Stdio::piped());
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let mut child = cmd.spawn().map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            PrepError::MissingTool(program.display().to_string())
        } else {
            on_fail(err.to_string())
        }
    })?;

    // Drain stderr on its own thread; a chatty tool would otherwise fill the
    // pipe buffer and stall against the wait loop below.
    let stderr_capture = child.stderr.take().map(|mut pipe| {
        std::thread::spawn(move || {
            let mut buffer = String::new();
            let _ = pipe.read_to_string(&mut buffer);
            buffer
        })
    });

    let deadline = timeout.map(|limit| (Instant::now() + limit, limit));
    let status = loop {
        match child.try_wait().map_err(|err| on_fail(err.to_string()))? {
            Some(status) => break status,
            None => {
                if let Some((at, limit)) = deadline {
                    if Instant::now() >= at {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(PrepError::CommandTimeout(limit.as_secs()));
                    }
                }
                std::thread::sleep(Duration::from_millis(100));
            }
        }
    };

    if status.success() {
        return Ok(());
    }
    let stderr = stderr_capture
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default();
    let stderr = stderr.trim();
    let message = if stderr.is_empty() {
        format!("command failed: {}", program.display())
    } else {
        stderr.to_string()
    };
    Err(on_fail(message))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn missing_program_maps_to_missing_tool() {
        let err = run_command(
            Path::new("/nonexistent/xlprep-test-tool"),
            &[],
            None,
            None,
            |message| PrepError::Filesystem(message),
        )
        .unwrap_err();
        assert_matches!(err, PrepError::MissingTool(_));
    }

    #[cfg(unix)]
    #[test]
    fn failing_command_surfaces_stderr() {
        let err = run_command(
            Path::new("/bin/sh"),
            &[
                "-c".to_string(),
                "echo boom >&2; exit 7".to_string(),
            ],
            None,
            None,
            |message| PrepError::Estimation {
                dataset: "PXD000001".to_string(),
                message,
            },
        )
        .unwrap_err();
        assert_matches!(err, PrepError::Estimation { message, .. } if message == "boom");
    }

    #[cfg(unix)]
    #[test]
    fn verbose_successful_command_is_not_mistaken_for_a_hang() {
        // Writes well past the OS pipe buffer before exiting cleanly.
        run_command(
            Path::new("/bin/sh"),
            &[
                "-c".to_string(),
                "head -c 200000 /dev/zero >&2".to_string(),
            ],
            None,
            Some(Duration::from_secs(3)),
            |message| PrepError::Filesystem(message),
        )
        .unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn timeout_kills_the_child() {
        let err = run_command(
            Path::new("/bin/sh"),
            &["-c".to_string(), "sleep 30".to_string()],
            None,
            Some(Duration::from_millis(200)),
            |message| PrepError::Filesystem(message),
        )
        .unwrap_err();
        assert_matches!(err, PrepError::CommandTimeout(_));
    }
}
