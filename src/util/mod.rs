//! Shared utilities: scoped operation logging and external command runs

pub mod blkid;
pub mod device;
pub mod files;
pub mod units;

use std::fmt::Display;
use std::future::Future;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, error, info};

use crate::error::IgnitionError;

/// Run an operation with matched begin/end logging. The end line is
/// emitted whether the operation succeeds or fails.
pub async fn log_op<T, E, F>(desc: impl Display, fut: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: Display,
{
    debug!("{}: started", desc);
    match fut.await {
        Ok(v) => {
            debug!("{}: finished", desc);
            Ok(v)
        }
        Err(e) => {
            error!("{}: failed: {}", desc, e);
            Err(e)
        }
    }
}

/// Run an external command, logging it, and return its stdout. A
/// non-zero exit becomes `CommandFailed` carrying the combined output.
pub async fn run_cmd(program: &str, args: &[String]) -> Result<String, IgnitionError> {
    info!("running: {} {}", program, args.join(" "));
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await?;

    if !output.status.success() {
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        return Err(IgnitionError::CommandFailed {
            cmd: program.to_string(),
            status: output.status.code().unwrap_or(-1),
            output: combined,
        });
    }
    debug!("{}: exited successfully", program);
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_cmd_success() {
        let out = run_cmd("true", &[]).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_run_cmd_failure_carries_output() {
        let err = run_cmd("sh", &["-c".into(), "echo boom >&2; exit 3".into()])
            .await
            .unwrap_err();
        match err {
            IgnitionError::CommandFailed {
                cmd,
                status,
                output,
            } => {
                assert_eq!(cmd, "sh");
                assert_eq!(status, 3);
                assert!(output.contains("boom"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_log_op_passes_through() {
        let ok: Result<u32, IgnitionError> = log_op("noop", async { Ok(7) }).await;
        assert_eq!(ok.unwrap(), 7);

        let err: Result<(), IgnitionError> =
            log_op("boom", async { Err(IgnitionError::NotFound) }).await;
        assert!(matches!(err, Err(IgnitionError::NotFound)));
    }
}
