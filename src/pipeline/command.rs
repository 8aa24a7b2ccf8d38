//! Running external image tools.

use super::StageError;
use std::ffi::OsStr;
use std::path::Path;
use tokio::process::Command;
use tracing::debug;

/// Runs `program` with `args` and waits for it. A non-zero exit is an error carrying stderr.
pub(crate) async fn run_cli<I, S>(program: &str, args: I) -> Result<(), StageError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args: Vec<S> = args.into_iter().collect();
    debug!(
        program,
        args = ?args.iter().map(|a| a.as_ref().to_string_lossy().into_owned()).collect::<Vec<_>>(),
        "running image tool"
    );
    let output = Command::new(program)
        .args(&args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| StageError::Spawn {
            program: program.to_string(),
            source,
        })?;

    if !output.status.success() {
        return Err(StageError::Failed {
            program: program.to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}

/// Some tools exit 0 without writing anything; treat that as a failure too.
pub(crate) async fn ensure_output(path: &Path) -> Result<(), StageError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.len() > 0 => Ok(()),
        _ => Err(StageError::MissingOutput(path.to_path_buf())),
    }
}
