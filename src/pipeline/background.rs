use super::command::{ensure_output, run_cli};
use super::StageError;
use async_trait::async_trait;
use std::ffi::OsStr;
use std::path::Path;

/// Produces a transparent-background PNG of the input image.
#[async_trait]
pub trait BackgroundRemover: Send + Sync {
    async fn remove_background(&self, input: &Path, output: &Path) -> Result<(), StageError>;
}

/// `rembg i <input> <output>`
pub struct RembgCli {
    program: String,
}

impl RembgCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl BackgroundRemover for RembgCli {
    async fn remove_background(&self, input: &Path, output: &Path) -> Result<(), StageError> {
        run_cli(
            &self.program,
            [OsStr::new("i"), input.as_os_str(), output.as_os_str()],
        )
        .await?;
        ensure_output(output).await
    }
}
