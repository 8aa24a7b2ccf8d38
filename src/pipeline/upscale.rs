use super::command::{ensure_output, run_cli};
use super::StageError;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::Path;
use std::str::FromStr;

/// Which upscaler (if any) runs before composition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UpscaleMode {
    #[default]
    Off,
    RealSr,
    Waifu2x,
}

impl FromStr for UpscaleMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "off" | "none" => Ok(UpscaleMode::Off),
            "realsr" => Ok(UpscaleMode::RealSr),
            "waifu2x" => Ok(UpscaleMode::Waifu2x),
            other => Err(format!("unknown upscaler '{other}' (expected off|realsr|waifu2x)")),
        }
    }
}

#[async_trait]
pub trait Upscaler: Send + Sync {
    async fn upscale(&self, input: &Path, output: &Path) -> Result<(), StageError>;
}

/// ncnn-vulkan style upscaler CLIs, always at 2x.
pub struct CliUpscaler {
    program: String,
    mode: UpscaleMode,
}

impl CliUpscaler {
    /// Returns `None` for [`UpscaleMode::Off`].
    pub fn new(mode: UpscaleMode, program: impl Into<String>) -> Option<Self> {
        match mode {
            UpscaleMode::Off => None,
            mode => Some(Self {
                program: program.into(),
                mode,
            }),
        }
    }

    fn args(&self, input: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-i".into(),
            input.as_os_str().to_owned(),
            "-o".into(),
            output.as_os_str().to_owned(),
            "-s".into(),
            "2".into(),
        ];
        if self.mode == UpscaleMode::Waifu2x {
            // denoise level
            args.push("-n".into());
            args.push("2".into());
        }
        args
    }
}

#[async_trait]
impl Upscaler for CliUpscaler {
    async fn upscale(&self, input: &Path, output: &Path) -> Result<(), StageError> {
        run_cli(&self.program, self.args(input, output)).await?;
        ensure_output(output).await
    }
}
