//! Best-effort image post-processing run for every uploaded product picture.
//!
//! Stages, in order:
//! 1. background removal (optional, failure keeps the original)
//! 2. upscaling (optional, failure keeps the previous stage's output)
//! 3. composition onto a gradient canvas and JPEG encoding (required)
//!
//! Intermediate files live in a per-run working directory next to the *input*
//! (the caller's scratch area), removed when the run ends whether it succeeded or
//! not. The final JPEG is staged there too and only renamed into `output` once
//! it is complete.

pub mod background;
mod command;
pub mod compose;
pub mod upscale;

pub use background::{BackgroundRemover, RembgCli};
pub use compose::ComposeSettings;
pub use upscale::{CliUpscaler, UpscaleMode, Upscaler};

use crate::infra::config::PipelineConfig;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Failure of an optional stage. Logged, never surfaced to the caller.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("could not start '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("'{program}' exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("stage produced no output at {0}")]
    MissingOutput(PathBuf),
}

/// Failure of the pipeline as a whole.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("image file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image processing failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("image worker crashed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Which optional stages actually took effect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub background_removed: bool,
    pub upscaled: bool,
}

pub struct ImagePipeline {
    background: Option<Arc<dyn BackgroundRemover>>,
    upscaler: Option<Arc<dyn Upscaler>>,
    compose: ComposeSettings,
}

impl ImagePipeline {
    pub fn new(
        background: Option<Arc<dyn BackgroundRemover>>,
        upscaler: Option<Arc<dyn Upscaler>>,
        compose: ComposeSettings,
    ) -> Self {
        Self {
            background,
            upscaler,
            compose,
        }
    }

    /// Builds the CLI-backed stages selected by the configuration.
    pub fn from_config(config: &PipelineConfig) -> Self {
        let background: Option<Arc<dyn BackgroundRemover>> = if config.background_removal {
            Some(Arc::new(RembgCli::new(config.rembg_cli.clone())))
        } else {
            None
        };
        let program = match config.upscale {
            UpscaleMode::RealSr => config.realsr_cli.clone(),
            _ => config.waifu2x_cli.clone(),
        };
        let upscaler = CliUpscaler::new(config.upscale, program)
            .map(|u| Arc::new(u) as Arc<dyn Upscaler>);
        Self::new(background, upscaler, config.compose.clone())
    }

    pub fn compose_settings(&self) -> &ComposeSettings {
        &self.compose
    }

    /// Runs every stage on `input` and writes the final JPEG to `output`.
    pub async fn process(&self, input: &Path, output: &Path) -> Result<PipelineReport, PipelineError> {
        let out_dir = output.parent().unwrap_or_else(|| Path::new("."));
        tokio::fs::create_dir_all(out_dir).await?;
        let scratch = input.parent().unwrap_or_else(|| Path::new("."));
        let work_dir = tempfile::Builder::new()
            .prefix(".pipeline-")
            .tempdir_in(scratch)?;

        let mut report = PipelineReport::default();
        let mut current = input.to_path_buf();

        if let Some(remover) = &self.background {
            let stage_out = work_dir.path().join("bg-removed.png");
            match remover.remove_background(&current, &stage_out).await {
                Ok(()) => {
                    current = stage_out;
                    report.background_removed = true;
                }
                Err(e) => warn!(error = %e, "background removal failed, continuing without it"),
            }
        }

        if let Some(upscaler) = &self.upscaler {
            let stage_out = work_dir.path().join("upscaled.png");
            match upscaler.upscale(&current, &stage_out).await {
                Ok(()) => {
                    current = stage_out;
                    report.upscaled = true;
                }
                Err(e) => warn!(error = %e, "upscale failed, continuing without it"),
            }
        }

        let settings = self.compose.clone();
        let staged = work_dir.path().join("final.jpg");
        let target = staged.clone();
        tokio::task::spawn_blocking(move || {
            compose::compose_on_gradient(&current, &target, &settings)
        })
        .await??;
        tokio::fs::rename(&staged, output).await?;

        info!(
            output = %output.display(),
            background_removed = report.background_removed,
            upscaled = report.upscaled,
            "image pipeline finished"
        );
        // `work_dir` is dropped here (or on any early return above), removing intermediates.
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use image::{Rgba, RgbaImage};

    struct FailingRemover;

    #[async_trait]
    impl BackgroundRemover for FailingRemover {
        async fn remove_background(&self, _input: &Path, _output: &Path) -> Result<(), StageError> {
            Err(StageError::MissingOutput(PathBuf::from("nowhere.png")))
        }
    }

    /// Keeps the subject pixels and makes the white surroundings transparent.
    struct WhiteToTransparent;

    #[async_trait]
    impl BackgroundRemover for WhiteToTransparent {
        async fn remove_background(&self, input: &Path, output: &Path) -> Result<(), StageError> {
            let mut img = image::open(input).unwrap().to_rgba8();
            for px in img.pixels_mut() {
                if px[0] > 240 && px[1] > 240 && px[2] > 240 {
                    *px = Rgba([0, 0, 0, 0]);
                }
            }
            img.save(output).unwrap();
            Ok(())
        }
    }

    struct FailingUpscaler;

    #[async_trait]
    impl Upscaler for FailingUpscaler {
        async fn upscale(&self, _input: &Path, _output: &Path) -> Result<(), StageError> {
            Err(StageError::Failed {
                program: "realesrgan".into(),
                status: "exit status: 1".into(),
                stderr: "no vulkan device".into(),
            })
        }
    }

    fn write_red_on_white(path: &Path) {
        // White photo background with a red product in the middle.
        let img = RgbaImage::from_fn(120, 80, |x, y| {
            if (40..80).contains(&x) && (20..60).contains(&y) {
                Rgba([200, 30, 30, 255])
            } else {
                Rgba([255, 255, 255, 255])
            }
        });
        img.save(path).unwrap();
    }

    fn small_settings() -> ComposeSettings {
        ComposeSettings {
            target_size: 160,
            ..Default::default()
        }
    }

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn failed_background_removal_keeps_original_subject() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("raw.png");
        write_red_on_white(&input);
        let output = dir.path().join("out").join("final.jpg");

        let pipeline = ImagePipeline::new(
            Some(Arc::new(FailingRemover)),
            Some(Arc::new(FailingUpscaler)),
            small_settings(),
        );
        let report = pipeline.process(&input, &output).await.unwrap();
        assert_eq!(report, PipelineReport::default());

        let out = image::open(&output).unwrap().to_rgb8();
        assert_eq!(out.dimensions(), (160, 160));
        let centre = out.get_pixel(80, 80);
        assert!(centre[0] > 170 && centre[1] < 90, "subject missing: {centre:?}");

        // Only the final JPEG is left behind.
        assert_eq!(entries(output.parent().unwrap()), vec!["final.jpg".to_string()]);
    }

    #[tokio::test]
    async fn removed_background_shows_gradient_around_subject() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("raw.png");
        write_red_on_white(&input);
        let output = dir.path().join("final.jpg");

        let pipeline = ImagePipeline::new(Some(Arc::new(WhiteToTransparent)), None, small_settings());
        let report = pipeline.process(&input, &output).await.unwrap();
        assert!(report.background_removed);

        let out = image::open(&output).unwrap().to_rgb8();
        // The square subject is trimmed and scaled to 99px, leaving gradient at the edges.
        let edge = out.get_pixel(80, 4);
        assert!(edge[2] > 230 && edge[0] < 230, "expected gradient: {edge:?}");
        let centre = out.get_pixel(80, 80);
        assert!(centre[0] > 170 && centre[1] < 90, "subject missing: {centre:?}");
    }

    /// Records what the output directory looks like while a stage is running.
    struct WatchingRemover {
        watched: PathBuf,
        seen: std::sync::Mutex<Option<Vec<String>>>,
    }

    #[async_trait]
    impl BackgroundRemover for WatchingRemover {
        async fn remove_background(&self, _input: &Path, _output: &Path) -> Result<(), StageError> {
            *self.seen.lock().unwrap() = Some(entries(&self.watched));
            Err(StageError::MissingOutput(PathBuf::from("skipped.png")))
        }
    }

    #[tokio::test]
    async fn intermediates_never_touch_the_output_directory() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = dir.path().join("scratch");
        std::fs::create_dir(&scratch).unwrap();
        let input = scratch.join("raw.png");
        write_red_on_white(&input);
        let out_dir = dir.path().join("public");
        let output = out_dir.join("final.jpg");

        let remover = Arc::new(WatchingRemover {
            watched: out_dir.clone(),
            seen: std::sync::Mutex::new(None),
        });
        let pipeline = ImagePipeline::new(Some(remover.clone()), None, small_settings());
        pipeline.process(&input, &output).await.unwrap();

        assert_eq!(remover.seen.lock().unwrap().clone(), Some(Vec::new()));
        assert_eq!(entries(&out_dir), vec!["final.jpg".to_string()]);
        assert_eq!(entries(&scratch), vec!["raw.png".to_string()]);
    }

    #[tokio::test]
    async fn failed_publish_leaves_no_partial_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("raw.png");
        write_red_on_white(&input);
        let out_dir = dir.path().join("out");
        // A non-empty directory sits where the JPEG should go, so the final rename fails.
        let output = out_dir.join("final.jpg");
        std::fs::create_dir_all(output.join("occupied")).unwrap();

        let pipeline = ImagePipeline::new(None, None, small_settings());
        let err = pipeline.process(&input, &output).await.unwrap_err();
        assert!(matches!(err, PipelineError::Io(_)));
        assert_eq!(entries(&out_dir), vec!["final.jpg".to_string()]);
        assert!(output.is_dir());
        assert_eq!(entries(dir.path()), vec!["out".to_string(), "raw.png".to_string()]);
    }

    #[tokio::test]
    async fn undecodable_input_is_an_error_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("raw.png");
        std::fs::write(&input, b"definitely not an image").unwrap();
        let out_dir = dir.path().join("out");
        let output = out_dir.join("final.jpg");

        let pipeline = ImagePipeline::new(None, None, small_settings());
        let err = pipeline.process(&input, &output).await.unwrap_err();
        assert!(matches!(err, PipelineError::Image(_) | PipelineError::Io(_)));
        assert!(entries(&out_dir).is_empty());
    }
}
