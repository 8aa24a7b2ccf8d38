//! Centralized configuration (environment variables + defaults).
//!
//! Values are read through a lookup function so the parsing can be exercised
//! without touching the process environment; `from_env` is the production entry.

use crate::pipeline::compose::parse_hex_color;
use crate::pipeline::{ComposeSettings, UpscaleMode};
use anyhow::{anyhow, Context, Result};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

/// Upload size limit enforced before handlers run (15 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 15 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub enum StorageBackend {
    Postgres { database_url: String },
    Memory,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub bind_addr: IpAddr,
    pub port: u16,
    /// Where processed images are written; served at `/uploads`.
    pub upload_dir: PathBuf,
    /// Static browser client, served at `/`. Skipped when the directory is missing.
    pub client_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub storage: StorageBackend,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let storage = match string_or(&lookup, "STORAGE_BACKEND", "postgres")
            .to_lowercase()
            .as_str()
        {
            "postgres" | "postgresql" => StorageBackend::Postgres {
                // Database URL must be provided (no default) for safety.
                database_url: lookup("DATABASE_URL")
                    .filter(|v| !v.trim().is_empty())
                    .ok_or_else(|| anyhow!("DATABASE_URL must be set"))?,
            },
            "memory" => StorageBackend::Memory,
            other => return Err(anyhow!("STORAGE_BACKEND must be postgres or memory, got '{other}'")),
        };

        Ok(Self {
            bind_addr: parse_or(&lookup, "BIND_ADDR", IpAddr::from([0, 0, 0, 0]))?,
            port: parse_or(&lookup, "PORT", 5001u16)?,
            upload_dir: PathBuf::from(string_or(&lookup, "UPLOAD_DIR", "server/uploads")),
            client_dir: PathBuf::from(string_or(&lookup, "CLIENT_DIR", "client")),
            max_upload_bytes: parse_or(&lookup, "MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            storage,
        })
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub background_removal: bool,
    pub rembg_cli: String,
    pub upscale: UpscaleMode,
    pub realsr_cli: String,
    pub waifu2x_cli: String,
    pub compose: ComposeSettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            background_removal: true,
            rembg_cli: "rembg".to_string(),
            upscale: UpscaleMode::Off,
            realsr_cli: "realesrgan-ncnn-vulkan".to_string(),
            waifu2x_cli: "waifu2x-ncnn-vulkan".to_string(),
            compose: ComposeSettings::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let compose_defaults = defaults.compose.clone();

        let upscale = match lookup("IMG_UPSCALE") {
            Some(raw) => raw
                .parse::<UpscaleMode>()
                .map_err(|e| anyhow!("IMG_UPSCALE: {e}"))?,
            None => defaults.upscale,
        };

        let content_ratio: f32 = parse_or(&lookup, "IMG_CONTENT_RATIO", compose_defaults.content_ratio)?;
        if !(content_ratio > 0.0 && content_ratio <= 1.0) {
            return Err(anyhow!("IMG_CONTENT_RATIO must be in (0, 1], got {content_ratio}"));
        }
        let target_size: u32 = parse_or(&lookup, "IMG_TARGET_SIZE", compose_defaults.target_size)?;
        if target_size == 0 {
            return Err(anyhow!("IMG_TARGET_SIZE must be positive"));
        }
        let jpeg_quality: u8 = parse_or(&lookup, "IMG_JPEG_QUALITY", compose_defaults.jpeg_quality)?;

        Ok(Self {
            background_removal: toggle(&lookup, "IMG_BGM_REMOVE", defaults.background_removal)?,
            rembg_cli: string_or(&lookup, "REMBG_CLI", &defaults.rembg_cli),
            upscale,
            realsr_cli: string_or(&lookup, "REALSR_CLI", &defaults.realsr_cli),
            waifu2x_cli: string_or(&lookup, "WAIFU2X_CLI", &defaults.waifu2x_cli),
            compose: ComposeSettings {
                target_size,
                content_ratio,
                jpeg_quality: jpeg_quality.clamp(1, 100),
                gradient_top: color_or(&lookup, "IMG_BG_GRADIENT_TOP", compose_defaults.gradient_top)?,
                gradient_bottom: color_or(
                    &lookup,
                    "IMG_BG_GRADIENT_BOTTOM",
                    compose_defaults.gradient_bottom,
                )?,
                radial_highlight: toggle(&lookup, "IMG_BG_RADIAL", compose_defaults.radial_highlight)?,
            },
        })
    }
}

fn string_or(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: &str) -> String {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value '{raw}'")),
        None => Ok(default),
    }
}

/// `on|off`, also accepting `true|false|1|0|yes|no`.
fn toggle(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> Result<bool> {
    let Some(raw) = lookup(key).map(|v| v.trim().to_lowercase()).filter(|v| !v.is_empty()) else {
        return Ok(default);
    };
    match raw.as_str() {
        "on" | "true" | "1" | "yes" => Ok(true),
        "off" | "false" | "0" | "no" => Ok(false),
        _ => Err(anyhow!("{key} must be on or off, got '{raw}'")),
    }
}

fn color_or(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: image::Rgb<u8>,
) -> Result<image::Rgb<u8>> {
    match lookup(key).filter(|v| !v.trim().is_empty()) {
        Some(raw) => parse_hex_color(&raw).ok_or_else(|| anyhow!("{key} must be a #rrggbb colour, got '{raw}'")),
        None => Ok(default),
    }
}
