//! Re-encoding through an external converter process

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use super::error::ConvertError;
use crate::config::{AudioFormat, Bitrate, Quality};

/// Produces the configured container/codec from a raw download
#[async_trait]
pub trait Converter: Send + Sync {
    /// Convert `input` into `output`
    ///
    /// Must return [`ConvertError::ToolMissing`] when the converter is not
    /// installed, so callers can keep the unconverted file.
    async fn convert(
        &self,
        input: &Path,
        output: &Path,
        format: AudioFormat,
        bitrate: Option<&str>,
    ) -> Result<(), ConvertError>;
}

/// Target bitrate for a conversion; `None` for stream copies
pub fn transcode_bitrate(
    format: AudioFormat,
    configured: &Bitrate,
    quality: Quality,
    premium: bool,
) -> Option<String> {
    if format.is_copy() {
        return None;
    }
    let bitrate = match configured {
        Bitrate::Explicit(b) => return Some(b.clone()),
        Bitrate::Auto => match quality {
            Quality::Auto if premium => "320k",
            Quality::Auto => "160k",
            Quality::Normal => "96k",
            Quality::High => "160k",
            Quality::VeryHigh => "320k",
        },
    };
    Some(bitrate.to_string())
}

/// ffmpeg, located from the config or `PATH`
pub struct FfmpegConverter {
    configured: Option<PathBuf>,
    log_level: String,
}

impl FfmpegConverter {
    pub fn new(configured: Option<PathBuf>, log_level: &str) -> Self {
        Self {
            configured,
            log_level: log_level.to_string(),
        }
    }

    fn executable(&self) -> Result<PathBuf, ConvertError> {
        match &self.configured {
            Some(path) if path.is_file() => Ok(path.clone()),
            Some(path) => Err(ConvertError::ToolMissing(path.display().to_string())),
            None => which::which("ffmpeg").map_err(|e| ConvertError::ToolMissing(e.to_string())),
        }
    }

    fn arguments(
        &self,
        input: &Path,
        output: &Path,
        codec: &str,
        bitrate: Option<&str>,
    ) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            self.log_level.clone(),
            "-i".to_string(),
            input.display().to_string(),
            "-c:a".to_string(),
            codec.to_string(),
        ];
        if let Some(bitrate) = bitrate {
            args.push("-b:a".to_string());
            args.push(bitrate.to_string());
        }
        args.push(output.display().to_string());
        args
    }
}

#[async_trait]
impl Converter for FfmpegConverter {
    async fn convert(
        &self,
        input: &Path,
        output: &Path,
        format: AudioFormat,
        bitrate: Option<&str>,
    ) -> Result<(), ConvertError> {
        let executable = self.executable()?;
        let args = self.arguments(input, output, format.codec(), bitrate);
        debug!("Running {} {}", executable.display(), args.join(" "));

        let result = Command::new(&executable)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await;

        let output = match result {
            Ok(output) => output,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConvertError::ToolMissing(executable.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .unwrap_or("no output")
                .to_string();
            return Err(ConvertError::Failed(format!("{} ({})", detail, output.status)));
        }
        Ok(())
    }
}
