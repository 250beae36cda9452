use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;

/// A single request to the external media toolchain.
#[derive(Debug, Clone, Copy)]
pub enum ToolRequest<'a> {
    /// Dump stream metadata of `input` as JSON on stdout.
    Probe { input: &'a Path },
    /// Stream-copy `input` into `output` with the index moved to the front.
    FastStart { input: &'a Path, output: &'a Path },
}

impl ToolRequest<'_> {
    pub fn operation(&self) -> &'static str {
        match self {
            ToolRequest::Probe { .. } => "probe",
            ToolRequest::FastStart { .. } => "faststart",
        }
    }
}

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Exited {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("{program} did not finish within {after:?}")]
    TimedOut { program: String, after: Duration },
}

/// Capability interface over the external probe/remux processes.
///
/// Returns the tool's stdout on success.
#[async_trait]
pub trait MediaTool: Send + Sync {
    async fn run(&self, request: ToolRequest<'_>) -> Result<Vec<u8>, ToolError>;
}

/// ffprobe/ffmpeg invoked as child processes, one per call.
///
/// Children are killed when the calling future is dropped, so a cancelled
/// request does not leave a remux running.
pub struct FfmpegToolchain {
    ffprobe_path: String,
    ffmpeg_path: String,
    timeout: Duration,
}

impl FfmpegToolchain {
    pub fn new(ffprobe_path: String, ffmpeg_path: String, timeout: Duration) -> Self {
        Self {
            ffprobe_path,
            ffmpeg_path,
            timeout,
        }
    }

    fn command_line(&self, request: &ToolRequest<'_>) -> (String, Vec<OsString>) {
        match request {
            ToolRequest::Probe { input } => (
                self.ffprobe_path.clone(),
                vec![
                    "-v".into(),
                    "error".into(),
                    "-print_format".into(),
                    "json".into(),
                    "-show_streams".into(),
                    "-select_streams".into(),
                    "v".into(),
                    input.as_os_str().to_owned(),
                ],
            ),
            ToolRequest::FastStart { input, output } => (
                self.ffmpeg_path.clone(),
                vec![
                    "-nostdin".into(),
                    "-v".into(),
                    "error".into(),
                    "-i".into(),
                    input.as_os_str().to_owned(),
                    "-c".into(),
                    "copy".into(),
                    "-movflags".into(),
                    "faststart".into(),
                    "-f".into(),
                    "mp4".into(),
                    "-y".into(),
                    output.as_os_str().to_owned(),
                ],
            ),
        }
    }
}

#[async_trait]
impl MediaTool for FfmpegToolchain {
    #[tracing::instrument(skip(self), fields(operation = request.operation()))]
    async fn run(&self, request: ToolRequest<'_>) -> Result<Vec<u8>, ToolError> {
        let (program, args) = self.command_line(&request);
        let start = Instant::now();

        let mut command = Command::new(&program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| ToolError::TimedOut {
                program: program.clone(),
                after: self.timeout,
            })?
            .map_err(|source| ToolError::Spawn {
                program: program.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            tracing::warn!(
                program = %program,
                status = %output.status,
                "media tool failed: {}",
                stderr
            );
            return Err(ToolError::Exited {
                program,
                status: output.status.to_string(),
                stderr,
            });
        }

        tracing::debug!(
            program = %program,
            duration_ms = start.elapsed().as_millis() as u64,
            "media tool finished"
        );

        Ok(output.stdout)
    }
}

/// Sibling path used for the remuxed copy of `input`.
pub fn processing_path(input: &Path) -> PathBuf {
    let mut name = input.as_os_str().to_owned();
    name.push(".processing");
    PathBuf::from(name)
}
