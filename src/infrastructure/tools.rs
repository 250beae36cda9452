use crate::config::PipelineConfig;
use crate::services::media_tool::{FfmpegToolchain, MediaTool};
use std::sync::Arc;
use tokio::process::Command;
use tracing::{info, warn};

/// Build the ffprobe/ffmpeg toolchain and report whether the binaries answer.
pub async fn setup_toolchain(config: &PipelineConfig) -> Arc<dyn MediaTool> {
    for program in [&config.ffprobe_path, &config.ffmpeg_path] {
        match Command::new(program)
            .arg("-version")
            .kill_on_drop(true)
            .output()
            .await
        {
            Ok(output) if output.status.success() => {
                let banner = String::from_utf8_lossy(&output.stdout);
                info!(
                    "🎬 {}",
                    banner.lines().next().unwrap_or(program.as_str())
                );
            }
            Ok(output) => warn!("⚠️  {} -version exited with {}", program, output.status),
            Err(e) => warn!("⚠️  {} is not runnable: {}; uploads will fail", program, e),
        }
    }

    Arc::new(FfmpegToolchain::new(
        config.ffprobe_path.clone(),
        config.ffmpeg_path.clone(),
        config.tool_timeout(),
    ))
}
