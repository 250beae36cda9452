use crate::models::Classification;
use crate::services::media_tool::{MediaTool, ToolError, ToolRequest};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InspectionError {
    #[error("probe failed: {0}")]
    Tool(#[from] ToolError),

    #[error("probe output is not valid stream metadata: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("file contains no video stream")]
    NoVideoStream,

    #[error("video stream has no usable dimensions")]
    MissingDimensions,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

/// Pixel dimensions of the first video stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoGeometry {
    pub width: u32,
    pub height: u32,
}

impl VideoGeometry {
    pub fn classification(&self) -> Classification {
        Classification::from_dimensions(self.width, self.height)
    }
}

/// Reads stream geometry through the probe tool and buckets it by aspect ratio.
pub struct MediaInspector {
    tool: Arc<dyn MediaTool>,
}

impl MediaInspector {
    pub fn new(tool: Arc<dyn MediaTool>) -> Self {
        Self { tool }
    }

    pub async fn geometry(&self, path: &Path) -> Result<VideoGeometry, InspectionError> {
        let stdout = self.tool.run(ToolRequest::Probe { input: path }).await?;
        parse_geometry(&stdout)
    }

    pub async fn classify(&self, path: &Path) -> Result<Classification, InspectionError> {
        let geometry = self.geometry(path).await?;
        let classification = geometry.classification();

        tracing::debug!(
            width = geometry.width,
            height = geometry.height,
            classification = %classification,
            "Classified video"
        );

        Ok(classification)
    }
}

fn parse_geometry(stdout: &[u8]) -> Result<VideoGeometry, InspectionError> {
    let probe: ProbeOutput = serde_json::from_slice(stdout)?;

    // Streams without a codec_type come from probes already filtered to video.
    let stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref().is_none_or(|t| t == "video"))
        .ok_or(InspectionError::NoVideoStream)?;

    match (stream.width, stream.height) {
        (Some(width), Some(height)) if width > 0 && height > 0 => {
            Ok(VideoGeometry { width, height })
        }
        _ => Err(InspectionError::MissingDimensions),
    }
}
