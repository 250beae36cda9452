use crate::services::media_tool::{MediaTool, ToolError, ToolRequest, processing_path};
use crate::services::staging::{StagedFile, StagingArea, StagingError};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TranscodeError {
    #[error("remux failed: {0}")]
    Tool(#[from] ToolError),

    #[error("remux output unavailable: {0}")]
    Output(#[from] StagingError),
}

/// Moves the container index to the front of the file so it can be played
/// over byte-range requests before the download finishes. Streams are copied,
/// never re-encoded.
pub struct FastStartTranscoder {
    tool: Arc<dyn MediaTool>,
}

impl FastStartTranscoder {
    pub fn new(tool: Arc<dyn MediaTool>) -> Self {
        Self { tool }
    }

    /// Remux `input` into `{input}.processing`, returned as a new staged file.
    ///
    /// `input` is never modified. The output path is owned by the staging area
    /// before the tool starts, so a failed or cancelled run leaves nothing behind.
    pub async fn process(
        &self,
        staging: &StagingArea,
        input: &Path,
    ) -> Result<StagedFile, TranscodeError> {
        let output = staging.reserve(processing_path(input))?;

        self.tool
            .run(ToolRequest::FastStart {
                input,
                output: output.path(),
            })
            .await?;

        let processed = StagedFile::open(output).await?;

        tracing::debug!(
            input = %input.display(),
            output = %processed.path().display(),
            bytes = processed.len(),
            "Fast-start remux finished"
        );

        Ok(processed)
    }
}
