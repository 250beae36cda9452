use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

const COPY_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Error, Debug)]
pub enum StagingError {
    #[error("local staging I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("inbound stream failed mid-copy: {0}")]
    SourceRead(#[source] std::io::Error),

    #[error("upload exceeds the limit of {limit} bytes")]
    LimitExceeded { limit: u64 },
}

/// Hands out exclusively-owned temp files under one directory.
#[derive(Debug, Clone)]
pub struct StagingArea {
    dir: PathBuf,
}

impl StagingArea {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Create an empty staged file, open for writing and reading.
    pub async fn create(&self, suffix: &str) -> Result<StagedFile, StagingError> {
        let temp = tempfile::Builder::new()
            .prefix("upload-")
            .suffix(suffix)
            .tempfile_in(&self.dir)?;
        let (file, path) = temp.into_parts();

        tracing::debug!("Staged file created at {}", path.display());

        Ok(StagedFile {
            file: File::from_std(file),
            path: StagedPath::from_temp(path),
            len: 0,
        })
    }

    /// Take ownership of a path some other process is about to write.
    ///
    /// The path is removed when the guard is dropped, whether or not the file
    /// was ever created. Relative paths are resolved against the working directory.
    pub fn reserve(&self, path: impl Into<PathBuf>) -> Result<StagedPath, StagingError> {
        let temp = TempPath::try_from_path(path)?;
        Ok(StagedPath::from_temp(temp))
    }
}

/// Removal guard for one staged path. Runs exactly once, on release or drop.
#[derive(Debug)]
pub struct StagedPath {
    path: PathBuf,
    inner: Option<TempPath>,
}

impl StagedPath {
    fn from_temp(temp: TempPath) -> Self {
        Self {
            path: temp.to_path_buf(),
            inner: Some(temp),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the file now. Failures are logged, never returned.
    pub fn release(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if let Some(temp) = self.inner.take() {
            match temp.close() {
                Ok(()) => tracing::debug!("Removed staged file {}", self.path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(
                    "Failed to remove staged file {}: {}",
                    self.path.display(),
                    e
                ),
            }
        }
    }
}

impl Drop for StagedPath {
    fn drop(&mut self) {
        self.remove();
    }
}

/// A local, seekable, exclusively-owned file that disappears with its owner.
#[derive(Debug)]
pub struct StagedFile {
    // Declared first so the handle closes before the path is unlinked.
    file: File,
    path: StagedPath,
    len: u64,
}

impl StagedFile {
    /// Open an existing staged path (e.g. a tool's output) for reading.
    pub async fn open(path: StagedPath) -> Result<Self, StagingError> {
        let file = File::open(path.path()).await?;
        let len = file.metadata().await?.len();
        Ok(Self { file, path, len })
    }

    pub fn path(&self) -> &Path {
        self.path.path()
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copy `reader` to the end of the file, failing once more than `limit`
    /// bytes have arrived. Leaves the cursor at the end; call [`rewind`](Self::rewind)
    /// before handing the file to a reader.
    pub async fn write_from<R>(&mut self, mut reader: R, limit: u64) -> Result<u64, StagingError>
    where
        R: AsyncRead + Unpin,
    {
        let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
        let mut written = 0u64;

        loop {
            let n = reader
                .read(&mut buffer)
                .await
                .map_err(StagingError::SourceRead)?;
            if n == 0 {
                break;
            }

            written += n as u64;
            if self.len + written > limit {
                return Err(StagingError::LimitExceeded { limit });
            }

            self.file.write_all(&buffer[..n]).await?;
        }

        self.file.flush().await?;
        self.len += written;

        Ok(written)
    }

    pub async fn rewind(&mut self) -> Result<(), StagingError> {
        self.file.seek(SeekFrom::Start(0)).await?;
        Ok(())
    }

    /// The underlying handle, positioned wherever the last operation left it.
    pub fn handle(&mut self) -> &mut File {
        &mut self.file
    }

    /// Close the handle and remove the file now.
    pub fn release(self) {
        let StagedFile { file, path, .. } = self;
        drop(file);
        path.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::stream;
    use tokio_util::io::StreamReader;

    fn area() -> (tempfile::TempDir, StagingArea) {
        let dir = tempfile::tempdir().unwrap();
        let area = StagingArea::new(dir.path());
        (dir, area)
    }

    #[tokio::test]
    async fn test_write_rewind_read_round_trip() {
        let (_dir, area) = area();
        let payload: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();

        let mut staged = area.create(".mp4").await.unwrap();
        let written = staged
            .write_from(std::io::Cursor::new(payload.clone()), u64::MAX)
            .await
            .unwrap();
        assert_eq!(written, payload.len() as u64);
        assert_eq!(staged.len(), payload.len() as u64);

        staged.rewind().await.unwrap();
        let mut read_back = Vec::new();
        staged.handle().read_to_end(&mut read_back).await.unwrap();
        assert_eq!(read_back, payload);
    }

    #[tokio::test]
    async fn test_without_rewind_reader_sees_nothing() {
        let (_dir, area) = area();
        let mut staged = area.create(".bin").await.unwrap();
        staged.write_from(&b"hello"[..], 1024).await.unwrap();

        let mut read_back = Vec::new();
        staged.handle().read_to_end(&mut read_back).await.unwrap();
        assert!(read_back.is_empty());
    }

    #[tokio::test]
    async fn test_file_removed_on_drop() {
        let (_dir, area) = area();
        let mut staged = area.create(".mp4").await.unwrap();
        staged.write_from(&b"data"[..], 1024).await.unwrap();
        let path = staged.path().to_path_buf();
        assert!(path.exists());

        drop(staged);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_file_removed_after_failed_copy() {
        let (_dir, area) = area();
        let source = StreamReader::new(stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(std::io::Error::other("connection reset")),
        ]));

        let path = {
            let mut staged = area.create(".mp4").await.unwrap();
            let err = staged.write_from(source, 1024).await.unwrap_err();
            assert!(matches!(err, StagingError::SourceRead(_)));
            staged.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_limit_exceeded() {
        let (_dir, area) = area();
        let mut staged = area.create(".mp4").await.unwrap();
        let err = staged
            .write_from(std::io::Cursor::new(vec![0u8; 2048]), 1024)
            .await
            .unwrap_err();
        assert!(matches!(err, StagingError::LimitExceeded { limit: 1024 }));
    }

    #[tokio::test]
    async fn test_reserved_path_removed_even_if_written_later() {
        let (dir, area) = area();
        let target = dir.path().join("out.processing");

        let reserved = area.reserve(&target).unwrap();
        tokio::fs::write(reserved.path(), b"remuxed").await.unwrap();
        assert!(target.exists());

        let mut opened = StagedFile::open(reserved).await.unwrap();
        assert_eq!(opened.len(), 7);
        let mut content = String::new();
        opened.handle().read_to_string(&mut content).await.unwrap();
        assert_eq!(content, "remuxed");

        opened.release();
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn test_reserved_path_never_created_is_fine() {
        let (dir, area) = area();
        let reserved = area.reserve(dir.path().join("never-written")).unwrap();
        drop(reserved);
    }

    #[tokio::test]
    async fn test_reserving_empty_path_is_io_error() {
        let (_dir, area) = area();
        assert!(matches!(area.reserve(""), Err(StagingError::Io(_))));
    }
}
