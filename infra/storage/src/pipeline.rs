use crate::error::{StorageError, StorageErrorExt};
use std::fmt;
use stowage_envelope::StreamTransform;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// An owned, sendable byte stream.
pub type ByteStream = Box<dyn AsyncRead + Send + Unpin>;

/// Default chunk size moved through a pipeline per iteration.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Drives `source → stages… → sink` until the source is exhausted or a stage fails.
///
/// Each chunk passes through every stage in order before it is written. The first
/// failure stops the run and is returned as-is; the sink is flushed only on success.
pub struct Pipeline<'a> {
    source: &'a mut (dyn AsyncRead + Send + Unpin),
    sink: &'a mut (dyn AsyncWrite + Send + Unpin),
    stages: Vec<&'a mut dyn StreamTransform>,
    chunk_size: usize,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        source: &'a mut (dyn AsyncRead + Send + Unpin),
        sink: &'a mut (dyn AsyncWrite + Send + Unpin),
    ) -> Self {
        Self { source, sink, stages: Vec::new(), chunk_size: CHUNK_SIZE }
    }

    #[must_use]
    pub fn stage(mut self, stage: &'a mut dyn StreamTransform) -> Self {
        self.stages.push(stage);
        self
    }

    #[must_use]
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    /// Runs to completion and returns the number of bytes written.
    ///
    /// # Errors
    /// * [`StorageError::Envelope`] if a stage fails or the source is a decrypting
    ///   stream that fails verification.
    /// * [`StorageError::Io`] on read or write failure.
    pub async fn run(mut self) -> Result<u64, StorageError> {
        let mut buf = vec![0u8; self.chunk_size];
        let mut written = 0u64;

        loop {
            let n = self
                .source
                .read(&mut buf)
                .await
                .map_err(|e| StorageError::from_stream(e, "Reading source"))?;
            if n == 0 {
                break;
            }

            let chunk = &mut buf[..n];
            for stage in &mut self.stages {
                stage.apply(chunk)?;
            }
            self.sink.write_all(chunk).await.context("Writing destination")?;
            written += n as u64;
        }

        self.sink.flush().await.context("Flushing destination")?;
        Ok(written)
    }
}

impl fmt::Debug for Pipeline<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stages.len())
            .field("chunk_size", &self.chunk_size)
            .finish_non_exhaustive()
    }
}
