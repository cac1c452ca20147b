//! Read path: detect the envelope, then stream plaintext or decrypt on the fly.

use crate::engine::{FileStats, LocalStorage};
use crate::error::{StorageError, StorageErrorExt};
use crate::pipeline::{ByteStream, CHUNK_SIZE, Pipeline};
use std::fmt;
use std::io::{self, SeekFrom};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use stowage_envelope::{DecryptingReader, StreamTransform, Trailer};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, ReadBuf};
use tracing::{debug, warn};

/// Plaintext bytes inspected for content-type detection.
const SNIFF_LEN: u64 = 8192;

/// A readable stored file.
///
/// For encrypted files `stream` yields plaintext and fails with an integrity error
/// at its end if the tag does not verify; every byte read before that must be
/// discarded by the caller.
pub struct FileDownload {
    pub stats: FileStats,
    pub encrypted: bool,
    /// Bytes `stream` yields when fully drained.
    pub content_length: u64,
    pub stream: ByteStream,
}

impl fmt::Debug for FileDownload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileDownload")
            .field("stats", &self.stats)
            .field("encrypted", &self.encrypted)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// A verified plaintext copy in the staging area.
///
/// Removed by [`StagedFile::remove`], or on drop as a fallback.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
    size: u64,
    removed: bool,
}

impl StagedFile {
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// # Errors
    /// Returns [`StorageError::Io`] if the staged file cannot be opened.
    pub async fn open(&self) -> Result<fs::File, StorageError> {
        fs::File::open(&self.path)
            .await
            .map_err(|e| StorageError::from_fs(e, &self.path, "Opening staged file"))
    }

    /// # Errors
    /// Returns [`StorageError::Io`] if the staged file exists but cannot be removed.
    pub async fn remove(mut self) -> Result<(), StorageError> {
        self.removed = true;
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io {
                source: e,
                context: Some(format!("Removing staged file {}", self.path.display()).into()),
            }),
        }
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Dropped staged file removed"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {},
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove staged file"),
        }
    }
}

impl LocalStorage {
    /// Opens `key` for streaming.
    ///
    /// A file carries an envelope only when encryption is enabled, it is at least one
    /// trailer long and its last bytes end with the codec marker; anything else is
    /// served unchanged as plaintext.
    ///
    /// # Errors
    /// * [`StorageError::FileNotFound`] unless `key` names a regular file.
    /// * [`StorageError::Envelope`] if the trailer cannot be read in full.
    /// * [`StorageError::Io`] on open or seek failure.
    pub async fn get_file(&self, key: impl AsRef<Path>) -> Result<FileDownload, StorageError> {
        self.get_file_range(key, 0..u64::MAX).await
    }

    /// Opens the plaintext bytes `range` of `key` for streaming.
    ///
    /// The range is clamped to the plaintext length. Plaintext files are served
    /// with a seek. Encrypted files are decrypted from the start: bytes before the
    /// range are discarded, and bytes after it are read and dropped so the tag is
    /// still checked before the stream reports its end.
    ///
    /// # Errors
    /// As [`LocalStorage::get_file`], plus [`StorageError::InvalidInput`] when
    /// `range.start > range.end`.
    pub async fn get_file_range(
        &self,
        key: impl AsRef<Path>,
        range: Range<u64>,
    ) -> Result<FileDownload, StorageError> {
        if range.start > range.end {
            return Err(StorageError::InvalidInput {
                message: format!("Range start {} is past its end {}", range.start, range.end)
                    .into(),
                context: None,
            });
        }

        let stats = self.stats(key).await?;
        let path = &stats.absolute_path;
        let (mut file, trailer) = self.open_envelope(path, stats.size).await?;

        let Some(trailer) = trailer else {
            let (start, end) = (range.start.min(stats.size), range.end.min(stats.size));
            if start > 0 {
                file.seek(SeekFrom::Start(start)).await.context("Seeking to range start")?;
            }
            debug!(path = %path.display(), start, end, "Serving plaintext file");
            return Ok(FileDownload {
                content_length: end - start,
                encrypted: false,
                stream: Box::new(file.take(end - start)),
                stats,
            });
        };

        let total = self.encryptor.ciphertext_end(stats.size);
        let (start, end) = (range.start.min(total), range.end.min(total));
        let opener = self.encryptor.begin_decryption(&trailer.nonce, &trailer.auth_tag)?;
        let reader = DecryptingReader::new(file.take(total), opener);
        debug!(path = %path.display(), start, end, "Serving encrypted file");

        let stream: ByteStream = if start == 0 && end == total {
            Box::new(reader)
        } else {
            Box::new(RangeReader::new(reader, start, end - start))
        };
        Ok(FileDownload { content_length: end - start, encrypted: true, stream, stats })
    }

    /// Opens `path` and reads its trailer when it can carry one. The file is
    /// returned positioned at its first byte.
    async fn open_envelope(
        &self,
        path: &Path,
        size: u64,
    ) -> Result<(fs::File, Option<Trailer>), StorageError> {
        let mut file =
            fs::File::open(path).await.map_err(|e| StorageError::from_fs(e, path, "Opening file"))?;

        let trailer = match self.encryptor.trailer_len() {
            Some(len) if size >= len as u64 => {
                file.seek(SeekFrom::Start(self.encryptor.trailer_start(size)))
                    .await
                    .context("Seeking to trailer")?;
                let trailer = self.encryptor.read_trailer((&mut file).take(len as u64)).await?;
                file.seek(SeekFrom::Start(0)).await.context("Rewinding file")?;
                self.encryptor.is_trailer_valid(&trailer.marker).then_some(trailer)
            },
            _ => None,
        };

        Ok((file, trailer))
    }

    /// Detects the content type from the first plaintext bytes of `path`.
    ///
    /// The sniffed prefix of an encrypted file is decrypted without checking the
    /// tag; it only feeds the type guess and is never handed out.
    pub(crate) async fn sniff(
        &self,
        path: &Path,
        size: u64,
    ) -> Result<Option<infer::Type>, StorageError> {
        let (file, trailer) = self.open_envelope(path, size).await?;
        let limit = match &trailer {
            Some(_) => self.encryptor.ciphertext_end(size).min(SNIFF_LEN),
            None => size.min(SNIFF_LEN),
        };

        let mut head = Vec::with_capacity(usize::try_from(limit).unwrap_or_default());
        file.take(limit).read_to_end(&mut head).await.context("Reading file header")?;

        if let Some(trailer) = trailer {
            let mut opener = self.encryptor.begin_decryption(&trailer.nonce, &trailer.auth_tag)?;
            StreamTransform::apply(&mut *opener, &mut head)?;
        }
        Ok(infer::get(&head))
    }

    /// Reads the whole plaintext into memory.
    ///
    /// # Errors
    /// As [`LocalStorage::get_file`]; a tag mismatch is reported as an integrity
    /// failure ([`StorageError::is_integrity_failure`]) and no bytes are returned.
    pub async fn read(&self, key: impl AsRef<Path>) -> Result<Vec<u8>, StorageError> {
        drain(self.get_file(key).await?).await
    }

    /// Reads the plaintext bytes `range` into memory, verifying encrypted files in full.
    ///
    /// # Errors
    /// As [`LocalStorage::get_file_range`] and [`LocalStorage::read`].
    pub async fn read_range(
        &self,
        key: impl AsRef<Path>,
        range: Range<u64>,
    ) -> Result<Vec<u8>, StorageError> {
        drain(self.get_file_range(key, range).await?).await
    }

    /// Decrypts `key` into the staging area and returns the verified copy.
    ///
    /// The tag is checked before this returns, so a caller never observes
    /// unauthenticated plaintext. A failed stage leaves nothing behind.
    ///
    /// # Errors
    /// As [`LocalStorage::get_file`], plus [`StorageError::Io`] on staging write failure.
    pub async fn stage(&self, key: impl AsRef<Path>) -> Result<StagedFile, StorageError> {
        let download = self.get_file(key).await?;
        let path = self.staging.next_path();

        match copy_to(download.stream, &path).await {
            Ok(size) => {
                debug!(path = %path.display(), size, "File staged");
                Ok(StagedFile { path, size, removed: false })
            },
            Err(err) => {
                if let Err(e) = fs::remove_file(&path).await
                    && e.kind() != io::ErrorKind::NotFound
                {
                    warn!(path = %path.display(), error = %e, "Failed to remove failed stage");
                }
                Err(err)
            },
        }
    }
}

async fn drain(download: FileDownload) -> Result<Vec<u8>, StorageError> {
    let capacity = usize::try_from(download.content_length).unwrap_or_default();
    let mut data = Vec::with_capacity(capacity);
    let mut stream = download.stream;
    stream.read_to_end(&mut data).await.map_err(|e| StorageError::from_stream(e, "Reading file"))?;
    Ok(data)
}

async fn copy_to(mut stream: ByteStream, path: &Path) -> Result<u64, StorageError> {
    let mut file = fs::File::create(path)
        .await
        .context(format!("Failed to create staging file {}", path.display()))?;
    let size = Pipeline::new(&mut *stream, &mut file).run().await?;
    file.sync_all().await.context("Syncing staged file")?;
    Ok(size)
}

/// Hands out `len` bytes starting at `skip` of an inner stream, then drains the
/// rest of it before reporting EOF, so a failure at its end still surfaces.
struct RangeReader<R> {
    inner: R,
    skip: u64,
    remaining: u64,
    drained: bool,
    scratch: Box<[u8]>,
}

impl<R: AsyncRead + Unpin> RangeReader<R> {
    fn new(inner: R, skip: u64, len: u64) -> Self {
        Self { inner, skip, remaining: len, drained: false, scratch: vec![0; CHUNK_SIZE].into() }
    }

    /// Reads at most `limit` bytes into the scratch buffer.
    fn poll_scratch(&mut self, cx: &mut Context<'_>, limit: u64) -> Poll<io::Result<usize>> {
        let want = usize::try_from(limit).map_or(self.scratch.len(), |l| l.min(self.scratch.len()));
        let mut chunk = ReadBuf::new(&mut self.scratch[..want]);
        ready!(Pin::new(&mut self.inner).poll_read(cx, &mut chunk))?;
        Poll::Ready(Ok(chunk.filled().len()))
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for RangeReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        while this.skip > 0 {
            let n = ready!(this.poll_scratch(cx, this.skip))?;
            if n == 0 {
                // The inner stream ended before the range began.
                this.skip = 0;
                this.remaining = 0;
            } else {
                this.skip -= n as u64;
            }
        }

        if this.remaining > 0 {
            let n = ready!(this.poll_scratch(cx, this.remaining.min(buf.remaining() as u64)))?;
            if n > 0 {
                buf.put_slice(&this.scratch[..n]);
                this.remaining -= n as u64;
                return Poll::Ready(Ok(()));
            }
            this.remaining = 0;
        }

        while !this.drained {
            if ready!(this.poll_scratch(cx, u64::MAX))? == 0 {
                this.drained = true;
            }
        }
        Poll::Ready(Ok(()))
    }
}
