use crate::codec::OpeningCipher;
use crate::error::EnvelopeError;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use tokio::io::{AsyncRead, ReadBuf};

#[derive(Debug)]
enum State {
    Streaming(Box<dyn OpeningCipher>),
    Verified,
    Failed,
}

/// Decrypts a bounded ciphertext reader on the fly.
///
/// Plaintext is handed out as soon as it is decrypted; the authentication tag
/// is checked when the inner reader reports EOF, and a mismatch is returned as
/// the terminal read error (kind `InvalidData`, wrapping [`EnvelopeError::Integrity`]).
/// Callers must discard everything read so far when that happens.
///
/// After any error the reader stays failed. Dropping it early releases the
/// inner reader and the cipher without verification.
#[derive(Debug)]
pub struct DecryptingReader<R> {
    inner: R,
    state: State,
}

impl<R> DecryptingReader<R> {
    pub fn new(inner: R, cipher: Box<dyn OpeningCipher>) -> Self {
        Self { inner, state: State::Streaming(cipher) }
    }

    /// `true` once the tag has been checked successfully.
    pub const fn is_verified(&self) -> bool {
        matches!(self.state, State::Verified)
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for DecryptingReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let State::Streaming(cipher) = &mut this.state else {
            return Poll::Ready(match this.state {
                State::Failed => Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "decrypting stream already failed",
                )),
                _ => Ok(()),
            });
        };

        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        let start = buf.filled().len();
        if let Err(err) = ready!(Pin::new(&mut this.inner).poll_read(cx, buf)) {
            this.state = State::Failed;
            return Poll::Ready(Err(err));
        }

        let fresh = &mut buf.filled_mut()[start..];
        if !fresh.is_empty() {
            if let Err(err) = cipher.apply(fresh) {
                this.state = State::Failed;
                return Poll::Ready(Err(err.into_io()));
            }
            return Poll::Ready(Ok(()));
        }

        match std::mem::replace(&mut this.state, State::Failed) {
            State::Streaming(cipher) => match cipher.finalize() {
                Ok(()) => {
                    this.state = State::Verified;
                    Poll::Ready(Ok(()))
                },
                Err(err) => Poll::Ready(Err(err.into_io())),
            },
            _ => Poll::Ready(Ok(())),
        }
    }
}
