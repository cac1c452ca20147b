use universal_hash::UniversalHash;
use universal_hash::consts::U16;

const BLOCK: usize = 16;

/// Feeds arbitrarily sized chunks into a 16-byte block universal hash.
///
/// Bytes that do not fill a block are held back until the next chunk (or
/// [`BlockMac::finish`]), so the hash sees the same blocks a one-shot
/// computation over the concatenated input would.
pub(crate) struct BlockMac<M> {
    mac: M,
    pending: [u8; BLOCK],
    filled: usize,
    total: u64,
}

impl<M: UniversalHash<BlockSize = U16>> BlockMac<M> {
    pub(crate) const fn new(mac: M) -> Self {
        Self { mac, pending: [0; BLOCK], filled: 0, total: 0 }
    }

    pub(crate) fn update(&mut self, mut data: &[u8]) {
        self.total += data.len() as u64;

        if self.filled > 0 {
            let take = (BLOCK - self.filled).min(data.len());
            self.pending[self.filled..self.filled + take].copy_from_slice(&data[..take]);
            self.filled += take;
            data = &data[take..];
            if self.filled < BLOCK {
                return;
            }
            self.mac.update_padded(&self.pending);
            self.filled = 0;
        }

        let whole = data.len() - data.len() % BLOCK;
        if whole > 0 {
            self.mac.update_padded(&data[..whole]);
        }

        let rest = &data[whole..];
        self.pending[..rest.len()].copy_from_slice(rest);
        self.filled = rest.len();
    }

    /// Number of bytes hashed so far.
    pub(crate) const fn total(&self) -> u64 {
        self.total
    }

    /// Pads the held-back tail and absorbs the final lengths block.
    pub(crate) fn finish(mut self, lengths: [u8; BLOCK]) -> M {
        if self.filled > 0 {
            self.mac.update_padded(&self.pending[..self.filled]);
        }
        self.mac.update_padded(&lengths);
        self.mac
    }
}
