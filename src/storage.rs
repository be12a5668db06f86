//! Append store backed by a single file.
//!
//! The file plays two roles at once: the durable log of every completed
//! packet, and the assembly buffer for the packet currently being received.
//! Incoming chunks are appended whether or not they complete a packet, so a
//! packet's size is bounded by disk space rather than process memory.

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWrite, AsyncWriteExt, SeekFrom};
use tracing::{debug, trace, warn};

/// Chunk size for streaming the store back to a client.
const REPLAY_CHUNK_SIZE: usize = 8 * 1024;

/// The append store file and its lifecycle state.
///
/// `destroy` is idempotent: the handle and the file on disk are each torn
/// down at most once, tracked explicitly rather than inferred.
pub struct AppendStore {
    path: PathBuf,
    file: Option<File>,
    removed: bool,
}

impl AppendStore {
    /// Create or truncate the store file at `path`, open read+write.
    pub async fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .await?;
        debug!(path = %path.display(), "Opened append store");
        Ok(Self {
            path,
            file: Some(file),
            removed: false,
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append bytes to the end of the store and flush them out.
    pub async fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
        let file = self.file_mut()?;
        file.seek(SeekFrom::End(0)).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        trace!(bytes = bytes.len(), "Appended to store");
        Ok(())
    }

    /// Stream the entire store contents into `writer` in bounded chunks.
    ///
    /// The tail of the file at this point is exactly the packet that just
    /// completed; there is no interleaving because only one connection is
    /// ever active.
    pub async fn replay<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let file = self.file_mut()?;
        file.seek(SeekFrom::Start(0)).await?;

        let mut chunk = vec![0u8; REPLAY_CHUNK_SIZE];
        let mut sent = 0usize;
        loop {
            let n = file.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            writer.write_all(&chunk[..n]).await?;
            sent += n;
        }
        writer.flush().await?;
        trace!(bytes = sent, "Replayed store");
        Ok(())
    }

    /// Close the handle and unlink the backing file.
    ///
    /// Safe to call more than once; a missing file is not an error.
    pub fn destroy(&mut self) {
        if let Some(file) = self.file.take() {
            drop(file);
        }
        if !self.removed {
            self.removed = true;
            match std::fs::remove_file(&self.path) {
                Ok(()) => debug!(path = %self.path.display(), "Removed append store"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(error = %e, path = %self.path.display(), "Failed to remove append store")
                }
            }
        }
    }

    fn file_mut(&mut self) -> io::Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "append store is closed"))
    }
}
