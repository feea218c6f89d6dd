//! Adapts a sequence of export chunks into a single `Read` byte source.

use crate::error::{ExtractError, Result};
use flate2::read::GzDecoder;
use std::io::{self, Cursor, Read};

/// Forwards chunks from an export iterator as one continuous stream.
///
/// Only the chunk currently being drained is held in memory. Once the
/// iterator reports an error, every later read fails with the same message.
pub struct ChunkReader<I> {
    chunks: I,
    current: Vec<u8>,
    pos: usize,
    failure: Option<String>,
    finished: bool,
}

impl<I> ChunkReader<I>
where
    I: Iterator<Item = Result<Vec<u8>>>,
{
    pub fn new(chunks: I) -> Self {
        Self {
            chunks,
            current: Vec::new(),
            pos: 0,
            failure: None,
            finished: false,
        }
    }
}

impl<I> Read for ChunkReader<I>
where
    I: Iterator<Item = Result<Vec<u8>>>,
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        while self.pos >= self.current.len() {
            if let Some(msg) = &self.failure {
                return Err(ExtractError::Transport(msg.clone()).into_io());
            }
            if self.finished {
                return Ok(0);
            }
            match self.chunks.next() {
                Some(Ok(chunk)) => {
                    self.current = chunk;
                    self.pos = 0;
                }
                Some(Err(err)) => {
                    let msg = match err {
                        ExtractError::Transport(msg) => msg,
                        other => other.to_string(),
                    };
                    self.failure = Some(msg);
                }
                None => self.finished = true,
            }
        }

        let n = buf.len().min(self.current.len() - self.pos);
        buf[..n].copy_from_slice(&self.current[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// Wraps an export byte source, transparently decompressing gzip input.
///
/// The first two bytes are sniffed for the gzip magic and then replayed in
/// front of the remaining stream, so nothing is buffered beyond them.
pub fn open_archive_stream<R>(mut reader: R) -> Result<Box<dyn Read>>
where
    R: Read + 'static,
{
    let mut magic = [0u8; 2];
    let mut filled = 0;
    while filled < magic.len() {
        match reader.read(&mut magic[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(ExtractError::from_archive_io(e)),
        }
    }

    let replay = Cursor::new(magic[..filled].to_vec()).chain(reader);
    if filled == 2 && magic == [0x1f, 0x8b] {
        log::debug!("Export stream is gzip compressed");
        Ok(Box::new(GzDecoder::new(replay)))
    } else {
        Ok(Box::new(replay))
    }
}
