//! Line splitting over async byte streams.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

/// Splits a byte stream into text lines as they arrive.
///
/// Line terminators (`\n` or `\r\n`) are stripped. Invalid UTF-8 is replaced
/// rather than rejected, so a single odd byte from a tool never ends a run.
pub struct LineStreamer<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> LineStreamer<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            buf: Vec::new(),
        }
    }

    /// Next complete line, or `None` at end of stream.
    ///
    /// A trailing fragment without a terminator is returned as the last line.
    pub async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        self.buf.clear();
        let n = self.reader.read_until(b'\n', &mut self.buf).await?;
        if n == 0 {
            return Ok(None);
        }

        if self.buf.ends_with(b"\n") {
            self.buf.pop();
            if self.buf.ends_with(b"\r") {
                self.buf.pop();
            }
        }
        Ok(Some(String::from_utf8_lossy(&self.buf).into_owned()))
    }
}

impl<R> std::fmt::Debug for LineStreamer<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineStreamer").finish_non_exhaustive()
    }
}
