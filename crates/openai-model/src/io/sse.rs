use super::{Chunks, ChunksError};

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    ChunksError(ChunksError),
    InvalidPayload,
}

/// A type for reading server-sent events from a chunk stream.
pub struct Sse {
    buf: String,
    chunks: Chunks,
}

impl Sse {
    #[inline]
    pub fn new(chunks: Chunks) -> Self {
        Self {
            buf: String::new(),
            chunks,
        }
    }

    /// Returns the data of the next event.
    ///
    /// Events without data (comments and keep-alives) are skipped.
    pub async fn next_event(&mut self) -> Result<Option<String>, Error> {
        loop {
            // Drain complete events from the buffer before reading more.
            while let Some(block) = self.take_block() {
                if let Some(data) = parse_block(&block)? {
                    return Ok(Some(data));
                }
            }

            let Some(bytes) =
                self.chunks.next_chunk().await.map_err(Error::ChunksError)?
            else {
                // Incomplete trailing events are dropped.
                return Ok(None);
            };
            let Ok(s) = str::from_utf8(&bytes) else {
                return Err(Error::InvalidPayload);
            };
            self.buf.push_str(&s.replace("\r\n", "\n"));
        }
    }

    fn take_block(&mut self) -> Option<String> {
        let eol_idx = self.buf.find("\n\n")?;
        let block = self.buf[0..eol_idx].to_owned();
        self.buf.drain(0..eol_idx + 2);
        Some(block)
    }
}

// event         = *( comment / field ) end-of-line
// comment       = colon *any-char end-of-line
// field         = 1*name-char [ colon [ space ] *any-char ] end-of-line
fn parse_block(block: &str) -> Result<Option<String>, Error> {
    let mut data: Option<String> = None;
    for line in block.split('\n') {
        if line.starts_with(':') {
            continue;
        }
        let Some((name, value)) = line.split_once(':') else {
            return Err(Error::InvalidPayload);
        };
        if name != "data" {
            // `event`, `id` and `retry` carry nothing we need.
            continue;
        }
        let value = value.strip_prefix(' ').unwrap_or(value);
        match &mut data {
            Some(data) => {
                data.push('\n');
                data.push_str(value);
            }
            None => data = Some(value.to_owned()),
        }
    }
    Ok(data)
}
