//! Newline-delimited JSON [`SampleFrame`] source, read from stdin.
//!
//! Used with the simulation harness: `./simulation | vibesensor --stdin`.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader, Stdin};

use super::{AcquisitionError, IngestEvent, SampleSource};

pub struct StdinFrameSource {
    reader: BufReader<Stdin>,
    line: String,
}

impl StdinFrameSource {
    pub fn new() -> Self {
        Self {
            reader: BufReader::new(tokio::io::stdin()),
            line: String::with_capacity(4096),
        }
    }
}

impl Default for StdinFrameSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SampleSource for StdinFrameSource {
    async fn next_event(&mut self) -> Result<Option<IngestEvent>, AcquisitionError> {
        loop {
            self.line.clear();
            let bytes_read = self.reader.read_line(&mut self.line).await?;
            if bytes_read == 0 {
                return Ok(None);
            }
            let trimmed = self.line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let event: IngestEvent = serde_json::from_str(trimmed)
                .map_err(|e| AcquisitionError::Malformed(e.to_string()))?;
            return Ok(Some(event));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_line_is_reported_as_malformed() {
        let err = serde_json::from_str::<IngestEvent>("not json").unwrap_err();
        assert!(AcquisitionError::Malformed(err.to_string()).to_string().contains("malformed"));
    }
}
