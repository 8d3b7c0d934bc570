//! Line source over any async buffered reader.

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use super::{LineSource, SourceError};
use crate::line::Line;

/// Reads newline-terminated lines from an async reader.
///
/// Line endings (`\n` or `\r\n`) are stripped and invalid UTF-8 is
/// replaced rather than rejected. A final line without a terminator is
/// still returned before end-of-stream.
#[derive(Debug)]
pub struct ReaderSource<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R> ReaderSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    #[must_use]
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
        }
    }
}

#[async_trait]
impl<R> LineSource for ReaderSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn next_line(&mut self) -> Result<Option<Line>, SourceError> {
        self.buf.clear();
        let bytes_read = self.reader.read_until(b'\n', &mut self.buf).await?;
        if bytes_read == 0 {
            return Ok(None);
        }

        if self.buf.last() == Some(&b'\n') {
            self.buf.pop();
            if self.buf.last() == Some(&b'\r') {
                self.buf.pop();
            }
        }

        Ok(Some(Line::from(String::from_utf8_lossy(&self.buf).into_owned())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncWriteExt, BufReader};

    async fn collect<R: AsyncBufRead + Unpin + Send>(source: &mut ReaderSource<R>) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(line) = source.next_line().await.unwrap() {
            lines.push(line.to_string());
        }
        lines
    }

    #[tokio::test]
    async fn test_strips_line_endings() {
        let input: &[u8] = b"INFO start\r\nERROR disk full\nINFO ok\n";
        let mut source = ReaderSource::new(input);
        assert_eq!(
            collect(&mut source).await,
            vec!["INFO start", "ERROR disk full", "INFO ok"]
        );
    }

    #[tokio::test]
    async fn test_keeps_unterminated_last_line() {
        let input: &[u8] = b"first\nsecond";
        let mut source = ReaderSource::new(input);
        assert_eq!(collect(&mut source).await, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_keeps_blank_lines() {
        let input: &[u8] = b"a\n\nb\n";
        let mut source = ReaderSource::new(input);
        assert_eq!(collect(&mut source).await, vec!["a", "", "b"]);
    }

    #[tokio::test]
    async fn test_replaces_invalid_utf8() {
        let input: &[u8] = b"bad \xff byte\n";
        let mut source = ReaderSource::new(input);
        let line = source.next_line().await.unwrap().unwrap();
        assert_eq!(line.as_str(), "bad \u{fffd} byte");
    }

    #[tokio::test]
    async fn test_read_error_surfaces() {
        let reader = tokio_test::io::Builder::new()
            .read(b"ok\n")
            .read_error(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "gone",
            ))
            .build();
        let mut source = ReaderSource::new(BufReader::new(reader));

        assert_eq!(source.next_line().await.unwrap().unwrap().as_str(), "ok");
        let err = source.next_line().await.unwrap_err();
        assert!(matches!(err, SourceError::Read(_)));
    }

    #[tokio::test]
    async fn test_waits_for_more_input() {
        let (mut writer, reader) = tokio::io::duplex(64);
        let mut source = ReaderSource::new(BufReader::new(reader));

        writer.write_all(b"one\n").await.unwrap();
        assert_eq!(source.next_line().await.unwrap().unwrap().as_str(), "one");

        writer.write_all(b"two\n").await.unwrap();
        assert_eq!(source.next_line().await.unwrap().unwrap().as_str(), "two");

        drop(writer);
        assert!(source.next_line().await.unwrap().is_none());
    }
}
