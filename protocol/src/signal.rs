use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

/// A "collect now" request read from the input stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signal;

/// Splits the input stream into lines and yields one [`Signal`] per complete
/// line. Line content is ignored and never buffered: bytes that do not
/// terminate a line are discarded as soon as they are seen. A partial line
/// at end-of-stream is not a line and yields nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct SignalDecoder;

impl Decoder for SignalDecoder {
    type Item = Signal;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Signal>, Self::Error> {
        match src.iter().position(|b| *b == b'\n') {
            Some(pos) => {
                src.advance(pos + 1);
                Ok(Some(Signal))
            }
            None => {
                src.clear();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Signal>, Self::Error> {
        let signal = self.decode(src)?;
        if signal.is_none() {
            src.clear();
        }
        Ok(signal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tokio::io::AsyncWriteExt;
    use tokio_util::codec::FramedRead;

    #[test]
    fn test_one_signal_per_line() {
        let mut decoder = SignalDecoder;
        let mut buf = BytesMut::from(&b"\nhello\r\n\npartial"[..]);

        assert_eq!(decoder.decode(&mut buf).unwrap(), Some(Signal));
        assert_eq!(decoder.decode(&mut buf).unwrap(), Some(Signal));
        assert_eq!(decoder.decode(&mut buf).unwrap(), Some(Signal));
        assert_eq!(decoder.decode(&mut buf).unwrap(), None);
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn test_stream_ends_without_trailing_signal() {
        let (mut tx, rx) = tokio::io::duplex(64);
        let mut reader = FramedRead::new(rx, SignalDecoder);

        tx.write_all(b"a\nb\nno newline").await.unwrap();
        drop(tx);

        let mut count = 0;
        while let Some(signal) = reader.next().await {
            signal.unwrap();
            count += 1;
        }
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_long_lines_split_across_reads() {
        let (mut tx, rx) = tokio::io::duplex(8);
        let mut reader = FramedRead::new(rx, SignalDecoder);

        let writer = tokio::spawn(async move {
            tx.write_all(&[b'x'; 100]).await.unwrap();
            tx.write_all(b"\n").await.unwrap();
        });

        assert_eq!(reader.next().await.unwrap().unwrap(), Signal);
        writer.await.unwrap();
        assert!(reader.next().await.is_none());
    }
}
