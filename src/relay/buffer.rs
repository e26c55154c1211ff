//! Queue of operator keystrokes waiting for the outbound pipe.

use std::io::{self, Write};

/// Fixed-capacity FIFO byte buffer between console input and the outbound
/// endpoint.
///
/// [`append`](Self::append) accepts at most the remaining space; the relay
/// stops polling console input while the buffer is full, so excess input
/// waits in the kernel instead of being dropped.
pub struct InboundBuffer {
    data: Vec<u8>,
    capacity: usize,
}

impl InboundBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.data.len() == self.capacity
    }

    /// Copy in as many bytes as fit; returns how many were accepted.
    pub fn append(&mut self, bytes: &[u8]) -> usize {
        let take = bytes.len().min(self.capacity - self.data.len());
        self.data.extend_from_slice(&bytes[..take]);
        take
    }

    /// One non-blocking write attempt; the unwritten suffix stays queued,
    /// order preserved.
    ///
    /// `WouldBlock` and `Interrupted` count as writing nothing; the caller
    /// keeps write-interest registered and retries on the next readiness.
    pub fn drain_into<W: Write>(&mut self, sink: &mut W) -> io::Result<usize> {
        if self.data.is_empty() {
            return Ok(0);
        }
        match sink.write(&self.data) {
            Ok(written) => {
                self.data.drain(..written);
                Ok(written)
            }
            Err(err)
                if err.kind() == io::ErrorKind::WouldBlock
                    || err.kind() == io::ErrorKind::Interrupted =>
            {
                Ok(0)
            }
            Err(err) => Err(err),
        }
    }

    /// Throw away everything queued.
    pub fn clear(&mut self) {
        self.data.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Writes at most `limit` bytes per call.
    struct ShortWriter {
        sink: Vec<u8>,
        limit: usize,
    }

    impl Write for ShortWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let take = buf.len().min(self.limit);
            self.sink.extend_from_slice(&buf[..take]);
            Ok(take)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct BlockedWriter;

    impl Write for BlockedWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::WouldBlock))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn append_preserves_order_and_clamps_to_capacity() {
        let mut buffer = InboundBuffer::new(4);
        assert_eq!(buffer.append(b"ab"), 2);
        assert_eq!(buffer.append(b"cdef"), 2);
        assert!(buffer.is_full());

        let mut sink = ShortWriter {
            sink: Vec::new(),
            limit: usize::MAX,
        };
        buffer.drain_into(&mut sink).expect("drain");
        assert_eq!(sink.sink, b"abcd");
        assert!(buffer.is_empty());
    }

    #[test]
    fn partial_write_keeps_exactly_the_unwritten_suffix() {
        for split in 1..=6 {
            let mut buffer = InboundBuffer::new(16);
            buffer.append(b"hello\n");

            let mut first = ShortWriter {
                sink: Vec::new(),
                limit: split,
            };
            let written = buffer.drain_into(&mut first).expect("first drain");
            assert_eq!(written, split.min(6));
            assert_eq!(buffer.len(), 6 - written);

            let mut rest = ShortWriter {
                sink: Vec::new(),
                limit: usize::MAX,
            };
            buffer.drain_into(&mut rest).expect("second drain");

            let mut all = first.sink.clone();
            all.extend_from_slice(&rest.sink);
            assert_eq!(all, b"hello\n");
            assert!(buffer.is_empty());
        }
    }

    #[test]
    fn would_block_drains_nothing_and_keeps_the_queue() {
        let mut buffer = InboundBuffer::new(8);
        buffer.append(b"abc");
        assert_eq!(buffer.drain_into(&mut BlockedWriter).expect("drain"), 0);
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn clear_discards_everything() {
        let mut buffer = InboundBuffer::new(8);
        buffer.append(b"abc");
        buffer.clear();
        assert!(buffer.is_empty());
    }
}
