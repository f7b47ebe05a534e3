use bytes::Bytes;

/// Append-only slices of one recording attempt, in arrival order
#[derive(Debug, Default, Clone)]
pub struct ChunkBuffer {
    chunks: Vec<Bytes>,
    total_bytes: usize,
}

impl ChunkBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one slice; zero-byte slices are kept too
    pub fn push(&mut self, chunk: Bytes) {
        self.total_bytes += chunk.len();
        self.chunks.push(chunk);
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
        self.total_bytes = 0;
    }

    /// Cheap copy of the current contents (`Bytes` clones are refcounted)
    pub fn snapshot(&self) -> Vec<Bytes> {
        self.chunks.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_arrival_order_and_empty_slices() {
        let mut buffer = ChunkBuffer::new();
        buffer.push(Bytes::from_static(b"ab"));
        buffer.push(Bytes::new());
        buffer.push(Bytes::from_static(b"c"));

        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.total_bytes(), 3);
        let snapshot = buffer.snapshot();
        assert_eq!(snapshot[0].as_ref(), b"ab");
        assert!(snapshot[1].is_empty());
        assert_eq!(snapshot[2].as_ref(), b"c");
    }

    #[test]
    fn test_clear() {
        let mut buffer = ChunkBuffer::new();
        buffer.push(Bytes::from_static(b"abc"));
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.total_bytes(), 0);
    }
}
