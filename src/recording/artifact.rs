use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::error::RecordingError;

/// Finished recording handed to the host
///
/// Assembled once per successful attempt and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputArtifact {
    pub id: Uuid,
    pub data: Bytes,
    pub content_type: String,
    pub chunk_count: usize,
    pub created_at: DateTime<Utc>,
}

impl OutputArtifact {
    /// Concatenate a stable snapshot
    pub fn assemble(chunks: &[Bytes], content_type: impl Into<String>) -> Result<Self, RecordingError> {
        if chunks.is_empty() {
            return Err(RecordingError::EmptyRecording);
        }

        let total: usize = chunks.iter().map(Bytes::len).sum();
        if total == 0 {
            return Err(RecordingError::ZeroBytes);
        }

        let mut data = BytesMut::with_capacity(total);
        for chunk in chunks {
            data.extend_from_slice(chunk);
        }

        Ok(Self {
            id: Uuid::new_v4(),
            data: data.freeze(),
            content_type: content_type.into(),
            chunk_count: chunks.len(),
            created_at: Utc::now(),
        })
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn summary(&self) -> ArtifactSummary {
        ArtifactSummary {
            id: self.id,
            size: self.size(),
            content_type: self.content_type.clone(),
            chunk_count: self.chunk_count,
            created_at: self.created_at,
        }
    }
}

/// Artifact metadata without the payload (for events and logs)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactSummary {
    pub id: Uuid,
    pub size: usize,
    pub content_type: String,
    pub chunk_count: usize,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assemble_concatenates_in_order() {
        let chunks = vec![
            Bytes::from_static(b"head"),
            Bytes::new(),
            Bytes::from_static(b"tail"),
        ];
        let artifact = OutputArtifact::assemble(&chunks, "video/webm").unwrap();
        assert_eq!(artifact.data.as_ref(), b"headtail");
        assert_eq!(artifact.chunk_count, 3);
        assert_eq!(artifact.content_type, "video/webm");
        assert_eq!(artifact.summary().size, 8);
    }

    #[test]
    fn test_empty_snapshot_is_rejected() {
        assert_eq!(
            OutputArtifact::assemble(&[], "video/webm").unwrap_err(),
            RecordingError::EmptyRecording
        );
    }

    #[test]
    fn test_zero_byte_snapshot_is_rejected() {
        let chunks = vec![Bytes::new(), Bytes::new()];
        assert_eq!(
            OutputArtifact::assemble(&chunks, "video/mp4").unwrap_err(),
            RecordingError::ZeroBytes
        );
    }
}
