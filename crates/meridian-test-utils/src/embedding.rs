use async_trait::async_trait;
use meridian_vector::{EmbeddingClient, EmbeddingError};
use std::time::Duration;

/// Deterministic bag-of-words embedding.
///
/// Each lowercase word is hashed into one of `dimension` buckets, so texts
/// sharing words score a positive cosine similarity.
#[derive(Debug, Clone)]
pub struct KeywordEmbedding {
    dimension: usize,
}

impl KeywordEmbedding {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dimension];
        for word in text
            .split(|ch: char| !ch.is_alphanumeric())
            .filter(|word| !word.is_empty())
        {
            let bucket = fnv1a(&word.to_lowercase()) % self.dimension as u64;
            vector[bucket as usize] += 1.0;
        }
        vector
    }
}

impl Default for KeywordEmbedding {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl EmbeddingClient for KeywordEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.vector(text))
    }
}

fn fnv1a(word: &str) -> u64 {
    word.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
    })
}

#[derive(Debug, Clone, Default)]
pub struct FailingEmbedding;

#[async_trait]
impl EmbeddingClient for FailingEmbedding {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::Unavailable("scripted failure".to_string()))
    }
}

/// Sleeps on the tokio clock, then embeds like [`KeywordEmbedding`].
#[derive(Debug, Clone)]
pub struct SlowEmbedding {
    delay: Duration,
    inner: KeywordEmbedding,
}

impl SlowEmbedding {
    pub fn new(delay: Duration, dimension: usize) -> Self {
        Self {
            delay,
            inner: KeywordEmbedding::new(dimension),
        }
    }
}

#[async_trait]
impl EmbeddingClient for SlowEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        tokio::time::sleep(self.delay).await;
        Ok(self.inner.vector(text))
    }
}
