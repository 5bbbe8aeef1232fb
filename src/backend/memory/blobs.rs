use std::collections::HashMap;

use async_trait::async_trait;
use log::info;
use tokio::sync::Mutex as TokioMutex;
use uuid::Uuid;

use crate::backend::BlobStore;
use crate::error::{ChatError, Result};

const BUCKET: &str = "chatapp.appspot.com";

struct Blob {
    bytes: Vec<u8>,
    token: String,
}

#[derive(Default)]
pub struct MemoryBlobs {
    blobs: TokioMutex<HashMap<String, Blob>>,
}

impl MemoryBlobs {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn read(&self, path: &str) -> Option<Vec<u8>> {
        self.blobs.lock().await.get(path).map(|blob| blob.bytes.clone())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobs {
    async fn put(&self, path: &str, bytes: Vec<u8>) -> Result<()> {
        let path = path.trim_matches('/');
        if path.is_empty() {
            return Err(ChatError::validation("blob path must not be empty"));
        }
        info!("Storing {} bytes at {}", bytes.len(), path);
        self.blobs.lock().await.insert(
            path.to_string(),
            Blob {
                bytes,
                token: Uuid::new_v4().to_string(),
            },
        );
        Ok(())
    }

    async fn download_url(&self, path: &str) -> Result<String> {
        let path = path.trim_matches('/');
        let blobs = self.blobs.lock().await;
        let blob = blobs
            .get(path)
            .ok_or_else(|| ChatError::NotFound(format!("object {}", path)))?;
        Ok(format!(
            "memory://{}/o/{}?alt=media&token={}",
            BUCKET,
            path.replace('/', "%2F"),
            blob.token
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_then_url() {
        let blobs = MemoryBlobs::new();
        blobs.put("profile_images/u1_1.jpg", vec![1, 2, 3]).await.unwrap();

        let url = blobs.download_url("profile_images/u1_1.jpg").await.unwrap();
        assert!(url.starts_with("memory://chatapp.appspot.com/o/profile_images%2Fu1_1.jpg?alt=media&token="));
        assert_eq!(blobs.read("profile_images/u1_1.jpg").await, Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn test_unknown_path() {
        let blobs = MemoryBlobs::new();
        assert!(matches!(blobs.download_url("nope.jpg").await, Err(ChatError::NotFound(_))));
    }
}
