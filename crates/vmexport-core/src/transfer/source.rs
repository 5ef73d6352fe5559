//! Byte sources the transfer layer reads from

use crate::error::TransferError;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_RANGE, RANGE};

/// An opened byte stream
pub struct SourceStream {
    /// Offset the stream actually starts at. A source that cannot honour a
    /// range request reports 0 here.
    pub offset: u64,

    /// Full object size when the source knows it
    pub total_size: Option<u64>,
    pub stream: BoxStream<'static, Result<Bytes, TransferError>>,
}

impl std::fmt::Debug for SourceStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceStream")
            .field("offset", &self.offset)
            .field("total_size", &self.total_size)
            .finish_non_exhaustive()
    }
}

/// Something that can be read from a byte offset
#[async_trait]
pub trait ByteSource: Send + Sync {
    /// Stable identifier recorded in checkpoints. Must not change between
    /// attempts even if the access URL does (e.g. a fresh SAS token).
    fn identity(&self) -> &str;

    async fn open(&self, offset: u64) -> Result<SourceStream, TransferError>;
}

/// HTTP(S) GET with `Range` support
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
    url: String,
    identity: String,
    bearer_token: Option<String>,
}

impl HttpSource {
    /// The identity defaults to the URL without its query string
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        let url = url.into();
        let identity = url.split('?').next().unwrap_or(&url).to_string();
        Self {
            client,
            url,
            identity,
            bearer_token: None,
        }
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into();
        self
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Total size from `Content-Range: bytes 100-199/1000`
fn content_range_total(value: &str) -> Option<u64> {
    value.rsplit('/').next().and_then(|total| total.trim().parse().ok())
}

/// Start offset from `Content-Range: bytes 100-199/1000`
fn content_range_start(value: &str) -> Option<u64> {
    value
        .trim()
        .strip_prefix("bytes")?
        .trim()
        .split('-')
        .next()
        .and_then(|start| start.trim().parse().ok())
}

#[async_trait]
impl ByteSource for HttpSource {
    fn identity(&self) -> &str {
        &self.identity
    }

    async fn open(&self, offset: u64) -> Result<SourceStream, TransferError> {
        let mut request = self.client.get(&self.url);
        if offset > 0 {
            request = request.header(RANGE, format!("bytes={}-", offset));
        }
        if let Some(token) = &self.bearer_token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        let response = request.send().await?;
        let status = response.status();

        let (served_offset, total_size) = match status {
            StatusCode::PARTIAL_CONTENT => {
                let range = response
                    .headers()
                    .get(CONTENT_RANGE)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default();
                (
                    content_range_start(range).unwrap_or(offset),
                    content_range_total(range),
                )
            }
            s if s.is_success() => (0, response.content_length()),
            s => {
                return Err(TransferError::Status {
                    status: s.as_u16(),
                    url: self.identity.clone(),
                });
            }
        };

        tracing::debug!(
            source = %self.identity,
            requested = offset,
            served = served_offset,
            total = ?total_size,
            "Opened HTTP source"
        );

        Ok(SourceStream {
            offset: served_offset,
            total_size,
            stream: response
                .bytes_stream()
                .map(|chunk| chunk.map_err(TransferError::from))
                .boxed(),
        })
    }
}

/// In-memory source, chunked and optionally failing part-way
///
/// Used to exercise the transfer layer and provider state machines without a
/// network.
#[derive(Debug, Clone)]
pub struct MemorySource {
    identity: String,
    data: Bytes,
    chunk_size: usize,
    fail_after: Option<u64>,
    honor_range: bool,
    report_size: bool,
}

impl MemorySource {
    pub fn new(identity: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            identity: identity.into(),
            data: data.into(),
            chunk_size: 8 * 1024,
            fail_after: None,
            honor_range: true,
            report_size: true,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Emit an error once `bytes` (absolute offset) have been delivered
    pub fn fail_after(mut self, bytes: u64) -> Self {
        self.fail_after = Some(bytes);
        self
    }

    /// Behave like a server that ignores `Range` headers
    pub fn ignore_range(mut self) -> Self {
        self.honor_range = false;
        self
    }

    /// Behave like a server that sends no length
    pub fn without_size(mut self) -> Self {
        self.report_size = false;
        self
    }
}

#[async_trait]
impl ByteSource for MemorySource {
    fn identity(&self) -> &str {
        &self.identity
    }

    async fn open(&self, offset: u64) -> Result<SourceStream, TransferError> {
        let len = self.data.len() as u64;
        let start = if self.honor_range { offset.min(len) } else { 0 };

        let mut items: Vec<Result<Bytes, TransferError>> = Vec::new();
        let mut pos = start;
        while pos < len {
            if self.fail_after.is_some_and(|limit| pos >= limit) {
                items.push(Err(TransferError::Source("connection reset by peer".into())));
                break;
            }
            let mut end = (pos + self.chunk_size as u64).min(len);
            if let Some(limit) = self.fail_after.filter(|limit| *limit > pos) {
                end = end.min(limit);
            }
            items.push(Ok(self.data.slice(pos as usize..end as usize)));
            pos = end;
        }

        Ok(SourceStream {
            offset: start,
            total_size: self.report_size.then_some(len),
            stream: stream::iter(items).boxed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect(source: &MemorySource, offset: u64) -> (u64, Vec<u8>, bool) {
        let opened = source.open(offset).await.unwrap();
        let mut stream = opened.stream;
        let mut out = Vec::new();
        let mut failed = false;
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(bytes) => out.extend_from_slice(&bytes),
                Err(_) => failed = true,
            }
        }
        (opened.offset, out, failed)
    }

    #[test]
    fn test_content_range_parsing() {
        assert_eq!(content_range_total("bytes 100-199/1000"), Some(1000));
        assert_eq!(content_range_total("bytes 100-199/*"), None);
        assert_eq!(content_range_start("bytes 100-199/1000"), Some(100));
    }

    #[test]
    fn test_http_identity_drops_query() {
        let source = HttpSource::new(
            reqwest::Client::new(),
            "https://md-abc.blob.core.windows.net/x/abcd?sv=2021&sig=secret",
        );
        assert_eq!(source.identity(), "https://md-abc.blob.core.windows.net/x/abcd");
        let source = source.with_identity("azure-disk:web-01-os");
        assert_eq!(source.identity(), "azure-disk:web-01-os");
    }

    #[tokio::test]
    async fn test_memory_source_ranges_and_failures() {
        let data: Vec<u8> = (0..=255u8).collect();
        let source = MemorySource::new("mem", data.clone()).with_chunk_size(100);

        let (offset, bytes, failed) = collect(&source, 56).await;
        assert_eq!(offset, 56);
        assert_eq!(bytes, data[56..]);
        assert!(!failed);

        let failing = source.clone().fail_after(150);
        let (_, bytes, failed) = collect(&failing, 0).await;
        assert_eq!(bytes, data[..150]);
        assert!(failed);

        let ignoring = source.ignore_range();
        let (offset, bytes, _) = collect(&ignoring, 56).await;
        assert_eq!(offset, 0);
        assert_eq!(bytes, data);
    }
}
