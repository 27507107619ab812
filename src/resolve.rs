//! Attachment resolution capability.
//!
//! Attachment storage (object stores, OCR, extraction pipelines) lives
//! outside the kernel; the kernel consumes it through this interface and
//! carries the resolver's provenance fields (`snapshot_hash`,
//! `resolver_version`) into derived blocks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::KernelError;
use crate::types::block::Block;

/// How much of an attachment to materialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionLevel {
    /// Name, type, and size only.
    MetadataOnly,
    /// Extracted text.
    Extract,
    /// Full content, including binary parts where renderable.
    Full,
}

/// Reference to an attachment held by external storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    /// Storage-side identifier.
    pub id: String,
    /// Optional source location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    /// Optional MIME type hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// A resolved attachment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedAttachment {
    /// Resolver-reported metadata.
    pub meta: Value,
    /// Renderable content parts.
    pub parts: Vec<Value>,
    /// Blocks derived from the attachment, ready for graph insertion.
    pub derived_blocks: Vec<Block>,
    /// Content fingerprint at resolution time.
    pub snapshot_hash: String,
    /// Version of the resolving pipeline.
    pub resolver_version: String,
}

/// Async attachment resolution capability.
#[async_trait]
pub trait AttachmentResolver: Send + Sync {
    /// Resolve a reference at the requested level.
    async fn resolve(
        &self,
        reference: &AttachmentRef,
        level: ResolutionLevel,
    ) -> Result<ResolvedAttachment, KernelError>;
}
