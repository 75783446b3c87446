//! Data types for the retrieval layer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Logical slice of the knowledge collection a search or load runs against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Partition {
    /// Static billing policies, refund terms, payment rules
    PolicyStatic,
    /// Invoices, current pricing, account-specific billing data
    BillingDynamic,
    /// Technical docs, bug reports, forum posts
    Technical,
}

impl Partition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Partition::PolicyStatic => "policy_static",
            Partition::BillingDynamic => "billing_dynamic",
            Partition::Technical => "technical",
        }
    }

    /// Chunk categories that belong to this partition
    pub fn categories(&self) -> &'static [ChunkCategory] {
        match self {
            Partition::PolicyStatic => &[ChunkCategory::Policy],
            Partition::BillingDynamic => &[ChunkCategory::BillingData],
            Partition::Technical => &[
                ChunkCategory::TechnicalDoc,
                ChunkCategory::BugReport,
                ChunkCategory::ForumPost,
            ],
        }
    }
}

impl std::fmt::Display for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category tag stored on each indexed chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkCategory {
    Policy,
    BillingData,
    TechnicalDoc,
    BugReport,
    ForumPost,
}

impl ChunkCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkCategory::Policy => "policy",
            ChunkCategory::BillingData => "billing_data",
            ChunkCategory::TechnicalDoc => "technical_doc",
            ChunkCategory::BugReport => "bug_report",
            ChunkCategory::ForumPost => "forum_post",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "policy" => Some(ChunkCategory::Policy),
            "billing_data" => Some(ChunkCategory::BillingData),
            "technical_doc" => Some(ChunkCategory::TechnicalDoc),
            "bug_report" => Some(ChunkCategory::BugReport),
            "forum_post" => Some(ChunkCategory::ForumPost),
            _ => None,
        }
    }
}

/// One indexed document chunk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextChunk {
    pub id: Uuid,
    /// Attribution identifier, typically the originating file or ticket
    pub source: String,
    pub content: String,
    pub category: ChunkCategory,
    pub ingested_at: DateTime<Utc>,
}

impl ContextChunk {
    pub fn new(
        source: impl Into<String>,
        content: impl Into<String>,
        category: ChunkCategory,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: source.into(),
            content: content.into(),
            category,
            ingested_at: Utc::now(),
        }
    }

    /// Stable content hash used for deduplication
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.source.as_bytes());
        hasher.update(b"\x00");
        hasher.update(self.content.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Render with source attribution for prompt assembly
    pub fn render_attributed(&self) -> String {
        format!("[Source: {}]\n{}", self.source, self.content)
    }
}

/// Search hit with its similarity score
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: ContextChunk,
    pub score: f32,
}

/// Join chunks with source attribution, separated by a rule
pub fn render_attributed(chunks: &[ContextChunk]) -> String {
    chunks
        .iter()
        .map(ContextChunk::render_attributed)
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

/// Join chunk bodies without attribution
pub fn render_plain(chunks: &[ContextChunk]) -> String {
    chunks
        .iter()
        .map(|chunk| chunk.content.clone())
        .collect::<Vec<_>>()
        .join("\n\n")
}
