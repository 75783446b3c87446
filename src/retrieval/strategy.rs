//! Context assembly strategies
//!
//! Each responder role pairs with a fixed strategy. Assembly never fails:
//! search and load errors are logged and degrade to an empty context block,
//! leaving the generation step to admit it lacks the information.

use super::models::{render_attributed, render_plain, ContextChunk, Partition, ScoredChunk};
use super::store::{CorpusLoader, SimilaritySearch};
use crate::config::RetrievalConfig;
use crate::session::SessionState;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Fixed probe used to pull the static policy block for billing sessions
pub const STATIC_POLICY_QUERY: &str = "billing policies refund terms payment";

/// Produces the context text handed to a responder
#[async_trait]
pub trait RetrievalStrategy: Send + Sync {
    async fn assemble(&self, query: &str, session: &mut SessionState) -> String;
}

fn into_chunks(scored: Vec<ScoredChunk>) -> Vec<ContextChunk> {
    scored.into_iter().map(|s| s.chunk).collect()
}

/// Fresh similarity search on every call, no session involvement
///
/// Over-fetches candidates and keeps a diversity-aware subset so the
/// context covers distinct documents instead of near-duplicates.
pub struct AlwaysFetch {
    search: Arc<dyn SimilaritySearch>,
    top_k: usize,
    fetch_k: usize,
}

impl AlwaysFetch {
    pub fn new(search: Arc<dyn SimilaritySearch>, config: &RetrievalConfig) -> Self {
        Self {
            search,
            top_k: config.top_k,
            fetch_k: config.fetch_k(config.top_k),
        }
    }
}

#[async_trait]
impl RetrievalStrategy for AlwaysFetch {
    async fn assemble(&self, query: &str, _session: &mut SessionState) -> String {
        match self
            .search
            .search(Partition::Technical, query, self.top_k, Some(self.fetch_k))
            .await
        {
            Ok(hits) => render_attributed(&into_chunks(hits)),
            Err(e) => {
                warn!(error = %e, "technical search failed, continuing without context");
                String::new()
            }
        }
    }
}

/// Loads the static policy corpus once per process and serves the same
/// blob on every call, ignoring the query entirely
pub struct CacheOnce {
    loader: Arc<dyn CorpusLoader>,
    blob: OnceCell<String>,
}

impl CacheOnce {
    pub fn new(loader: Arc<dyn CorpusLoader>) -> Self {
        Self {
            loader,
            blob: OnceCell::new(),
        }
    }

    /// Uppercased section heading derived from the source file name
    fn section_title(source: &str) -> String {
        let stem = source.strip_suffix(".txt").unwrap_or(source);
        stem.replace(['_', '-'], " ").to_uppercase()
    }

    fn build_blob(chunks: &[ContextChunk]) -> String {
        chunks
            .iter()
            .map(|chunk| {
                format!(
                    "{}:\n{}",
                    Self::section_title(&chunk.source),
                    chunk.content.trim_end()
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    async fn load_blob(&self) -> crate::error::Result<String> {
        let chunks = self.loader.load(Partition::PolicyStatic).await?;
        debug!(sections = chunks.len(), "policy corpus cached for process lifetime");
        Ok(Self::build_blob(&chunks))
    }

    /// Warm the corpus cache ahead of the first request. Failure leaves the
    /// cell empty so a later request can retry the load.
    pub async fn preload(&self) -> crate::error::Result<()> {
        self.blob.get_or_try_init(|| self.load_blob()).await?;
        Ok(())
    }
}

#[async_trait]
impl RetrievalStrategy for CacheOnce {
    async fn assemble(&self, _query: &str, _session: &mut SessionState) -> String {
        // A failed load leaves the cell empty so the next call retries.
        match self.blob.get_or_try_init(|| self.load_blob()).await {
            Ok(blob) => blob.clone(),
            Err(e) => {
                warn!(error = %e, "policy corpus unavailable, continuing without context");
                String::new()
            }
        }
    }
}

/// Cached static policies plus a fresh dynamic search per call
///
/// The static block is computed on first use within a session and then
/// reused for the session's whole lifetime, even on search failure (the
/// failure result, an empty block, is cached rather than retried).
pub struct Hybrid {
    search: Arc<dyn SimilaritySearch>,
    top_k: usize,
}

impl Hybrid {
    pub fn new(search: Arc<dyn SimilaritySearch>, config: &RetrievalConfig) -> Self {
        Self {
            search,
            top_k: config.hybrid_top_k,
        }
    }

    async fn static_block(&self) -> String {
        match self
            .search
            .search(Partition::PolicyStatic, STATIC_POLICY_QUERY, self.top_k, None)
            .await
        {
            Ok(hits) => render_plain(&into_chunks(hits)),
            Err(e) => {
                warn!(error = %e, "static policy search failed, caching empty block");
                String::new()
            }
        }
    }
}

#[async_trait]
impl RetrievalStrategy for Hybrid {
    async fn assemble(&self, query: &str, session: &mut SessionState) -> String {
        if session.cached_static_context.is_none() {
            let block = self.static_block().await;
            debug!(bytes = block.len(), "cached static billing policies for session");
            session.cached_static_context = Some(block);
        }

        let dynamic = match self
            .search
            .search(Partition::BillingDynamic, query, self.top_k, None)
            .await
        {
            Ok(hits) => render_plain(&into_chunks(hits)),
            Err(e) => {
                warn!(error = %e, "dynamic billing search failed, continuing without it");
                String::new()
            }
        };

        let cached = session
            .cached_static_context
            .as_deref()
            .unwrap_or_default();

        let mut context = String::new();
        if !cached.is_empty() {
            context.push_str("BILLING POLICIES (cached):\n");
            context.push_str(cached);
            context.push_str("\n\n");
        }
        if !dynamic.is_empty() {
            context.push_str("CURRENT BILLING DATA:\n");
            context.push_str(&dynamic);
        }

        context
    }
}
