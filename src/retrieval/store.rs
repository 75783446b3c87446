//! Similarity-search and corpus-loading capabilities
//!
//! `QdrantSearch` embeds the query and runs a category-filtered vector
//! search. When an over-fetch count is given, candidates are re-ranked for
//! diversity before the final cut (maximal marginal relevance with a lexical
//! redundancy term, so no second embedding round-trip is needed).

use super::embedding::EmbeddingClient;
use super::models::{ChunkCategory, ContextChunk, Partition, ScoredChunk};
use crate::config::RetrievalConfig;
use crate::error::{Result, SupportError};
use crate::metrics::METRICS;
use async_trait::async_trait;
use chrono::Utc;
use qdrant_client::{
    client::QdrantClient,
    qdrant::{value::Kind, Condition, FieldCondition, Filter, Match, SearchPoints, Value},
};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Similarity search over the indexed document chunks
#[async_trait]
pub trait SimilaritySearch: Send + Sync {
    /// Return the `top_k` most relevant chunks for `query` within `partition`.
    ///
    /// When `fetch_k` is given, implementations over-fetch that many
    /// candidates and re-rank for diversity before returning `top_k`.
    async fn search(
        &self,
        partition: Partition,
        query: &str,
        top_k: usize,
        fetch_k: Option<usize>,
    ) -> Result<Vec<ScoredChunk>>;
}

/// Loads a full partition of static reference text
#[async_trait]
pub trait CorpusLoader: Send + Sync {
    async fn load(&self, partition: Partition) -> Result<Vec<ContextChunk>>;
}

/// Qdrant-backed similarity search
pub struct QdrantSearch {
    client: QdrantClient,
    embeddings: Arc<EmbeddingClient>,
    config: RetrievalConfig,
}

impl QdrantSearch {
    pub fn connect(config: RetrievalConfig, embeddings: Arc<EmbeddingClient>) -> Result<Self> {
        let client = QdrantClient::from_url(&config.qdrant_url)
            .build()
            .map_err(|e| SupportError::Configuration(format!("Qdrant client: {}", e)))?;

        Ok(Self {
            client,
            embeddings,
            config,
        })
    }

    /// Verify the collection is reachable; missing collections are logged
    /// but not fatal since searches degrade to empty context anyway.
    pub async fn healthcheck(&self) -> Result<()> {
        let collections = self
            .client
            .list_collections()
            .await
            .map_err(|e| SupportError::Search(format!("Qdrant unreachable: {}", e)))?;

        let exists = collections
            .collections
            .iter()
            .any(|c| c.name == self.config.collection_name);

        if !exists {
            warn!(
                collection = %self.config.collection_name,
                "collection not found, searches will return no results"
            );
        }

        Ok(())
    }

    fn partition_filter(partition: Partition) -> Filter {
        let conditions: Vec<Condition> = partition
            .categories()
            .iter()
            .map(|category| Condition {
                condition_one_of: Some(qdrant_client::qdrant::condition::ConditionOneOf::Field(
                    FieldCondition {
                        key: "category".to_string(),
                        r#match: Some(Match {
                            match_value: Some(qdrant_client::qdrant::r#match::MatchValue::Keyword(
                                category.as_str().to_string(),
                            )),
                        }),
                        ..Default::default()
                    },
                )),
            })
            .collect();

        if conditions.len() == 1 {
            Filter {
                must: conditions,
                ..Default::default()
            }
        } else {
            Filter {
                should: conditions,
                ..Default::default()
            }
        }
    }

    fn chunk_from_payload(payload: &HashMap<String, Value>) -> Option<ContextChunk> {
        let source = payload_str(payload, "source")?;
        let content = payload_str(payload, "content")?;
        let category = payload_str(payload, "category")
            .as_deref()
            .and_then(ChunkCategory::parse)?;

        let id = payload_str(payload, "id")
            .and_then(|raw| Uuid::parse_str(&raw).ok())
            .unwrap_or_else(Uuid::new_v4);

        let ingested_at = payload_str(payload, "ingested_at")
            .and_then(|raw| chrono::DateTime::parse_from_rfc3339(&raw).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        Some(ContextChunk {
            id,
            source,
            content,
            category,
            ingested_at,
        })
    }
}

#[async_trait]
impl SimilaritySearch for QdrantSearch {
    async fn search(
        &self,
        partition: Partition,
        query: &str,
        top_k: usize,
        fetch_k: Option<usize>,
    ) -> Result<Vec<ScoredChunk>> {
        let vector = self.embeddings.embed(query).await.map_err(|e| {
            SupportError::Search(format!("query embedding failed: {}", e))
        })?;

        let limit = fetch_k.unwrap_or(top_k).max(top_k);

        let request = SearchPoints {
            collection_name: self.config.collection_name.clone(),
            vector,
            filter: Some(Self::partition_filter(partition)),
            limit: limit as u64,
            with_payload: Some(true.into()),
            ..Default::default()
        };

        let response = tokio::time::timeout(
            self.config.search_timeout(),
            self.client.search_points(&request),
        )
        .await
        .map_err(|_| {
            SupportError::Search(format!(
                "search timed out after {}ms",
                self.config.search_timeout_ms
            ))
        })?
        .map_err(|e| SupportError::Search(format!("Qdrant search failed: {}", e)))?;

        let candidates: Vec<ScoredChunk> = response
            .result
            .iter()
            .filter_map(|point| {
                Self::chunk_from_payload(&point.payload).map(|chunk| ScoredChunk {
                    chunk,
                    score: point.score,
                })
            })
            .collect();

        METRICS.record_search(partition);
        debug!(
            partition = %partition,
            candidates = candidates.len(),
            top_k,
            "similarity search complete"
        );

        let results = if fetch_k.is_some() {
            mmr_select(candidates, top_k, self.config.mmr_lambda)
        } else {
            let mut trimmed = candidates;
            trimmed.truncate(top_k);
            trimmed
        };

        Ok(results)
    }
}

fn payload_str(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
    match payload.get(key)?.kind.as_ref()? {
        Kind::StringValue(s) => Some(s.clone()),
        _ => None,
    }
}

/// Maximal marginal relevance selection
///
/// Balances the raw similarity score against lexical redundancy with
/// already-selected chunks. `lambda` of 1.0 reduces to pure relevance order.
pub(crate) fn mmr_select(
    candidates: Vec<ScoredChunk>,
    top_k: usize,
    lambda: f32,
) -> Vec<ScoredChunk> {
    if candidates.len() <= top_k {
        return candidates;
    }

    let token_sets: Vec<HashSet<String>> = candidates
        .iter()
        .map(|scored| tokenize(&scored.chunk.content))
        .collect();

    let mut selected: Vec<usize> = Vec::with_capacity(top_k);
    let mut remaining: Vec<usize> = (0..candidates.len()).collect();

    while selected.len() < top_k && !remaining.is_empty() {
        let mut best_pos = 0;
        let mut best_value = f32::MIN;

        for (pos, &idx) in remaining.iter().enumerate() {
            let redundancy = selected
                .iter()
                .map(|&chosen| jaccard(&token_sets[idx], &token_sets[chosen]))
                .fold(0.0_f32, f32::max);

            let value = lambda * candidates[idx].score - (1.0 - lambda) * redundancy;
            if value > best_value {
                best_value = value;
                best_pos = pos;
            }
        }

        selected.push(remaining.swap_remove(best_pos));
    }

    selected
        .into_iter()
        .map(|idx| candidates[idx].clone())
        .collect()
}

fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_lowercase())
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f32 / union as f32
}

/// Reads static policy documents from a directory of `*.txt` files
pub struct FileCorpusLoader {
    root: PathBuf,
}

impl FileCorpusLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl CorpusLoader for FileCorpusLoader {
    async fn load(&self, partition: Partition) -> Result<Vec<ContextChunk>> {
        if !self.root.is_dir() {
            return Err(SupportError::Corpus(format!(
                "corpus directory not found: {}",
                self.root.display()
            )));
        }

        let pattern = self.root.join("*.txt");
        let pattern = pattern.to_string_lossy().to_string();

        let mut paths: Vec<PathBuf> = glob::glob(&pattern)
            .map_err(|e| SupportError::Corpus(format!("bad corpus pattern: {}", e)))?
            .filter_map(|entry| entry.ok())
            .collect();
        paths.sort();

        let category = partition
            .categories()
            .first()
            .copied()
            .unwrap_or(ChunkCategory::Policy);

        let mut chunks = Vec::with_capacity(paths.len());
        let mut seen = HashSet::new();
        for path in paths {
            let source = path
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_else(|| path.display().to_string());

            match tokio::fs::read_to_string(&path).await {
                Ok(content) => {
                    // a stray copy of a policy file under a second name would
                    // otherwise be served to the model twice
                    let digest = format!("{:x}", Sha256::digest(content.as_bytes()));
                    if !seen.insert(digest) {
                        debug!(file = %path.display(), "skipping duplicate corpus content");
                        continue;
                    }
                    chunks.push(ContextChunk::new(source, content, category));
                }
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "skipping unreadable corpus file");
                }
            }
        }

        if chunks.is_empty() {
            warn!(root = %self.root.display(), "corpus directory contained no readable .txt files");
        }

        debug!(partition = %partition, files = chunks.len(), "corpus loaded");
        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(source: &str, content: &str, score: f32) -> ScoredChunk {
        ScoredChunk {
            chunk: ContextChunk::new(source, content, ChunkCategory::TechnicalDoc),
            score,
        }
    }

    #[test]
    fn test_mmr_demotes_near_duplicates() {
        let candidates = vec![
            scored("kb/a.md", "how to reset your password quickly", 0.95),
            scored("kb/b.md", "how to reset your password quickly", 0.94),
            scored("kb/c.md", "exporting billing invoices to csv", 0.90),
        ];

        let selected = mmr_select(candidates, 2, 0.7);
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0].chunk.source, "kb/a.md");
        assert_eq!(selected[1].chunk.source, "kb/c.md");
    }

    #[test]
    fn test_mmr_pure_relevance_at_lambda_one() {
        let candidates = vec![
            scored("kb/a.md", "same words here", 0.9),
            scored("kb/b.md", "same words here", 0.8),
            scored("kb/c.md", "different text entirely", 0.7),
        ];

        let selected = mmr_select(candidates, 2, 1.0);
        assert_eq!(selected[0].chunk.source, "kb/a.md");
        assert_eq!(selected[1].chunk.source, "kb/b.md");
    }

    #[test]
    fn test_mmr_short_input_passes_through() {
        let candidates = vec![scored("kb/a.md", "only one", 0.9)];
        let selected = mmr_select(candidates, 5, 0.7);
        assert_eq!(selected.len(), 1);
    }

    #[test]
    fn test_jaccard_bounds() {
        let a = tokenize("alpha beta gamma");
        let b = tokenize("alpha beta gamma");
        let c = tokenize("delta epsilon");
        assert!((jaccard(&a, &b) - 1.0).abs() < f32::EPSILON);
        assert_eq!(jaccard(&a, &c), 0.0);
    }

    #[test]
    fn test_partition_filter_uses_should_for_multi_category() {
        let filter = QdrantSearch::partition_filter(Partition::Technical);
        assert_eq!(filter.should.len(), 3);
        assert!(filter.must.is_empty());

        let single = QdrantSearch::partition_filter(Partition::PolicyStatic);
        assert_eq!(single.must.len(), 1);
        assert!(single.should.is_empty());
    }

    #[tokio::test]
    async fn test_file_corpus_loader_reads_sorted_txt() {
        let root = std::env::temp_dir().join(format!("corpus-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&root).await.unwrap();
        tokio::fs::write(root.join("terms_of_service.txt"), "Terms body.")
            .await
            .unwrap();
        tokio::fs::write(root.join("privacy_policy.txt"), "Privacy body.")
            .await
            .unwrap();
        tokio::fs::write(root.join("notes.md"), "ignored")
            .await
            .unwrap();

        let loader = FileCorpusLoader::new(&root);
        let chunks = loader.load(Partition::PolicyStatic).await.unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].source, "privacy_policy.txt");
        assert_eq!(chunks[1].source, "terms_of_service.txt");
        assert!(chunks.iter().all(|c| c.category == ChunkCategory::Policy));

        let _ = tokio::fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn test_file_corpus_loader_suppresses_duplicate_content() {
        let root = std::env::temp_dir().join(format!("corpus-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&root).await.unwrap();
        tokio::fs::write(root.join("terms_of_service.txt"), "Same body.")
            .await
            .unwrap();
        tokio::fs::write(root.join("terms_copy.txt"), "Same body.")
            .await
            .unwrap();

        let loader = FileCorpusLoader::new(&root);
        let chunks = loader.load(Partition::PolicyStatic).await.unwrap();

        assert_eq!(chunks.len(), 1);
        // sorted scan keeps the first name encountered
        assert_eq!(chunks[0].source, "terms_copy.txt");

        let _ = tokio::fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn test_file_corpus_loader_missing_dir_errors() {
        let loader = FileCorpusLoader::new("/nonexistent/corpus/path");
        let err = loader.load(Partition::PolicyStatic).await.unwrap_err();
        assert!(matches!(err, SupportError::Corpus(_)));
    }

    // Requires a running Qdrant instance
    #[tokio::test]
    #[ignore]
    async fn test_qdrant_healthcheck() {
        let config = RetrievalConfig::default();
        let models = crate::config::ModelConfig::default();
        let embeddings = Arc::new(EmbeddingClient::new(&models, &config).unwrap());
        let search = QdrantSearch::connect(config, embeddings).unwrap();
        assert!(search.healthcheck().await.is_ok());
    }
}
