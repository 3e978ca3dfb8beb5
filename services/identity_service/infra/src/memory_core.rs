//! C7: CRUD + soft-delete + version + TTL + hybrid search (§4.7).
//! Embedding generation is delegated to an [`EmbeddingClient`] collaborator
//! — an internal seam, not one of the capability interfaces `api` depends
//! on — so the HTTP call and its local fallback behavior (both grounded on
//! `original_source/manushya/services/embedding_service.py`) stay out of
//! the domain trait.

use async_trait::async_trait;
use chrono::Utc;
use identity_service_core::model::Memory;
use identity_service_core::repository::{MemoryFilters, MemoryRepository, Paging};
use identity_service_core::service::{MemoryCore, MemoryPatch, SearchMode, SearchResult};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use shared_error::AppError;
use shared_types::Scope;
use std::sync::Arc;
use uuid::Uuid;

#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AppError>;
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

/// Calls `embedding_provider_url`; when unset or unreachable, a
/// deterministic hash-based fallback keeps the pipeline functional rather
/// than blocking every memory write on an external dependency.
pub struct HttpEmbeddingClient {
    client: reqwest::Client,
    provider_url: Option<String>,
    provider_api_key: Option<String>,
    dimension: usize,
}

impl HttpEmbeddingClient {
    pub fn new(provider_url: Option<String>, provider_api_key: Option<String>, dimension: usize) -> Self {
        Self { client: reqwest::Client::new(), provider_url, provider_api_key, dimension }
    }

    fn hash_embedding(&self, text: &str) -> Vec<f32> {
        let digest = Sha256::digest(text.as_bytes());
        let mut values: Vec<f32> = digest.iter().map(|b| *b as f32 / 255.0).collect();
        values.resize(self.dimension, 0.0);
        values
    }
}

#[async_trait]
impl EmbeddingClient for HttpEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AppError> {
        if text.trim().is_empty() {
            return Err(AppError::ValidationFailed("memory text cannot be empty".into()));
        }

        let Some(url) = &self.provider_url else {
            return Ok(self.hash_embedding(text));
        };

        let mut request = self.client.post(url).json(&serde_json::json!({ "input": text }));
        if let Some(key) = &self.provider_api_key {
            request = request.bearer_auth(key);
        }

        match request.send().await {
            Ok(response) if response.status().is_success() => match response.json::<EmbeddingResponse>().await {
                Ok(body) => Ok(body.embedding),
                Err(_) => Ok(self.hash_embedding(text)),
            },
            _ => Ok(self.hash_embedding(text)),
        }
    }
}

pub struct DefaultMemoryCore {
    memories: Arc<dyn MemoryRepository>,
    embeddings: Arc<dyn EmbeddingClient>,
}

impl DefaultMemoryCore {
    pub fn new(memories: Arc<dyn MemoryRepository>, embeddings: Arc<dyn EmbeddingClient>) -> Self {
        Self { memories, embeddings }
    }
}

#[async_trait]
impl MemoryCore for DefaultMemoryCore {
    async fn create(
        &self,
        scope: Scope,
        identity_id: Uuid,
        text: String,
        r#type: String,
        metadata: serde_json::Value,
        ttl_days: Option<i32>,
    ) -> Result<Memory, AppError> {
        let now = Utc::now();
        // Embedding failures never block the write (§4.7): the row is
        // created with `vector = None` and picked up by `backfill_embeddings`.
        let vector = self.embeddings.embed(&text).await.ok();

        let memory = Memory {
            id: Uuid::new_v4(),
            tenant_id: scope.tenant_id(),
            identity_id,
            text,
            vector,
            r#type,
            metadata: sqlx::types::Json(metadata),
            score: None,
            version: 1,
            ttl_days,
            is_deleted: false,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        };
        self.memories.create(&memory).await
    }

    async fn get(&self, scope: Scope, id: Uuid, include_deleted: bool) -> Result<Memory, AppError> {
        self.memories
            .find_by_id(scope, id, include_deleted)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("memory {id} not found")))
    }

    async fn list(&self, scope: Scope, identity_id: Uuid, r#type: Option<String>, paging: Paging) -> Result<Vec<Memory>, AppError> {
        let filters = MemoryFilters { r#type, metadata_requirements: None };
        self.memories.list(scope, identity_id, &filters, paging).await
    }

    async fn update(&self, scope: Scope, id: Uuid, patch: MemoryPatch) -> Result<Memory, AppError> {
        let mut memory = self.get(scope, id, false).await?;

        if let Some(text) = patch.text {
            if text != memory.text {
                // I3: a text change invalidates any cached vector and bumps
                // the version; re-embedding happens the same way a fresh
                // create does, never blocking the write on failure.
                memory.vector = self.embeddings.embed(&text).await.ok();
                memory.version += 1;
                memory.text = text;
            }
        }
        if let Some(r#type) = patch.r#type {
            memory.r#type = r#type;
        }
        if let Some(metadata) = patch.metadata {
            memory.metadata = sqlx::types::Json(metadata);
        }
        if let Some(ttl_days) = patch.ttl_days {
            memory.ttl_days = ttl_days;
        }
        memory.updated_at = Utc::now();

        self.memories.update(scope, &memory).await
    }

    async fn delete(&self, scope: Scope, id: Uuid, hard: bool) -> Result<(), AppError> {
        if hard {
            self.memories.hard_delete(scope, id).await
        } else {
            self.memories.soft_delete(scope, id, Utc::now()).await
        }
    }

    async fn search(
        &self,
        scope: Scope,
        identity_id: Uuid,
        query_text: &str,
        filters: MemoryFilters,
        k: u32,
        min_score: f32,
    ) -> Result<SearchResult, AppError> {
        let (memories, mode) = match self.embeddings.embed(query_text).await {
            Ok(vector) => {
                let results = self.memories.search_by_vector(scope, identity_id, &vector, &filters, k).await?;
                (results, SearchMode::Vector)
            }
            Err(_) => {
                let results = self.memories.search_by_text(scope, identity_id, query_text, &filters, k).await?;
                (results, SearchMode::TextFallback)
            }
        };

        let filtered = memories.into_iter().filter(|m| m.score.unwrap_or(0.0) >= min_score).collect();
        Ok(SearchResult { memories: filtered, mode })
    }

    async fn backfill_embeddings(&self, batch_size: u32) -> Result<u64, AppError> {
        let candidates = self.memories.list_missing_vector(batch_size).await?;
        let mut backfilled = 0u64;
        for mut memory in candidates {
            match self.embeddings.embed(&memory.text).await {
                Ok(vector) => {
                    memory.vector = Some(vector);
                    let scope = memory.tenant_id.map(Scope::Tenant).unwrap_or(Scope::System);
                    self.memories.update(scope, &memory).await?;
                    backfilled += 1;
                }
                Err(e) => {
                    tracing::warn!(memory_id = %memory.id, %e, "embedding backfill failed, will retry next sweep");
                }
            }
        }
        Ok(backfilled)
    }
}
