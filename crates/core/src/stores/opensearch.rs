use crate::error::IndexError;
use crate::models::DocumentIndex;
use crate::traits::{SearchBackend, SearchCriteria};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

pub struct OpenSearchBackend {
    client: Arc<Client>,
    endpoint: String,
    index_name: String,
}

impl OpenSearchBackend {
    pub fn new(endpoint: impl Into<String>, index_name: impl Into<String>) -> Self {
        Self {
            client: Arc::new(Client::new()),
            endpoint: endpoint.into(),
            index_name: index_name.into(),
        }
    }

    pub async fn ensure_index(&self) -> Result<(), IndexError> {
        let response = self
            .client
            .head(format!("{}/{}", self.endpoint, self.index_name))
            .send()
            .await?;

        if response.status() == StatusCode::OK {
            return Ok(());
        }

        if !response.status().is_client_error() {
            return Err(IndexError::BackendResponse {
                backend: "opensearch".to_string(),
                details: response.status().to_string(),
            });
        }

        let response = self
            .client
            .put(format!("{}/{}", self.endpoint, self.index_name))
            .json(&json!({
                "settings": {
                    "number_of_shards": 1,
                    "number_of_replicas": 0
                },
                "mappings": {
                    "properties": {
                        "title": {"type": "text"},
                        "description": {"type": "text"},
                        "content": {"type": "text"},
                        "file_name": {"type": "keyword"},
                        "content_type": {"type": "keyword"},
                        "file_size": {"type": "long"},
                        "document_type": {"type": "keyword"},
                        "language": {"type": "keyword"},
                        "keywords": {"type": "keyword"},
                        "owner_id": {"type": "keyword"},
                        "uploaded_at": {"type": "date"}
                    }
                }
            }))
            .send()
            .await?;

        if response.status().is_server_error() || response.status().is_client_error() {
            return Err(IndexError::Request(format!(
                "open-search index setup failed with {}",
                response.status()
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl SearchBackend for OpenSearchBackend {
    async fn upsert(&self, entry: &DocumentIndex) -> Result<(), IndexError> {
        let response = self
            .client
            .put(format!(
                "{}/{}/_doc/{}",
                self.endpoint, self.index_name, entry.id
            ))
            .json(entry)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(IndexError::BackendResponse {
                backend: "opensearch".to_string(),
                details: response.status().to_string(),
            });
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), IndexError> {
        let response = self
            .client
            .delete(format!(
                "{}/{}/_doc/{}",
                self.endpoint, self.index_name, id
            ))
            .send()
            .await?;

        // A missing entry is already the state we want.
        if response.status() == StatusCode::NOT_FOUND || response.status().is_success() {
            return Ok(());
        }

        Err(IndexError::BackendResponse {
            backend: "opensearch".to_string(),
            details: response.status().to_string(),
        })
    }

    async fn query(&self, criteria: &SearchCriteria) -> Result<Vec<Uuid>, IndexError> {
        let mut filters = vec![json!({"term": {"owner_id": criteria.owner_id}})];
        if let Some(type_name) = &criteria.document_type {
            filters.push(json!({"term": {"document_type": type_name}}));
        }

        let should: Vec<Value> = criteria
            .terms
            .iter()
            .map(|term| {
                json!({
                    "multi_match": {
                        "query": term,
                        "fields": ["title", "description", "content", "keywords"]
                    }
                })
            })
            .collect();

        let mut bool_query = json!({"filter": filters});
        if !should.is_empty() {
            bool_query["should"] = Value::Array(should);
            bool_query["minimum_should_match"] = json!(1);
        }

        let body = json!({
            "size": 1000,
            "_source": false,
            "query": {"bool": bool_query}
        });

        let response = self
            .client
            .post(format!(
                "{}/{}/_search",
                self.endpoint, self.index_name
            ))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(IndexError::BackendResponse {
                backend: "opensearch".to_string(),
                details: response.status().to_string(),
            });
        }

        let response_json: Value = response.json().await?;
        let hits = response_json
            .pointer("/hits/hits")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let ids = hits
            .iter()
            .filter_map(|raw| raw.pointer("/_id").and_then(Value::as_str))
            .filter_map(|id| Uuid::parse_str(id).ok())
            .collect();

        Ok(ids)
    }
}
