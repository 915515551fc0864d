use async_trait::async_trait;
use reqwest::{Method, StatusCode, Url};
use serde_json::json;
use std::time::Duration;

use super::{BulkAction, BulkItemFailure, BulkResponse, SearchTransport};
use crate::error::TransportError;
use crate::types::{DocumentBody, OperationKind, RecordId};

const SCROLL_KEEPALIVE: &str = "1m";

/// [`SearchTransport`] over an Elasticsearch-compatible REST API.
pub struct HttpTransport {
    base_url: Url,
    http_client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(base_url: &str) -> Result<Self, TransportError> {
        Self::with_timeout(base_url, Duration::from_secs(30))
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| TransportError::Request(format!("invalid url '{}': {}", base_url, e)))?;
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Ok(Self {
            base_url,
            http_client,
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Append path segments to the base url, escaping each one.
    fn url(&self, segments: &[&str]) -> Result<Url, TransportError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| TransportError::Request("base url cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<&serde_json::Value>,
    ) -> Result<reqwest::Response, TransportError> {
        let mut req = self.http_client.request(method, url);
        if let Some(body) = body {
            req = req.json(body);
        }
        let response = req.send().await?;
        check_status(response).await
    }

    async fn send_json(
        &self,
        method: Method,
        url: Url,
        body: Option<&serde_json::Value>,
    ) -> Result<serde_json::Value, TransportError> {
        let response = self.send(method, url, body).await?;
        response
            .json()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(TransportError::Status { status, body })
}

fn bulk_ndjson(actions: &[BulkAction]) -> Result<String, TransportError> {
    let mut out = String::new();
    for action in actions {
        let meta = json!({ action.kind.as_str(): {"_index": action.index, "_id": action.id} });
        out.push_str(&meta.to_string());
        out.push('\n');
        match (action.kind, &action.body) {
            (OperationKind::Index, Some(body)) => {
                out.push_str(&body.to_json().to_string());
                out.push('\n');
            }
            (OperationKind::Update, Some(body)) => {
                out.push_str(&json!({"doc": body.to_json()}).to_string());
                out.push('\n');
            }
            (OperationKind::Delete, _) => {}
            (kind, None) => {
                return Err(TransportError::Request(format!(
                    "bulk {} action for {} has no body",
                    kind, action.id
                )))
            }
        }
    }
    Ok(out)
}

fn parse_bulk_response(value: &serde_json::Value) -> BulkResponse {
    let mut response = BulkResponse::default();
    let Some(items) = value.get("items").and_then(|i| i.as_array()) else {
        return response;
    };
    for item in items {
        let Some((op, result)) = item.as_object().and_then(|o| o.iter().next()) else {
            continue;
        };
        let status = result.get("status").and_then(|s| s.as_u64()).unwrap_or(0) as u16;
        if (200..300).contains(&status) {
            response.succeeded += 1;
            continue;
        }
        let kind = match op.as_str() {
            "update" => OperationKind::Update,
            "delete" => OperationKind::Delete,
            _ => OperationKind::Index,
        };
        let id = result
            .get("_id")
            .and_then(|i| i.as_str())
            .unwrap_or_default();
        let reason = result
            .pointer("/error/reason")
            .and_then(|r| r.as_str())
            .map(|s| s.to_string())
            .or_else(|| result.get("error").map(|e| e.to_string()))
            .unwrap_or_else(|| format!("status {}", status));
        response.failures.push(BulkItemFailure {
            id: RecordId::from(id),
            kind,
            status,
            reason,
        });
    }
    response
}

fn collect_hit_ids(page: &serde_json::Value, into: &mut Vec<RecordId>) -> usize {
    let hits = page
        .pointer("/hits/hits")
        .and_then(|h| h.as_array())
        .map(|h| h.as_slice())
        .unwrap_or_default();
    for hit in hits {
        if let Some(id) = hit.get("_id").and_then(|i| i.as_str()) {
            into.push(RecordId::from(id));
        }
    }
    hits.len()
}

#[async_trait]
impl SearchTransport for HttpTransport {
    async fn index_document(
        &self,
        index: &str,
        id: &RecordId,
        body: &DocumentBody,
    ) -> Result<(), TransportError> {
        let url = self.url(&[index, "_doc", id.as_str()])?;
        self.send(Method::PUT, url, Some(&body.to_json())).await?;
        Ok(())
    }

    async fn update_document(
        &self,
        index: &str,
        id: &RecordId,
        body: &DocumentBody,
    ) -> Result<(), TransportError> {
        let url = self.url(&[index, "_update", id.as_str()])?;
        self.send(Method::POST, url, Some(&json!({"doc": body.to_json()})))
            .await?;
        Ok(())
    }

    async fn delete_document(&self, index: &str, id: &RecordId) -> Result<(), TransportError> {
        let url = self.url(&[index, "_doc", id.as_str()])?;
        self.send(Method::DELETE, url, None).await?;
        Ok(())
    }

    async fn bulk(&self, actions: &[BulkAction]) -> Result<BulkResponse, TransportError> {
        if actions.is_empty() {
            return Ok(BulkResponse::default());
        }
        let url = self.url(&["_bulk"])?;
        let payload = bulk_ndjson(actions)?;
        let response = self
            .http_client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(payload)
            .send()
            .await?;
        let value: serde_json::Value = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))?;
        Ok(parse_bulk_response(&value))
    }

    async fn create_index(
        &self,
        index: &str,
        mappings: &serde_json::Value,
        settings: Option<&serde_json::Value>,
    ) -> Result<(), TransportError> {
        let mut body = json!({ "mappings": mappings });
        if let Some(settings) = settings {
            body["settings"] = settings.clone();
        }
        let url = self.url(&[index])?;
        self.send(Method::PUT, url, Some(&body)).await?;
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> Result<(), TransportError> {
        let url = self.url(&[index])?;
        match self.send(Method::DELETE, url, None).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => {
                tracing::debug!("[HTTP] index '{}' already absent", index);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn search(
        &self,
        indexes: &[String],
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, TransportError> {
        let target = indexes.join(",");
        let url = self.url(&[target.as_str(), "_search"])?;
        self.send_json(Method::POST, url, Some(body)).await
    }

    async fn count(
        &self,
        indexes: &[String],
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, TransportError> {
        let target = indexes.join(",");
        let url = self.url(&[target.as_str(), "_count"])?;
        self.send_json(Method::POST, url, Some(body)).await
    }

    async fn scan_ids(
        &self,
        index: &str,
        batch_size: usize,
    ) -> Result<Vec<RecordId>, TransportError> {
        let mut url = self.url(&[index, "_search"])?;
        url.query_pairs_mut().append_pair("scroll", SCROLL_KEEPALIVE);
        let first = json!({
            "size": batch_size,
            "_source": false,
            "sort": ["_doc"],
            "query": {"match_all": {}},
        });
        let mut page = self.send_json(Method::POST, url, Some(&first)).await?;

        let mut ids = Vec::new();
        let mut scroll_id = None;
        loop {
            if let Some(sid) = page.get("_scroll_id").and_then(|s| s.as_str()) {
                scroll_id = Some(sid.to_string());
            }
            if collect_hit_ids(&page, &mut ids) == 0 {
                break;
            }
            let Some(sid) = scroll_id.as_deref() else {
                break;
            };
            let url = self.url(&["_search", "scroll"])?;
            let body = json!({"scroll": SCROLL_KEEPALIVE, "scroll_id": sid});
            page = self.send_json(Method::POST, url, Some(&body)).await?;
        }

        if let Some(sid) = scroll_id {
            let url = self.url(&["_search", "scroll"])?;
            if let Err(e) = self
                .send(Method::DELETE, url, Some(&json!({"scroll_id": sid})))
                .await
            {
                if e.status() != Some(StatusCode::NOT_FOUND) {
                    tracing::warn!("[HTTP] failed to clear scroll for '{}': {}", index, e);
                }
            }
        }
        Ok(ids)
    }
}
