use crate::models::{Candidate, CandidateFilter, Connection, ConnectionRequest};
use crate::services::backend::{Backend, BackendError, RemovalOutcome, RequestOutcome};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;

/// Collection IDs in the backend database
#[derive(Debug, Clone)]
pub struct BackendCollections {
    pub professionals: String,
    pub connection_requests: String,
    pub connections: String,
}

/// Document-API client for the marketplace backend
///
/// Handles all communication with the backend including:
/// - Listing professionals and fetching single professional records
/// - Reading the viewer's pending requests and connections
/// - Creating and cancelling connection requests, removing connections
pub struct RestBackend {
    base_url: String,
    api_key: String,
    project_id: String,
    database_id: String,
    client: Client,
    collections: BackendCollections,
}

impl RestBackend {
    pub fn new(
        base_url: String,
        api_key: String,
        project_id: String,
        database_id: String,
        collections: BackendCollections,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url,
            api_key,
            project_id,
            database_id,
            client,
            collections,
        })
    }

    fn documents_url(&self, collection: &str) -> String {
        format!(
            "{}/databases/{}/collections/{}/documents",
            self.base_url.trim_end_matches('/'),
            self.database_id,
            collection
        )
    }

    fn document_url(&self, collection: &str, document_id: &str) -> String {
        format!(
            "{}/{}",
            self.documents_url(collection),
            urlencoding::encode(document_id)
        )
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("X-Appwrite-Key", &self.api_key)
            .header("X-Appwrite-Project", &self.project_id)
    }

    /// List documents of a collection matching the given query strings
    async fn list_documents(&self, collection: &str, queries: &[String]) -> Result<Vec<Value>, BackendError> {
        let queries_json = serde_json::to_string(queries)
            .map_err(|e| BackendError::InvalidResponse(format!("Failed to encode queries: {}", e)))?;
        let url = format!(
            "{}?query={}",
            self.documents_url(collection),
            urlencoding::encode(&queries_json)
        );

        tracing::debug!("Listing documents from: {}", url);

        let response = self.authorized(self.client.get(&url)).send().await?;
        let response = check_status(response, collection).await?;

        let json: Value = response.json().await?;

        let total = json.get("total").and_then(|t| t.as_u64()).unwrap_or(0);

        let documents = json
            .get("documents")
            .and_then(|d| d.as_array())
            .ok_or_else(|| BackendError::InvalidResponse("Missing documents array".into()))?;

        tracing::debug!("Listed {} documents from {} (total: {})", documents.len(), collection, total);

        Ok(documents.iter().map(document_payload).collect())
    }

    /// Decode each document, skipping the ones that don't fit the model
    fn decode_all<T: DeserializeOwned>(documents: Vec<Value>, kind: &str) -> Vec<T> {
        documents
            .into_iter()
            .filter_map(|doc| match serde_json::from_value(doc) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!("Skipping malformed {} record: {}", kind, e);
                    None
                }
            })
            .collect()
    }

    async fn find_pending_request(
        &self,
        viewer_id: &str,
        professional_id: &str,
    ) -> Result<Option<String>, BackendError> {
        let queries = vec![
            equal("requesterId", viewer_id),
            equal("professionalId", professional_id),
            equal("status", "pending"),
        ];
        let documents = self
            .list_documents(&self.collections.connection_requests, &queries)
            .await?;

        Ok(documents
            .first()
            .and_then(|doc| doc.get("$id"))
            .and_then(|id| id.as_str())
            .map(str::to_string))
    }
}

/// Build an `equal` query string
fn equal(attribute: &str, value: &str) -> String {
    format!("equal(\"{}\", [{}])", attribute, Value::String(value.to_string()))
}

/// Flatten a document into its record, keeping the document id
fn document_payload(doc: &Value) -> Value {
    let mut data = doc.get("data").cloned().unwrap_or_else(|| doc.clone());
    if let (Some(obj), Some(id)) = (data.as_object_mut(), doc.get("$id")) {
        obj.entry("$id").or_insert_with(|| id.clone());
    }
    data
}

async fn check_status(response: Response, context: &str) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unable to read body".to_string());
    tracing::error!("Backend call for {} failed: {} - {}", context, status, body);

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(BackendError::Unauthorized),
        StatusCode::NOT_FOUND => Err(BackendError::NotFound(context.to_string())),
        _ => Err(BackendError::ApiError(format!("{} returned {}", context, status))),
    }
}

fn removal(result: Result<Response, BackendError>) -> Result<RemovalOutcome, BackendError> {
    match result {
        Ok(_) => Ok(RemovalOutcome::Removed),
        Err(BackendError::NotFound(_)) => Ok(RemovalOutcome::AlreadyGone),
        Err(e) => Err(e),
    }
}

#[async_trait]
impl Backend for RestBackend {
    async fn fetch_candidates(&self, filter: &CandidateFilter) -> Result<Vec<Candidate>, BackendError> {
        let mut queries = Vec::new();
        if let Some(service) = &filter.service {
            queries.push(equal("category", service));
        }
        if let Some(city) = &filter.city {
            queries.push(equal("city", city));
        }

        let documents = self
            .list_documents(&self.collections.professionals, &queries)
            .await?;

        let total = documents.len();
        let candidates: Vec<Candidate> = documents
            .into_iter()
            .filter_map(Candidate::from_payload)
            .collect();

        if candidates.len() < total {
            tracing::warn!("Skipped {} professional records without an id", total - candidates.len());
        }

        Ok(candidates)
    }

    async fn fetch_pending_requests(&self, viewer_id: &str) -> Result<Vec<ConnectionRequest>, BackendError> {
        let queries = vec![equal("requesterId", viewer_id), equal("status", "pending")];
        let documents = self
            .list_documents(&self.collections.connection_requests, &queries)
            .await?;

        Ok(Self::decode_all(documents, "connection request"))
    }

    async fn fetch_connections(&self, viewer_id: &str) -> Result<Vec<Connection>, BackendError> {
        let queries = vec![format!(
            "or([{}, {}])",
            equal("requesterId", viewer_id),
            equal("professionalId", viewer_id)
        )];
        let documents = self
            .list_documents(&self.collections.connections, &queries)
            .await?;

        Ok(Self::decode_all(documents, "connection"))
    }

    async fn create_connection_request(
        &self,
        viewer_id: &str,
        professional_id: &str,
    ) -> Result<RequestOutcome, BackendError> {
        let payload = json!({
            "documentId": uuid::Uuid::new_v4().to_string(),
            "data": {
                "requesterId": viewer_id,
                "professionalId": professional_id,
                "status": "pending",
            }
        });

        let response = self
            .authorized(self.client.post(self.documents_url(&self.collections.connection_requests)))
            .json(&payload)
            .send()
            .await?;

        if response.status() == StatusCode::CONFLICT {
            tracing::debug!("Request {} -> {} already exists", viewer_id, professional_id);
            return Ok(RequestOutcome::AlreadyRequested);
        }

        check_status(response, &self.collections.connection_requests).await?;
        tracing::debug!("Created connection request: {} -> {}", viewer_id, professional_id);

        Ok(RequestOutcome::Created)
    }

    async fn cancel_connection_request(
        &self,
        viewer_id: &str,
        professional_id: &str,
    ) -> Result<RemovalOutcome, BackendError> {
        let Some(document_id) = self.find_pending_request(viewer_id, professional_id).await? else {
            return Ok(RemovalOutcome::AlreadyGone);
        };

        let url = self.document_url(&self.collections.connection_requests, &document_id);
        let response = self
            .authorized(self.client.patch(&url))
            .json(&json!({ "data": { "status": "cancelled" } }))
            .send()
            .await?;

        removal(check_status(response, &self.collections.connection_requests).await)
    }

    async fn remove_connection(&self, connection_id: &str) -> Result<RemovalOutcome, BackendError> {
        let url = self.document_url(&self.collections.connections, connection_id);
        let response = self.authorized(self.client.delete(&url)).send().await?;

        removal(check_status(response, &self.collections.connections).await)
    }

    async fn fetch_candidate_detail(&self, id: &str) -> Result<Candidate, BackendError> {
        let url = self.document_url(&self.collections.professionals, id);

        tracing::debug!("Fetching professional detail: {}", id);

        let response = self.authorized(self.client.get(&url)).send().await?;
        let response = check_status(response, &self.collections.professionals).await?;
        let doc: Value = response.json().await?;

        Candidate::from_payload(document_payload(&doc))
            .ok_or_else(|| BackendError::InvalidResponse(format!("Professional {} has no id", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn collections() -> BackendCollections {
        BackendCollections {
            professionals: "professionals".to_string(),
            connection_requests: "connection_requests".to_string(),
            connections: "connections".to_string(),
        }
    }

    fn backend(url: String) -> RestBackend {
        RestBackend::new(
            url,
            "test_key".to_string(),
            "test_project".to_string(),
            "test_db".to_string(),
            collections(),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_rest_backend_creation() {
        let client = backend("https://backend.test/v1/".to_string());

        assert_eq!(
            client.documents_url("professionals"),
            "https://backend.test/v1/databases/test_db/collections/professionals/documents"
        );
        assert_eq!(client.api_key, "test_key");
    }

    #[test]
    fn test_equal_query_escapes_value() {
        assert_eq!(equal("city", "Lagos"), r#"equal("city", ["Lagos"])"#);
        assert_eq!(equal("name", "a\"b"), r#"equal("name", ["a\"b"])"#);
    }

    #[tokio::test]
    async fn test_fetch_candidates_skips_records_without_id() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/databases/test_db/collections/professionals/documents")
            .match_query(Matcher::Any)
            .match_header("X-Appwrite-Key", "test_key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "total": 2,
                    "documents": [
                        { "$id": "pro-1", "name": "Ada", "category": "Electrician", "latitude": 6.5, "longitude": 3.3 },
                        { "name": "No id" }
                    ]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let candidates = backend(server.url())
            .fetch_candidates(&CandidateFilter {
                service: Some("Electrician".to_string()),
                city: None,
            })
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, "pro-1");
    }

    #[tokio::test]
    async fn test_create_request_conflict_is_already_requested() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/databases/test_db/collections/connection_requests/documents")
            .with_status(409)
            .with_body(r#"{"message":"Document already exists"}"#)
            .create_async()
            .await;

        let outcome = backend(server.url())
            .create_connection_request("viewer", "pro-1")
            .await
            .unwrap();

        assert_eq!(outcome, RequestOutcome::AlreadyRequested);
    }

    #[tokio::test]
    async fn test_remove_missing_connection_is_already_gone() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("DELETE", "/databases/test_db/collections/connections/documents/c1")
            .with_status(404)
            .create_async()
            .await;

        let outcome = backend(server.url()).remove_connection("c1").await.unwrap();
        assert_eq!(outcome, RemovalOutcome::AlreadyGone);
    }

    #[tokio::test]
    async fn test_server_error_is_surfaced() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/databases/test_db/collections/connections/documents")
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let result = backend(server.url()).fetch_connections("viewer").await;
        assert!(matches!(result, Err(BackendError::ApiError(_))));
    }

    #[tokio::test]
    async fn test_fetch_connections_reads_nested_documents() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/databases/test_db/collections/connections/documents")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                json!({
                    "documents": [
                        { "$id": "c1", "data": { "requesterId": "viewer", "professionalId": "pro-1" } },
                        { "$id": "c2", "requesterId": "viewer" }
                    ]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let connections = backend(server.url()).fetch_connections("viewer").await.unwrap();

        assert_eq!(connections.len(), 1);
        assert_eq!(connections[0].id, "c1");
        assert_eq!(connections[0].professional_id, "pro-1");
    }
}
