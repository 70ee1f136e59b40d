//! Firestore REST client (documents of one project's default database)

use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, instrument};

use super::{read_upstream, transport_error};
use crate::domain::value::Fields;
use crate::error::ApiError;

const SERVICE: &str = "Firestore";

/// Upper bound on pages fetched by [`FirestoreClient::list_all`]
const MAX_PAGES: usize = 50;

/// Field map of one document, or why it could not be decoded
pub type DecodedFields = Result<Fields, String>;

#[derive(Debug, Clone, Deserialize)]
pub struct Document {
    /// `projects/<p>/databases/(default)/documents/<collection>/<id>`
    pub name: String,
    /// Decoded per document so one unreadable value cannot fail a whole page
    #[serde(default = "no_fields", deserialize_with = "decode_fields")]
    pub fields: DecodedFields,
}

fn no_fields() -> DecodedFields {
    Ok(Fields::new())
}

fn decode_fields<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DecodedFields, D::Error> {
    let raw = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(raw).map_err(|e| e.to_string()))
}

impl Document {
    pub fn id(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPage {
    #[serde(default)]
    pub documents: Vec<Document>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Serialize)]
struct DocumentWrite<'a> {
    fields: &'a Fields,
}

#[derive(Clone)]
pub struct FirestoreClient {
    client: Client,
    base_url: String,
    project_id: String,
}

/// Document ids are single path segments
pub fn is_valid_document_id(id: &str) -> bool {
    !id.is_empty() && id != "." && id != ".." && !id.contains('/')
}

impl FirestoreClient {
    pub fn new(client: Client, base_url: &str, project_id: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            project_id: project_id.to_string(),
        }
    }

    fn collection_url(&self, collection: &str) -> String {
        format!(
            "{}/projects/{}/databases/(default)/documents/{}",
            self.base_url, self.project_id, collection
        )
    }

    /// One page of a collection. Requests run with the signed-in user's ID token so
    /// the project's security rules apply.
    #[instrument(skip(self, id_token))]
    pub async fn list_documents(
        &self,
        collection: &str,
        page_size: u32,
        page_token: Option<&str>,
        id_token: &str,
    ) -> Result<DocumentPage, ApiError> {
        let mut request = self
            .client
            .get(self.collection_url(collection))
            .bearer_auth(id_token)
            .query(&[("pageSize", page_size.to_string())]);

        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;

        let page: DocumentPage = read_upstream(response, SERVICE).await?;
        debug!(count = page.documents.len(), "Listed documents");
        Ok(page)
    }

    /// Every document in a collection
    pub async fn list_all(&self, collection: &str, id_token: &str) -> Result<Vec<Document>, ApiError> {
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let page = self
                .list_documents(collection, 300, page_token.as_deref(), id_token)
                .await?;
            documents.extend(page.documents);

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) => page_token = Some(next),
                None => return Ok(documents),
            }
        }

        tracing::warn!(collection, count = documents.len(), "Stopped listing after page limit");
        Ok(documents)
    }

    /// Overwrite the given fields of an existing document
    #[instrument(skip(self, fields, id_token))]
    pub async fn update_fields(
        &self,
        collection: &str,
        document_id: &str,
        fields: &Fields,
        id_token: &str,
    ) -> Result<Document, ApiError> {
        if !is_valid_document_id(document_id) {
            return Err(ApiError::BadRequest(format!(
                "Invalid document id: {document_id}"
            )));
        }

        let url = format!("{}/{}", self.collection_url(collection), document_id);

        let mut query: Vec<(&str, &str)> = fields
            .keys()
            .map(|key| ("updateMask.fieldPaths", key.as_str()))
            .collect();
        query.push(("currentDocument.exists", "true"));

        let response = self
            .client
            .patch(&url)
            .bearer_auth(id_token)
            .query(&query)
            .json(&DocumentWrite { fields })
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;

        read_upstream(response, SERVICE).await
    }
}
