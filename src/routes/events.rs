use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::{Data, Page, PageParams};
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::events::{parse_event, validate_raw_event, ParsedEvent, RawEvent};
use crate::domain::grid::{
    apply_edit, event_row, sort_rows, GridColumn, GridRow, DEFAULT_SORT_FIELD, EVENT_COLUMNS,
};
use crate::domain::nav::EVENT_CONSOLE_PATH;
use crate::domain::value::Fields;
use crate::error::ApiResult;
use crate::services::firestore::Document;

#[derive(Debug, Serialize)]
pub struct EventItem {
    pub id: String,
    #[serde(flatten)]
    pub event: ParsedEvent,
}

#[derive(Debug, Serialize)]
pub struct EventGrid {
    pub collection: String,
    pub default_sort_field: &'static str,
    pub columns: &'static [GridColumn],
    pub rows: Vec<GridRow>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct EditRequest {
    pub field: String,
    pub value: serde_json::Value,
}

/// Split documents into valid events and the ids of those that fail validation
fn validate_documents(collection: &str, documents: Vec<Document>) -> (Vec<(String, RawEvent)>, Vec<String>) {
    let mut valid = Vec::with_capacity(documents.len());
    let mut skipped = Vec::new();

    for document in documents {
        let id = document.id().to_string();
        let checked = document
            .fields
            .and_then(|fields| validate_raw_event(Some(&fields)).map_err(|e| e.to_string()));

        match checked {
            Ok(event) => valid.push((id, event)),
            Err(error) => {
                tracing::warn!(collection, document_id = %id, %error, "Skipping invalid event");
                skipped.push(id);
            }
        }
    }

    (valid, skipped)
}

/// List one page of events in display form
pub async fn list_events(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Query(params): Query<PageParams>,
) -> ApiResult<Page<EventItem>> {
    auth.require_route(EVENT_CONSOLE_PATH)?;
    let id_token = auth.id_token().await?;
    let collection = &state.settings.events_collection;

    let page = state
        .firestore
        .list_documents(collection, params.page_size(), params.page_token(), &id_token)
        .await?;

    let (valid, mut skipped) = validate_documents(collection, page.documents);

    let storage = state.storage.authorized(&id_token);
    let parsed = join_all(valid.iter().map(|(_, event)| parse_event(event, &storage))).await;

    let mut data = Vec::with_capacity(parsed.len());
    for ((id, _), result) in valid.into_iter().zip(parsed) {
        match result {
            Ok(event) => data.push(EventItem { id, event }),
            Err(e) => {
                tracing::warn!(document_id = %id, error = %e, "Skipping event with unresolvable image");
                skipped.push(id);
            }
        }
    }

    Ok(Page {
        data,
        next_page_token: page.next_page_token.filter(|t| !t.is_empty()),
        skipped,
    })
}

/// Every event as a grid row, ordered by start time
pub async fn events_grid(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<EventGrid>> {
    auth.require_route(EVENT_CONSOLE_PATH)?;
    let id_token = auth.id_token().await?;
    let collection = &state.settings.events_collection;

    let documents = state.firestore.list_all(collection, &id_token).await?;
    let (valid, skipped) = validate_documents(collection, documents);

    let mut rows: Vec<GridRow> = valid
        .iter()
        .map(|(id, event)| event_row(id.as_str(), event))
        .collect();
    sort_rows(&mut rows);

    Ok(Json(EventGrid {
        collection: collection.clone(),
        default_sort_field: DEFAULT_SORT_FIELD,
        columns: EVENT_COLUMNS,
        rows,
        skipped,
    }))
}

/// Save one inline grid edit
///
/// Responds with the updated row, or `null` when the stored document no longer validates.
pub async fn update_event(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<String>,
    Json(req): Json<EditRequest>,
) -> ApiResult<Data<Option<GridRow>>> {
    auth.require_route(EVENT_CONSOLE_PATH)?;

    let (field, value) = apply_edit(&req.field, &req.value, Utc::now())?;
    let id_token = auth.id_token().await?;
    let collection = &state.settings.events_collection;

    let mut fields = Fields::new();
    fields.insert(field.to_string(), value);

    let document = state
        .firestore
        .update_fields(collection, &event_id, &fields, &id_token)
        .await?;

    tracing::info!(uid = %auth.uid, document_id = %event_id, field, "Event updated");

    let checked = document
        .fields
        .as_ref()
        .map_err(String::clone)
        .and_then(|fields| validate_raw_event(Some(fields)).map_err(|e| e.to_string()));

    match checked {
        Ok(event) => Ok(Data::new(Some(event_row(document.id(), &event)))),
        Err(error) => {
            tracing::warn!(document_id = %event_id, %error, "Edited event no longer validates");
            Ok(Data::new(None))
        }
    }
}
