//! Column schema and cell rendering for the events grid
//!
//! The console's generic collection grid is driven entirely by this schema: which field each
//! column shows, how a stored value renders, and how an inline edit is written back.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

use super::events::RawEvent;
use super::images::FirestoreImage;
use super::value::FirestoreValue;

pub const EVENTS_COLLECTION: &str = "events";
pub const DEFAULT_SORT_FIELD: &str = "startTime";
pub const IMAGE_CELL_HEIGHT: u32 = 160;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ColumnType {
    String,
    DateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum CellRenderer {
    Plain,
    Links,
    Image { height: u32 },
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GridColumn {
    pub field: &'static str,
    pub header_name: &'static str,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    pub renderer: CellRenderer,
    pub editable: bool,
    pub flex: f32,
}

pub const EVENT_COLUMNS: &[GridColumn] = &[
    GridColumn {
        field: "title",
        header_name: "Title",
        column_type: ColumnType::String,
        renderer: CellRenderer::Plain,
        editable: true,
        flex: 1.0,
    },
    GridColumn {
        field: "startTime",
        header_name: "Start Time",
        column_type: ColumnType::DateTime,
        renderer: CellRenderer::Plain,
        editable: true,
        flex: 1.0,
    },
    GridColumn {
        field: "endTime",
        header_name: "End Time",
        column_type: ColumnType::DateTime,
        renderer: CellRenderer::Plain,
        editable: true,
        flex: 1.0,
    },
    GridColumn {
        field: "address",
        header_name: "Address",
        column_type: ColumnType::String,
        renderer: CellRenderer::Plain,
        editable: true,
        flex: 2.0,
    },
    GridColumn {
        field: "link",
        header_name: "Link",
        column_type: ColumnType::String,
        renderer: CellRenderer::Links,
        editable: false,
        flex: 1.8,
    },
    GridColumn {
        field: "description",
        header_name: "Description",
        column_type: ColumnType::String,
        renderer: CellRenderer::Plain,
        editable: true,
        flex: 3.0,
    },
    GridColumn {
        field: "image",
        header_name: "Image",
        column_type: ColumnType::String,
        renderer: CellRenderer::Image {
            height: IMAGE_CELL_HEIGHT,
        },
        editable: false,
        flex: 3.0,
    },
];

pub fn column(field: &str) -> Option<&'static GridColumn> {
    EVENT_COLUMNS.iter().find(|c| c.field == field)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Anchor {
    pub text: String,
    pub href: String,
    pub target: &'static str,
    pub rel: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageCell {
    pub src: String,
    pub alt: String,
    pub is_storage_uri: bool,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "value")]
pub enum GridCell {
    Empty,
    Text(String),
    DateTime(DateTime<Utc>),
    Links(Vec<Anchor>),
    Images(Vec<ImageCell>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridRow {
    pub id: String,
    pub cells: BTreeMap<&'static str, GridCell>,
}

impl GridRow {
    fn sort_key(&self) -> Option<DateTime<Utc>> {
        match self.cells.get(DEFAULT_SORT_FIELD) {
            Some(GridCell::DateTime(ts)) => Some(*ts),
            _ => None,
        }
    }
}

fn text_cell(value: Option<&String>) -> GridCell {
    value.map_or(GridCell::Empty, |s| GridCell::Text(s.clone()))
}

fn date_cell(value: Option<DateTime<Utc>>) -> GridCell {
    value.map_or(GridCell::Empty, GridCell::DateTime)
}

/// The console labels grid images with their `title`, falling back to `alt`
fn image_cell(image: &FirestoreImage) -> ImageCell {
    ImageCell {
        src: image.uri.clone(),
        alt: image
            .title
            .as_ref()
            .or(image.alt.as_ref())
            .cloned()
            .unwrap_or_default(),
        is_storage_uri: image.is_storage_uri(),
        height: IMAGE_CELL_HEIGHT,
    }
}

/// Render one event as a grid row keyed by column field.
pub fn event_row(id: impl Into<String>, event: &RawEvent) -> GridRow {
    let cells = EVENT_COLUMNS
        .iter()
        .map(|column| {
            let cell = match column.field {
                "title" => GridCell::Text(event.title.clone()),
                "description" => GridCell::Text(event.description.clone()),
                "address" => text_cell(event.address.as_ref()),
                "startTime" => date_cell(event.start_time),
                "endTime" => date_cell(event.end_time),
                "link" => event.link.as_ref().map_or(GridCell::Empty, |links| {
                    GridCell::Links(
                        links
                            .as_slice()
                            .iter()
                            .map(|link| Anchor {
                                text: link.text.clone(),
                                href: link.url.clone(),
                                target: "_blank",
                                rel: "noreferrer",
                            })
                            .collect(),
                    )
                }),
                "image" => event.image.as_ref().map_or(GridCell::Empty, |images| {
                    GridCell::Images(images.as_slice().iter().map(image_cell).collect())
                }),
                _ => GridCell::Empty,
            };
            (column.field, cell)
        })
        .collect();

    GridRow {
        id: id.into(),
        cells,
    }
}

/// Order rows by the default sort field, rows without a start time first.
pub fn sort_rows(rows: &mut [GridRow]) {
    rows.sort_by_key(GridRow::sort_key);
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GridEditError {
    #[error("unknown column `{0}`")]
    UnknownColumn(String),

    #[error("column `{0}` is not editable")]
    NotEditable(&'static str),

    #[error("column `{0}` expects a string")]
    ExpectedString(&'static str),

    #[error("column `{0}` expects an RFC 3339 date")]
    ExpectedDate(&'static str),
}

fn parse_date(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Convert an inline cell edit into the stored field value.
///
/// `startTime` stores `now` when the edit is not a date; `endTime` rejects it.
pub fn apply_edit(
    field: &str,
    value: &serde_json::Value,
    now: DateTime<Utc>,
) -> Result<(&'static str, FirestoreValue), GridEditError> {
    let column = column(field).ok_or_else(|| GridEditError::UnknownColumn(field.to_string()))?;

    if !column.editable {
        return Err(GridEditError::NotEditable(column.field));
    }

    let stored = match (column.field, column.column_type) {
        ("startTime", _) => FirestoreValue::timestamp(parse_date(value).unwrap_or(now)),
        (name, ColumnType::DateTime) => {
            FirestoreValue::timestamp(parse_date(value).ok_or(GridEditError::ExpectedDate(name))?)
        }
        (name, ColumnType::String) => FirestoreValue::string(
            value.as_str().ok_or(GridEditError::ExpectedString(name))?,
        ),
    };

    Ok((column.field, stored))
}
