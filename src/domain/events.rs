//! Event documents: shape validation and normalization for display
//!
//! Stored events are loosely typed. [`validate_raw_event`] checks a document's fields and
//! produces a typed [`RawEvent`]; [`parse_event`] turns that into the display form, resolving
//! images and collapsing the start/end timestamps into one ISO-8601 interval.

use chrono::{DateTime, SecondsFormat, Utc};
use futures::future::try_join_all;
use serde::Serialize;
use thiserror::Error;

use super::images::{parse_image, DownloadableImage, FirestoreImage, ImageError, ImageResolver};
use super::value::{present, Fields, FirestoreValue};

/// A field that holds either one value or a list of them
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn as_slice(&self) -> &[T] {
        match self {
            Self::One(item) => std::slice::from_ref(item),
            Self::Many(items) => items,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventLink {
    pub text: String,
    pub url: String,
}

/// Event document as stored, after validation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<OneOrMany<FirestoreImage>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<OneOrMany<EventLink>>,
}

/// Event in display form
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedEvent {
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<OneOrMany<DownloadableImage>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// `start/end`, absent when end precedes start
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<OneOrMany<EventLink>>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventValidationError {
    #[error("no document data")]
    MissingDocument,

    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("field `{field}` must be a {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },

    #[error("field `image` is not a valid image{}", index_suffix(.0))]
    InvalidImage(Option<usize>),

    #[error("field `link` is not a valid link{}", index_suffix(.0))]
    InvalidLink(Option<usize>),
}

fn index_suffix(index: &Option<usize>) -> String {
    index.map(|i| format!(" (entry {i})")).unwrap_or_default()
}

/// Check that a value is a `{text, url}` map with both entries non-null strings.
pub fn validate_link(value: &FirestoreValue) -> bool {
    link_from_value(value).is_some()
}

fn link_from_value(value: &FirestoreValue) -> Option<EventLink> {
    let fields = value.as_map()?;
    Some(EventLink {
        text: present(fields, "text")?.as_str()?.to_string(),
        url: present(fields, "url")?.as_str()?.to_string(),
    })
}

fn required_string(fields: &Fields, field: &'static str) -> Result<String, EventValidationError> {
    present(fields, field)
        .ok_or(EventValidationError::MissingField(field))?
        .as_str()
        .map(str::to_string)
        .ok_or(EventValidationError::WrongType {
            field,
            expected: "string",
        })
}

fn optional_string(
    fields: &Fields,
    field: &'static str,
) -> Result<Option<String>, EventValidationError> {
    present(fields, field)
        .map(|v| {
            v.as_str().map(str::to_string).ok_or(EventValidationError::WrongType {
                field,
                expected: "string",
            })
        })
        .transpose()
}

fn optional_timestamp(
    fields: &Fields,
    field: &'static str,
) -> Result<Option<DateTime<Utc>>, EventValidationError> {
    present(fields, field)
        .map(|v| {
            v.as_timestamp().ok_or(EventValidationError::WrongType {
                field,
                expected: "timestamp",
            })
        })
        .transpose()
}

/// Read a one-or-many field, converting each entry with `convert`.
/// `invalid` builds the error for a bad entry (`None` for the single form).
fn one_or_many<T>(
    value: Option<&FirestoreValue>,
    convert: impl Fn(&FirestoreValue) -> Option<T>,
    invalid: impl Fn(Option<usize>) -> EventValidationError,
) -> Result<Option<OneOrMany<T>>, EventValidationError> {
    let Some(value) = value else {
        return Ok(None);
    };

    match value.as_array() {
        Some(entries) => entries
            .iter()
            .enumerate()
            .map(|(i, entry)| convert(entry).ok_or_else(|| invalid(Some(i))))
            .collect::<Result<Vec<_>, _>>()
            .map(|items| Some(OneOrMany::Many(items))),
        None => convert(value)
            .map(|item| Some(OneOrMany::One(item)))
            .ok_or_else(|| invalid(None)),
    }
}

/// Validate a stored event document.
///
/// Any field failing its check fails the whole document.
pub fn validate_raw_event(document: Option<&Fields>) -> Result<RawEvent, EventValidationError> {
    let fields = document.ok_or(EventValidationError::MissingDocument)?;

    let title = required_string(fields, "title")?;
    let description = required_string(fields, "description")?;

    let image = one_or_many(
        present(fields, "image"),
        FirestoreImage::from_value,
        EventValidationError::InvalidImage,
    )?;

    let address = optional_string(fields, "address")?;
    let start_time = optional_timestamp(fields, "startTime")?;
    let end_time = optional_timestamp(fields, "endTime")?;

    let link = one_or_many(
        present(fields, "link"),
        link_from_value,
        EventValidationError::InvalidLink,
    )?;

    Ok(RawEvent {
        title,
        description,
        image,
        address,
        start_time,
        end_time,
        link,
    })
}

pub fn is_raw_event(document: Option<&Fields>) -> bool {
    validate_raw_event(document).is_ok()
}

/// Format `[start, end)` as an ISO-8601 interval.
///
/// Missing boundaries are the Unix epoch. Returns `None` when the interval is invalid
/// (end before start).
pub fn display_interval(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Option<String> {
    let start = start.unwrap_or_default();
    let end = end.unwrap_or_default();

    if end < start {
        return None;
    }

    Some(format!(
        "{}/{}",
        start.to_rfc3339_opts(SecondsFormat::Millis, true),
        end.to_rfc3339_opts(SecondsFormat::Millis, true)
    ))
}

/// Convert a validated event into its display form.
///
/// Every image must resolve; results keep the stored order.
pub async fn parse_event<R: ImageResolver>(
    event: &RawEvent,
    resolver: &R,
) -> Result<ParsedEvent, ImageError> {
    let image = match &event.image {
        None => None,
        Some(OneOrMany::One(image)) => Some(OneOrMany::One(parse_image(image, resolver).await?)),
        Some(OneOrMany::Many(images)) => Some(OneOrMany::Many(
            try_join_all(images.iter().map(|image| parse_image(image, resolver))).await?,
        )),
    };

    Ok(ParsedEvent {
        title: event.title.clone(),
        description: event.description.clone(),
        image,
        address: event.address.clone(),
        interval: display_interval(event.start_time, event.end_time),
        link: event.link.clone(),
    })
}
