use crate::error::PipelineError;
use crate::keys::geohash;
use crate::keys::types::entity_id_from_pk;
use crate::search::tokenizer::keywords;
use crate::search::{GeoPoint, SearchDocument};
use crate::storage::{EventName, Item, StreamRecord};

use chrono::{DateTime, Utc};
use serde_json::Value;

/// The index call a mutation event turns into.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexAction {
    Upsert(SearchDocument),
    Delete(String),
}

pub fn to_action(record: &StreamRecord) -> Result<IndexAction, PipelineError> {
    match record.event_name {
        EventName::Insert | EventName::Modify => {
            let image = record.new_image.as_ref().ok_or_else(|| {
                PipelineError::Malformed(format!(
                    "{} event for {} has no new image",
                    record.event_name.as_str(),
                    record.keys.pk
                ))
            })?;
            to_document(&record.keys.pk, image, record.approximate_created_at)
                .map(IndexAction::Upsert)
        }
        EventName::Remove => document_id(&record.keys.pk).map(IndexAction::Delete),
    }
}

/// Search documents are keyed by entity id.
pub fn document_id(pk: &str) -> Result<String, PipelineError> {
    entity_id_from_pk(pk)
        .map(str::to_string)
        .ok_or_else(|| PipelineError::Malformed(format!("{:?} is not an entity key", pk)))
}

/// Projects a stored entity row onto the search document shape.
pub fn to_document(
    pk: &str,
    image: &Item,
    observed_at: DateTime<Utc>,
) -> Result<SearchDocument, PipelineError> {
    let entity_id = match text(image, "entityId") {
        Some(id) => id.to_string(),
        None => document_id(pk)?,
    };
    let name = text(image, "name")
        .ok_or_else(|| PipelineError::Malformed(format!("{} has no name", pk)))?
        .to_string();
    let studio_name = text(image, "studioName").map(str::to_string);
    let location = text(image, "location").unwrap_or_default().to_string();
    let handle = text(image, "handle").map(str::to_string);

    let styles: Vec<String> = image
        .get("styles")
        .and_then(Value::as_array)
        .map(|styles| {
            styles
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let search_keywords = keywords(
        std::iter::once(name.as_str())
            .chain(studio_name.as_deref())
            .chain(styles.iter().map(String::as_str))
            .chain(std::iter::once(location.as_str())),
    );

    let last_updated = text(image, "lastWrittenAt")
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|at| at.with_timezone(&Utc))
        .unwrap_or(observed_at);

    Ok(SearchDocument {
        id: entity_id.clone(),
        entity_id,
        name,
        studio_name,
        styles,
        location,
        geo_location: geo_point(image),
        handle,
        search_keywords,
        last_updated,
    })
}

/// Stored coordinates first, then the centre of the stored geohash cell.
fn geo_point(image: &Item) -> Option<GeoPoint> {
    let lat = image.get("latitude").and_then(Value::as_f64);
    let lon = image.get("longitude").and_then(Value::as_f64);
    if let (Some(lat), Some(lon)) = (lat, lon) {
        return Some(GeoPoint { lat, lon });
    }

    text(image, "geohash")
        .and_then(geohash::decode)
        .map(|(lat, lon)| GeoPoint { lat, lon })
}

fn text<'a>(image: &'a Item, attribute: &str) -> Option<&'a str> {
    image
        .get(attribute)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}
