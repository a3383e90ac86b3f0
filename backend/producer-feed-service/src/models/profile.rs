//! Account profiles as read from the partition documents.
//!
//! Venue and user documents were written by several generations of clients, so the same
//! fact can sit under different field names. Everything is normalized here, once, so the
//! scoring code only ever sees one shape.

use serde_json::Value;
use std::collections::BTreeSet;

use super::{AccountKind, AccountRef, GeoPoint};

const NAME_FIELDS: &[&str] = &["name", "username", "title"];
const AVATAR_FIELDS: &[&str] = &["photo", "photo_url", "profilePicture", "avatar"];
const VENUE_TAG_FIELDS: &[&str] = &[
    "category",
    "cuisine_type",
    "specialties",
    "types",
    "services",
    "activities",
];
const USER_TAG_FIELDS: &[&str] = &["interests", "liked_tags"];
const VENUE_FOLLOW_FIELDS: &[&str] = &["followers", "following"];
const USER_FOLLOW_FIELDS: &[&str] = &["following"];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountProfile {
    pub id: String,
    pub display_name: Option<String>,
    pub avatar: Option<String>,
    pub location: Option<GeoPoint>,
    /// Lower-cased, de-duplicated profile tags
    pub tags: Vec<String>,
    /// `None` when the document has no follow list at all
    pub follow_list: Option<Vec<String>>,
}

impl AccountProfile {
    pub fn from_document(account: &AccountRef, doc: &Value) -> Self {
        let (tag_fields, follow_fields) = match account.kind {
            AccountKind::User => (USER_TAG_FIELDS, USER_FOLLOW_FIELDS),
            AccountKind::Venue(_) => (VENUE_TAG_FIELDS, VENUE_FOLLOW_FIELDS),
        };

        Self {
            id: account.id.clone(),
            display_name: first_string(doc, NAME_FIELDS),
            avatar: first_string(doc, AVATAR_FIELDS),
            location: extract_location(doc),
            tags: normalize_tags(tag_fields.iter().filter_map(|field| doc.get(*field))),
            follow_list: first_id_list(doc, follow_fields),
        }
    }
}

fn first_string(doc: &Value, fields: &[&str]) -> Option<String> {
    fields
        .iter()
        .filter_map(|field| doc.get(*field).and_then(Value::as_str))
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

fn first_id_list(doc: &Value, fields: &[&str]) -> Option<Vec<String>> {
    fields.iter().find_map(|field| {
        doc.get(*field).and_then(Value::as_array).map(|ids| {
            ids.iter()
                .filter_map(|id| match id {
                    Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                    // {"$oid": "..."} exports
                    Value::Object(map) => map.get("$oid").and_then(Value::as_str).map(str::to_string),
                    _ => None,
                })
                .collect()
        })
    })
}

/// Flatten string / list-of-string fields into one lower-cased, de-duplicated tag set
pub(crate) fn normalize_tags<'a>(values: impl Iterator<Item = &'a Value>) -> Vec<String> {
    let mut tags = BTreeSet::new();
    for value in values {
        match value {
            Value::String(s) => insert_tag(&mut tags, s),
            Value::Array(items) => {
                for item in items.iter().filter_map(Value::as_str) {
                    insert_tag(&mut tags, item);
                }
            }
            _ => {}
        }
    }
    tags.into_iter().collect()
}

fn insert_tag(tags: &mut BTreeSet<String>, raw: &str) {
    let tag = raw.trim().to_lowercase();
    if !tag.is_empty() {
        tags.insert(tag);
    }
}

/// First location convention that yields valid coordinates wins
fn extract_location(doc: &Value) -> Option<GeoPoint> {
    // GeoJSON style [lng, lat]
    let geojson = ["gps_coordinates", "location"].iter().find_map(|field| {
        let coords = doc.get(*field)?.get("coordinates")?.as_array()?;
        match coords.as_slice() {
            [lng, lat, ..] => GeoPoint::new(lat.as_f64()?, lng.as_f64()?),
            _ => None,
        }
    });
    if geojson.is_some() {
        return geojson;
    }

    // Places-API style {"geometry": {"location": {"lat", "lng"}}}
    if let Some(point) = doc
        .get("geometry")
        .and_then(|g| g.get("location"))
        .and_then(|loc| lat_lng(loc, "lat", "lng"))
    {
        return Some(point);
    }

    lat_lng(doc, "latitude", "longitude").or_else(|| lat_lng(doc, "lat", "lng"))
}

fn lat_lng(value: &Value, lat_field: &str, lng_field: &str) -> Option<GeoPoint> {
    let lat = number(value.get(lat_field)?)?;
    let lng = number(value.get(lng_field)?)?;
    GeoPoint::new(lat, lng)
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
