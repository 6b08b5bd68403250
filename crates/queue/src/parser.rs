//! Find the scene a queue message body refers to.

use serde_json::{Map, Value};

use gapfill_core::{BackfillRequest, SceneKey};

/// Well-known field names carrying a scene id.
const SCENE_ID_KEYS: &[&str] = &[
    "scene_id", "sceneId",
    "display_id", "product_id", "productId",
    "id",
];

/// Well-known field names carrying an object key or URI that contains a scene id.
const PATH_KEYS: &[&str] = &["key", "stac_key", "uri", "source_uri", "path", "href"];

/// Parse a message body into the scene it refers to.
///
/// Accepted shapes, tried in order:
/// - a [`BackfillRequest`] as published by the dispatcher,
/// - an SNS envelope whose `Message` string holds one of these shapes,
/// - an S3 event notification (`Records[].s3.object.key`),
/// - any object carrying a scene id or object key under a well-known field,
/// - a bare scene id or object key as plain text.
///
/// Returns `None` when nothing in the body identifies a scene.
pub fn parse_scene_reference(body: &str) -> Option<SceneKey> {
    match serde_json::from_str::<Value>(body) {
        Ok(value) => scene_from_value(&value, 0),
        Err(_) => scene_from_text(body),
    }
}

fn scene_from_text(text: &str) -> Option<SceneKey> {
    let text = text.trim();
    if text.contains('/') {
        SceneKey::from_object_path(text).ok()
    } else {
        SceneKey::parse_scene_id(text).ok()
    }
}

fn scene_from_value(value: &Value, depth: u8) -> Option<SceneKey> {
    // Bound envelope nesting.
    if depth > 3 {
        return None;
    }
    match value {
        Value::Object(obj) => scene_from_object(obj, depth),
        Value::String(s) => scene_from_text(s),
        _ => None,
    }
}

fn scene_from_object(obj: &Map<String, Value>, depth: u8) -> Option<SceneKey> {
    if let Ok(request) = serde_json::from_value::<BackfillRequest>(Value::Object(obj.clone())) {
        return Some(request.scene);
    }

    if let Some(inner) = obj.get("Message").and_then(Value::as_str) {
        return match serde_json::from_str::<Value>(inner) {
            Ok(value) => scene_from_value(&value, depth + 1),
            Err(_) => scene_from_text(inner),
        };
    }

    if let Some(records) = obj.get("Records").and_then(Value::as_array) {
        return records.iter().find_map(|record| {
            record
                .pointer("/s3/object/key")
                .and_then(Value::as_str)
                .and_then(|key| SceneKey::from_object_path(key).ok())
        });
    }

    SCENE_ID_KEYS
        .iter()
        .filter_map(|k| obj.get(*k).and_then(Value::as_str))
        .find_map(|id| SceneKey::parse_scene_id(id).ok())
        .or_else(|| {
            PATH_KEYS
                .iter()
                .filter_map(|k| obj.get(*k).and_then(Value::as_str))
                .find_map(|path| SceneKey::from_object_path(path).ok())
        })
}
