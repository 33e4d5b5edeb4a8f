// Built-in property maps for the domain collections.

use chrono::{DateTime, FixedOffset};
use serde_json::Value;

use super::{PropertyMap, lookup};

/// `dateFrom` / `dateTo` bounds on the entity timestamp at `entity_field`.
///
/// Bounds are RFC 3339. `dateFrom` is inclusive, `dateTo` exclusive. An
/// absent bound is open; with any bound present, entities without a
/// parseable timestamp never match.
pub fn date_range(entity_field: &str) -> PropertyMap {
    let field = entity_field.to_owned();
    PropertyMap::new(["dateFrom", "dateTo"], move |values, entity| {
        let from = values.first().copied().flatten();
        let to = values.get(1).copied().flatten();
        if from.is_none() && to.is_none() {
            return true;
        }

        let Some(at) = lookup(entity, &field).and_then(parse_time) else {
            return false;
        };
        let after_from = from.and_then(parse_time).is_none_or(|from| at >= from);
        let before_to = to.and_then(parse_time).is_none_or(|to| at < to);
        after_from && before_to
    })
    .reading([entity_field])
}

/// `source` filter value (an id, or an object carrying `id`) against the
/// entity's `source.id`.
pub fn source_id() -> PropertyMap {
    PropertyMap::new(["source"], |values, entity| {
        let Some(wanted) = values.first().copied().flatten() else {
            return true;
        };
        let wanted = wanted.get("id").unwrap_or(wanted);
        match (id_string(wanted), lookup(entity, "source.id").and_then(id_string)) {
            (Some(wanted), Some(actual)) => wanted == actual,
            _ => false,
        }
    })
}

fn parse_time(value: &Value) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(value.as_str()?).ok()
}

/// Ids travel as strings or numbers depending on the producer.
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
