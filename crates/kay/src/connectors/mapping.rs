//! Index mapping templates and index/alias naming.
//!
//! Items are stored with dynamic mapping disabled: only the metadata fields
//! listed here are indexed, while `data` is kept as an opaque object so that
//! arbitrary nested payloads cannot blow up the index mapping.

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use tracing::warn;

/// Raw items produced by Perceval.
pub const PERCEVAL_TYPE: &str = "perceval";
/// Enriched items produced by Galahad.
pub const GALAHAD_TYPE: &str = "galahad";
/// Raw items produced by Graal.
pub const GRAAL_TYPE: &str = "graal";

/// Item kinds with a dedicated mapping.
pub const SUPPORTED_TYPES: [&str; 3] = [PERCEVAL_TYPE, GALAHAD_TYPE, GRAAL_TYPE];

/// Alias shared by every index holding raw items.
pub const ALIAS_RAW: &str = "raw-items";
/// Alias shared by every index holding enriched items.
pub const ALIAS_ENRICH: &str = "enrich-items";

/// Timestamp suffix of generated index names.
const INDEX_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Returns the alias items of this kind are published under.
#[must_use]
pub fn alias_for(items_type: &str) -> &'static str {
    match items_type {
        PERCEVAL_TYPE | GRAAL_TYPE => ALIAS_RAW,
        _ => ALIAS_ENRICH,
    }
}

/// Builds a fresh index name for this kind at the given instant.
#[must_use]
pub fn index_name_at(items_type: &str, at: DateTime<Utc>) -> String {
    format!(
        "{}_{}",
        alias_for(items_type),
        at.format(INDEX_TIMESTAMP_FORMAT)
    )
}

/// Builds a fresh index name for this kind using the current UTC time.
#[must_use]
pub fn index_name(items_type: &str) -> String {
    index_name_at(items_type, Utc::now())
}

/// Whether this kind has a dedicated mapping.
#[must_use]
pub fn is_supported(items_type: &str) -> bool {
    SUPPORTED_TYPES.contains(&items_type)
}

/// Indexed fields for a supported kind.
fn properties_for(items_type: &str) -> Option<Map<String, Value>> {
    let version_field = match items_type {
        PERCEVAL_TYPE => "perceval_version",
        GALAHAD_TYPE => "galahad_version",
        GRAAL_TYPE => "graal_version",
        _ => return None,
    };

    let mut properties = Map::new();
    for field in [
        "backend_name",
        "backend_version",
        "category",
        "origin",
        "tag",
        "uuid",
        version_field,
    ] {
        properties.insert(field.to_string(), json!({ "type": "keyword" }));
    }
    for field in ["timestamp", "updated_on"] {
        properties.insert(field.to_string(), json!({ "type": "long" }));
    }
    properties.insert("data".to_string(), json!({ "properties": {} }));

    if items_type == GALAHAD_TYPE {
        properties.insert("perceval_uuid".to_string(), json!({ "type": "keyword" }));
    }

    Some(properties)
}

/// Index creation body for a kind.
///
/// Unknown kinds get a mapping with no indexed fields. With `legacy_types`
/// the mapping is nested under the kind, as mapping types require.
#[must_use]
pub fn index_body(items_type: &str, legacy_types: bool) -> Value {
    let properties = properties_for(items_type).unwrap_or_else(|| {
        warn!("Items mapping {} unknown, setting default mapping", items_type);
        Map::new()
    });

    let mapping = json!({
        "dynamic": false,
        "properties": properties,
    });

    if legacy_types {
        json!({ "mappings": { items_type: mapping } })
    } else {
        json!({ "mappings": mapping })
    }
}
