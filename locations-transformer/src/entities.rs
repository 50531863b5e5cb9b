//! Published location entities and the lightweight links used to list them.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Key under which the base64-joined TME identifier is exposed.
pub const TME_AUTHORITY: &str = "TME";

/// Type tag of every entity produced by this service.
pub const LOCATION_TYPE: &str = "Location";

/// Type hierarchy, most general first.
pub const LOCATION_TYPES: [&str; 3] = ["Thing", "Concept", LOCATION_TYPE];

/// A canonical location. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub uuid: Uuid,
    pub alternative_identifiers: AlternativeIdentifiers,
    pub pref_label: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub types: Vec<String>,
}

impl Entity {
    /// Builds a location entity from its derived identifier.
    pub fn location(uuid: Uuid, tme_identifier: String, pref_label: String) -> Self {
        Self {
            uuid,
            alternative_identifiers: AlternativeIdentifiers {
                tme: vec![tme_identifier],
                uuids: vec![uuid],
            },
            pref_label,
            entity_type: LOCATION_TYPE.to_string(),
            types: LOCATION_TYPES.iter().map(|t| (*t).to_string()).collect(),
        }
    }
}

/// Identifiers under which the same location is known elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlternativeIdentifiers {
    #[serde(rename = "TME", default, skip_serializing_if = "Vec::is_empty")]
    pub tme: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub uuids: Vec<Uuid>,
}

/// Pointer to an entity, listed without fetching it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    #[serde(skip)]
    pub uuid: Uuid,
    #[serde(rename = "apiUrl")]
    pub api_url: String,
}

impl Link {
    /// `base_url` is used verbatim as the prefix, trailing slash included.
    pub fn new(base_url: &str, uuid: Uuid) -> Self {
        Self {
            uuid,
            api_url: format!("{base_url}{uuid}"),
        }
    }
}

/// One line of the `__ids` stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdRecord {
    pub id: Uuid,
}
