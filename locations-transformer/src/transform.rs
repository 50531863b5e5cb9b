//! Raw term to canonical entity transformation.
//!
//! The entity identifier is a name-based (version 3) UUID computed over
//! `base64(source_id) + "-" + base64(namespace)`. The hash covers the name bytes only,
//! with no namespace UUID prefix, which keeps identifiers compatible with the ones
//! already published downstream.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use md5::{Digest, Md5};
use uuid::{Builder, Uuid};

use crate::entities::Entity;
use crate::error::{FetcherError, Result};
use crate::record::RawRecord;

/// Turns raw records into entities. Implementations must be pure.
pub trait Transformer: Send + Sync {
    /// Transforms one record. An `Err` means the record is skipped, never that the
    /// batch is aborted.
    fn transform(&self, record: &RawRecord, namespace: &str) -> Result<Entity>;
}

/// The TME location transformer.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocationTransformer;

impl Transformer for LocationTransformer {
    fn transform(&self, record: &RawRecord, namespace: &str) -> Result<Entity> {
        let source_id = mandatory(record.id.as_deref(), "id")?;
        let label = mandatory(record.name.as_deref(), "name")?;

        let tme_identifier = tme_identifier(source_id, namespace);
        let uuid = derive_uuid(&tme_identifier);

        Ok(Entity::location(uuid, tme_identifier, label.to_string()))
    }
}

fn mandatory<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(FetcherError::RecordSkipped {
            reason: format!("missing {field}"),
        }),
    }
}

/// `base64(source_id)-base64(namespace)`, kept on the entity for traceability.
pub fn tme_identifier(source_id: &str, namespace: &str) -> String {
    format!(
        "{}-{}",
        STANDARD.encode(source_id.as_bytes()),
        STANDARD.encode(namespace.as_bytes())
    )
}

/// Name-based UUID over the TME identifier.
pub fn derive_uuid(tme_identifier: &str) -> Uuid {
    let digest: [u8; 16] = Md5::digest(tme_identifier.as_bytes()).into();
    Builder::from_md5_bytes(digest).into_uuid()
}
