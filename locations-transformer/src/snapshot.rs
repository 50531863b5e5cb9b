//! Immutable generations of the cached dataset.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::entities::{Entity, Link};
use crate::error::Result;
use crate::record::RawRecord;
use crate::transform::Transformer;

/// One fully built generation: entities by id plus the ordered link list.
///
/// Never mutated after construction.
#[derive(Debug, Clone)]
pub struct Snapshot {
    id_to_entity: HashMap<Uuid, Entity>,
    links: Vec<Link>,
    generation: u64,
    published_at: DateTime<Utc>,
    skipped: usize,
}

impl Snapshot {
    pub fn get(&self, id: &Uuid) -> Option<&Entity> {
        self.id_to_entity.get(id)
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn ids(&self) -> impl Iterator<Item = &Uuid> {
        self.id_to_entity.keys()
    }

    /// Size of the link list.
    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn published_at(&self) -> DateTime<Utc> {
        self.published_at
    }

    /// Records left out of this generation by the transformer.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

/// Applies the transformer to a record stream and assembles a [`Snapshot`].
#[derive(Clone)]
pub struct SnapshotBuilder {
    transformer: Arc<dyn Transformer>,
    namespace: String,
    base_url: String,
}

impl SnapshotBuilder {
    pub fn new(
        transformer: Arc<dyn Transformer>,
        namespace: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            transformer,
            namespace: namespace.into(),
            base_url: base_url.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Builds generation `generation` from `records`.
    ///
    /// Records the transformer rejects are counted and skipped. Later records with an
    /// already seen identifier replace the earlier entity; every transformed record still
    /// contributes one link. Only an error item in the stream itself fails the build.
    pub fn build<I>(&self, records: I, generation: u64) -> Result<(Snapshot, usize)>
    where
        I: IntoIterator<Item = Result<RawRecord>>,
    {
        let records = records.into_iter();
        let (lower, _) = records.size_hint();
        let mut id_to_entity = HashMap::with_capacity(lower);
        let mut links = Vec::with_capacity(lower);
        let mut skipped = 0;

        for record in records {
            let record = record?;
            match self.transformer.transform(&record, &self.namespace) {
                Ok(entity) => {
                    links.push(Link::new(&self.base_url, entity.uuid));
                    id_to_entity.insert(entity.uuid, entity);
                }
                Err(e) => {
                    debug!(error = %e, source_id = ?record.id, "Skipping record");
                    skipped += 1;
                }
            }
        }

        let snapshot = Snapshot {
            id_to_entity,
            links,
            generation,
            published_at: Utc::now(),
            skipped,
        };
        Ok((snapshot, skipped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetcherError;
    use crate::transform::LocationTransformer;

    const BASE_URL: &str = "http://localhost:8080/transformers/locations/";

    fn builder() -> SnapshotBuilder {
        SnapshotBuilder::new(Arc::new(LocationTransformer), "GL", BASE_URL)
    }

    #[test]
    fn test_build_single_record() {
        let records = vec![Ok(RawRecord::new(
            "Nstein_GL_US_NY_Municipality_942968",
            "Banksville, New York",
        ))];

        let (snapshot, skipped) = builder().build(records, 1).unwrap();

        assert_eq!(skipped, 0);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.generation(), 1);
        assert_eq!(
            snapshot.links()[0].api_url,
            "http://localhost:8080/transformers/locations/095b89cd-4d4c-3195-ba78-e366fbe47291"
        );

        let id = Uuid::parse_str("095b89cd-4d4c-3195-ba78-e366fbe47291").unwrap();
        assert_eq!(snapshot.get(&id).unwrap().pref_label, "Banksville, New York");
    }

    #[test]
    fn test_malformed_records_are_counted_not_fatal() {
        let records = vec![
            Ok(RawRecord::new("a", "A")),
            Ok(RawRecord::default()),
            Ok(RawRecord {
                id: Some("c".to_string()),
                ..Default::default()
            }),
            Ok(RawRecord::new("d", "D")),
        ];

        let (snapshot, skipped) = builder().build(records, 1).unwrap();

        assert_eq!(skipped, 2);
        assert_eq!(snapshot.skipped(), 2);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.ids().count(), 2);
    }

    #[test]
    fn test_duplicate_ids_last_write_wins() {
        let records = vec![
            Ok(RawRecord::new("a", "First label")),
            Ok(RawRecord::new("a", "Second label")),
        ];

        let (snapshot, _) = builder().build(records, 1).unwrap();

        assert_eq!(snapshot.ids().count(), 1);
        let id = *snapshot.ids().next().unwrap();
        assert_eq!(snapshot.get(&id).unwrap().pref_label, "Second label");
    }

    #[test]
    fn test_stream_error_fails_build() {
        let records = vec![
            Ok(RawRecord::new("a", "A")),
            Err(FetcherError::MalformedPayload("bad page".to_string())),
        ];

        let err = builder().build(records, 1).unwrap_err();
        assert!(matches!(err, FetcherError::MalformedPayload(_)));
    }

    #[test]
    fn test_empty_stream_builds_empty_snapshot() {
        let (snapshot, skipped) = builder().build(Vec::new(), 3).unwrap();
        assert!(snapshot.is_empty());
        assert_eq!(skipped, 0);
        assert_eq!(snapshot.generation(), 3);
    }
}
