use async_trait::async_trait;
use parl_core::{Bill, Mp, NaturalKey};
use parl_storage::{RecordStore, StoreError};
use tracing::warn;

/// A record kind the store knows how to upsert by natural key.
#[async_trait]
pub trait Upsertable: NaturalKey + Send + Sync {
    async fn upsert_into(&self, store: &dyn RecordStore) -> Result<(), StoreError>;
}

#[async_trait]
impl Upsertable for Bill {
    async fn upsert_into(&self, store: &dyn RecordStore) -> Result<(), StoreError> {
        store.upsert_bill(self).await
    }
}

#[async_trait]
impl Upsertable for Mp {
    async fn upsert_into(&self, store: &dyn RecordStore) -> Result<(), StoreError> {
        store.upsert_mp(self).await
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertTally {
    pub attempted: usize,
    pub upserted: usize,
    pub failed: usize,
}

/// Upsert every record in source order, one round trip each. A failed record
/// is logged and skipped; it never stops the rest of the batch.
pub async fn upsert_batch<T: Upsertable>(store: &dyn RecordStore, records: &[T]) -> UpsertTally {
    let mut tally = UpsertTally::default();
    for (position, record) in records.iter().enumerate() {
        tally.attempted += 1;
        match record.upsert_into(store).await {
            Ok(()) => tally.upserted += 1,
            Err(err) => {
                tally.failed += 1;
                warn!(
                    kind = T::KIND,
                    key = %record.natural_key(),
                    position,
                    error = %err,
                    "upsert failed; continuing with batch"
                );
            }
        }
    }
    tally
}
