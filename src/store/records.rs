use std::collections::HashMap;

use uuid::Uuid;

use super::types::{Record, RecordFields, StoreError};

/// Authoritative in-memory record table.
///
/// Owned by exactly one dispatcher task. All operations are synchronous and
/// run to completion before the next is accepted, which is what makes the
/// whole system linearizable without a single lock.
#[derive(Debug, Default)]
pub struct RecordStore {
    records: HashMap<Uuid, RecordFields>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every live record. Order is unspecified.
    pub fn all(&self) -> Vec<Record> {
        self.records
            .iter()
            .map(|(id, fields)| Record {
                id: *id,
                fields: fields.clone(),
            })
            .collect()
    }

    pub fn get(&self, id: Uuid) -> Result<Record, StoreError> {
        self.records
            .get(&id)
            .map(|fields| Record {
                id,
                fields: fields.clone(),
            })
            .ok_or(StoreError::NotFound)
    }

    /// Inserts under a fresh v4 id and returns the full record.
    ///
    /// Re-rolls on a collision with a live id, so the returned id is always
    /// new to the table.
    pub fn create(&mut self, fields: RecordFields) -> Record {
        let mut id = Uuid::new_v4();
        while self.records.contains_key(&id) {
            id = Uuid::new_v4();
        }
        self.records.insert(id, fields.clone());
        Record { id, fields }
    }

    /// Replaces the fields in place; the id never changes.
    pub fn update(&mut self, id: Uuid, fields: RecordFields) -> Result<Record, StoreError> {
        match self.records.get_mut(&id) {
            Some(slot) => {
                *slot = fields.clone();
                Ok(Record { id, fields })
            }
            None => Err(StoreError::NotFound),
        }
    }

    /// Removal is immediate and visible to the next operation. Deleting the
    /// same id twice fails the second time.
    pub fn delete(&mut self, id: Uuid) -> Result<(), StoreError> {
        self.records
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
