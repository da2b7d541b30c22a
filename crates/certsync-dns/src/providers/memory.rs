//! In-memory record store for tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use super::traits::{DnsRecordStore, DnsRecordType};
use crate::errors::DnsError;

/// A mutating call observed by [`InMemoryRecordStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordCall {
    Create(DnsRecordType, String, String),
    Delete(DnsRecordType, String),
}

/// Record store backed by a map, recording every mutating call
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: Mutex<HashMap<(DnsRecordType, String), String>>,
    calls: Mutex<Vec<RecordCall>>,
    failing: Mutex<Option<DnsRecordType>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(self, record_type: DnsRecordType, name: &str, value: &str) -> Self {
        self.records
            .lock()
            .unwrap()
            .insert((record_type, name.to_string()), value.to_string());
        self
    }

    /// Make every call touching `record_type` fail
    pub fn fail_on(&self, record_type: DnsRecordType) {
        *self.failing.lock().unwrap() = Some(record_type);
    }

    pub fn record(&self, record_type: DnsRecordType, name: &str) -> Option<String> {
        self.records
            .lock()
            .unwrap()
            .get(&(record_type, name.to_string()))
            .cloned()
    }

    pub fn calls(&self) -> Vec<RecordCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn mutation_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn check(&self, record_type: DnsRecordType) -> Result<(), DnsError> {
        if *self.failing.lock().unwrap() == Some(record_type) {
            return Err(DnsError::ApiError(format!(
                "injected failure for {} records",
                record_type
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl DnsRecordStore for InMemoryRecordStore {
    fn provider_name(&self) -> &str {
        "memory"
    }

    async fn exists_record(
        &self,
        record_type: DnsRecordType,
        name: &str,
    ) -> Result<Option<String>, DnsError> {
        self.check(record_type)?;
        Ok(self.record(record_type, name))
    }

    async fn create_record(
        &self,
        record_type: DnsRecordType,
        name: &str,
        value: &str,
    ) -> Result<(), DnsError> {
        self.check(record_type)?;
        self.calls.lock().unwrap().push(RecordCall::Create(
            record_type,
            name.to_string(),
            value.to_string(),
        ));
        self.records
            .lock()
            .unwrap()
            .insert((record_type, name.to_string()), value.to_string());
        Ok(())
    }

    async fn delete_record(&self, record_type: DnsRecordType, name: &str) -> Result<(), DnsError> {
        self.check(record_type)?;
        self.calls
            .lock()
            .unwrap()
            .push(RecordCall::Delete(record_type, name.to_string()));
        self.records
            .lock()
            .unwrap()
            .remove(&(record_type, name.to_string()));
        Ok(())
    }
}
