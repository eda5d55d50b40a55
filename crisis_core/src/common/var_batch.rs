use std::borrow::Borrow;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use typed_key::Key;

/// One delivery of server-side variables: the names that changed in this
/// delivery, plus the current value of every variable the delivery carries.
///
/// Values are only ever read through typed keys, so an unexpected shape is
/// reported at the boundary instead of leaking an untyped value inward.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VarBatch {
    #[serde(default)]
    changed: BTreeSet<String>,
    #[serde(default)]
    values: HashMap<String, Value>,
}

#[derive(Clone, Debug, Error)]
pub enum VarBatchError {
    #[error("required variable not found [{0}]")]
    RequiredKeyNotFound(String),
    #[error("variable [{field}] has an unexpected shape: {source}")]
    Malformed {
        field: String,
        #[source]
        source: Arc<serde_json::Error>,
    },
}

type Result<T> = std::result::Result<T, VarBatchError>;

impl VarBatch {
    pub fn new() -> Self {
        VarBatch::default()
    }

    /// True if nothing changed in this delivery
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty()
    }

    pub fn changed(&self) -> impl Iterator<Item = &str> + '_ {
        self.changed.iter().map(String::as_str)
    }

    pub fn has_changed<T>(&self, key: Key<T>) -> bool {
        self.changed.contains(key.name())
    }

    pub fn get_optional<T: DeserializeOwned>(&self, key: Key<T>) -> Result<Option<T>> {
        self.values
            .get(key.name())
            .map(|value| decode(key.name(), value))
            .transpose()
    }

    pub fn get_required<T: DeserializeOwned>(&self, key: Key<T>) -> Result<T> {
        self.get_optional(key)?
            .ok_or_else(|| VarBatchError::RequiredKeyNotFound(key.name().to_owned()))
    }

    /// Reads a variable only if it is marked as changed in this delivery.
    ///
    /// A variable that is marked as changed but carries no value is an error.
    pub fn get_changed<T: DeserializeOwned>(&self, key: Key<T>) -> Result<Option<T>> {
        if self.has_changed(key) {
            self.get_required(key).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Sets a value and marks it as changed
    pub fn put<T: Serialize, B: Borrow<T>>(&mut self, key: Key<T>, data: B) -> Result<()> {
        let value = serde_json::to_value(data.borrow()).map_err(|e| VarBatchError::Malformed {
            field: key.name().to_owned(),
            source: Arc::new(e),
        })?;
        self.put_field_value(key.name(), value);
        Ok(())
    }

    pub fn put_field_value(&mut self, field: &str, value: Value) {
        self.changed.insert(field.to_owned());
        self.values.insert(field.to_owned(), value);
    }

    /// Carries a value without marking it as changed, the way the server
    /// exposes every variable of a user alongside the ones that changed.
    pub fn carry_field_value(&mut self, field: &str, value: Value) {
        self.values.insert(field.to_owned(), value);
    }

    pub fn with_changed(mut self, field: &str, value: Value) -> Self {
        self.put_field_value(field, value);
        self
    }

    pub fn with_carried(mut self, field: &str, value: Value) -> Self {
        self.carry_field_value(field, value);
        self
    }
}

fn decode<T: DeserializeOwned>(field: &str, value: &Value) -> Result<T> {
    serde_json::from_value(value.clone()).map_err(|e| VarBatchError::Malformed {
        field: field.to_owned(),
        source: Arc::new(e),
    })
}
