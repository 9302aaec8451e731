use dashmap::DashMap;
use serde_json::Value;
use std::sync::RwLock;

use crate::models::user::SelfUser;
use crate::snowflake;

/// Record collections the store keeps besides the base user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Users,
    Presences,
    Relationships,
    Guilds,
    Channels,
    Messages,
}

impl Collection {
    pub const ALL: [Collection; 6] = [
        Collection::Users,
        Collection::Presences,
        Collection::Relationships,
        Collection::Guilds,
        Collection::Channels,
        Collection::Messages,
    ];
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record {1} not found in collection {0:?}")]
    NotFound(Collection, String),
    #[error("the base user cannot be modified through the collection API")]
    BaseUser,
}

/// In-memory record store. Holds exactly one authenticated identity plus
/// keyed collections of loose JSON records. Nothing here survives a restart,
/// which is the point of a mock.
pub struct Store {
    self_user: RwLock<SelfUser>,
    collections: DashMap<Collection, DashMap<String, Value>>,
}

impl Store {
    pub fn new() -> Self {
        Self::with_user(SelfUser::default())
    }

    /// Builds a store around a caller-supplied identity, so tests can swap
    /// the single accepted account instead of relying on the default one.
    pub fn with_user(user: SelfUser) -> Self {
        let collections = DashMap::new();
        for col in Collection::ALL {
            collections.insert(col, DashMap::new());
        }
        let store = Self {
            self_user: RwLock::new(user),
            collections,
        };
        store.index_self();
        store
    }

    fn index_self(&self) {
        let user = self.read_self();
        let id = user.id.clone();
        if let Ok(value) = serde_json::to_value(&user) {
            if let Some(users) = self.collections.get(&Collection::Users) {
                users.insert(id, value);
            }
        }
    }

    pub fn read_self(&self) -> SelfUser {
        self.self_user
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Shallow-merges `patch` into the base user. `settings` is merged one
    /// level deeper; an `id` field in the patch is dropped.
    pub fn patch_self(&self, patch: &Value) -> SelfUser {
        let mut guard = self.self_user.write().unwrap_or_else(|e| e.into_inner());
        let mut current = serde_json::to_value(&*guard).unwrap_or(Value::Null);
        if let (Some(cur), Some(new)) = (current.as_object_mut(), patch.as_object()) {
            for (key, value) in new {
                match key.as_str() {
                    "id" => {}
                    "settings" => {
                        if let (Some(Value::Object(cur_settings)), Some(new_settings)) =
                            (cur.get_mut("settings"), value.as_object())
                        {
                            for (k, v) in new_settings {
                                cur_settings.insert(k.clone(), v.clone());
                            }
                        }
                    }
                    _ => {
                        cur.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        if let Ok(updated) = serde_json::from_value::<SelfUser>(current) {
            *guard = updated;
        }
        let user = guard.clone();
        drop(guard);
        self.index_self();
        user
    }

    pub fn read(&self, col: Collection, id: &str) -> Option<Value> {
        self.collections.get(&col)?.get(id).map(|v| v.clone())
    }

    /// Inserts a record, generating a snowflake ID when none is supplied.
    /// Returns the ID the record was stored under.
    pub fn push(&self, col: Collection, record: Value, id: Option<String>) -> String {
        let id = id.unwrap_or_else(snowflake::generate);
        if let Some(records) = self.collections.get(&col) {
            records.insert(id.clone(), record);
        }
        id
    }

    pub fn patch(&self, col: Collection, id: &str, patch: &Value) -> Result<(), StoreError> {
        if col == Collection::Users && self.is_self(id) {
            return Err(StoreError::BaseUser);
        }
        let records = self
            .collections
            .get(&col)
            .ok_or_else(|| StoreError::NotFound(col, id.to_string()))?;
        let mut record = records
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(col, id.to_string()))?;
        if let (Some(cur), Some(new)) = (record.as_object_mut(), patch.as_object()) {
            for (key, value) in new {
                if key != "id" {
                    cur.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(())
    }

    pub fn pull(&self, col: Collection, id: &str) -> Result<bool, StoreError> {
        if col == Collection::Users && self.is_self(id) {
            return Err(StoreError::BaseUser);
        }
        Ok(self
            .collections
            .get(&col)
            .map(|records| records.remove(id).is_some())
            .unwrap_or(false))
    }

    /// Drops every record and restores a fresh default identity.
    pub fn reset(&self) {
        for col in self.collections.iter() {
            col.value().clear();
        }
        *self.self_user.write().unwrap_or_else(|e| e.into_inner()) = SelfUser::default();
        self.index_self();
    }

    fn is_self(&self, id: &str) -> bool {
        self.self_user
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .id
            == id
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}
