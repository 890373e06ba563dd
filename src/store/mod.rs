mod file;

pub use file::FileStore;

use crate::error::Result;

pub const SELECTED_SPREADSHEET_ID: &str = "selected_spreadsheet_id";
pub const SELECTED_SHEET_NAME: &str = "selected_sheet_name";
pub const PENDING_EXPENSES: &str = "pending-expenses";
pub const SESSION_TOKEN: &str = "gapi_token";
pub const USER_HAS_SIGNED_IN: &str = "user_has_signed_in";

/// Current value of a key in, new value out; `None` out removes the key.
pub type Update<'a> = &'a mut dyn FnMut(Option<String>) -> Result<Option<String>>;

/// Durable string key/value storage shared by the queue, the session and the sheet selection.
///
/// Several processes may share one store, so every call sees the latest durable state. Writes
/// must be durable before they return; a write the medium rejects is reported as
/// `AppError::StorageUnavailable` and leaves the previous value in place.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;

    /// Read-modify-write of one key with no other writer in between.
    fn update(&self, key: &str, apply: Update<'_>) -> Result<()>;
}

#[cfg(test)]
pub(crate) mod test_helpers {
    use super::*;
    use crate::error::AppError;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    /// In-memory store that can be told to reject writes, like a browser over its quota.
    #[derive(Default)]
    pub(crate) struct MemoryStore {
        pub entries: Mutex<BTreeMap<String, String>>,
        pub reject_writes: Mutex<bool>,
    }

    impl MemoryStore {
        pub(crate) fn reject_writes(&self, reject: bool) {
            *self.reject_writes.lock().unwrap() = reject;
        }
    }

    impl KeyValueStore for MemoryStore {
        fn get(&self, key: &str) -> Result<Option<String>> {
            Ok(self.entries.lock().unwrap().get(key).cloned())
        }

        fn set(&self, key: &str, value: &str) -> Result<()> {
            self.update(key, &mut |_| Ok(Some(value.to_string())))
        }

        fn remove(&self, key: &str) -> Result<()> {
            self.update(key, &mut |_| Ok(None))
        }

        fn update(&self, key: &str, apply: Update<'_>) -> Result<()> {
            let mut entries = self.entries.lock().unwrap();
            let next = apply(entries.get(key).cloned())?;

            if *self.reject_writes.lock().unwrap() {
                return Err(AppError::StorageUnavailable("quota exceeded".to_string()));
            }
            match next {
                Some(value) => entries.insert(key.to_string(), value),
                None => entries.remove(key),
            };
            Ok(())
        }
    }
}
