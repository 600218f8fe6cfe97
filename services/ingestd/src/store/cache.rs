//! Read-through cache in front of the device directory.
//!
//! Shared by every connection and request task. Hits are served from an
//! in-process map; misses always go to the inner directory so a device
//! registered after first contact is picked up on its next message.

use super::{DeviceDirectory, DeviceRecord, StoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct CachedDeviceDirectory {
    inner: Arc<dyn DeviceDirectory>,
    cache: RwLock<HashMap<String, DeviceRecord>>,
}

impl CachedDeviceDirectory {
    pub fn new(inner: Arc<dyn DeviceDirectory>) -> Self {
        CachedDeviceDirectory {
            inner,
            cache: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl DeviceDirectory for CachedDeviceDirectory {
    async fn find_by_serial_number(
        &self,
        serial_number: &str,
    ) -> Result<Option<DeviceRecord>, StoreError> {
        {
            let cache = self.cache.read().await;
            if let Some(record) = cache.get(serial_number) {
                return Ok(Some(record.clone()));
            }
        }

        let found = self.inner.find_by_serial_number(serial_number).await?;
        if let Some(ref record) = found {
            let mut cache = self.cache.write().await;
            cache.insert(serial_number.to_owned(), record.clone());
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MockDeviceDirectory;

    #[tokio::test]
    async fn second_lookup_is_served_from_cache() {
        let mut mock = MockDeviceDirectory::new();
        mock.expect_find_by_serial_number()
            .times(1)
            .returning(|serial| {
                Ok(Some(DeviceRecord {
                    serial_number: serial.to_owned(),
                    model_id: "MODEL_A".to_owned(),
                }))
            });

        let cached = CachedDeviceDirectory::new(Arc::new(mock));
        let first = cached.find_by_serial_number("123").await.unwrap();
        let second = cached.find_by_serial_number("123").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.unwrap().model_id, "MODEL_A");
    }

    #[tokio::test]
    async fn misses_are_not_cached() {
        let mut mock = MockDeviceDirectory::new();
        let mut registered = false;
        mock.expect_find_by_serial_number()
            .times(2)
            .returning_st(move |serial| {
                let hit = registered;
                registered = true;
                Ok(hit.then(|| DeviceRecord {
                    serial_number: serial.to_owned(),
                    model_id: "MODEL_B".to_owned(),
                }))
            });

        let cached = CachedDeviceDirectory::new(Arc::new(mock));
        // First contact: device not yet registered.
        assert!(cached.find_by_serial_number("456").await.unwrap().is_none());
        // Registered in the meantime; the miss must not have been cached.
        assert!(cached.find_by_serial_number("456").await.unwrap().is_some());
    }
}
