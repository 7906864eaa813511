//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements both [`ConfigPort`] and [`StoragePort`] for the bridge.
//!
//! - Config validation: every field is range-checked before persistence.
//! - Namespace isolation: each subsystem uses its own namespace (`lifepo`
//!   for the system config, `netcfg` for the static IP record).
//! - Atomic writes: ESP-IDF NVS commits are atomic per blob.
//!
//! On the host the adapter keeps blobs in a `HashMap` so the identity
//! store and config persistence can be exercised in tests.

use crate::app::ports::{ConfigError, ConfigPort, StorageError, StoragePort};
use crate::config::SystemConfig;
use log::{info, warn};

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};

const CONFIG_NAMESPACE: &str = "lifepo";
const CONFIG_KEY: &str = "syscfg";

/// Largest blob the config reader accepts.
const MAX_BLOB_SIZE: usize = 1024;

pub struct NvsAdapter {
    #[cfg(target_os = "espidf")]
    partition: EspDefaultNvsPartition,
    #[cfg(not(target_os = "espidf"))]
    store: std::cell::RefCell<HashMap<String, Vec<u8>>>,
}

impl NvsAdapter {
    /// Wrap the default NVS partition.  The partition handle is shared
    /// with the WiFi driver, which keeps its calibration data there.
    #[cfg(target_os = "espidf")]
    pub fn new(partition: EspDefaultNvsPartition) -> Result<Self, ConfigError> {
        info!("NvsAdapter: ESP-IDF NVS ready");
        Ok(Self { partition })
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new() -> Result<Self, ConfigError> {
        info!("NvsAdapter: simulation backend");
        Ok(Self {
            store: std::cell::RefCell::new(HashMap::new()),
        })
    }

    #[cfg(not(target_os = "espidf"))]
    fn composite_key(namespace: &str, key: &str) -> String {
        format!("{}::{}", namespace, key)
    }

    #[cfg(target_os = "espidf")]
    fn open(&self, namespace: &str, write: bool) -> Result<EspNvs<NvsDefault>, StorageError> {
        EspNvs::new(self.partition.clone(), namespace, write).map_err(|e| {
            warn!("NvsAdapter: open namespace {} failed: {}", namespace, e);
            StorageError::IoError
        })
    }
}

fn validate_config(cfg: &SystemConfig) -> Result<(), ConfigError> {
    cfg.validate().map_err(ConfigError::ValidationFailed)
}

impl ConfigPort for NvsAdapter {
    fn load(&self) -> Result<SystemConfig, ConfigError> {
        let mut buf = [0u8; MAX_BLOB_SIZE];
        match self.read(CONFIG_NAMESPACE, CONFIG_KEY, &mut buf) {
            Ok(n) => {
                let cfg: SystemConfig = postcard::from_bytes(&buf[..n]).map_err(|_| ConfigError::Corrupted)?;
                validate_config(&cfg)?;
                info!("NvsAdapter: loaded config ({} bytes)", n);
                Ok(cfg)
            }
            Err(StorageError::NotFound) => {
                info!("NvsAdapter: no stored config, using defaults");
                Ok(SystemConfig::default())
            }
            Err(e) => {
                warn!("NvsAdapter: config read error {}, using defaults", e);
                Ok(SystemConfig::default())
            }
        }
    }

    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError> {
        validate_config(config)?;
        let bytes = postcard::to_allocvec(config).map_err(|_| ConfigError::IoError)?;
        if bytes.len() > MAX_BLOB_SIZE {
            return Err(ConfigError::StorageFull);
        }

        #[cfg(not(target_os = "espidf"))]
        {
            let key = Self::composite_key(CONFIG_NAMESPACE, CONFIG_KEY);
            self.store.borrow_mut().insert(key, bytes);
            info!("NvsAdapter: config saved (simulation)");
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let mut nvs = self.open(CONFIG_NAMESPACE, true).map_err(|_| ConfigError::IoError)?;
            match nvs.set_blob(CONFIG_KEY, &bytes) {
                Ok(()) => {
                    info!("NvsAdapter: config saved to NVS ({} bytes)", bytes.len());
                    Ok(())
                }
                Err(e) => {
                    warn!("NvsAdapter: NVS write error {}", e);
                    Err(ConfigError::IoError)
                }
            }
        }
    }
}

impl StoragePort for NvsAdapter {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            match self.store.borrow().get(&composite) {
                Some(data) => {
                    let len = data.len().min(buf.len());
                    buf[..len].copy_from_slice(&data[..len]);
                    Ok(len)
                }
                None => Err(StorageError::NotFound),
            }
        }

        #[cfg(target_os = "espidf")]
        {
            let nvs = match self.open(namespace, false) {
                Ok(nvs) => nvs,
                // A namespace that was never written cannot be opened read-only.
                Err(_) => return Err(StorageError::NotFound),
            };
            match nvs.blob_len(key) {
                Ok(Some(len)) if len > buf.len() => return Err(StorageError::TooLarge),
                Ok(Some(_)) => {}
                Ok(None) => return Err(StorageError::NotFound),
                Err(_) => return Err(StorageError::IoError),
            }
            match nvs.get_blob(key, buf) {
                Ok(Some(data)) => Ok(data.len()),
                Ok(None) => Err(StorageError::NotFound),
                Err(_) => Err(StorageError::IoError),
            }
        }
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            self.store.borrow_mut().insert(composite, data.to_vec());
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let mut nvs = self.open(namespace, true)?;
            nvs.set_blob(key, data).map_err(|e| {
                warn!("NvsAdapter: write {}::{} failed: {}", namespace, key, e);
                StorageError::IoError
            })
        }
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            self.store.borrow_mut().remove(&composite);
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let mut nvs = self.open(namespace, true)?;
            nvs.remove(key).map(|_| ()).map_err(|_| StorageError::IoError)
        }
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            self.store.borrow().contains_key(&composite)
        }

        #[cfg(target_os = "espidf")]
        {
            self.open(namespace, false)
                .and_then(|nvs| nvs.contains(key).map_err(|_| StorageError::IoError))
                .unwrap_or(false)
        }
    }
}
