use log::{debug, warn};
use qrlink_proto::LinkedDeviceRecord;
use std::sync::{Mutex, MutexGuard};

/// Receives devices as soon as a pairing session completes.
///
/// Implementations must not fail the caller: anything that goes wrong is
/// theirs to log. Pairing success never depends on the registry.
pub trait DeviceRegistry: Send + Sync {
    fn reconcile(&self, record: &LinkedDeviceRecord);
}

impl<F> DeviceRegistry for F
where
    F: Fn(&LinkedDeviceRecord) + Send + Sync,
{
    fn reconcile(&self, record: &LinkedDeviceRecord) {
        self(record)
    }
}

/// Insert-or-replace by `id`.
///
/// An existing entry is replaced where it stands; a new one is prepended.
/// Any other entries sharing the id are dropped.
pub fn upsert_device(devices: &mut Vec<LinkedDeviceRecord>, record: &LinkedDeviceRecord) {
    match devices.iter().position(|d| d.id == record.id) {
        Some(pos) => {
            devices[pos] = record.clone();
            let mut idx = 0;
            devices.retain(|d| {
                let keep = idx <= pos || d.id != record.id;
                idx += 1;
                keep
            });
        }
        None => devices.insert(0, record.clone()),
    }
}

/// The caller's list of linked devices, newest first.
#[derive(Debug, Default)]
pub struct DeviceList {
    devices: Mutex<Vec<LinkedDeviceRecord>>,
}

impl DeviceList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_devices(initial: Vec<LinkedDeviceRecord>) -> Self {
        let mut devices: Vec<LinkedDeviceRecord> = Vec::with_capacity(initial.len());
        for record in initial {
            if !devices.iter().any(|d| d.id == record.id) {
                devices.push(record);
            }
        }
        Self {
            devices: Mutex::new(devices),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<LinkedDeviceRecord>> {
        match self.devices.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("device list lock was poisoned; continuing with last state");
                poisoned.into_inner()
            }
        }
    }

    pub fn devices(&self) -> Vec<LinkedDeviceRecord> {
        self.lock().clone()
    }

    pub fn get(&self, id: &str) -> Option<LinkedDeviceRecord> {
        self.lock().iter().find(|d| d.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl DeviceRegistry for DeviceList {
    fn reconcile(&self, record: &LinkedDeviceRecord) {
        debug!("reconciling linked device {}", record.id);
        upsert_device(&mut self.lock(), record);
    }
}
