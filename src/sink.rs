//! Position sink: persistence seam for positions and device-setting
//! acknowledgement state.
//!
//! The gateway core only speaks to this trait; schema, pooling and drivers
//! live behind it. [`MemorySink`] is the reference implementation used in
//! tests and for embedding without a database.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::model::{AckStatus, Contact, DeviceId, DeviceSettings, Position, SosNumber};

/// Generated position row id.
pub type PositionId = i64;

/// Persistence operations the decoding pipeline needs.
#[async_trait]
pub trait PositionSink: Send + Sync {
    /// Persist a position, returning its generated id.
    async fn insert(&self, position: Position) -> Result<PositionId>;

    /// Mark `position_id` as the device's latest position.
    async fn update_latest(&self, device_id: DeviceId, position_id: PositionId) -> Result<()>;

    /// Pending settings for a device, if any.
    async fn get_settings(&self, device_id: DeviceId) -> Result<Option<DeviceSettings>>;

    /// SOS numbers still awaiting push for a settings row.
    async fn get_pending_sos(&self, settings_id: i64) -> Result<Vec<SosNumber>>;

    /// Contacts still awaiting push for a settings row.
    async fn get_pending_contacts(&self, settings_id: i64) -> Result<Vec<Contact>>;

    /// Record that the device confirmed one SOS number.
    async fn mark_sos_acknowledged(&self, sos_id: i64) -> Result<()>;

    /// Record that the device confirmed one contact.
    async fn mark_contact_acknowledged(&self, contact_id: i64) -> Result<()>;

    /// Record that every push behind a settings row is confirmed.
    async fn mark_settings_acknowledged(&self, settings_id: i64) -> Result<()>;
}

#[derive(Default)]
struct MemoryState {
    positions: Vec<(PositionId, Position)>,
    latest: HashMap<DeviceId, PositionId>,
    settings: HashMap<DeviceId, DeviceSettings>,
    sos_numbers: Vec<SosNumber>,
    contacts: Vec<Contact>,
}

/// In-memory sink for tests and storage-less embedding.
#[derive(Default)]
pub struct MemorySink {
    state: Mutex<MemoryState>,
}

impl MemorySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Seed settings plus their pending lists.
    pub async fn seed_settings(
        &self,
        settings: DeviceSettings,
        sos_numbers: Vec<SosNumber>,
        contacts: Vec<Contact>,
    ) {
        let mut state = self.state.lock().await;
        state.settings.insert(settings.device_id, settings);
        state.sos_numbers.extend(sos_numbers);
        state.contacts.extend(contacts);
    }

    /// All persisted positions, oldest first.
    pub async fn positions(&self) -> Vec<Position> {
        let state = self.state.lock().await;
        state.positions.iter().map(|(_, p)| p.clone()).collect()
    }

    /// Latest position id for a device.
    pub async fn latest(&self, device_id: DeviceId) -> Option<PositionId> {
        self.state.lock().await.latest.get(&device_id).copied()
    }

    /// Settings row as currently stored.
    pub async fn settings(&self, device_id: DeviceId) -> Option<DeviceSettings> {
        self.state.lock().await.settings.get(&device_id).cloned()
    }
}

#[async_trait]
impl PositionSink for MemorySink {
    async fn insert(&self, position: Position) -> Result<PositionId> {
        let mut state = self.state.lock().await;
        let id = state.positions.len() as PositionId + 1;
        state.positions.push((id, position));
        Ok(id)
    }

    async fn update_latest(&self, device_id: DeviceId, position_id: PositionId) -> Result<()> {
        let mut state = self.state.lock().await;
        state.latest.insert(device_id, position_id);
        Ok(())
    }

    async fn get_settings(&self, device_id: DeviceId) -> Result<Option<DeviceSettings>> {
        let state = self.state.lock().await;
        Ok(state.settings.get(&device_id).cloned())
    }

    async fn get_pending_sos(&self, settings_id: i64) -> Result<Vec<SosNumber>> {
        let state = self.state.lock().await;
        Ok(state
            .sos_numbers
            .iter()
            .filter(|n| n.settings_id == settings_id && n.status == AckStatus::Pending)
            .cloned()
            .collect())
    }

    async fn get_pending_contacts(&self, settings_id: i64) -> Result<Vec<Contact>> {
        let state = self.state.lock().await;
        Ok(state
            .contacts
            .iter()
            .filter(|c| c.settings_id == settings_id && c.status == AckStatus::Pending)
            .cloned()
            .collect())
    }

    async fn mark_sos_acknowledged(&self, sos_id: i64) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(number) = state.sos_numbers.iter_mut().find(|n| n.id == sos_id) {
            number.status = AckStatus::Updated;
        }
        Ok(())
    }

    async fn mark_contact_acknowledged(&self, contact_id: i64) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(contact) = state.contacts.iter_mut().find(|c| c.id == contact_id) {
            contact.status = AckStatus::Updated;
        }
        Ok(())
    }

    async fn mark_settings_acknowledged(&self, settings_id: i64) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(settings) = state
            .settings
            .values_mut()
            .find(|settings| settings.id == settings_id)
        {
            settings.status = AckStatus::Updated;
        }
        Ok(())
    }
}
