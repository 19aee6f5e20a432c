//! GATT clients for the services the watch consumes on the phone.
//!
//! Both clients implement `nrf_softdevice::ble::gatt_client::Client` by
//! hand instead of through `#[gatt_client]`: the discovered handles have
//! to be handed to the [`DiscoveryCoordinator`](crate::ancs::discovery::DiscoveryCoordinator)
//! and the Control Point write must be able to carry a variable-length
//! request.

use heapless::Vec;
use nrf_softdevice::ble::gatt_client::{self, Characteristic, Descriptor, DiscoverError, HvxType};
use nrf_softdevice::ble::{Connection, Uuid};

use crate::ancs::discovery::{AncsHandles, GattServiceHandles};
use crate::ancs::protocol::{
    ANCS_SERVICE_UUID_LE, CCCD_UUID16, CONTROL_POINT_UUID_LE, DATA_SOURCE_UUID_LE, GATT_SERVICE_UUID16,
    NOTIFICATION_SOURCE_LEN, NOTIFICATION_SOURCE_UUID_LE, SERVICE_CHANGED_UUID16,
};
use crate::config::BLE_ATT_MTU;

/// Largest Data Source notification payload.
pub const DATA_SOURCE_MAX: usize = BLE_ATT_MTU as usize - 3;

/// Value notified or indicated by the phone.
pub enum PeerEvent {
    NotificationSource(Vec<u8, NOTIFICATION_SOURCE_LEN>),
    DataSource(Vec<u8, DATA_SOURCE_MAX>),
    ServiceChanged,
}

fn cccd_handle(descriptors: &[Descriptor]) -> u16 {
    let cccd = Uuid::new_16(CCCD_UUID16);
    descriptors
        .iter()
        .find(|d| d.uuid.as_ref() == Some(&cccd))
        .map(|d| d.handle)
        .unwrap_or(0)
}

/// Generic Attribute service (0x1801), for Service Changed indications.
pub struct GattServiceClient {
    handles: GattServiceHandles,
}

impl GattServiceClient {
    pub fn handles(&self) -> GattServiceHandles {
        self.handles
    }
}

impl gatt_client::Client for GattServiceClient {
    type Event = PeerEvent;

    fn on_hvx(&self, _conn: &Connection, type_: HvxType, handle: u16, _data: &[u8]) -> Option<PeerEvent> {
        (handle == self.handles.service_changed && matches!(type_, HvxType::Indication))
            .then_some(PeerEvent::ServiceChanged)
    }

    fn uuid() -> Uuid {
        Uuid::new_16(GATT_SERVICE_UUID16)
    }

    fn new_undiscovered(_conn: Connection) -> Self {
        Self {
            handles: GattServiceHandles::default(),
        }
    }

    fn discovered_characteristic(&mut self, characteristic: &Characteristic, descriptors: &[Descriptor]) {
        if characteristic.uuid.as_ref() == Some(&Uuid::new_16(SERVICE_CHANGED_UUID16)) {
            self.handles.service_changed = characteristic.handle_value;
            self.handles.service_changed_cccd = cccd_handle(descriptors);
        }
    }

    fn discovery_complete(&mut self) -> Result<(), DiscoverError> {
        if self.handles.service_changed == 0 || self.handles.service_changed_cccd == 0 {
            return Err(DiscoverError::ServiceIncomplete);
        }
        Ok(())
    }
}

/// Apple Notification Center Service.
///
/// Once the Generic Attribute service is known this client also reports
/// its Service Changed indications, so a single `gatt_client::run` loop
/// covers the whole connection.
pub struct AncsServiceClient {
    handles: AncsHandles,
    service_changed: Option<u16>,
}

impl AncsServiceClient {
    pub fn handles(&self) -> AncsHandles {
        self.handles
    }

    pub fn watch_service_changed(&mut self, gatt: Option<GattServiceHandles>) {
        self.service_changed = gatt.map(|h| h.service_changed);
    }
}

impl gatt_client::Client for AncsServiceClient {
    type Event = PeerEvent;

    fn on_hvx(&self, _conn: &Connection, type_: HvxType, handle: u16, data: &[u8]) -> Option<PeerEvent> {
        match type_ {
            HvxType::Notification if handle == self.handles.notification_source => {
                Vec::from_slice(data).ok().map(PeerEvent::NotificationSource)
            }
            HvxType::Notification if handle == self.handles.data_source => {
                Vec::from_slice(data).ok().map(PeerEvent::DataSource)
            }
            HvxType::Indication if Some(handle) == self.service_changed => Some(PeerEvent::ServiceChanged),
            _ => None,
        }
    }

    fn uuid() -> Uuid {
        Uuid::new_128(&ANCS_SERVICE_UUID_LE)
    }

    fn new_undiscovered(_conn: Connection) -> Self {
        Self {
            handles: AncsHandles::default(),
            service_changed: None,
        }
    }

    fn discovered_characteristic(&mut self, characteristic: &Characteristic, descriptors: &[Descriptor]) {
        let Some(uuid) = characteristic.uuid.as_ref() else {
            return;
        };

        if *uuid == Uuid::new_128(&NOTIFICATION_SOURCE_UUID_LE) {
            self.handles.notification_source = characteristic.handle_value;
            self.handles.notification_source_cccd = cccd_handle(descriptors);
        } else if *uuid == Uuid::new_128(&CONTROL_POINT_UUID_LE) {
            self.handles.control_point = characteristic.handle_value;
        } else if *uuid == Uuid::new_128(&DATA_SOURCE_UUID_LE) {
            self.handles.data_source = characteristic.handle_value;
            self.handles.data_source_cccd = cccd_handle(descriptors);
        }
    }

    fn discovery_complete(&mut self) -> Result<(), DiscoverError> {
        let h = &self.handles;
        if h.notification_source == 0
            || h.notification_source_cccd == 0
            || h.control_point == 0
            || h.data_source == 0
            || h.data_source_cccd == 0
        {
            return Err(DiscoverError::ServiceIncomplete);
        }
        Ok(())
    }
}
