//! GATT discovery coordinator for one connection.
//!
//! Once the phone has encrypted the link, the coordinator:
//! 1. Discovers the Generic Attribute service (0x1801) and subscribes to
//!    Service Changed indications.
//! 2. Discovers ANCS, keeps its characteristic handles and subscribes to
//!    Notification Source and Data Source.
//! 3. If ANCS discovery fails, waits for a Service Changed indication and
//!    tries once more per indication.
//!
//! Peer procedures are asynchronous: the coordinator only *starts* them
//! through [`GattLink`] and is told about their outcome through the
//! `on_*_discovered` methods. All methods run in the single BLE context,
//! so state is plain `&mut self`.

use super::protocol::AttributeRequest;
use crate::config::MIN_SECURITY_LEVEL;
use crate::error::Error;

/// Link security level as reported by the stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SecurityLevel {
    /// L1 - no encryption.
    Open,
    /// L2 - encrypted, unauthenticated pairing.
    Encrypted,
    /// L3 - encrypted, authenticated (MITM protected) pairing.
    Authenticated,
    /// L4 - authenticated LE Secure Connections.
    SecureConnections,
}

/// Which service a discovery procedure looks for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ServiceTarget {
    /// Generic Attribute service (Service Changed).
    GattService,
    /// Apple Notification Center Service.
    Ancs,
}

/// Handles found in the Generic Attribute service.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GattServiceHandles {
    pub service_changed: u16,
    pub service_changed_cccd: u16,
}

/// Handles found in ANCS.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AncsHandles {
    pub notification_source: u16,
    pub notification_source_cccd: u16,
    pub control_point: u16,
    pub data_source: u16,
    pub data_source_cccd: u16,
}

/// Requests the coordinator and the ANCS client make to the peer.
///
/// `start_discovery` only starts the procedure; its outcome is reported
/// back through the coordinator's completion methods.
pub trait GattLink {
    fn start_discovery(&mut self, target: ServiceTarget) -> Result<(), Error>;

    fn subscribe_service_changed(&mut self, handles: &GattServiceHandles) -> Result<(), Error>;

    fn subscribe_notification_source(&mut self, handles: &AncsHandles) -> Result<(), Error>;

    fn subscribe_data_source(&mut self, handles: &AncsHandles) -> Result<(), Error>;

    fn write_control_point(
        &mut self,
        handles: &AncsHandles,
        request: &AttributeRequest,
    ) -> Result<(), Error>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DiscoveryState {
    Idle,
    DiscoveringGattService,
    DiscoveringAncs,
    /// ANCS found and subscribed. Left only by a new security upgrade
    /// or a disconnection.
    Ready,
}

pub struct DiscoveryCoordinator {
    state: DiscoveryState,
    /// Service Changed seen since the last retry.
    change_indicated: bool,
    gatt_handles: Option<GattServiceHandles>,
    ancs_handles: Option<AncsHandles>,
}

impl DiscoveryCoordinator {
    pub const fn new() -> Self {
        Self {
            state: DiscoveryState::Idle,
            change_indicated: false,
            gatt_handles: None,
            ancs_handles: None,
        }
    }

    pub fn state(&self) -> DiscoveryState {
        self.state
    }

    pub fn service_found(&self) -> bool {
        self.state == DiscoveryState::Ready
    }

    pub fn change_pending(&self) -> bool {
        self.change_indicated
    }

    pub fn is_discovering(&self) -> bool {
        matches!(
            self.state,
            DiscoveryState::DiscoveringGattService | DiscoveryState::DiscoveringAncs
        )
    }

    /// ANCS handles, once discovery succeeded.
    pub fn handles(&self) -> Option<&AncsHandles> {
        self.ancs_handles.as_ref()
    }

    pub fn gatt_handles(&self) -> Option<&GattServiceHandles> {
        self.gatt_handles.as_ref()
    }

    /// Link security changed. From L2 upwards, start over with a fresh
    /// discovery of the Generic Attribute service.
    pub fn on_security_upgraded<L: GattLink>(&mut self, level: SecurityLevel, link: &mut L) {
        if level < MIN_SECURITY_LEVEL {
            debug!("Security {:?} too low for discovery", level);
            return;
        }

        *self = Self::new();
        match link.start_discovery(ServiceTarget::GattService) {
            Ok(()) => self.state = DiscoveryState::DiscoveringGattService,
            Err(e) => {
                error!("Failed to start discovery for GATT Service: {:?}", e);
                self.discover(false, link);
            }
        }
    }

    /// Outcome of the Generic Attribute service discovery.
    pub fn on_gatt_service_discovered<L: GattLink>(
        &mut self,
        result: Result<GattServiceHandles, Error>,
        link: &mut L,
    ) {
        if self.state != DiscoveryState::DiscoveringGattService {
            warn!("Unexpected GATT Service discovery result in {:?}", self.state);
            return;
        }
        self.state = DiscoveryState::Idle;

        match result {
            Ok(handles) => {
                info!("The discovery procedure for GATT Service succeeded");
                self.gatt_handles = Some(handles);
                if let Err(e) = link.subscribe_service_changed(&handles) {
                    error!("Cannot subscribe to Service Changed indication: {:?}", e);
                }
            }
            Err(Error::ServiceNotFound) => {
                warn!("GATT Service could not be found during the discovery");
            }
            Err(e) => {
                error!("The discovery procedure for GATT Service failed: {:?}", e);
            }
        }

        self.discover(false, link);
    }

    /// Start ANCS discovery unless one is running or ANCS is already known.
    ///
    /// With `retry`, a Service Changed indication must have arrived since
    /// the last attempt; the indication is consumed by this call.
    pub fn discover<L: GattLink>(&mut self, retry: bool, link: &mut L) {
        match self.state {
            DiscoveryState::DiscoveringGattService | DiscoveryState::DiscoveringAncs => return,
            DiscoveryState::Ready => return,
            DiscoveryState::Idle => {}
        }

        if retry {
            if !self.change_indicated {
                return;
            }
            self.change_indicated = false;
        }

        match link.start_discovery(ServiceTarget::Ancs) {
            Ok(()) => {
                debug!("ANCS discovery started (retry={})", retry);
                self.state = DiscoveryState::DiscoveringAncs;
            }
            Err(e) => {
                error!("Failed to start discovery for ANCS: {:?}", e);
            }
        }
    }

    /// Outcome of the ANCS discovery.
    pub fn on_ancs_discovered<L: GattLink>(
        &mut self,
        result: Result<AncsHandles, Error>,
        link: &mut L,
    ) {
        if self.state != DiscoveryState::DiscoveringAncs {
            warn!("Unexpected ANCS discovery result in {:?}", self.state);
            return;
        }

        match result {
            Ok(handles) => {
                info!("The discovery procedure for ANCS succeeded");
                self.ancs_handles = Some(handles);
                self.state = DiscoveryState::Ready;
                if let Err(e) = link.subscribe_notification_source(&handles) {
                    error!("Failed to enable Notification Source notification: {:?}", e);
                }
                if let Err(e) = link.subscribe_data_source(&handles) {
                    error!("Failed to enable Data Source notification: {:?}", e);
                }
            }
            Err(Error::ServiceNotFound) => {
                warn!("ANCS could not be found during the discovery");
                self.state = DiscoveryState::Idle;
            }
            Err(e) => {
                error!("The discovery procedure for ANCS failed: {:?}", e);
                self.state = DiscoveryState::Idle;
            }
        }

        // Honour a Service Changed that arrived while we were busy.
        self.discover(true, link);
    }

    /// The phone's service table changed.
    pub fn on_service_changed_indicated<L: GattLink>(&mut self, link: &mut L) {
        self.change_indicated = true;
        self.discover(true, link);
    }

    /// Forget everything learned on the dropped link.
    pub fn on_disconnected(&mut self) {
        *self = Self::new();
    }
}

impl Default for DiscoveryCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
