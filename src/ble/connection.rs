//! Peripheral connection manager.
//!
//! Advertises to the phone, bonds with it, waits for an encrypted link
//! and then runs the ANCS session until the phone goes away.

use core::cell::RefCell;

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Sender;
use embassy_time::{Duration, Timer};
use heapless::Vec;
use nrf_softdevice::ble::gatt_client;
use nrf_softdevice::ble::peripheral;
use nrf_softdevice::ble::security::{IoCapabilities, SecurityHandler};
use nrf_softdevice::ble::{Connection, EncryptionInfo, IdentityKey, MasterId, SecurityMode};
use nrf_softdevice::raw;
use nrf_softdevice::Softdevice;
use static_cell::StaticCell;

use super::gatt::{AncsServiceClient, GattServiceClient, PeerEvent};
use super::link::{Discovered, Session};
use crate::ancs::discovery::SecurityLevel;
use crate::ancs::protocol::ANCS_SERVICE_UUID_LE;
use crate::ancs::AncsClient;
use crate::config;
use crate::config::{EVENT_QUEUE_DEPTH, MAX_BONDED_PEERS};
use crate::error::{BleError, Error};
use crate::notification::NotificationRecord;

pub type RecordSender = Sender<'static, CriticalSectionRawMutex, NotificationRecord, EVENT_QUEUE_DEPTH>;

struct PeerBond {
    master_id: MasterId,
    key: EncryptionInfo,
    peer_id: IdentityKey,
}

/// In-RAM bond table. Bonds are lost on reset and the phone re-pairs.
struct Bonder {
    peers: RefCell<Vec<PeerBond, MAX_BONDED_PEERS>>,
}

impl Bonder {
    fn new() -> Self {
        Self {
            peers: RefCell::new(Vec::new()),
        }
    }
}

impl SecurityHandler for Bonder {
    fn io_capabilities(&self) -> IoCapabilities {
        IoCapabilities::None
    }

    fn can_bond(&self, _conn: &Connection) -> bool {
        true
    }

    fn on_bonded(&self, _conn: &Connection, master_id: MasterId, key: EncryptionInfo, peer_id: IdentityKey) {
        let mut peers = self.peers.borrow_mut();
        if let Some(existing) = peers.iter_mut().find(|p| p.master_id == master_id) {
            existing.key = key;
            existing.peer_id = peer_id;
            return;
        }

        if peers.is_full() {
            warn!("Bond table full - forgetting oldest phone");
            peers.remove(0);
        }

        let _ = peers.push(PeerBond {
            master_id,
            key,
            peer_id,
        });
        info!("Bonded with phone ({} known)", peers.len());
    }

    fn get_key(&self, _conn: &Connection, master_id: MasterId) -> Option<EncryptionInfo> {
        self.peers
            .borrow()
            .iter()
            .find_map(|p| (p.master_id == master_id).then_some(p.key))
    }

    fn get_peripheral_key(&self, conn: &Connection) -> Option<(MasterId, EncryptionInfo)> {
        self.peers.borrow().iter().find_map(|p| {
            p.peer_id
                .is_match(conn.peer_address())
                .then_some((p.master_id, p.key))
        })
    }

    fn on_security_update(&self, _conn: &Connection, mode: SecurityMode) {
        info!("BLE security mode updated: {}", mode);
    }
}

fn bonder() -> &'static Bonder {
    static BONDER: StaticCell<Bonder> = StaticCell::new();
    BONDER.init(Bonder::new())
}

/// Map the SoftDevice security mode onto link security levels.
fn security_level(mode: SecurityMode) -> SecurityLevel {
    match mode {
        SecurityMode::JustWorks => SecurityLevel::Encrypted,
        SecurityMode::Mitm => SecurityLevel::Authenticated,
        SecurityMode::LescMitm => SecurityLevel::SecureConnections,
        // Signing without encryption is not enough for ANCS.
        _ => SecurityLevel::Open,
    }
}

async fn wait_for_secure_link(conn: &Connection) -> bool {
    for _ in 0..config::SECURE_LINK_POLL_COUNT {
        if conn.handle().is_none() {
            return false;
        }
        match conn.security_mode() {
            SecurityMode::NoAccess | SecurityMode::Open => {
                Timer::after(Duration::from_millis(config::SECURE_LINK_POLL_MS)).await
            }
            _ => return true,
        }
    }
    false
}

/// Advertising payload: flags plus a 128-bit service solicitation for
/// ANCS, so iOS offers to share notifications once bonded.
fn advertising_data() -> [u8; 21] {
    let mut adv = [0u8; 21];
    adv[..3].copy_from_slice(&[0x02, 0x01, raw::BLE_GAP_ADV_FLAGS_LE_ONLY_GENERAL_DISC_MODE as u8]);
    adv[3] = 0x11;
    adv[4] = 0x15; // List of 128-bit Service Solicitation UUIDs
    adv[5..].copy_from_slice(&ANCS_SERVICE_UUID_LE);
    adv
}

fn scan_response_data() -> Vec<u8, 31> {
    let name = config::BLE_DEVICE_NAME.as_bytes();
    let mut data = Vec::new();
    let _ = data.push(name.len() as u8 + 1);
    let _ = data.push(0x09); // Complete Local Name
    let _ = data.extend_from_slice(name);
    data
}

/// Advertise, accept the phone and run ANCS on it, forever.
pub async fn ble_task(sd: &'static Softdevice, records: &RecordSender) -> ! {
    let bonder = bonder();
    let client = RefCell::new(AncsClient::new());
    let adv_data = advertising_data();
    let scan_data = scan_response_data();

    loop {
        let adv_config = peripheral::Config {
            interval: config::BLE_ADV_INTERVAL,
            ..Default::default()
        };
        let adv = peripheral::ConnectableAdvertisement::ScannableUndirected {
            adv_data: &adv_data,
            scan_data: scan_data.as_slice(),
        };

        info!("Advertising as {}", config::BLE_DEVICE_NAME);
        let conn = match peripheral::advertise_pairable(sd, adv, &adv_config, bonder).await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("Advertising failed: {:?}", e);
                Timer::after(Duration::from_secs(1)).await;
                continue;
            }
        };
        info!("Phone connected");

        if let Err(e) = run_connection(&conn, &client, records).await {
            warn!("Connection ended: {:?}", e);
        }

        client.borrow_mut().on_disconnected();
        info!("Phone disconnected");
    }
}

async fn run_connection(
    conn: &Connection,
    client: &RefCell<AncsClient>,
    records: &RecordSender,
) -> Result<(), Error> {
    let params = raw::ble_gap_conn_params_t {
        min_conn_interval: config::BLE_CONN_INTERVAL_MIN,
        max_conn_interval: config::BLE_CONN_INTERVAL_MAX,
        slave_latency: config::BLE_SLAVE_LATENCY,
        conn_sup_timeout: config::BLE_SUP_TIMEOUT,
    };
    if let Err(e) = conn.set_conn_params(params) {
        warn!("set_conn_params failed: {:?}", e);
    }

    if matches!(conn.security_mode(), SecurityMode::NoAccess | SecurityMode::Open) {
        // A bonded phone encrypts on its own; a new one needs asking.
        if conn.request_pairing().is_err() {
            warn!("Could not request pairing");
        }
    }

    if !wait_for_secure_link(conn).await {
        warn!("Phone did not secure the link");
        let _ = conn.disconnect();
        return Err(Error::Ble(BleError::Disconnected));
    }

    let session = Session::new(client);
    let level = security_level(conn.security_mode());
    session.dispatch(|client, ops| client.on_security_changed(level, ops));

    let mut gatt: Option<GattServiceClient> = None;
    let mut ancs: Option<AncsServiceClient> = None;
    loop {
        let events = listen(conn, &session, gatt.as_ref(), ancs.as_ref(), records);
        match select(events, session.execute(conn)).await {
            Either::First(()) => return Ok(()),
            Either::Second(Discovered::GattService(found)) => gatt = Some(found),
            Either::Second(Discovered::Ancs(mut found)) => {
                found.watch_service_changed(gatt.as_ref().map(GattServiceClient::handles));
                ancs = Some(found);
            }
        }
    }
}

/// Deliver peer notifications to the ANCS client until disconnection.
async fn listen(
    conn: &Connection,
    session: &Session<'_>,
    gatt: Option<&GattServiceClient>,
    ancs: Option<&AncsServiceClient>,
    records: &RecordSender,
) {
    let on_event = |event: PeerEvent| match event {
        PeerEvent::NotificationSource(data) => {
            session.dispatch(|client, ops| client.on_notification_source(&data, ops));
        }
        PeerEvent::DataSource(data) => {
            session.client.borrow_mut().on_data_source(&data, records);
        }
        PeerEvent::ServiceChanged => {
            info!("Service Changed indicated");
            session.dispatch(|client, ops| client.on_service_changed(ops));
        }
    };

    match (ancs, gatt) {
        (Some(ancs), _) => {
            let _ = gatt_client::run(conn, ancs, on_event).await;
        }
        (None, Some(gatt)) => {
            let _ = gatt_client::run(conn, gatt, on_event).await;
        }
        (None, None) => {
            // Nothing subscribed yet: only watch for the link dropping.
            while conn.handle().is_some() {
                Timer::after(Duration::from_millis(config::SECURE_LINK_POLL_MS)).await;
            }
        }
    }
}
