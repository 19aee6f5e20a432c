//! `GattLink` for the SoftDevice.
//!
//! The coordinator and the ANCS client run synchronously, inside GATT
//! event callbacks. Whatever they ask of the peer is queued here as a
//! [`LinkOp`] and carried out by [`Session::execute`], which feeds each
//! outcome back into the [`AncsClient`].

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::signal::Signal;
use heapless::Deque;
use nrf_softdevice::ble::gatt_client;
use nrf_softdevice::ble::Connection;

use super::gatt::{AncsServiceClient, GattServiceClient};
use crate::ancs::discovery::{AncsHandles, GattLink, GattServiceHandles, ServiceTarget};
use crate::ancs::protocol::AttributeRequest;
use crate::ancs::AncsClient;
use crate::error::{BleError, Error};

/// Operations that can be pending at once. Discovery and subscriptions
/// need at most four; the rest is head-room for Control Point writes.
const MAX_PENDING_OPS: usize = 8;

/// CCCD values.
const CCCD_NOTIFY: [u8; 2] = [0x01, 0x00];
const CCCD_INDICATE: [u8; 2] = [0x02, 0x00];

pub enum LinkOp {
    Discover(ServiceTarget),
    SubscribeServiceChanged(GattServiceHandles),
    SubscribeNotificationSource(AncsHandles),
    SubscribeDataSource(AncsHandles),
    WriteControlPoint(AncsHandles, AttributeRequest),
}

/// Peer requests waiting for the connection task.
pub struct OpQueue {
    ops: Deque<LinkOp, MAX_PENDING_OPS>,
}

impl OpQueue {
    pub const fn new() -> Self {
        Self { ops: Deque::new() }
    }

    pub fn pop(&mut self) -> Option<LinkOp> {
        self.ops.pop_front()
    }

    fn push(&mut self, op: LinkOp) -> Result<(), Error> {
        self.ops.push_back(op).map_err(|_| Error::QueueFull)
    }
}

impl GattLink for OpQueue {
    fn start_discovery(&mut self, target: ServiceTarget) -> Result<(), Error> {
        self.push(LinkOp::Discover(target))
    }

    fn subscribe_service_changed(&mut self, handles: &GattServiceHandles) -> Result<(), Error> {
        self.push(LinkOp::SubscribeServiceChanged(*handles))
    }

    fn subscribe_notification_source(&mut self, handles: &AncsHandles) -> Result<(), Error> {
        self.push(LinkOp::SubscribeNotificationSource(*handles))
    }

    fn subscribe_data_source(&mut self, handles: &AncsHandles) -> Result<(), Error> {
        self.push(LinkOp::SubscribeDataSource(*handles))
    }

    fn write_control_point(
        &mut self,
        handles: &AncsHandles,
        request: &AttributeRequest,
    ) -> Result<(), Error> {
        self.push(LinkOp::WriteControlPoint(*handles, request.clone()))
    }
}

/// State shared by the GATT event loop and the operation executor of
/// one connection. Both run on the same executor, and no borrow is held
/// across an `.await`.
pub struct Session<'a> {
    pub client: &'a RefCell<AncsClient>,
    ops: RefCell<OpQueue>,
    wake: Signal<NoopRawMutex, ()>,
}

/// A peer service that was just discovered.
pub enum Discovered {
    GattService(GattServiceClient),
    Ancs(AncsServiceClient),
}

impl<'a> Session<'a> {
    pub fn new(client: &'a RefCell<AncsClient>) -> Self {
        Self {
            client,
            ops: RefCell::new(OpQueue::new()),
            wake: Signal::new(),
        }
    }

    /// Run `f` against the ANCS client and wake the executor for
    /// anything it queued.
    pub fn dispatch<F>(&self, f: F)
    where
        F: FnOnce(&mut AncsClient, &mut OpQueue),
    {
        {
            let mut client = self.client.borrow_mut();
            let mut ops = self.ops.borrow_mut();
            f(&mut client, &mut ops);
        }
        self.wake.signal(());
    }

    /// Carry out queued operations until a discovery succeeds.
    ///
    /// Returns the discovered client so the caller can start listening
    /// on it; never returns otherwise.
    pub async fn execute(&self, conn: &Connection) -> Discovered {
        loop {
            let next = self.ops.borrow_mut().pop();
            let Some(op) = next else {
                self.wake.wait().await;
                continue;
            };

            if let Some(found) = self.run_op(conn, op).await {
                return found;
            }
        }
    }

    async fn run_op(&self, conn: &Connection, op: LinkOp) -> Option<Discovered> {
        match op {
            LinkOp::Discover(ServiceTarget::GattService) => {
                match gatt_client::discover::<GattServiceClient>(conn).await {
                    Ok(gatt) => {
                        let handles = gatt.handles();
                        self.dispatch(|client, ops| client.on_gatt_service_discovered(Ok(handles), ops));
                        Some(Discovered::GattService(gatt))
                    }
                    Err(e) => {
                        info!("Generic Attribute service not found: {:?}", e);
                        self.dispatch(|client, ops| {
                            client.on_gatt_service_discovered(Err(Error::ServiceNotFound), ops)
                        });
                        None
                    }
                }
            }
            LinkOp::Discover(ServiceTarget::Ancs) => {
                match gatt_client::discover::<AncsServiceClient>(conn).await {
                    Ok(ancs) => {
                        let handles = ancs.handles();
                        self.dispatch(|client, ops| client.on_ancs_discovered(Ok(handles), ops));
                        Some(Discovered::Ancs(ancs))
                    }
                    Err(e) => {
                        info!("ANCS not found: {:?}", e);
                        self.dispatch(|client, ops| {
                            client.on_ancs_discovered(Err(Error::ServiceNotFound), ops)
                        });
                        None
                    }
                }
            }
            LinkOp::SubscribeServiceChanged(h) => {
                log_failure(
                    "Service Changed subscription",
                    write(conn, h.service_changed_cccd, &CCCD_INDICATE, BleError::NotifyFailed).await,
                );
                None
            }
            LinkOp::SubscribeNotificationSource(h) => {
                log_failure(
                    "Notification Source subscription",
                    write(conn, h.notification_source_cccd, &CCCD_NOTIFY, BleError::NotifyFailed).await,
                );
                None
            }
            LinkOp::SubscribeDataSource(h) => {
                log_failure(
                    "Data Source subscription",
                    write(conn, h.data_source_cccd, &CCCD_NOTIFY, BleError::NotifyFailed).await,
                );
                None
            }
            LinkOp::WriteControlPoint(h, request) => {
                log_failure(
                    "Control Point write",
                    write(conn, h.control_point, request.as_bytes(), BleError::WriteFailed).await,
                );
                None
            }
        }
    }
}

async fn write(conn: &Connection, handle: u16, data: &[u8], on_error: BleError) -> Result<(), Error> {
    gatt_client::write(conn, handle, data)
        .await
        .map_err(|_| Error::Ble(on_error))
}

fn log_failure(what: &str, result: Result<(), Error>) {
    if let Err(e) = result {
        warn!("{} failed: {:?}", what, e);
    }
}
