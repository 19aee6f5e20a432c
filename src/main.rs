//! ANCS watch firmware entry point.
//!
//! Tasks:
//! - `softdevice_task` - SoftDevice event pump
//! - `bluetooth_task` - advertising, bonding and the ANCS session
//! - `notification_task` - moves completed records into the store

#![no_std]
#![no_main]

use core::mem;

use ancs_watch::ble;
use ancs_watch::bridge::{self, NotificationChannel};
use ancs_watch::config::{self, MAX_NOTIFICATIONS};
use ancs_watch::store::NotificationStore;
use defmt::{info, unwrap};
use embassy_executor::Spawner;
use embassy_nrf::interrupt::Priority;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use nrf_softdevice::{raw, Softdevice};
use {defmt_rtt as _, nrf_softdevice_s140 as _, panic_probe as _};

/// Completed notifications, BLE context → application.
static RECORDS: NotificationChannel<CriticalSectionRawMutex> = Channel::new();

#[embassy_executor::task]
async fn softdevice_task(sd: &'static Softdevice) -> ! {
    sd.run().await
}

#[embassy_executor::task]
async fn bluetooth_task(sd: &'static Softdevice) -> ! {
    ble::ble_task(sd, &RECORDS.sender()).await
}

#[embassy_executor::task]
async fn notification_task() -> ! {
    let rx = RECORDS.receiver();
    let mut store: NotificationStore<MAX_NOTIFICATIONS> = NotificationStore::new();
    loop {
        bridge::forward_next(&rx, &mut store).await;
    }
}

fn softdevice_config() -> nrf_softdevice::Config {
    let name_len = config::BLE_DEVICE_NAME.len() as u16;
    nrf_softdevice::Config {
        clock: Some(raw::nrf_clock_lf_cfg_t {
            source: raw::NRF_CLOCK_LF_SRC_RC as u8,
            rc_ctiv: 16,
            rc_temp_ctiv: 2,
            accuracy: raw::NRF_CLOCK_LF_ACCURACY_500_PPM as u8,
        }),
        conn_gap: Some(raw::ble_gap_conn_cfg_t {
            conn_count: 1,
            event_length: 24,
        }),
        conn_gatt: Some(raw::ble_gatt_conn_cfg_t {
            att_mtu: config::BLE_ATT_MTU,
        }),
        gatts_attr_tab_size: Some(raw::ble_gatts_cfg_attr_tab_size_t {
            attr_tab_size: raw::BLE_GATTS_ATTR_TAB_SIZE_DEFAULT,
        }),
        gap_role_count: Some(raw::ble_gap_cfg_role_count_t {
            adv_set_count: 1,
            periph_role_count: 1,
            central_role_count: 0,
            central_sec_count: 0,
            _bitfield_1: raw::ble_gap_cfg_role_count_t::new_bitfield_1(0),
        }),
        gap_device_name: Some(raw::ble_gap_cfg_device_name_t {
            p_value: config::BLE_DEVICE_NAME.as_ptr() as _,
            current_len: name_len,
            max_len: name_len,
            write_perm: unsafe { mem::zeroed() },
            _bitfield_1: raw::ble_gap_cfg_device_name_t::new_bitfield_1(raw::BLE_GATTS_VLOC_STACK as u8),
        }),
        ..Default::default()
    }
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("ancs-watch starting");

    // The SoftDevice reserves priorities 0, 1 and 4.
    let mut nrf_config = embassy_nrf::config::Config::default();
    nrf_config.gpiote_interrupt_priority = Priority::P2;
    nrf_config.time_interrupt_priority = Priority::P2;
    let _p = embassy_nrf::init(nrf_config);

    let sd: &'static Softdevice = Softdevice::enable(&softdevice_config());

    unwrap!(spawner.spawn(softdevice_task(sd)));
    unwrap!(spawner.spawn(notification_task()));
    unwrap!(spawner.spawn(bluetooth_task(sd)));
}
