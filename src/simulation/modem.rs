//! Simulated acoustic modem backing the driver contract.

use crate::modem::ModemDriver;

use super::types::{AirFrame, UplinkQueueSender};

/// In-process stand-in for the serial modem. Transmissions go to the medium
/// task over the shared uplink channel; ranging pings are logged (the harness
/// models no time-of-flight); status queries arm a voltage callback the node
/// task drains on its next tick, preserving the asynchronous shape of the
/// real driver.
pub struct SimulatedModem {
    device_id: u16,
    uplink_tx: UplinkQueueSender,
    supply_voltage: f32,
    pending_status: Option<f32>,
}

impl SimulatedModem {
    pub fn new(device_id: u16, supply_voltage: f32, uplink_tx: UplinkQueueSender) -> Self {
        Self {
            device_id,
            uplink_tx,
            supply_voltage,
            pending_status: None,
        }
    }

    /// Take the result of an earlier `query_status`, if one has arrived.
    pub fn take_status(&mut self) -> Option<f32> {
        self.pending_status.take()
    }
}

impl ModemDriver for SimulatedModem {
    fn broadcast(&mut self, frame: &[u8]) {
        let air = AirFrame {
            sender: self.device_id,
            bytes: frame.to_vec(),
        };
        if self.uplink_tx.try_send(air).is_err() {
            log::warn!("[{}] medium uplink full, frame lost", self.device_id);
        }
    }

    fn ping(&mut self, modem_id: u16) {
        log::info!("[{}] ranging ping to modem {modem_id}", self.device_id);
    }

    fn query_status(&mut self) {
        self.pending_status = Some(self.supply_voltage);
    }
}
