//! Contract with the acoustic-modem driver.
//!
//! The core never talks to hardware directly; it drives whatever implements
//! [`ModemDriver`]. The scheduler is the single call site feeding the
//! transmit channel, so implementations may block for a frame time without
//! breaking anything; the tick rate is already bounded by modem throughput.

/// Operations the FLOC core consumes from the modem driver.
pub trait ModemDriver {
    /// Queue a frame for over-the-air transmission. May block.
    fn broadcast(&mut self, frame: &[u8]);

    /// Issue a ranging ping to a neighbor's modem address.
    fn ping(&mut self, modem_id: u16);

    /// Ask the modem for its status. The answer arrives asynchronously
    /// through the host glue, which feeds it back via `FlocNode::send_status`.
    fn query_status(&mut self);
}

/// Translate a device/network pair to the modem address plane.
///
/// The deployed address plan maps devices one-to-one onto modem ids, so this
/// is the identity on the device id today; deployments with a separate
/// acoustic addressing scheme swap this single function.
pub fn modem_id_from(device_id: u16, _network_id: u16) -> u16 {
    device_id
}

#[cfg(test)]
pub(crate) mod testing {
    use super::ModemDriver;

    /// Test double that records every driver call.
    #[derive(Debug, Default)]
    pub struct RecordingModem {
        pub broadcasts: Vec<Vec<u8>>,
        pub pings: Vec<u16>,
        pub status_queries: usize,
    }

    impl ModemDriver for RecordingModem {
        fn broadcast(&mut self, frame: &[u8]) {
            self.broadcasts.push(frame.to_vec());
        }

        fn ping(&mut self, modem_id: u16) {
            self.pings.push(modem_id);
        }

        fn query_status(&mut self) {
            self.status_queries += 1;
        }
    }
}
