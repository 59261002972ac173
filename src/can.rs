// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use kanal::{ReceiveErrorTimeout, Receiver, Sender};
use log::trace;
use std::{fmt, io, time::Duration};

/// Bus index of the vehicle's primary powertrain bus.
pub const PRIMARY_BUS: u8 = 0;

/// Largest payload a classic CAN frame can carry.
pub const MAX_PAYLOAD: usize = 8;

/// CAN transport error types.
#[derive(Debug)]
pub enum Error {
    /// I/O error from underlying socket operations
    Io(io::Error),
    /// All producers feeding the frame channel have gone away
    Disconnected,
    /// No CAN interface was configured
    NoInterface,
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Io(err) => write!(f, "io error: {}", err),
            Error::Disconnected => write!(f, "frame source disconnected"),
            Error::NoInterface => write!(f, "no can interface"),
        }
    }
}

/// A single CAN message as seen on one of the vehicle buses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Index of the bus the frame was received on
    pub bus: u8,
    /// CAN message ID (11-bit or 29-bit)
    pub address: u32,
    /// Frame payload
    pub data: Vec<u8>,
}

impl Frame {
    /// Creates a frame, copying the payload.
    pub fn new(bus: u8, address: u32, data: &[u8]) -> Self {
        Frame {
            bus,
            address,
            data: data.to_vec(),
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "bus {} {:#05X} [{}] {:02X?}",
            self.bus,
            self.address,
            self.data.len(),
            self.data
        )
    }
}

/// Frames handed over by the transport in one go.
pub type FrameBatch = Vec<Frame>;

/// Producer of frame batches for the fingerprint resolver.
pub trait FrameSource {
    /// Returns every batch queued since the last call. With `wait_for_one`
    /// the call blocks until at least one batch is available, then drains the
    /// rest without blocking again.
    fn drain(&mut self, wait_for_one: bool) -> Result<Vec<FrameBatch>, Error>;

    /// Like `drain(true)` but gives up waiting after `wait`, returning no
    /// batches. Sources which cannot bound the wait block as `drain(true)`.
    fn drain_timeout(&mut self, _wait: Duration) -> Result<Vec<FrameBatch>, Error> {
        self.drain(true)
    }
}

/// Frame source backed by a channel, fed by one or more bus readers.
pub struct ChannelSource {
    rx: Receiver<FrameBatch>,
}

impl ChannelSource {
    /// Wraps the receiving end of a batch channel.
    pub fn new(rx: Receiver<FrameBatch>) -> Self {
        ChannelSource { rx }
    }

    /// Creates a source together with the sender producers push batches into.
    pub fn unbounded() -> (Sender<FrameBatch>, Self) {
        let (tx, rx) = kanal::unbounded();
        (tx, ChannelSource::new(rx))
    }

    /// Appends every batch available without blocking.
    fn drain_ready(&mut self, mut batches: Vec<FrameBatch>) -> Result<Vec<FrameBatch>, Error> {
        loop {
            match self.rx.try_recv() {
                Ok(Some(batch)) => batches.push(batch),
                Ok(None) => break,
                // Keep what we already drained, report closure on the next call.
                Err(_) if !batches.is_empty() => break,
                Err(_) => return Err(Error::Disconnected),
            }
        }

        trace!("drained {} batches", batches.len());
        Ok(batches)
    }
}

impl FrameSource for ChannelSource {
    fn drain(&mut self, wait_for_one: bool) -> Result<Vec<FrameBatch>, Error> {
        let mut batches = Vec::new();

        if wait_for_one {
            batches.push(self.rx.recv().map_err(|_| Error::Disconnected)?);
        }

        self.drain_ready(batches)
    }

    fn drain_timeout(&mut self, wait: Duration) -> Result<Vec<FrameBatch>, Error> {
        match self.rx.recv_timeout(wait) {
            Ok(batch) => self.drain_ready(vec![batch]),
            Err(ReceiveErrorTimeout::Timeout) => {
                trace!("no batches within {:?}", wait);
                Ok(Vec::new())
            }
            Err(_) => Err(Error::Disconnected),
        }
    }
}

#[cfg(feature = "can")]
pub use socket::{open, read_frame, spawn_reader};

#[cfg(feature = "can")]
mod socket {
    use super::{Error, Frame, FrameBatch};
    use kanal::Sender;
    use log::{debug, error, warn};
    use socketcan::{CanFrame, CanSocket, EmbeddedFrame, Id as CanId, Socket};
    use std::thread;

    /// Opens a blocking SocketCAN interface such as `can0`.
    pub fn open(interface: &str) -> Result<CanSocket, Error> {
        debug!("opening can interface {}", interface);
        Ok(CanSocket::open(interface)?)
    }

    /// Read next data frame from socket, skipping remote and error frames.
    ///
    /// # Arguments
    /// * `sock` - Open CAN socket
    /// * `bus` - Bus index stamped onto the returned frame
    ///
    /// # Errors
    /// Returns Error if socket read fails
    pub fn read_frame(sock: &CanSocket, bus: u8) -> Result<Frame, Error> {
        loop {
            match sock.read_frame()? {
                CanFrame::Data(frame) => {
                    let address = match frame.id() {
                        CanId::Standard(id) => id.as_raw() as u32,
                        CanId::Extended(id) => id.as_raw(),
                    };
                    return Ok(Frame::new(bus, address, frame.data()));
                }
                CanFrame::Remote(frame) => warn!("bus {} remote frame: {:?}", bus, frame),
                CanFrame::Error(frame) => warn!("bus {} error frame: {:?}", bus, frame),
            }
        }
    }

    /// Spawns a reader thread forwarding every frame of `interface` as a
    /// single-frame batch. The thread exits when the socket fails or every
    /// receiver is dropped.
    pub fn spawn_reader(
        interface: &str,
        bus: u8,
        tx: Sender<FrameBatch>,
    ) -> Result<thread::JoinHandle<()>, Error> {
        let sock = open(interface)?;
        let name = format!("can{}", bus);
        let interface = interface.to_string();

        let handle = thread::Builder::new().name(name).spawn(move || loop {
            match read_frame(&sock, bus) {
                Ok(frame) => {
                    if tx.send(vec![frame]).is_err() {
                        debug!("{} reader closed", interface);
                        return;
                    }
                }
                Err(err) => {
                    error!("{} read error: {}", interface, err);
                    return;
                }
            }
        })?;

        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_waits_then_empties_queue() {
        let (tx, mut source) = ChannelSource::unbounded();
        tx.send(vec![Frame::new(0, 0x1D0, &[0; 8])]).unwrap();
        tx.send(vec![Frame::new(1, 0x1D4, &[0; 4])]).unwrap();
        tx.send(vec![]).unwrap();

        let batches = source.drain(true).unwrap();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0][0].address, 0x1D0);
        assert_eq!(batches[1][0].bus, 1);

        assert!(source.drain(false).unwrap().is_empty());
    }

    #[test]
    fn test_drain_disconnected() {
        let (tx, mut source) = ChannelSource::unbounded();
        tx.send(vec![Frame::new(0, 0x39, &[1, 2, 3])]).unwrap();
        drop(tx);

        assert_eq!(source.drain(true).unwrap().len(), 1);
        assert!(matches!(source.drain(true), Err(Error::Disconnected)));
    }

    #[test]
    fn test_drain_timeout_on_silent_bus() {
        let (tx, mut source) = ChannelSource::unbounded();

        let start = std::time::Instant::now();
        assert!(source
            .drain_timeout(Duration::from_millis(50))
            .unwrap()
            .is_empty());
        assert!(start.elapsed() >= Duration::from_millis(50));

        tx.send(vec![Frame::new(0, 0x1D0, &[0; 8])]).unwrap();
        tx.send(vec![Frame::new(0, 0x1D4, &[0; 4])]).unwrap();
        assert_eq!(
            source
                .drain_timeout(Duration::from_millis(50))
                .unwrap()
                .len(),
            2
        );

        drop(tx);
        assert!(matches!(
            source.drain_timeout(Duration::from_millis(50)),
            Err(Error::Disconnected)
        ));
    }

    #[test]
    fn test_frame_display() {
        let frame = Frame::new(0, 0x39, &[0xAB, 0x01, 0x00]);
        assert_eq!(frame.to_string(), "bus 0 0x039 [3] [AB, 01, 00]");
    }
}
