//! # Networked bus client
//!
//! [`Bus`] implementation which forwards every request to a bus gateway over a zmq REQ socket.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::sync::Mutex;

use log::trace;

use super::{MonitoredSocket, MonitoredSocketError, SocketOptions};
use crate::{
    bus::{Bus, BusError},
    eqpt::{BusRequest, BusResponse, DiskCmd, DiskId, DiskTelemetry, ModuleId},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Client side of a bus segment exposed by a gateway.
///
/// Requests are serialised through a mutex, so one `ZmqBus` can be shared by every actuator of
/// the segment.
pub struct ZmqBus {
    socket: Mutex<MonitoredSocket>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ZmqBus {
    /// Connect to the gateway at `endpoint`.
    ///
    /// `timeout_ms` bounds both the first connection and each request/response exchange.
    pub fn connect(
        ctx: &zmq::Context,
        endpoint: &str,
        timeout_ms: i32,
    ) -> Result<Self, MonitoredSocketError> {
        let options = SocketOptions {
            connect_timeout: timeout_ms,
            linger: 1,
            recv_timeout: timeout_ms,
            send_timeout: timeout_ms,
            req_correlate: true,
            req_relaxed: true,
            ..Default::default()
        };

        Ok(Self {
            socket: Mutex::new(MonitoredSocket::new(ctx, zmq::REQ, options, endpoint)?),
        })
    }

    fn request(&self, request: &BusRequest) -> Result<BusResponse, BusError> {
        let socket = self.socket.lock().map_err(|_| BusError::Poisoned)?;

        if !socket.connected() {
            return Err(BusError::NotConnected);
        }

        let req_str = serde_json::to_string(request).map_err(BusError::SerializationError)?;
        socket
            .send(&req_str, 0)
            .map_err(|e| BusError::SendError(e.to_string()))?;

        let msg = socket
            .recv_msg(0)
            .map_err(|e| BusError::RecvError(e.to_string()))?;

        let response: BusResponse = serde_json::from_str(msg.as_str().unwrap_or(""))
            .map_err(BusError::SerializationError)?;

        trace!("{:?} -> {:?}", request, response);

        match response {
            BusResponse::Rejected(reason) => Err(BusError::Rejected(reason)),
            r => Ok(r),
        }
    }
}

impl Bus for ZmqBus {
    fn send(&self, id: DiskId, cmd: DiskCmd) -> Result<(), BusError> {
        match self.request(&BusRequest::Command { id, cmd })? {
            BusResponse::Ack => Ok(()),
            BusResponse::NotFound => Err(BusError::UnknownDisk(id)),
            r => Err(BusError::UnexpectedResponse(format!("{:?}", r))),
        }
    }

    fn disk_telemetry(&self, id: DiskId) -> Result<DiskTelemetry, BusError> {
        match self.request(&BusRequest::Telemetry { id })? {
            BusResponse::Telemetry(t) => Ok(t),
            BusResponse::NotFound => Err(BusError::UnknownDisk(id)),
            r => Err(BusError::UnexpectedResponse(format!("{:?}", r))),
        }
    }

    fn sensor_raw(&self, id: ModuleId) -> Result<f64, BusError> {
        match self.request(&BusRequest::SensorRaw { id })? {
            BusResponse::SensorRaw(raw) => Ok(raw),
            BusResponse::NotFound => Err(BusError::UnknownSensor(id)),
            r => Err(BusError::UnexpectedResponse(format!("{:?}", r))),
        }
    }

    fn find_disk(&self, id: DiskId) -> Result<(), BusError> {
        match self.request(&BusRequest::FindDisk { id })? {
            BusResponse::Ack => Ok(()),
            BusResponse::NotFound => Err(BusError::UnknownDisk(id)),
            r => Err(BusError::UnexpectedResponse(format!("{:?}", r))),
        }
    }

    fn find_module(&self, name: &str) -> Result<ModuleId, BusError> {
        match self.request(&BusRequest::FindModule { name: name.into() })? {
            BusResponse::Module(id) => Ok(id),
            BusResponse::NotFound => Err(BusError::UnknownModule(name.into())),
            r => Err(BusError::UnexpectedResponse(format!("{:?}", r))),
        }
    }
}
