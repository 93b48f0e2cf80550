//! # Hand Server Module
//!
//! This module abstracts over the networking side of the hand executable. The server accepts
//! [`HandCmd`]s from clients on a REP socket and answers each of them with a [`HandResponse`].

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::{
    net::{zmq, MonitoredSocket, MonitoredSocketError, SocketOptions},
    tc::{HandCmd, HandResponse},
};
use log::warn;

use crate::params::HandExecParams;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Time the server waits for a command before returning control to the main loop.
const RECV_TIMEOUT_MS: i32 = 200;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// An abstraction over the networking part of the hand executable.
pub struct HandServer {
    /// REP socket which accepts commands from clients
    socket: MonitoredSocket,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors which can occur in the [`HandServer`]
#[derive(thiserror::Error, Debug)]
pub enum HandServerError {
    #[error("Socket error: {0}")]
    SocketError(#[from] MonitoredSocketError),

    #[error("Could not recieve a command from the client: {0}")]
    RecvError(zmq::Error),

    #[error("Could not send the response to the client: {0}")]
    SendError(zmq::Error),

    #[error("Could not serialize the response: {0}")]
    SerializationError(serde_json::Error),

    #[error("The client sent a command which was not valid UTF-8")]
    NonUtf8Command,

    #[error("Could not parse the recieved command: {0}")]
    CmdParseError(serde_json::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl HandServer {
    /// Create a new instance of the hand server.
    ///
    /// This function will not wait for a connection from a client before returning.
    pub fn new(ctx: &zmq::Context, params: &HandExecParams) -> Result<Self, HandServerError> {
        let options = SocketOptions {
            bind: true,
            block_on_first_connect: false,
            recv_timeout: RECV_TIMEOUT_MS,
            send_timeout: 10,
            ..Default::default()
        };

        let socket = MonitoredSocket::new(ctx, zmq::REP, options, &params.server_endpoint)?;

        Ok(Self { socket })
    }

    /// Retrieve the next command from a client.
    ///
    /// `Ok(None)` is returned if no command arrived within the receive timeout. After a command
    /// is returned the caller MUST answer it with [`HandServer::send_response`] before getting
    /// the next one. Commands which can't be parsed are answered by this function.
    pub fn get_cmd(&mut self) -> Result<Option<HandCmd>, HandServerError> {
        let cmd_str = match self.socket.recv_string(0) {
            Ok(Ok(s)) => s,
            Ok(Err(_)) => {
                self.send_response(&HandResponse::Error("Command is not valid UTF-8".into()))?;
                return Err(HandServerError::NonUtf8Command);
            }
            Err(zmq::Error::EAGAIN) => return Ok(None),
            Err(e) => return Err(HandServerError::RecvError(e)),
        };

        match serde_json::from_str(&cmd_str) {
            Ok(cmd) => Ok(Some(cmd)),
            Err(e) => {
                if let Err(send_err) =
                    self.send_response(&HandResponse::Error(format!("Invalid command: {}", e)))
                {
                    warn!("Could not reject invalid command: {}", send_err);
                }
                Err(HandServerError::CmdParseError(e))
            }
        }
    }

    /// Send the response to the last command.
    pub fn send_response(&mut self, response: &HandResponse) -> Result<(), HandServerError> {
        let resp_str =
            serde_json::to_string(response).map_err(HandServerError::SerializationError)?;

        self.socket
            .send(&resp_str, 0)
            .map_err(HandServerError::SendError)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_cmd_json() {
        let cmd = HandCmd::Close {
            end_pos: Some(30.0),
            duration_s: None,
            target_grip_force: Some(80.0),
        };

        let json = serde_json::to_string(&cmd).unwrap();
        let parsed: HandCmd = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, cmd);

        let parsed: HandCmd = serde_json::from_str(r#""Home""#).unwrap();
        assert_eq!(parsed, HandCmd::Home);
    }
}
