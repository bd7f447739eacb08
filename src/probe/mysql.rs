use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{debug, trace};

use crate::config::NodeConfig;
use crate::wire::{
    capabilities, is_err_packet, is_ok_packet, scramble_password, ErrPacket, HandshakeResponse,
    Packet, PacketCodec, ServerHandshake, COM_PING, COM_QUIT,
};

use super::connection::{ConnectionError, NodeConnector, ProbeConnection};

/// Opens MySQL probe connections
#[derive(Debug, Default)]
pub struct MySqlConnector;

#[async_trait]
impl NodeConnector for MySqlConnector {
    async fn connect(&self, node: &NodeConfig) -> Result<Box<dyn ProbeConnection>, ConnectionError> {
        let conn = MySqlProbeConnection::connect(node).await?;
        Ok(Box::new(conn))
    }
}

/// A MySQL connection used only for liveness probing
pub struct MySqlProbeConnection {
    framed: Framed<TcpStream, PacketCodec>,
    closed: bool,
}

impl MySqlProbeConnection {
    /// Connect and authenticate against a node
    pub async fn connect(node: &NodeConfig) -> Result<Self, ConnectionError> {
        let addr = node.addr();
        debug!(addr = %addr, "Opening probe connection");

        let connect_timeout = Duration::from_millis(node.connect_timeout_ms);
        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| ConnectionError::Connect(format!("connect timed out to {addr}")))?
            .map_err(|e| ConnectionError::Connect(e.to_string()))?;

        let mut framed = Framed::new(stream, PacketCodec);

        // Receive server handshake
        let handshake_packet = framed
            .next()
            .await
            .ok_or(ConnectionError::Disconnected)?
            .map_err(|e| ConnectionError::Io(e.to_string()))?;

        let server_handshake = ServerHandshake::parse(&handshake_packet.payload)
            .ok_or_else(|| ConnectionError::Protocol("Invalid server handshake".into()))?;

        trace!(
            server_version = %server_handshake.server_version,
            "Received server handshake"
        );

        let auth_data = server_handshake.auth_plugin_data();
        let auth_response = scramble_password(&node.password, &auth_data);

        let mut caps = capabilities::PROBE_CAPABILITIES & server_handshake.capability_flags;
        let database = node.database.clone();
        if database.is_some() {
            caps |= capabilities::CLIENT_CONNECT_WITH_DB;
        }

        let response = HandshakeResponse {
            capability_flags: caps,
            max_packet_size: 16 * 1024 * 1024,
            character_set: 0x21, // utf8_general_ci
            username: node.user.clone(),
            auth_response,
            database,
            auth_plugin_name: server_handshake.auth_plugin_name.clone(),
        };

        framed
            .send(response.encode(1))
            .await
            .map_err(|e| ConnectionError::Io(e.to_string()))?;

        // Receive OK or ERR
        let reply = framed
            .next()
            .await
            .ok_or(ConnectionError::Disconnected)?
            .map_err(|e| ConnectionError::Io(e.to_string()))?;

        if is_err_packet(&reply.payload) {
            let err = ErrPacket::parse(&reply.payload).unwrap_or(ErrPacket {
                error_code: 1045,
                error_message: "Access denied".to_string(),
            });
            return Err(ConnectionError::Auth(err.error_message));
        }

        if !is_ok_packet(&reply.payload) {
            return Err(ConnectionError::Protocol(
                "Expected OK packet after handshake".into(),
            ));
        }

        debug!(addr = %addr, "Probe connection established");

        Ok(Self {
            framed,
            closed: false,
        })
    }

    async fn ping(&mut self) -> bool {
        if self.framed.send(Packet::command(COM_PING)).await.is_err() {
            self.closed = true;
            return false;
        }

        match self.framed.next().await {
            Some(Ok(packet)) => {
                if is_ok_packet(&packet.payload) {
                    true
                } else {
                    self.closed = true;
                    false
                }
            }
            _ => {
                self.closed = true;
                false
            }
        }
    }
}

#[async_trait]
impl ProbeConnection for MySqlProbeConnection {
    async fn is_valid(&mut self, timeout: Duration) -> Result<bool, ConnectionError> {
        if self.closed {
            return Ok(false);
        }

        if timeout.is_zero() {
            return Ok(self.ping().await);
        }

        match tokio::time::timeout(timeout, self.ping()).await {
            Ok(alive) => Ok(alive),
            Err(_) => {
                // The reply may still arrive later and desync the stream
                self.closed = true;
                Ok(false)
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    async fn close(&mut self) -> Result<(), ConnectionError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        // COM_QUIT has no reply; the server just drops the connection
        self.framed
            .send(Packet::command(COM_QUIT))
            .await
            .map_err(|e| ConnectionError::Io(e.to_string()))?;
        Ok(())
    }
}
