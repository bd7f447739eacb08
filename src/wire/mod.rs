//! Minimal MySQL client wire protocol
//!
//! Just enough of the protocol for a probe connection: packet framing,
//! the client side of the handshake, and OK/ERR classification. No result
//! sets, no server-side packets.

mod codec;
mod handshake;
mod packet;

pub use codec::PacketCodec;
pub use handshake::{scramble_password, ErrPacket, HandshakeResponse, ServerHandshake};
pub use packet::{capabilities, is_err_packet, is_ok_packet, Packet, COM_PING, COM_QUIT};
