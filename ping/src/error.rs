use std::{io, time::SystemTimeError};

use crate::packet::MIN_REPLY_SIZE;

#[derive(Debug, thiserror::Error)]
pub enum PingError {
    /// Raw sockets need root or CAP_NET_RAW on most systems
    #[error("cannot open raw ICMP socket (are you root?)")]
    SocketCreationFailed(#[source] io::Error),

    #[error("malformed packet: {len} bytes, expected at least {}", MIN_REPLY_SIZE)]
    MalformedPacket { len: usize },

    #[error("cannot resolve `{host}` to an IPv4 address")]
    ResolutionFailed {
        host: String,
        #[source]
        source: Option<io::Error>,
    },

    #[error("system clock is set before the UNIX epoch")]
    Clock(#[from] SystemTimeError),

    #[error(transparent)]
    Io(#[from] io::Error),
}
