//! ICMP Echo packet building and parsing

use crate::{checksum::checksum, error::PingError};

pub const ICMP_ECHO_REPLY: u8 = 0;
pub const ICMP_ECHO_REQUEST: u8 = 8;

/// IPv4 header without options
pub const IP_HEADER_SIZE: usize = 20;
pub const ICMP_HEADER_SIZE: usize = 8;
pub const TIMESTAMP_SIZE: usize = 8;

/// ICMP header plus the timestamp payload
pub const ECHO_REQUEST_SIZE: usize = ICMP_HEADER_SIZE + TIMESTAMP_SIZE;

/// Shortest datagram that still carries a whole ICMP header
pub const MIN_REPLY_SIZE: usize = IP_HEADER_SIZE + ICMP_HEADER_SIZE;

const TTL_OFFSET: usize = 8;

/// An outgoing Echo Request. `send_time` is seconds since the UNIX epoch and
/// travels as the 8 byte payload, so the reply carries it back.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EchoRequest {
    pub identifier: u16,
    pub sequence: u16,
    pub send_time: f64,
}

impl EchoRequest {
    pub fn new(identifier: u16, sequence: u16, send_time: f64) -> Self {
        Self {
            identifier,
            sequence,
            send_time,
        }
    }

    fn header(&self, checksum: u16) -> [u8; ICMP_HEADER_SIZE] {
        let mut header = [0u8; ICMP_HEADER_SIZE];
        header[0] = ICMP_ECHO_REQUEST;
        header[1] = 0;
        header[2..4].copy_from_slice(&checksum.to_be_bytes());
        header[4..6].copy_from_slice(&self.identifier.to_be_bytes());
        header[6..8].copy_from_slice(&self.sequence.to_be_bytes());
        header
    }

    /// Wire format: 8 byte ICMP header followed by the timestamp.
    pub fn encode(&self) -> [u8; ECHO_REQUEST_SIZE] {
        let mut packet = [0u8; ECHO_REQUEST_SIZE];
        packet[..ICMP_HEADER_SIZE].copy_from_slice(&self.header(0));
        packet[ICMP_HEADER_SIZE..]
            .copy_from_slice(&self.send_time.to_be_bytes());

        let checksum = checksum(&packet);
        packet[..ICMP_HEADER_SIZE].copy_from_slice(&self.header(checksum));
        packet
    }
}

/// Fields of a received IPv4 datagram carrying an ICMP message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EchoReply {
    pub icmp_type: u8,
    pub code: u8,
    pub checksum: u16,
    pub identifier: u16,
    pub sequence: u16,
    pub ttl: u8,
    /// `None` when the datagram ends right after the ICMP header
    pub send_time: Option<f64>,
    pub total_bytes: usize,
}

impl EchoReply {
    /// Decodes a datagram as read from a raw socket, IP header included.
    ///
    /// The IP header is assumed to be exactly 20 bytes; datagrams carrying IP
    /// options are misparsed.
    pub fn decode(datagram: &[u8]) -> Result<Self, PingError> {
        if datagram.len() < MIN_REPLY_SIZE {
            return Err(PingError::MalformedPacket {
                len: datagram.len(),
            });
        }

        let icmp = &datagram[IP_HEADER_SIZE..];
        let send_time = icmp
            .get(ICMP_HEADER_SIZE..ICMP_HEADER_SIZE + TIMESTAMP_SIZE)
            .map(|payload| {
                let mut bytes = [0u8; TIMESTAMP_SIZE];
                bytes.copy_from_slice(payload);
                f64::from_be_bytes(bytes)
            });

        Ok(Self {
            icmp_type: icmp[0],
            code: icmp[1],
            checksum: u16::from_be_bytes([icmp[2], icmp[3]]),
            identifier: u16::from_be_bytes([icmp[4], icmp[5]]),
            sequence: u16::from_be_bytes([icmp[6], icmp[7]]),
            ttl: datagram[TTL_OFFSET],
            send_time,
            total_bytes: datagram.len(),
        })
    }

    /// Only the type is checked, the code byte is ignored.
    pub fn is_echo_reply(&self) -> bool {
        self.icmp_type == ICMP_ECHO_REPLY
    }
}

/// Builds the datagram a peer would send back for `request`, IPv4 header
/// included.
#[cfg(test)]
pub(crate) fn echo_reply_datagram(request: &EchoRequest, ttl: u8) -> Vec<u8> {
    let mut icmp = request.encode().to_vec();
    icmp[0] = ICMP_ECHO_REPLY;
    icmp[2..4].copy_from_slice(&[0, 0]);
    let csum = checksum(&icmp);
    icmp[2..4].copy_from_slice(&csum.to_be_bytes());

    let total_len = (IP_HEADER_SIZE + icmp.len()) as u16;
    let mut datagram = vec![0u8; IP_HEADER_SIZE];
    datagram[0] = 0x45;
    datagram[2..4].copy_from_slice(&total_len.to_be_bytes());
    datagram[TTL_OFFSET] = ttl;
    datagram[9] = 1;
    datagram[12..16].copy_from_slice(&[10, 0, 0, 1]);
    datagram[16..20].copy_from_slice(&[10, 0, 0, 2]);
    datagram.extend_from_slice(&icmp);
    datagram
}
