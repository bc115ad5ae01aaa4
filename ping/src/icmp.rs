use std::{
    io,
    net::Ipv4Addr,
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use common::ICMPSocket;
use tracing::{debug, trace};

use crate::{
    checksum,
    error::PingError,
    packet::{EchoReply, EchoRequest, IP_HEADER_SIZE},
};

/// Sending half of a probe socket.
pub trait PingWrite {
    fn write_to(&mut self, packet: &[u8], dst: Ipv4Addr) -> io::Result<usize>;
}

/// Receiving half of a probe socket.
pub trait PingRead {
    /// Reads one datagram, waiting at most `timeout`. `Ok(None)` means the
    /// timeout elapsed with nothing to read.
    fn read_timeout(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> io::Result<Option<usize>>;
}

impl PingWrite for ICMPSocket {
    fn write_to(&mut self, packet: &[u8], dst: Ipv4Addr) -> io::Result<usize> {
        self.send_to(packet, dst)
    }
}

impl PingRead for ICMPSocket {
    fn read_timeout(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> io::Result<Option<usize>> {
        self.recv_timeout(buf, timeout)
    }
}

/// Result of a single probe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProbeOutcome {
    Success { bytes: usize, rtt_ms: f64, ttl: u8 },
    Timeout,
}

impl ProbeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ProbeOutcome::Success { .. })
    }

    // Flattened accessors for display, a timeout reads as zero

    pub fn bytes(&self) -> usize {
        match self {
            ProbeOutcome::Success { bytes, .. } => *bytes,
            ProbeOutcome::Timeout => 0,
        }
    }

    pub fn rtt_ms(&self) -> f64 {
        match self {
            ProbeOutcome::Success { rtt_ms, .. } => *rtt_ms,
            ProbeOutcome::Timeout => 0.0,
        }
    }

    pub fn ttl(&self) -> u8 {
        match self {
            ProbeOutcome::Success { ttl, .. } => *ttl,
            ProbeOutcome::Timeout => 0,
        }
    }
}

/// Rules a received datagram must pass to count as the reply to a probe,
/// on top of the Echo Reply type and identifier check.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplyFilter {
    /// Require the reply sequence to equal the request sequence
    pub match_sequence: bool,
    /// Drop replies whose ICMP checksum does not verify
    pub verify_checksum: bool,
}

/// Seconds since the UNIX epoch, the clock carried in probe payloads.
pub fn unix_time() -> Result<f64, PingError> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs_f64())
}

pub struct ICMPClient<S> {
    /// Raw ICMP socket, or anything that reads and writes like one
    socket: S,
    /// Extra matching rules for replies
    filter: ReplyFilter,
    /// Receive buffer, large enough for one Ethernet MTU
    buf: [u8; 1500],
}

impl ICMPClient<ICMPSocket> {
    /// Opens a raw socket, optionally bound to `iface`.
    pub fn open(
        iface: Option<&str>,
        filter: ReplyFilter,
    ) -> Result<Self, PingError> {
        let socket =
            ICMPSocket::new(iface).map_err(PingError::SocketCreationFailed)?;
        Ok(Self::new(socket, filter))
    }
}

impl<S> ICMPClient<S>
where
    S: PingRead + PingWrite,
{
    pub fn new(socket: S, filter: ReplyFilter) -> Self {
        Self {
            socket,
            filter,
            buf: [0u8; 1500],
        }
    }

    #[cfg(test)]
    pub(crate) fn into_inner(self) -> S {
        self.socket
    }

    /// Sends one Echo Request stamped with the current time.
    pub fn send_probe(
        &mut self,
        dst: Ipv4Addr,
        identifier: u16,
        sequence: u16,
    ) -> Result<EchoRequest, PingError> {
        let request = EchoRequest::new(identifier, sequence, unix_time()?);
        self.socket.write_to(&request.encode(), dst)?;
        trace!(%dst, identifier, sequence, "sent echo request");
        Ok(request)
    }

    /// Waits up to `timeout` for the reply to `request`.
    ///
    /// Datagrams that do not match are dropped and the wait goes on with
    /// whatever is left of the original timeout.
    pub fn await_reply(
        &mut self,
        request: &EchoRequest,
        timeout: Duration,
    ) -> Result<ProbeOutcome, PingError> {
        let mut time_left = timeout;

        loop {
            let started = Instant::now();
            let ready = self.socket.read_timeout(&mut self.buf, time_left)?;
            let received_at = unix_time()?;

            let len = match ready {
                Some(len) => len,
                None => return Ok(ProbeOutcome::Timeout),
            };

            if let Some(reply) = self.accept(&self.buf[..len], request) {
                let send_time = reply.send_time.unwrap_or(request.send_time);
                let rtt_ms = ((received_at - send_time) * 1000.0).max(0.0);
                return Ok(ProbeOutcome::Success {
                    bytes: reply.total_bytes,
                    rtt_ms,
                    ttl: reply.ttl,
                });
            }

            time_left = time_left.saturating_sub(started.elapsed());
            if time_left.is_zero() {
                return Ok(ProbeOutcome::Timeout);
            }
        }
    }

    fn accept(&self, datagram: &[u8], request: &EchoRequest) -> Option<EchoReply> {
        let reply = match EchoReply::decode(datagram) {
            Ok(reply) => reply,
            Err(e) => {
                debug!("discarding datagram: {}", e);
                return None;
            }
        };

        if !reply.is_echo_reply() {
            trace!(icmp_type = reply.icmp_type, code = reply.code, "not an echo reply");
            return None;
        }
        if reply.identifier != request.identifier {
            trace!(
                identifier = reply.identifier,
                expected = request.identifier,
                "echo reply for another pinger"
            );
            return None;
        }
        if self.filter.match_sequence && reply.sequence != request.sequence {
            debug!(
                sequence = reply.sequence,
                expected = request.sequence,
                "stale echo reply"
            );
            return None;
        }
        if self.filter.verify_checksum
            && !checksum::verify(&datagram[IP_HEADER_SIZE..])
        {
            debug!(checksum = reply.checksum, "echo reply with bad checksum");
            return None;
        }
        Some(reply)
    }
}


#[cfg(test)]
mod test {
    use super::{testing::ScriptedSocket, *};
    use crate::packet::{echo_reply_datagram, ECHO_REQUEST_SIZE};

    const DST: Ipv4Addr = Ipv4Addr::new(192, 0, 2, 1);

    fn client(socket: ScriptedSocket, filter: ReplyFilter) -> ICMPClient<ScriptedSocket> {
        ICMPClient::new(socket, filter)
    }

    #[test]
    fn sends_encoded_request() {
        let mut client = client(ScriptedSocket::default(), ReplyFilter::default());

        let request = client.send_probe(DST, 0x4242, 1).unwrap();

        let (packet, dst) = &client.socket.sent[0];
        assert_eq!(*dst, DST);
        assert_eq!(packet.len(), ECHO_REQUEST_SIZE);
        assert_eq!(packet.as_slice(), &request.encode()[..]);
        assert_eq!(request.identifier, 0x4242);
        assert_eq!(request.sequence, 1);
    }

    #[test]
    fn matching_reply_is_success() {
        let request = EchoRequest::new(7, 1, unix_time().unwrap() - 0.010);
        let mut socket = ScriptedSocket::default();
        socket.inbox.push_back(echo_reply_datagram(&request, 57));
        let mut client = client(socket, ReplyFilter::default());

        let outcome = client
            .await_reply(&request, Duration::from_secs(1))
            .unwrap();

        match outcome {
            ProbeOutcome::Success { bytes, rtt_ms, ttl } => {
                assert_eq!(bytes, 36);
                assert_eq!(ttl, 57);
                assert!(rtt_ms > 9.0 && rtt_ms < 1000.0, "rtt {}", rtt_ms);
            }
            ProbeOutcome::Timeout => panic!("expected a reply"),
        }
    }

    #[test]
    fn short_datagram_keeps_waiting() {
        let request = EchoRequest::new(7, 1, unix_time().unwrap());
        let mut socket = ScriptedSocket::default();
        socket.inbox.push_back(vec![0x45; 27]);
        socket.inbox.push_back(echo_reply_datagram(&request, 64));
        let mut client = client(socket, ReplyFilter::default());

        let outcome = client
            .await_reply(&request, Duration::from_secs(1))
            .unwrap();

        assert!(outcome.is_success());
        assert_eq!(client.socket.waits.len(), 2);
    }

    #[test]
    fn foreign_reply_does_not_reset_deadline() {
        let request = EchoRequest::new(7, 1, unix_time().unwrap());
        let other = EchoRequest::new(8, 1, request.send_time);
        let mut socket = ScriptedSocket::default();
        socket.read_delay = Duration::from_millis(20);
        socket.inbox.push_back(echo_reply_datagram(&other, 64));
        socket.inbox.push_back(echo_reply_datagram(&other, 64));
        let mut client = client(socket, ReplyFilter::default());

        let timeout = Duration::from_millis(500);
        let outcome = client.await_reply(&request, timeout).unwrap();

        assert_eq!(outcome, ProbeOutcome::Timeout);
        let waits = &client.socket.waits;
        assert_eq!(waits.len(), 3);
        assert_eq!(waits[0], timeout);
        assert!(waits[1] <= timeout - Duration::from_millis(20));
        assert!(waits[2] <= waits[1] - Duration::from_millis(20));
    }

    #[test]
    fn exhausted_deadline_is_timeout() {
        let request = EchoRequest::new(7, 1, unix_time().unwrap());
        let other = EchoRequest::new(8, 1, request.send_time);
        let mut socket = ScriptedSocket::default();
        socket.read_delay = Duration::from_millis(30);
        for _ in 0..10 {
            socket.inbox.push_back(echo_reply_datagram(&other, 64));
        }
        let mut client = client(socket, ReplyFilter::default());

        let outcome = client
            .await_reply(&request, Duration::from_millis(50))
            .unwrap();

        assert_eq!(outcome, ProbeOutcome::Timeout);
        assert_eq!(client.socket.waits.len(), 2);
    }

    #[test]
    fn own_request_is_ignored() {
        let request = EchoRequest::new(7, 1, unix_time().unwrap());
        let mut looped = vec![0x45; IP_HEADER_SIZE];
        looped.extend_from_slice(&request.encode());
        let mut socket = ScriptedSocket::default();
        socket.inbox.push_back(looped);
        let mut client = client(socket, ReplyFilter::default());

        let outcome = client
            .await_reply(&request, Duration::from_millis(100))
            .unwrap();
        assert_eq!(outcome, ProbeOutcome::Timeout);
    }

    #[test]
    fn sequence_only_checked_when_asked() {
        let stale = EchoRequest::new(7, 1, unix_time().unwrap());
        let request = EchoRequest::new(7, 2, stale.send_time);

        let mut socket = ScriptedSocket::default();
        socket.inbox.push_back(echo_reply_datagram(&stale, 64));
        let mut lenient = client(socket, ReplyFilter::default());
        assert!(lenient
            .await_reply(&request, Duration::from_millis(100))
            .unwrap()
            .is_success());

        let mut socket = ScriptedSocket::default();
        socket.inbox.push_back(echo_reply_datagram(&stale, 64));
        socket.inbox.push_back(echo_reply_datagram(&request, 64));
        let filter = ReplyFilter {
            match_sequence: true,
            ..Default::default()
        };
        let mut strict = client(socket, filter);
        assert!(strict
            .await_reply(&request, Duration::from_millis(100))
            .unwrap()
            .is_success());
        assert_eq!(strict.socket.waits.len(), 2);
    }

    #[test]
    fn bad_checksum_only_rejected_when_verifying() {
        let request = EchoRequest::new(7, 1, unix_time().unwrap());
        let mut corrupted = echo_reply_datagram(&request, 64);
        corrupted[IP_HEADER_SIZE + 2] ^= 0xff;

        let mut socket = ScriptedSocket::default();
        socket.inbox.push_back(corrupted.clone());
        let mut lenient = client(socket, ReplyFilter::default());
        assert!(lenient
            .await_reply(&request, Duration::from_millis(100))
            .unwrap()
            .is_success());

        let mut socket = ScriptedSocket::default();
        socket.inbox.push_back(corrupted);
        let filter = ReplyFilter {
            verify_checksum: true,
            ..Default::default()
        };
        let mut strict = client(socket, filter);
        assert_eq!(
            strict
                .await_reply(&request, Duration::from_millis(100))
                .unwrap(),
            ProbeOutcome::Timeout
        );
    }

    #[test]
    fn timeout_flattens_to_zero() {
        let outcome = ProbeOutcome::Timeout;
        assert!(!outcome.is_success());
        assert_eq!(outcome.bytes(), 0);
        assert_eq!(outcome.rtt_ms(), 0.0);
        assert_eq!(outcome.ttl(), 0);
    }
}
