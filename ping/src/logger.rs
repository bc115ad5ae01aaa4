use std::net::Ipv4Addr;

use common::Logging;

use crate::{icmp::ProbeOutcome, packet::EchoRequest};

/// One CSV row per probe.
#[derive(Debug, Logging, Clone, Default)]
pub struct ProbeRecord {
    pub seq: u16,
    pub identifier: u16,
    pub dst_addr: String,
    pub status: &'static str,
    pub size: usize,
    pub rtt: f64,
    pub ttl: u8,
    pub send_timestamp: f64,
    pub recv_timestamp: f64,
}

impl ProbeRecord {
    pub fn new(
        dst_addr: Ipv4Addr,
        request: &EchoRequest,
        outcome: &ProbeOutcome,
    ) -> Self {
        let (status, recv_timestamp) = match outcome {
            ProbeOutcome::Success { rtt_ms, .. } => {
                ("reply", request.send_time + rtt_ms / 1000.0)
            }
            ProbeOutcome::Timeout => ("timeout", 0.0),
        };
        Self {
            seq: request.sequence,
            identifier: request.identifier,
            dst_addr: dst_addr.to_string(),
            status,
            size: outcome.bytes(),
            rtt: outcome.rtt_ms(),
            ttl: outcome.ttl(),
            send_timestamp: request.send_time,
            recv_timestamp,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn header_follows_field_order() {
        assert_eq!(
            ProbeRecord::default().header(),
            "seq,identifier,dst_addr,status,size,rtt,ttl,send_timestamp,\
             recv_timestamp\n"
        );
    }

    #[test]
    fn reply_row() {
        let request = EchoRequest::new(77, 1, 100.0);
        let outcome = ProbeOutcome::Success {
            bytes: 36,
            rtt_ms: 250.0,
            ttl: 57,
        };

        let record =
            ProbeRecord::new(Ipv4Addr::new(8, 8, 8, 8), &request, &outcome);

        assert_eq!(
            record.to_string(),
            "1,77,8.8.8.8,reply,36,250,57,100,100.25\n"
        );
    }

    #[test]
    fn timeout_row() {
        let request = EchoRequest::new(77, 1, 100.0);
        let record = ProbeRecord::new(
            Ipv4Addr::new(8, 8, 8, 8),
            &request,
            &ProbeOutcome::Timeout,
        );

        assert_eq!(record.to_string(), "1,77,8.8.8.8,timeout,0,0,0,100,0\n");
    }
}
