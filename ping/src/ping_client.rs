use std::{net::Ipv4Addr, thread, time::Duration};

use anyhow::Result;
use tracing::info;

use crate::{
    icmp::{ICMPClient, PingRead, PingWrite, ProbeOutcome},
    packet::EchoRequest,
};

/// How sequence numbers are assigned to the probes of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SequenceMode {
    /// Every probe carries sequence 1
    #[default]
    Fixed,
    /// Probes are numbered 1, 2, 3, ...
    Incrementing,
}

impl SequenceMode {
    fn sequence(self, index: usize) -> u16 {
        match self {
            SequenceMode::Fixed => 1,
            SequenceMode::Incrementing => (index as u16).wrapping_add(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PingConfig {
    /// Number of probes per run
    pub count: usize,
    /// How long to wait for each reply
    pub timeout: Duration,
    /// Pause between consecutive probes
    pub interval: Duration,
    pub sequence_mode: SequenceMode,
}

impl Default for PingConfig {
    fn default() -> Self {
        Self {
            count: 4,
            timeout: Duration::from_secs(1),
            interval: Duration::from_secs(1),
            sequence_mode: SequenceMode::Fixed,
        }
    }
}

/// The outcomes of one run against one destination, in probe order.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeRun {
    destination: Ipv4Addr,
    identifier: u16,
    outcomes: Vec<ProbeOutcome>,
}

impl ProbeRun {
    pub fn new(
        destination: Ipv4Addr,
        identifier: u16,
        outcomes: Vec<ProbeOutcome>,
    ) -> Self {
        Self {
            destination,
            identifier,
            outcomes,
        }
    }

    pub fn destination(&self) -> Ipv4Addr {
        self.destination
    }

    pub fn identifier(&self) -> u16 {
        self.identifier
    }

    pub fn outcomes(&self) -> &[ProbeOutcome] {
        &self.outcomes
    }
}

/// Sends `config.count` probes to `destination`, one at a time, and collects
/// one outcome per probe. `identifier` tags every request of the run.
///
/// `on_probe` sees each request and its outcome as soon as it is known.
pub fn run_probes<S, F>(
    client: &mut ICMPClient<S>,
    destination: Ipv4Addr,
    identifier: u16,
    config: &PingConfig,
    mut on_probe: F,
) -> Result<ProbeRun>
where
    S: PingRead + PingWrite,
    F: FnMut(&EchoRequest, &ProbeOutcome) -> Result<()>,
{
    info!(%destination, identifier, count = config.count, "starting probe run");

    let mut outcomes = Vec::with_capacity(config.count);
    for index in 0..config.count {
        // No pause after the last probe
        if index > 0 {
            thread::sleep(config.interval);
        }

        let sequence = config.sequence_mode.sequence(index);
        let request = client.send_probe(destination, identifier, sequence)?;
        let outcome = client.await_reply(&request, config.timeout)?;

        on_probe(&request, &outcome)?;
        outcomes.push(outcome);
    }

    Ok(ProbeRun::new(destination, identifier, outcomes))
}
