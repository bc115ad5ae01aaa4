use std::time::Duration;

use clap::{Args, Parser};

use crate::{
    icmp::ReplyFilter,
    ping_client::{PingConfig, SequenceMode},
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Opts {
    /// Hosts to ping, by name or IPv4 address
    #[arg(required = true)]
    pub hosts: Vec<String>,

    #[command(flatten)]
    pub common_opts: CommonOpts,

    /// Number probes 1, 2, 3, ... and only accept replies with the matching
    /// sequence number
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub increment_seq: bool,

    /// Drop replies whose ICMP checksum does not verify
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub verify_checksum: bool,
}

#[derive(Args, Clone, Debug)]
pub struct CommonOpts {
    /// number of packets to send to each host
    #[arg(long, short, default_value = "4", value_parser = clap::value_parser!(u64).range(1..))]
    pub count: u64,
    /// interval between packets in seconds
    #[arg(long, short, default_value = "1", value_parser = parse_seconds)]
    pub interval: Duration,
    /// time to wait for each reply in seconds
    #[arg(long, short = 'W', default_value = "1", value_parser = parse_seconds)]
    pub timeout: Duration,
    /// Interface to bind to
    #[arg(long, short = 'I')]
    pub iface: Option<String>,
    /// Write one CSV line per probe to this file
    #[arg(long, short)]
    pub file: Option<String>,
}

fn parse_seconds(arg: &str) -> Result<Duration, String> {
    let seconds: f64 = arg
        .parse()
        .map_err(|_| format!("`{}` is not a number of seconds", arg))?;
    Duration::try_from_secs_f64(seconds).map_err(|e| e.to_string())
}

impl Opts {
    pub fn ping_config(&self) -> PingConfig {
        PingConfig {
            count: self.common_opts.count as usize,
            timeout: self.common_opts.timeout,
            interval: self.common_opts.interval,
            sequence_mode: if self.increment_seq {
                SequenceMode::Incrementing
            } else {
                SequenceMode::Fixed
            },
        }
    }

    pub fn reply_filter(&self) -> ReplyFilter {
        ReplyFilter {
            match_sequence: self.increment_seq,
            verify_checksum: self.verify_checksum,
        }
    }
}
