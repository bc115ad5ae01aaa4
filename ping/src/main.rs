use std::net::{IpAddr, Ipv4Addr, ToSocketAddrs};

use anyhow::{Context, Result};
use clap::Parser;
use common::Logger;
use tracing_subscriber::EnvFilter;

mod args;
mod checksum;
mod error;
mod icmp;
mod logger;
mod packet;
mod ping_client;
mod summary;

use crate::{
    error::PingError,
    icmp::{ICMPClient, ProbeOutcome},
    logger::ProbeRecord,
    packet::ECHO_REQUEST_SIZE,
};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = args::Opts::parse();
    let config = args.ping_config();
    let filter = args.reply_filter();

    // Every host is resolved before the first probe goes out
    let targets = args
        .hosts
        .iter()
        .map(|host| resolve(host).map(|addr| (host.as_str(), addr)))
        .collect::<Result<Vec<_>, _>>()?;

    let mut logger = match args.common_opts.file.as_deref() {
        Some(file_name) => Some(Logger::<ProbeRecord>::new(file_name)?),
        None => None,
    };

    for (host, dst_addr) in targets {
        let mut client =
            ICMPClient::open(args.common_opts.iface.as_deref(), filter)?;

        println!(
            "\nPinging {} [{}] with {} bytes of data:\n",
            host, dst_addr, ECHO_REQUEST_SIZE
        );

        let run = ping_client::run_probes(
            &mut client,
            dst_addr,
            rand::random::<u16>(),
            &config,
            |request, outcome| {
                print_outcome(dst_addr, outcome);
                if let Some(logger) = logger.as_mut() {
                    logger.log(&ProbeRecord::new(dst_addr, request, outcome))?;
                }
                Ok(())
            },
        )
        .with_context(|| format!("pinging {} failed", host))?;

        tracing::debug!(identifier = run.identifier(), "probe run finished");
        println!("\n--- {} ({}) ping statistics ---", host, run.destination());
        println!("{}", summary::summarize(&run));
    }

    Ok(())
}

fn print_outcome(dst_addr: Ipv4Addr, outcome: &ProbeOutcome) {
    match outcome {
        ProbeOutcome::Success { bytes, rtt_ms, ttl } => println!(
            "Reply from {}: bytes={} time={:.2}ms TTL={}",
            dst_addr, bytes, rtt_ms, ttl
        ),
        ProbeOutcome::Timeout => println!("Request timed out."),
    }
}

/// Resolves `host` to its first IPv4 address.
fn resolve(host: &str) -> Result<Ipv4Addr, PingError> {
    if let Ok(addr) = host.parse::<Ipv4Addr>() {
        return Ok(addr);
    }

    let addrs = (host, 0).to_socket_addrs().map_err(|e| {
        PingError::ResolutionFailed {
            host: host.to_string(),
            source: Some(e),
        }
    })?;

    addrs
        .filter_map(|addr| match addr.ip() {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(_) => None,
        })
        .next()
        .ok_or_else(|| PingError::ResolutionFailed {
            host: host.to_string(),
            source: None,
        })
}
