use std::{
    fmt,
    fs::File,
    io::{self, BufWriter, Read, Write},
    marker::PhantomData,
    net::{Ipv4Addr, SocketAddrV4},
    os::unix::io::AsRawFd,
    path::Path,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
pub use logging_macro::Logging;
use polling::{Event, Events, Poller};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tracing::debug;

// Key under which the socket is registered with its poller
const SOCKET_KEY: usize = 0;

/// Raw ICMPv4 socket with a blocking, deadline-bounded receive.
///
/// The socket itself is non-blocking; waiting is done on a private poller so
/// that a single read never blocks past the caller's timeout.
pub struct ICMPSocket {
    socket: Socket,
    poller: Poller,
    events: Events,
}

impl ICMPSocket {
    /// Opens a raw ICMPv4 socket. Usually requires root or CAP_NET_RAW.
    pub fn new(bind_interface: Option<&str>) -> io::Result<ICMPSocket> {
        let socket =
            Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4))?;
        socket.set_nonblocking(true)?;

        let socket = match bind_interface {
            Some(bi) => bind_to_device(socket, bi)?,
            None => socket,
        };

        let poller = Poller::new()?;
        // Safety: the socket is deleted from the poller in Drop, before it
        // is closed.
        unsafe {
            poller.add(&socket, Event::readable(SOCKET_KEY))?;
        }
        debug!(fd = socket.as_raw_fd(), iface = ?bind_interface, "opened raw ICMP socket");

        Ok(ICMPSocket {
            socket,
            poller,
            events: Events::new(),
        })
    }

    pub fn send_to(&self, packet: &[u8], addr: Ipv4Addr) -> io::Result<usize> {
        // The port is ignored for raw sockets
        let addr = SockAddr::from(SocketAddrV4::new(addr, 0));
        self.socket.send_to(packet, &addr)
    }

    /// Reads one datagram, waiting at most `timeout` for it to arrive.
    ///
    /// Returns `Ok(None)` when the timeout elapses first.
    pub fn recv_timeout(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> io::Result<Option<usize>> {
        let deadline = Instant::now() + timeout;
        loop {
            // A datagram may already be queued from an earlier wakeup
            match (&self.socket).read(buf) {
                Ok(n) => return Ok(Some(n)),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }

            self.events.clear();
            match self.poller.wait(&mut self.events, Some(remaining)) {
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
            // Interest is oneshot, re-arm before the next wait
            self.poller
                .modify(&self.socket, Event::readable(SOCKET_KEY))?;
        }
    }
}

impl Drop for ICMPSocket {
    fn drop(&mut self) {
        let _ = self.poller.delete(&self.socket);
    }
}

pub fn bind_to_device(
    socket: Socket,
    bind_interface: &str,
) -> Result<Socket, std::io::Error> {
    // Socket2 bind_device does not have nice error types, so we have to handle
    // the libc errors. In case, we get an error when binding, map it into a
    // more friendly std::io::Error
    if let Err(err) = socket.bind_device(Some(bind_interface.as_bytes())) {
        return if matches!(err.raw_os_error(), Some(libc::ENODEV)) {
            let error_msg = format!(
                "error binding to device (`{}`): {}",
                bind_interface, err
            );
            Err(std::io::Error::new(std::io::ErrorKind::Other, error_msg))
        } else {
            let error_msg = format!("unexpected error binding device: {}", err);
            Err(std::io::Error::new(std::io::ErrorKind::Other, error_msg))
        };
    }

    Ok(socket)
}

/// A record that can be written as one CSV line.
///
/// `#[derive(Logging)]` implements this together with a comma separated
/// `Display`.
pub trait Logging {
    fn header(&self) -> String;
}

/// Appends records to a CSV file, writing the header before the first one.
pub struct Logger<T> {
    writer: BufWriter<File>,
    header_written: bool,
    _record: PhantomData<T>,
}

impl<T: Logging + fmt::Display> Logger<T> {
    pub fn new(file_name: impl AsRef<Path>) -> Result<Self> {
        let path = file_name.as_ref();
        let file = File::create(path).with_context(|| {
            format!("failed to create log file {}", path.display())
        })?;
        Ok(Self {
            writer: BufWriter::new(file),
            header_written: false,
            _record: PhantomData,
        })
    }

    pub fn log(&mut self, record: &T) -> Result<()> {
        if !self.header_written {
            self.writer.write_all(record.header().as_bytes())?;
            self.header_written = true;
        }
        write!(self.writer, "{}", record)?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Running min/max/mean/variance over a stream of samples (Welford).
#[derive(Debug, Clone, Default)]
pub struct Statistics {
    mean: f64,
    // Sum of squared deviations from the mean
    m2: f64,
    min: f64,
    max: f64,
    samples: usize,
}

impl Statistics {
    /// Empty statistics. Every accessor reads 0.0 until the first `update`.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Sample variance (N-1 denominator). Zero below two samples.
    pub fn variance(&self) -> f64 {
        if self.samples < 2 {
            return 0.0;
        }
        self.m2 / (self.samples - 1) as f64
    }

    pub fn standard_deviation(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn update(&mut self, value: f64) {
        self.samples += 1;
        if self.samples == 1 {
            self.mean = value;
            self.m2 = 0.0;
            self.min = value;
            self.max = value;
        } else {
            let old_mean = self.mean;
            self.mean = old_mean + (value - old_mean) / self.samples as f64;
            self.m2 += (value - old_mean) * (value - self.mean);
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
    }
}
