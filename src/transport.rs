//! Byte transport between the host and a Wiimote.
//!
//! A Wiimote speaks HID over two L2CAP channels: control on PSM 17 and
//! data on PSM 19. Input reports always arrive on the data channel. Where
//! output reports go depends on the model (see
//! [`DeviceModel::send_channel`](crate::commands::DeviceModel::send_channel)).
//!
//! The device handle only sees the two traits below, so anything that can
//! produce datagrams (a socket, a simulation, a test double) can stand in
//! for the real device.

use nom::{
    bytes::complete::take_while_m_n,
    character::complete::char,
    combinator::{all_consuming, map_res},
    multi::count,
    sequence::{preceded, tuple},
    IResult,
};
use std::{fmt, io, str::FromStr};

pub const PSM_CONTROL: u16 = 17;
pub const PSM_DATA: u16 = 19;

/// The largest input report is 22 bytes including the header; leave room.
pub const MAX_DATAGRAM: usize = 32;

#[derive(Debug)]
pub enum TransportError {
    /// Nothing arrived within the receive timeout.
    Timeout,
    /// The read was interrupted by a signal before any data arrived.
    Interrupted,
    Io(io::Error),
    InvalidAddress(String),
    /// Bluetooth sockets are only available on Linux.
    Unsupported,
}

impl TransportError {
    /// Timeouts and interrupted reads are retried, anything else ends the
    /// connection.
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::Timeout | TransportError::Interrupted)
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Timeout => write!(f, "receive timed out"),
            TransportError::Interrupted => write!(f, "receive interrupted"),
            TransportError::Io(error) => write!(f, "io error: {}", error),
            TransportError::InvalidAddress(addr) => {
                write!(f, "'{}' is not a Bluetooth address", addr)
            }
            TransportError::Unsupported => {
                write!(f, "Bluetooth L2CAP sockets are not supported on this platform")
            }
        }
    }
}

impl std::error::Error for TransportError {}

impl From<io::Error> for TransportError {
    fn from(value: io::Error) -> Self {
        match value.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => TransportError::Timeout,
            io::ErrorKind::Interrupted => TransportError::Interrupted,
            _ => TransportError::Io(value),
        }
    }
}

/// Where input reports come from.
pub trait ReportSource: Send {
    /// Blocks until one datagram arrives and copies it into `buf`, returning
    /// its length. A length of zero means the peer went away.
    fn recv(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;
}

/// Where output reports go.
pub trait CommandSink: Send {
    /// Sends one complete output report.
    fn send(&mut self, report: &[u8]) -> Result<(), TransportError>;
}

impl<T: ReportSource + ?Sized> ReportSource for Box<T> {
    fn recv(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        (**self).recv(buf)
    }
}

impl<T: CommandSink + ?Sized> CommandSink for Box<T> {
    fn send(&mut self, report: &[u8]) -> Result<(), TransportError> {
        (**self).send(report)
    }
}

/// A Bluetooth device address, most significant byte first, the way it is
/// written (`00:1F:32:AB:CD:EF`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BdAddr(pub [u8; 6]);

impl BdAddr {
    /// The byte order the kernel expects, least significant byte first.
    pub fn to_le_bytes(self) -> [u8; 6] {
        let mut bytes = self.0;
        bytes.reverse();
        bytes
    }
}

fn hex_byte(s: &str) -> IResult<&str, u8> {
    map_res(
        take_while_m_n(2, 2, |c: char| c.is_ascii_hexdigit()),
        |digits| u8::from_str_radix(digits, 16),
    )(s)
}

fn bdaddr(s: &str) -> IResult<&str, [u8; 6]> {
    let (rest, (first, others)) =
        tuple((hex_byte, count(preceded(char(':'), hex_byte), 5)))(s)?;
    let mut bytes = [first; 6];
    bytes[1..].copy_from_slice(&others);
    Ok((rest, bytes))
}

impl FromStr for BdAddr {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        all_consuming(bdaddr)(s.trim())
            .map(|(_, bytes)| BdAddr(bytes))
            .map_err(|_| TransportError::InvalidAddress(s.to_owned()))
    }
}

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            a, b, c, d, e, g
        )
    }
}

#[cfg(target_os = "linux")]
pub use l2cap::{connect_l2cap, L2capSink, L2capSource};

#[cfg(target_os = "linux")]
mod l2cap {
    use super::{BdAddr, CommandSink, ReportSource, TransportError, PSM_CONTROL, PSM_DATA};
    use crate::commands::{Channel, DeviceModel};

    use log::{debug, info};
    use std::{
        io, mem,
        os::fd::{AsRawFd, FromRawFd, OwnedFd},
        time::Duration,
    };

    const BTPROTO_L2CAP: libc::c_int = 0;

    /// `struct sockaddr_l2` from the BlueZ headers.
    #[repr(C)]
    pub(super) struct SockaddrL2 {
        pub l2_family: libc::sa_family_t,
        pub l2_psm: u16,
        pub l2_bdaddr: [u8; 6],
        pub l2_cid: u16,
        pub l2_bdaddr_type: u8,
    }

    impl SockaddrL2 {
        pub(super) fn new(addr: BdAddr, psm: u16) -> Self {
            Self {
                l2_family: libc::AF_BLUETOOTH as libc::sa_family_t,
                l2_psm: psm.to_le(),
                l2_bdaddr: addr.to_le_bytes(),
                l2_cid: 0,
                l2_bdaddr_type: 0,
            }
        }
    }

    fn check(ret: libc::c_int) -> io::Result<libc::c_int> {
        if ret < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(ret)
        }
    }

    fn open_channel(addr: BdAddr, psm: u16) -> Result<OwnedFd, TransportError> {
        // SAFETY: plain socket(2) call; the descriptor is owned right away.
        let fd = check(unsafe {
            libc::socket(libc::AF_BLUETOOTH, libc::SOCK_SEQPACKET, BTPROTO_L2CAP)
        })
        .map_err(TransportError::Io)?;
        // SAFETY: fd is a fresh descriptor nobody else owns.
        let socket = unsafe { OwnedFd::from_raw_fd(fd) };

        let sockaddr = SockaddrL2::new(addr, psm);
        // SAFETY: sockaddr lives for the duration of the call and the length
        // matches its type.
        check(unsafe {
            libc::connect(
                socket.as_raw_fd(),
                &sockaddr as *const SockaddrL2 as *const libc::sockaddr,
                mem::size_of::<SockaddrL2>() as libc::socklen_t,
            )
        })
        .map_err(TransportError::Io)?;
        debug!("Connected to {} on PSM {}", addr, psm);
        Ok(socket)
    }

    fn set_recv_timeout(socket: &OwnedFd, timeout: Duration) -> Result<(), TransportError> {
        let tv = libc::timeval {
            tv_sec: timeout.as_secs() as libc::time_t,
            tv_usec: timeout.subsec_micros() as libc::suseconds_t,
        };
        // SAFETY: tv outlives the call and the length matches its type.
        check(unsafe {
            libc::setsockopt(
                socket.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_RCVTIMEO,
                &tv as *const libc::timeval as *const libc::c_void,
                mem::size_of::<libc::timeval>() as libc::socklen_t,
            )
        })
        .map_err(TransportError::Io)?;
        Ok(())
    }

    /// Reads input reports from the data channel.
    #[derive(Debug)]
    pub struct L2capSource {
        data: OwnedFd,
    }

    impl ReportSource for L2capSource {
        fn recv(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
            // SAFETY: buf is valid for writes of buf.len() bytes.
            let n = unsafe {
                libc::recv(
                    self.data.as_raw_fd(),
                    buf.as_mut_ptr() as *mut libc::c_void,
                    buf.len(),
                    0,
                )
            };
            if n < 0 {
                Err(io::Error::last_os_error().into())
            } else {
                Ok(n as usize)
            }
        }
    }

    /// Writes output reports to whichever channel the model listens on. Holds
    /// on to the control channel either way, since closing it drops the
    /// connection.
    #[derive(Debug)]
    pub struct L2capSink {
        channel: OwnedFd,
        _control: Option<OwnedFd>,
    }

    impl CommandSink for L2capSink {
        fn send(&mut self, report: &[u8]) -> Result<(), TransportError> {
            // SAFETY: report is valid for reads of report.len() bytes.
            let n = unsafe {
                libc::send(
                    self.channel.as_raw_fd(),
                    report.as_ptr() as *const libc::c_void,
                    report.len(),
                    libc::MSG_NOSIGNAL,
                )
            };
            if n < 0 {
                Err(TransportError::Io(io::Error::last_os_error()))
            } else {
                Ok(())
            }
        }
    }

    /// Opens both L2CAP channels to `addr` and splits them into a report
    /// source and a command sink for `model`.
    pub fn connect_l2cap(
        addr: BdAddr,
        model: DeviceModel,
        recv_timeout: Duration,
    ) -> Result<(L2capSource, L2capSink), TransportError> {
        let control = open_channel(addr, PSM_CONTROL)?;
        let data = open_channel(addr, PSM_DATA)?;
        set_recv_timeout(&data, recv_timeout)?;
        info!("Opened L2CAP channels to {} ({})", addr, model);

        let sink = match model.send_channel() {
            Channel::Control => L2capSink {
                channel: control,
                _control: None,
            },
            Channel::Data => L2capSink {
                channel: data.try_clone().map_err(TransportError::Io)?,
                _control: Some(control),
            },
        };
        Ok((L2capSource { data }, sink))
    }
}

/// Stand-in so callers compile everywhere; connecting fails at run time.
#[cfg(not(target_os = "linux"))]
pub fn connect_l2cap(
    _addr: BdAddr,
    _model: crate::commands::DeviceModel,
    _recv_timeout: std::time::Duration,
) -> Result<(Box<dyn ReportSource>, Box<dyn CommandSink>), TransportError> {
    Err(TransportError::Unsupported)
}
