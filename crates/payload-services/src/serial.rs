//! Serial device setup — opens a UART in raw mode at a fixed baud rate.
//!
//! The device is opened non-blocking and registered with the reactor, so a
//! pending read never holds up a write in the other direction.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use nix::fcntl::OFlag;
use nix::sys::termios::{self, BaudRate, FlushArg, SetArg};
use tokio::io::unix::AsyncFd;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf, ReadHalf, WriteHalf};

use crate::link::Link;

/// Link over an opened serial device.
pub type SerialLink = Link<ReadHalf<SerialPort>, WriteHalf<SerialPort>>;

/// A raw tty driven through readiness events.
pub struct SerialPort {
    fd: AsyncFd<File>,
}

impl SerialPort {
    /// Wrap an already configured, non-blocking device. Must be called from
    /// inside a tokio runtime.
    pub fn new(file: File) -> io::Result<Self> {
        Ok(Self {
            fd: AsyncFd::new(file)?,
        })
    }
}

impl AsyncRead for SerialPort {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        loop {
            let mut guard = ready!(self.fd.poll_read_ready(cx))?;
            let unfilled = buf.initialize_unfilled();
            match guard.try_io(|inner| inner.get_ref().read(unfilled)) {
                Ok(Ok(n)) => {
                    buf.advance(n);
                    return Poll::Ready(Ok(()));
                }
                Ok(Err(e)) => return Poll::Ready(Err(e)),
                Err(_would_block) => continue,
            }
        }
    }
}

impl AsyncWrite for SerialPort {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        loop {
            let mut guard = ready!(self.fd.poll_write_ready(cx))?;
            match guard.try_io(|inner| inner.get_ref().write(buf)) {
                Ok(result) => return Poll::Ready(result),
                Err(_would_block) => continue,
            }
        }
    }

    // writes go straight to the kernel queue
    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Map a numeric baud rate to the termios constant.
pub fn baud_rate(baud: u32) -> io::Result<BaudRate> {
    let rate = match baud {
        9600 => BaudRate::B9600,
        19200 => BaudRate::B19200,
        38400 => BaudRate::B38400,
        57600 => BaudRate::B57600,
        115200 => BaudRate::B115200,
        230400 => BaudRate::B230400,
        460800 => BaudRate::B460800,
        921600 => BaudRate::B921600,
        other => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unsupported baud rate {other}"),
            ))
        }
    };
    Ok(rate)
}

/// Open `device`, switch it to raw 8N1 at `baud`, and discard anything
/// already sitting in the kernel's input and output queues.
pub fn open(device: &Path, baud: u32) -> io::Result<SerialLink> {
    let rate = baud_rate(baud)?;

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags((OFlag::O_NOCTTY | OFlag::O_NONBLOCK).bits())
        .open(device)?;

    let mut tio = termios::tcgetattr(&file).map_err(io::Error::from)?;
    termios::cfmakeraw(&mut tio);
    termios::cfsetspeed(&mut tio, rate).map_err(io::Error::from)?;
    termios::tcsetattr(&file, SetArg::TCSANOW, &tio).map_err(io::Error::from)?;
    termios::tcflush(&file, FlushArg::TCIOFLUSH).map_err(io::Error::from)?;

    tracing::info!(device = %device.display(), baud, "serial link opened");

    Ok(Link::from_stream(SerialPort::new(file)?))
}
