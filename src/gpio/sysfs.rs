//! Sysfs GPIO backend
//!
//! Every watched input lives under `<root>/gpioN/`. Opening a pin exports it
//! through `<root>/export` (unless already exported), sets `direction` to `in`
//! and `edge` to `both`. The kernel flags edges on the `value` file with
//! `POLLPRI | POLLERR`, which is what [`SysfsGpio::wait`] polls for.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::os::fd::AsFd;
use std::path::{Path, PathBuf};
use std::time::Duration;

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags};
use tracing::debug;

use super::watcher::{EdgeBackend, ValueSource, WatcherError};
use super::PinId;

pub const DEFAULT_SYSFS_ROOT: &str = "/sys/class/gpio";

#[derive(Debug, Clone)]
pub struct SysfsGpio {
    root: PathBuf,
}

impl Default for SysfsGpio {
    fn default() -> Self {
        Self::new(DEFAULT_SYSFS_ROOT)
    }
}

impl SysfsGpio {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn pin_dir(&self, pin: PinId) -> PathBuf {
        self.root.join(format!("gpio{}", pin))
    }

    fn export(&self, pin: PinId) -> Result<(), WatcherError> {
        if self.pin_dir(pin).exists() {
            debug!("gpio {} already exported", pin);
            return Ok(());
        }
        write_file(&self.root.join("export"), pin.to_string().as_bytes())
            .map_err(|source| WatcherError::Export { pin, source })
    }

    fn configure(&self, pin: PinId, file: &'static str, content: &str) -> Result<(), WatcherError> {
        write_file(&self.pin_dir(pin).join(file), content.as_bytes())
            .map_err(|source| WatcherError::Configure { pin, file, source })
    }
}

fn write_file(path: &Path, content: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new().write(true).open(path)?;
    file.write_all(content)
}

/// Open `gpioN/value` file of a watched input.
#[derive(Debug)]
pub struct SysfsValue {
    file: File,
}

impl ValueSource for SysfsValue {
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut buf = [0u8; 1];
        match self.file.read(&mut buf)? {
            0 => Ok(None),
            _ => Ok(Some(buf[0])),
        }
    }
}

impl EdgeBackend for SysfsGpio {
    type Value = SysfsValue;

    fn open(&self, pin: PinId) -> Result<SysfsValue, WatcherError> {
        self.export(pin)?;
        self.configure(pin, "direction", "in")?;
        self.configure(pin, "edge", "both")?;

        let file = File::open(self.pin_dir(pin).join("value"))
            .map_err(|source| WatcherError::Open { pin, source })?;
        debug!("Opened gpio {} value file", pin);
        Ok(SysfsValue { file })
    }

    fn wait(&self, values: &[&SysfsValue], timeout: Duration) -> Result<Vec<usize>, WatcherError> {
        let mut fds: Vec<PollFd<'_>> = values
            .iter()
            .map(|value| PollFd::new(value.file.as_fd(), PollFlags::POLLPRI | PollFlags::POLLERR))
            .collect();

        let millis = u16::try_from(timeout.as_millis()).unwrap_or(u16::MAX);
        match poll(&mut fds, millis) {
            Ok(0) => return Ok(Vec::new()),
            Ok(_) => {}
            Err(Errno::EINTR) => return Ok(Vec::new()),
            Err(errno) => return Err(WatcherError::Poll(io::Error::from(errno))),
        }

        let ready = fds
            .iter()
            .enumerate()
            .filter(|(_, fd)| {
                fd.revents()
                    .is_some_and(|events| events.intersects(PollFlags::POLLPRI | PollFlags::POLLERR))
            })
            .map(|(index, _)| index)
            .collect();
        Ok(ready)
    }
}
