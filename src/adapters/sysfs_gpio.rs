//! Linux sysfs pin backend.
//!
//! Drives real lines through `/sys/class/gpio`: a pin is exported by
//! writing its line number to `export`, configured through
//! `gpioN/direction` and driven or read through `gpioN/value`.  Each
//! claimed line is wrapped in a [`SysfsPin`] that implements the
//! `embedded-hal` digital traits.
//!
//! sysfs has no edge interrupts usable without `poll(2)` on the value
//! file, so inputs are sampled by `HardwareIo` instead, and it has no
//! pull-resistor control at all; requested pulls are logged and ignored.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use embedded_hal::digital::{self, ErrorKind, ErrorType, InputPin, OutputPin};
use log::{debug, info, warn};

use crate::app::ports::PinBackend;
use crate::config::PinNumbering;
use crate::drivers::gpio::Pull;
use crate::error::HardwareError;
use crate::pins;

/// Default sysfs GPIO class directory.
pub const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";

/// How long to wait for udev to make a freshly exported line writable.
const EXPORT_SETTLE_TRIES: u32 = 20;
const EXPORT_SETTLE_STEP: Duration = Duration::from_millis(5);

// ---------------------------------------------------------------------------
// embedded-hal pin
// ---------------------------------------------------------------------------

/// I/O failure on a sysfs value file.
#[derive(Debug)]
pub struct SysfsError(io::Error);

impl digital::Error for SysfsError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

impl core::fmt::Display for SysfsError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One exported GPIO line.
#[derive(Debug)]
pub struct SysfsPin {
    line: u32,
    value: PathBuf,
}

impl SysfsPin {
    pub fn line(&self) -> u32 {
        self.line
    }
}

impl ErrorType for SysfsPin {
    type Error = SysfsError;
}

impl OutputPin for SysfsPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        fs::write(&self.value, b"0").map_err(SysfsError)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        fs::write(&self.value, b"1").map_err(SysfsError)
    }
}

impl InputPin for SysfsPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        let raw = fs::read_to_string(&self.value).map_err(SysfsError)?;
        Ok(raw.trim_start().starts_with('1'))
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.is_high().map(|high| !high)
    }
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// Real-hardware backend over the sysfs GPIO interface.
pub struct SysfsBackend {
    root: PathBuf,
    numbering: PinNumbering,
    base: u32,
    claimed: Mutex<HashMap<u8, SysfsPin>>,
}

impl SysfsBackend {
    pub fn new(numbering: PinNumbering, base: u32) -> Self {
        Self::with_root(SYSFS_GPIO_ROOT, numbering, base)
    }

    /// Backend rooted somewhere other than `/sys/class/gpio`.
    pub fn with_root(root: impl Into<PathBuf>, numbering: PinNumbering, base: u32) -> Self {
        Self {
            root: root.into(),
            numbering,
            base,
            claimed: Mutex::new(HashMap::new()),
        }
    }

    /// Whether the sysfs GPIO interface exists on this host.
    pub fn available() -> bool {
        Path::new(SYSFS_GPIO_ROOT).join("export").exists()
    }

    fn claimed(&self) -> MutexGuard<'_, HashMap<u8, SysfsPin>> {
        self.claimed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn line_for(&self, pin: u8) -> Result<u32, HardwareError> {
        let bcm = pins::resolve(self.numbering, pin)?;
        Ok(self.base + u32::from(bcm))
    }

    /// Export `pin` (if needed) and set its direction.
    fn export(&self, pin: u8, direction: &str) -> Result<SysfsPin, HardwareError> {
        let line = self.line_for(pin)?;
        let setup = |reason: io::Error| HardwareError::Setup {
            pin,
            reason: reason.to_string(),
        };

        let dir = self.root.join(format!("gpio{line}"));
        if !dir.exists() {
            fs::write(self.root.join("export"), line.to_string()).map_err(setup)?;
        }

        // The direction file appears (and becomes writable) asynchronously.
        let direction_file = dir.join("direction");
        let mut last_err = None;
        for _ in 0..EXPORT_SETTLE_TRIES {
            match fs::write(&direction_file, direction) {
                Ok(()) => {
                    last_err = None;
                    break;
                }
                Err(e) => {
                    last_err = Some(e);
                    thread::sleep(EXPORT_SETTLE_STEP);
                }
            }
        }
        if let Some(e) = last_err {
            return Err(setup(e));
        }

        debug!("HW[sysfs]: GPIO {} -> line {} ({})", pin, line, direction);
        Ok(SysfsPin {
            line,
            value: dir.join("value"),
        })
    }

    fn unexport(&self, line: u32) {
        if let Err(e) = fs::write(self.root.join("unexport"), line.to_string()) {
            debug!("HW[sysfs]: unexport line {} failed: {}", line, e);
        }
    }
}

impl PinBackend for SysfsBackend {
    fn name(&self) -> &'static str {
        "sysfs"
    }

    fn validate_pin(&self, pin: u8) -> Result<(), HardwareError> {
        pins::resolve(self.numbering, pin).map(|_| ())
    }

    fn setup_input(&self, pin: u8, pull: Pull) -> Result<(), HardwareError> {
        if pull != Pull::Off {
            warn!(
                "HW[sysfs]: pull {:?} on GPIO {} not supported, configure it in the device tree",
                pull, pin
            );
        }
        let line = self.export(pin, "in")?;
        self.claimed().insert(pin, line);
        Ok(())
    }

    fn setup_output(&self, pin: u8, level: bool) -> Result<(), HardwareError> {
        // "high"/"low" set direction and initial level in one write.
        let line = self.export(pin, if level { "high" } else { "low" })?;
        self.claimed().insert(pin, line);
        Ok(())
    }

    fn write(&self, pin: u8, level: bool) -> Result<(), HardwareError> {
        let mut claimed = self.claimed();
        let line = claimed.get_mut(&pin).ok_or_else(|| HardwareError::WriteFailed {
            pin,
            reason: "not exported".into(),
        })?;
        let result = if level { line.set_high() } else { line.set_low() };
        result.map_err(|e| HardwareError::WriteFailed {
            pin,
            reason: e.to_string(),
        })
    }

    fn read(&self, pin: u8) -> Result<bool, HardwareError> {
        let mut claimed = self.claimed();
        let line = claimed.get_mut(&pin).ok_or_else(|| HardwareError::ReadFailed {
            pin,
            reason: "not exported".into(),
        })?;
        line.is_high().map_err(|e| HardwareError::ReadFailed {
            pin,
            reason: e.to_string(),
        })
    }

    fn release_all(&self) {
        let lines: Vec<u32> = self.claimed().drain().map(|(_, l)| l.line).collect();
        for line in &lines {
            self.unexport(*line);
        }
        if !lines.is_empty() {
            info!("HW[sysfs]: unexported {} line(s)", lines.len());
        }
    }

    fn needs_sampling(&self) -> bool {
        true
    }
}
