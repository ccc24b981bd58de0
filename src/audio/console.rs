// src/audio/console.rs  —  Linux console beeper (KIOCSOUND ioctl)
//
// The PC speaker takes no PCM: the ioctl programs the timer chip with a
// divisor of its 1.193180 MHz clock and the beep runs until cancelled with
// divisor 0.  write_buffer therefore keys the beeper on or off from the
// tone cue and paces by wall clock, like the null sink.
//
// /dev/console is root-only on most systems; probe() reports whether the
// device can be opened for writing at all.

use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;

use super::{SinkCaps, SoundSink, ToneCue, DEFAULT_BUFFER_N_SAMPLES, SAMPLE_RATE_PREFERENCE};
use crate::clock;
use crate::errors::{Error, Result};

const DEFAULT_DEVICE: &str = "/dev/console";
const KIOCSOUND: libc::c_ulong = 0x4B2F;
const CLOCK_TICK_RATE: u32 = 1_193_180;

pub struct ConsoleSink {
    file: Option<File>,
    sample_rate: u32,
    /// Frequency the beeper is currently sounding; 0 = off.
    sounding: u32,
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self {
            file: None,
            sample_rate: SAMPLE_RATE_PREFERENCE[0],
            sounding: 0,
        }
    }

    pub fn probe(device: Option<&str>) -> bool {
        OpenOptions::new()
            .write(true)
            .open(device.unwrap_or(DEFAULT_DEVICE))
            .is_ok()
    }

    fn ioctl_sound(&mut self, frequency: u32) -> Result<()> {
        let Some(file) = &self.file else {
            return Err(Error::InvalidState("console sink is not open"));
        };
        let divisor = if frequency == 0 {
            0
        } else {
            libc::c_ulong::from(CLOCK_TICK_RATE / frequency)
        };
        let rc = unsafe { libc::ioctl(file.as_raw_fd(), KIOCSOUND, divisor) };
        if rc == -1 {
            return Err(Error::IoFailure(format!(
                "KIOCSOUND failed: {}",
                std::io::Error::last_os_error()
            )));
        }
        self.sounding = frequency;
        Ok(())
    }
}

impl SoundSink for ConsoleSink {
    fn name(&self) -> &'static str {
        "console"
    }

    fn open_and_configure(&mut self, device: Option<&str>) -> Result<SinkCaps> {
        let path = device.unwrap_or(DEFAULT_DEVICE);
        let file = OpenOptions::new().write(true).open(path).map_err(|e| {
            Error::BackendUnavailable(format!("cannot open {path} for the beeper: {e}"))
        })?;
        self.file = Some(file);
        self.sounding = 0;
        self.sample_rate = SAMPLE_RATE_PREFERENCE[0];
        Ok(SinkCaps {
            sample_rate: self.sample_rate,
            buffer_n_samples: DEFAULT_BUFFER_N_SAMPLES,
        })
    }

    fn write_buffer(&mut self, samples: &[i16], cue: ToneCue) -> Result<()> {
        let wanted = if cue.is_mark { cue.frequency } else { 0 };
        if wanted != self.sounding {
            self.ioctl_sound(wanted)?;
            log::debug!("console beeper → {wanted} Hz");
        }
        // No PCM path: hold the beeper state for the buffer's duration.
        let usecs = samples.len() as u64 * 1_000_000 / u64::from(self.sample_rate);
        clock::sleep_usecs(usecs);
        Ok(())
    }

    fn close(&mut self) {
        if self.file.is_some() {
            let _ = self.ioctl_sound(0);
        }
        self.file = None;
    }
}

impl Drop for ConsoleSink {
    fn drop(&mut self) {
        self.close();
    }
}
