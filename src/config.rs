//! Session settings.

use core::time::Duration;

/// The SDP series only talks 9600 baud.
pub const DEFAULT_BAUD_RATE: u32 = 9600;
/// 8N1 plus the start bit.
pub const DEFAULT_BITS_PER_BYTE: u32 = 10;
/// Slack on top of the transmission time of a response.
pub const DEFAULT_DEAD_TIME: Duration = Duration::from_millis(100);

/// Timing parameters of a session.
///
/// The session never waits forever for a response. Each exchange gets a deadline long enough to
/// transmit the whole expected response at the configured line speed, plus the dead time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SdpConfig {
    pub baud_rate: u32,
    pub bits_per_byte: u32,
    pub dead_time: Duration,
}

impl Default for SdpConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            bits_per_byte: DEFAULT_BITS_PER_BYTE,
            dead_time: DEFAULT_DEAD_TIME,
        }
    }
}

impl SdpConfig {
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_bits_per_byte(mut self, bits_per_byte: u32) -> Self {
        self.bits_per_byte = bits_per_byte;
        self
    }

    pub fn with_dead_time(mut self, dead_time: Duration) -> Self {
        self.dead_time = dead_time;
        self
    }

    /// How long to wait for a response of `response_len` bytes.
    pub fn response_timeout(&self, response_len: usize) -> Duration {
        let bits = response_len as u64 * self.bits_per_byte as u64;
        let micros = bits * 1_000_000 / self.baud_rate.max(1) as u64;
        Duration::from_micros(micros) + self.dead_time
    }
}
