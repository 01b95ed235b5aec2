//! Bounded waits on the modem.
//!
//! Every handshake step waits for the peer with a fixed budget and a fixed polling interval. The
//! budgets are expressed here as named [`Timeout`]s; [`Deadline`] charges each sleep against one.

use embedded_hal_async::delay::DelayNs;

use crate::Error;

/// Time budget of a wait together with the interval at which the condition is polled.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Timeout {
    budget_us: u32,
    interval_us: u32,
}

impl Timeout {
    pub const fn new(budget_ms: u32, interval_ms: u32) -> Self {
        Self {
            budget_us: budget_ms * 1000,
            interval_us: interval_ms * 1000,
        }
    }

    pub const fn budget_ms(&self) -> u32 {
        self.budget_us / 1000
    }

    pub const fn interval_ms(&self) -> u32 {
        self.interval_us / 1000
    }
}

/// Modem announces it is ready to receive a download.
pub const PREPARE: Timeout = Timeout::new(10_000, 10);
/// Whole transfer of a boot binary.
pub const BINARY_LOAD: Timeout = Timeout::new(10_000, 10);
/// Whole transfer of an NV blob.
pub const NV_LOAD: Timeout = Timeout::new(2_000, 10);
/// Modem acknowledges the start-execution request.
pub const BOOT_ACK: Timeout = Timeout::new(2_000, 10);
/// Modem reports it is up after booting.
pub const BOOT_POST_PROCESS: Timeout = Timeout::new(2_000, 10);
/// A single upload handshake or upload frame.
pub const UPLOAD_POLL: Timeout = Timeout::new(200, 1);
/// Mailbox response to a boot frame.
pub const UDL_RESPONSE: Timeout = Timeout::new(2_000, 1);

/// Running budget of one wait.
pub struct Deadline {
    timeout: Timeout,
    elapsed_us: u32,
}

impl Deadline {
    pub const fn new(timeout: Timeout) -> Self {
        Self {
            timeout,
            elapsed_us: 0,
        }
    }

    /// Sleep for one polling interval.
    ///
    /// Returns [`Error::Timeout`] once the budget has been exceeded.
    pub async fn sleep(&mut self, delay: &mut impl DelayNs) -> Result<(), Error> {
        delay.delay_us(self.timeout.interval_us).await;
        self.elapsed_us = self.elapsed_us.saturating_add(self.timeout.interval_us);

        if self.elapsed_us > self.timeout.budget_us {
            Err(Error::Timeout)
        } else {
            Ok(())
        }
    }

    pub const fn elapsed_ms(&self) -> u32 {
        self.elapsed_us / 1000
    }
}

/// Poll `ready` until it returns `true` or `timeout` runs out.
pub async fn wait_for(
    delay: &mut impl DelayNs,
    timeout: Timeout,
    mut ready: impl FnMut() -> bool,
) -> Result<(), Error> {
    let mut deadline = Deadline::new(timeout);
    loop {
        if ready() {
            return Ok(());
        }
        deadline.sleep(&mut *delay).await?;
    }
}
