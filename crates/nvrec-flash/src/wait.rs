use log::warn;
use nvrec_core::{FlashOp, StoreError, StoreResult};
use nvrec_hal::PlatformDelay;

/// Poll cadence for device completion.
/// Worst-case wait is `poll_interval_ms * max_polls` (500ms by default).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub poll_interval_ms: u32,
    pub max_polls: u32,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self { poll_interval_ms: 2, max_polls: 250 }
    }
}

impl WaitPolicy {
    pub fn budget_ms(&self) -> u64 {
        self.poll_interval_ms as u64 * self.max_polls as u64
    }
}

/// Bounded version of `nb::block!`: sleeps between polls and gives up after `max_polls`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompletionWaiter {
    policy: WaitPolicy,
}

impl CompletionWaiter {
    pub fn new(policy: WaitPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> WaitPolicy {
        self.policy
    }

    pub fn wait_for<T, F>(&self, delay: &mut dyn PlatformDelay, op: FlashOp, mut poll: F) -> StoreResult<T>
    where
        F: FnMut() -> nb::Result<T, StoreError>,
    {
        let mut polls = 0u32;
        loop {
            match poll() {
                Ok(v) => return Ok(v),
                Err(nb::Error::Other(e)) => return Err(e),
                Err(nb::Error::WouldBlock) => {}
            }

            if polls >= self.policy.max_polls {
                warn!("{} still busy after {}ms, giving up", op, self.policy.budget_ms());
                return Err(StoreError::Timeout { op });
            }
            delay.delay_ms(self.policy.poll_interval_ms);
            polls += 1;
        }
    }
}
