#![no_std]
#![forbid(unsafe_code)]

mod region;
mod wait;

pub use region::{FlashRegion, RegionConfig};
pub use wait::{CompletionWaiter, WaitPolicy};
