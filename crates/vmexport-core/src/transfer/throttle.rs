//! Token-bucket bandwidth limiting shared by concurrent transfers

use crate::cancel::CancelToken;
use crate::error::TransferError;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Smallest default burst
pub const MIN_DEFAULT_BURST: u64 = 64 * 1024;

/// Token bucket limiting throughput to `rate` bytes per second
///
/// The bucket starts empty, so moving `S` bytes through it takes at least
/// `S / rate` seconds. Callers reserve tokens up front and sleep off any
/// deficit, which keeps concurrent transfers in FIFO order.
#[derive(Debug)]
pub struct BandwidthLimiter {
    rate: u64,
    burst: u64,
    bucket: Mutex<Bucket>,
}

/// Token counts are kept in nano-bytes so refill and deficit math is exact
const NANOS: i128 = 1_000_000_000;

#[derive(Debug)]
struct Bucket {
    /// Nano-bytes; may go negative while callers sleep off a reservation
    tokens: i128,
    last_refill: Instant,
}

impl BandwidthLimiter {
    /// `None` when `rate` is 0 (unlimited). A `burst` of 0 selects
    /// `max(rate / 10, 64 KiB)`.
    pub fn new(rate: u64, burst: u64) -> Option<Self> {
        if rate == 0 {
            return None;
        }
        let burst = if burst == 0 {
            (rate / 10).max(MIN_DEFAULT_BURST)
        } else {
            burst
        };
        Some(Self {
            rate,
            burst,
            bucket: Mutex::new(Bucket {
                tokens: 0,
                last_refill: Instant::now(),
            }),
        })
    }

    pub fn rate(&self) -> u64 {
        self.rate
    }

    pub fn burst(&self) -> u64 {
        self.burst
    }

    /// Wait until `bytes` may pass
    ///
    /// Requests larger than the burst are split so a single large chunk
    /// cannot overdraw the bucket by more than one burst.
    pub async fn acquire(&self, bytes: u64, cancel: &CancelToken) -> Result<(), TransferError> {
        let mut remaining = bytes;
        while remaining > 0 {
            let take = remaining.min(self.burst);
            remaining -= take;

            let wait = {
                let mut bucket = self.bucket.lock().await;
                let now = Instant::now();
                let elapsed = now.duration_since(bucket.last_refill).as_nanos() as i128;
                let rate = self.rate as i128;
                bucket.tokens = (bucket.tokens + elapsed * rate).min(self.burst as i128 * NANOS);
                bucket.last_refill = now;
                bucket.tokens -= take as i128 * NANOS;

                if bucket.tokens < 0 {
                    // ceil(deficit / rate) nanoseconds
                    let nanos = (-bucket.tokens + rate - 1) / rate;
                    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
                } else {
                    Duration::ZERO
                }
            };

            if !wait.is_zero() {
                cancel
                    .sleep(wait)
                    .await
                    .map_err(|_| TransferError::Cancelled)?;
            }
        }
        Ok(())
    }
}
