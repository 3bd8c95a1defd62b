//! Offset and delay arithmetic.
//!
//! Four timestamps drive the estimate:
//!
//! - `master_sync_time`: responder clock when it sent the sync,
//! - `sync_time`: initiator clock when the sync arrived,
//! - `delay_req_time`: initiator clock when it sent the delay request,
//! - `req_time`: responder clock when it handled the delay request.
//!
//! `offset = master_sync_time - sync_time` mixes the true clock offset with
//! the forward path delay. The reverse leg `req_time - delay_req_time` mixes
//! the same offset with the reverse path delay. Under the symmetric-path
//! assumption the two equations give
//! `delay = (offset - (req_time - delay_req_time)) / 2` and the correction
//! `adjustment = offset - delay`.
//!
//! Timestamps come straight off the wire, so every step that could leave the
//! `i64` range is checked and reported as
//! [`ProtocolError::TimestampOverflow`].

use crate::core::ProtocolError;

/// Compute the forward-leg offset.
///
/// Fails when the difference does not fit a clock reading.
pub fn sync_offset(master_sync_time: i64, sync_time: i64) -> Result<i64, ProtocolError> {
    master_sync_time
        .checked_sub(sync_time)
        .ok_or(ProtocolError::TimestampOverflow {
            message: "followup",
        })
}

/// Result of one complete exchange.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncEstimate {
    /// Forward-leg offset, `master_sync_time - sync_time`.
    pub offset: i64,
    /// Derived one-way delay.
    pub delay: f64,
    /// Correction to add to the initiator clock, `offset - delay`.
    pub adjustment: f64,
}

impl SyncEstimate {
    /// Combine the forward offset with the delay request/reply timestamps.
    ///
    /// The numerator `offset - (req_time - delay_req_time)` is evaluated in
    /// `i128` and must fit an `i64`. The delay is exact for half-unit results:
    /// halving an integer is exact in `f64` for any value below 2^53.
    pub fn from_exchange(
        offset: i64,
        req_time: i64,
        delay_req_time: i64,
    ) -> Result<Self, ProtocolError> {
        let numerator = i128::from(offset) - (i128::from(req_time) - i128::from(delay_req_time));
        let numerator = i64::try_from(numerator).map_err(|_| ProtocolError::TimestampOverflow {
            message: "delay_reply",
        })?;

        let delay = numerator as f64 / 2.0;
        Ok(Self {
            offset,
            delay,
            adjustment: offset as f64 - delay,
        })
    }

    /// Adjustment in whole clock units, rounded half away from zero.
    ///
    /// Saturates at the `i64` bounds.
    pub fn clock_step(&self) -> i64 {
        self.adjustment.round() as i64
    }
}
