//! QR code storage and the one-time claim guard
//!
//! The QR map is the sole explicit serialization point of a scan. Claiming
//! acquires the code's map entry and keeps that guard alive for the duration
//! of the enclosing unit of work, so two concurrent scans of the same code
//! cannot both observe it as claimable: the loser either blocks on the entry
//! and then sees `claimed == true`, or finds no row at all. Both cases fail
//! fast with the same business error and no retry.

use crate::types::{Geolocation, ParticipantId, QrCode, RewardsError};
use dashmap::mapref::one::RefMut;
use dashmap::DashMap;

/// Concurrent store of provisioned QR codes, keyed by printed code
///
/// Codes are provisioned by upstream tooling, mutated exactly once by a
/// claim, and never deleted.
#[derive(Debug, Default)]
pub struct QrCodeStore {
    codes: DashMap<String, QrCode>,
}

impl QrCodeStore {
    /// Create an empty store
    pub fn new() -> Self {
        QrCodeStore {
            codes: DashMap::new(),
        }
    }

    /// Add a provisioned code; duplicate codes are rejected
    pub fn provision(&self, qr: QrCode) -> Result<(), RewardsError> {
        if self.codes.contains_key(&qr.code) {
            return Err(RewardsError::invalid_input(format!(
                "QR code '{}' is already provisioned",
                qr.code
            )));
        }
        self.codes.insert(qr.code.clone(), qr);
        Ok(())
    }

    /// Snapshot of a code's current state
    pub fn get(&self, code: &str) -> Option<QrCode> {
        self.codes.get(code).map(|entry| entry.clone())
    }

    /// Number of provisioned codes
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    /// Whether the store holds no codes
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Acquire the claim lock on a code
    ///
    /// Locks the code's entry and evaluates the not-yet-claimed filter under
    /// that lock. A missing code and an already-claimed code are
    /// indistinguishable to the caller. The returned guard keeps the entry
    /// locked; dropping it without [`ClaimedCode::commit`] leaves the code
    /// untouched and claimable.
    pub fn begin_claim(&self, code: &str) -> Result<ClaimedCode<'_>, RewardsError> {
        let entry = self
            .codes
            .get_mut(code)
            .ok_or_else(|| RewardsError::already_claimed(code))?;
        if entry.claimed {
            return Err(RewardsError::already_claimed(code));
        }
        Ok(ClaimedCode { entry })
    }
}

/// An exclusive hold on an unclaimed QR code
///
/// Exists only while the code's entry lock is held. The claim becomes
/// visible to other scanners only when [`commit`](ClaimedCode::commit) runs;
/// a guard dropped on the error path rolls the claim back by never writing
/// it.
pub struct ClaimedCode<'a> {
    entry: RefMut<'a, String, QrCode>,
}

impl ClaimedCode<'_> {
    /// The code row as read under the lock
    pub fn qr(&self) -> &QrCode {
        &self.entry
    }

    /// Finalize the claim: flip the flag and record the claimant
    ///
    /// The flag transition is irreversible; nothing in the engine ever
    /// writes `claimed = false`.
    pub fn commit(mut self, claimant: ParticipantId, location: Option<Geolocation>) {
        self.entry.claimed = true;
        self.entry.claimed_by = Some(claimant);
        self.entry.scan_location = location;
    }
}
