//! Per-item results of batch operations

use crate::model::Hash;
use crate::Error;
use serde::Serialize;

/// What happened to one hash in a batch
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ItemResult {
    /// Action performed; `bytes` copied or freed
    Done { bytes: u64 },
    /// Nothing to do, or deliberately not done
    Skipped { reason: String },
    Failed {
        code: String,
        message: String,
        /// Retrying with `force` would get past this failure
        guard_rail: bool,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ItemOutcome {
    pub hash: Hash,
    #[serde(flatten)]
    pub result: ItemResult,
}

impl ItemOutcome {
    pub fn done(hash: Hash, bytes: u64) -> Self {
        ItemOutcome {
            hash,
            result: ItemResult::Done { bytes },
        }
    }

    pub fn skipped(hash: Hash, reason: impl Into<String>) -> Self {
        ItemOutcome {
            hash,
            result: ItemResult::Skipped {
                reason: reason.into(),
            },
        }
    }

    pub fn failed(hash: Hash, err: &Error) -> Self {
        ItemOutcome {
            hash,
            result: ItemResult::Failed {
                code: err.code().to_string(),
                message: err.to_string(),
                guard_rail: err.is_guard_rail(),
            },
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.result, ItemResult::Failed { .. })
    }

    /// Failure code, if this item failed
    pub fn failure_code(&self) -> Option<&str> {
        match &self.result {
            ItemResult::Failed { code, .. } => Some(code),
            _ => None,
        }
    }
}

/// Counts over a set of outcomes
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeCounts {
    pub done: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl OutcomeCounts {
    pub fn tally(outcomes: &[ItemOutcome]) -> Self {
        outcomes
            .iter()
            .fold(OutcomeCounts::default(), |mut counts, outcome| {
                match outcome.result {
                    ItemResult::Done { .. } => counts.done += 1,
                    ItemResult::Skipped { .. } => counts.skipped += 1,
                    ItemResult::Failed { .. } => counts.failed += 1,
                }
                counts
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_json_shape() {
        let hash = Hash::digest(b"x");
        let outcome = ItemOutcome::failed(hash, &Error::LastCopyWarning(hash.to_hex()));
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["result"], "failed");
        assert_eq!(json["code"], "last_copy_warning");
        assert_eq!(json["guard_rail"], true);
        assert_eq!(json["hash"], hash.to_hex());
    }

    #[test]
    fn test_tally() {
        let h = Hash::digest(b"y");
        let outcomes = vec![
            ItemOutcome::done(h, 1),
            ItemOutcome::done(h, 2),
            ItemOutcome::skipped(h, "already there"),
            ItemOutcome::failed(h, &Error::NotFound(h.to_hex())),
        ];
        assert_eq!(
            OutcomeCounts::tally(&outcomes),
            OutcomeCounts {
                done: 2,
                skipped: 1,
                failed: 1
            }
        );
    }
}
