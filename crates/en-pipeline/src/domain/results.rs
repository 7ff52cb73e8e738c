//! # Per-Run Holder Results
//!
//! During a detection run every touched holder gets exactly one result:
//! processed, still valid but unprocessed, or invalid. Merging results back
//! into the stored collection is where invalid holders disappear, forcing a
//! re-download on the next acquisition cycle.

use shared_types::entities::KeySetHolder;
use shared_types::time::Timestamp;

/// Outcome for one holder in one detection run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HolderResult {
    /// The holder as it entered the run.
    pub holder: KeySetHolder,
    /// Set when the engine consumed this key set during the run.
    pub process_date: Option<Timestamp>,
    /// False drops the holder from storage on merge.
    pub valid: bool,
}

impl HolderResult {
    /// The engine consumed this key set.
    pub fn processed(holder: KeySetHolder, process_date: Timestamp) -> Self {
        Self {
            holder,
            process_date: Some(process_date),
            valid: true,
        }
    }

    /// Untouched this run; stays queued for the next one.
    pub fn unprocessed(holder: KeySetHolder) -> Self {
        Self {
            holder,
            process_date: None,
            valid: true,
        }
    }

    /// Broken on disk or rejected by the engine; drop and re-download.
    pub fn invalid(holder: KeySetHolder) -> Self {
        Self {
            holder,
            process_date: None,
            valid: false,
        }
    }

    /// Whether this run is done with the holder's blob files.
    pub fn consumed_blobs(&self) -> bool {
        self.process_date.is_some() || !self.valid
    }
}

/// Split unprocessed holders into those whose blob files are really on disk
/// and those that only claim so.
pub fn partition_by_files(
    unprocessed: Vec<KeySetHolder>,
    has_files: impl Fn(&KeySetHolder) -> bool,
) -> (Vec<KeySetHolder>, Vec<KeySetHolder>) {
    unprocessed.into_iter().partition(has_files)
}

/// Pick up to `budget` holders, oldest creation date first. Returns the
/// selection and the skipped remainder.
pub fn select_fifo(
    mut valid: Vec<KeySetHolder>,
    budget: usize,
) -> (Vec<KeySetHolder>, Vec<KeySetHolder>) {
    valid.sort_by(|a, b| {
        a.creation_date
            .cmp(&b.creation_date)
            .then_with(|| a.identifier.cmp(&b.identifier))
    });
    let selected: Vec<_> = valid.iter().take(budget).cloned().collect();
    let skipped = valid.into_iter().skip(selected.len()).collect();
    (selected, skipped)
}

/// Merge run results into the stored collection: holders without a result
/// are untouched, valid results keep their holder (with the new process
/// date, if any), invalid results drop it.
pub fn merge_results(stored: Vec<KeySetHolder>, results: &[HolderResult]) -> Vec<KeySetHolder> {
    stored
        .into_iter()
        .filter_map(|holder| {
            let Some(result) = results
                .iter()
                .find(|r| r.holder.identifier == holder.identifier)
            else {
                return Some(holder);
            };
            if !result.valid {
                return None;
            }
            Some(KeySetHolder {
                process_date: result.process_date.or(holder.process_date),
                ..holder
            })
        })
        .collect()
}
