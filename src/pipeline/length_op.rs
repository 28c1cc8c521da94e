use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use std::fmt;

use crate::align::Aligner;
use crate::patterns::{Catalog, LenCutOffs};
use crate::pipeline::*;
use crate::read::{Mate, SequencePair};

/// Name suffix for pairs that are only flagged by a length window.
pub const LEN_SUFFIX: &str = "_len";

/// Inclusive `[min, max]` read length window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LengthWindow {
    pub min: usize,
    pub max: usize,
}

impl LengthWindow {
    pub fn new(min: usize, max: usize) -> Self {
        Self { min, max }
    }

    /// Window of 5% around a median length. The lower bound is 0 if the step exceeds the
    /// median.
    pub fn from_median(median: f64) -> Self {
        let step = median * 0.05;
        let min = if step > median {
            0
        } else {
            (median - step).round() as usize
        };
        Self {
            min,
            max: (median + step).round() as usize,
        }
    }

    pub fn check(&self, len: usize) -> Option<LengthFailureKind> {
        if len < self.min {
            Some(LengthFailureKind::TooShort)
        } else if len > self.max {
            Some(LengthFailureKind::TooLong)
        } else {
            None
        }
    }
}

/// Median of `lens`, the mean of the two middle values for an even count and 0 when empty.
pub fn median(lens: &[usize]) -> f64 {
    if lens.is_empty() {
        return 0.0;
    }

    let mut sorted = lens.to_owned();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;

    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) as f64 / 2.0
    } else {
        sorted[mid] as f64
    }
}

/// Mate lengths of every barcode-accepted pair, used to derive default windows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadLengths {
    pub r1: Vec<usize>,
    pub r2: Vec<usize>,
}

impl ReadLengths {
    pub fn push(&mut self, pair: &SequencePair) {
        self.r1.push(pair.r1.len());
        self.r2.push(pair.r2.len());
    }

    pub fn merge(&mut self, other: ReadLengths) {
        self.r1.extend(other.r1);
        self.r2.extend(other.r2);
    }
}

/// Explicit bounds for every target that has no entry in the cutoff file. Unset bounds come
/// from the median.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalLengthBounds {
    pub r1_min: Option<usize>,
    pub r1_max: Option<usize>,
    pub r2_min: Option<usize>,
    pub r2_max: Option<usize>,
}

/// Length windows of every target, resolved once for the whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthWindows {
    default: LenCutOffs,
    per_target: FxHashMap<String, LenCutOffs>,
}

impl LengthWindows {
    /// Resolve windows with precedence: cutoff file entry, then global bounds, then the
    /// median of `lengths`.
    pub fn resolve(
        catalog: &Catalog,
        global: GlobalLengthBounds,
        lengths: &ReadLengths,
        mark_only: bool,
    ) -> Self {
        let r1_median = LengthWindow::from_median(median(&lengths.r1));
        let r2_median = LengthWindow::from_median(median(&lengths.r2));

        let default = LenCutOffs {
            r1: LengthWindow::new(
                global.r1_min.unwrap_or(r1_median.min),
                global.r1_max.unwrap_or(r1_median.max),
            ),
            r2: LengthWindow::new(
                global.r2_min.unwrap_or(r2_median.min),
                global.r2_max.unwrap_or(r2_median.max),
            ),
            mark_only,
        };

        let per_target = catalog
            .targets()
            .iter()
            .filter_map(|t| t.len_cut_offs.map(|c| (t.name.clone(), c)))
            .collect();

        Self {
            default,
            per_target,
        }
    }

    /// The same window for every target.
    pub fn uniform(cut_offs: LenCutOffs) -> Self {
        Self {
            default: cut_offs,
            per_target: FxHashMap::default(),
        }
    }

    pub fn get(&self, target: &str) -> &LenCutOffs {
        self.per_target.get(target).unwrap_or(&self.default)
    }

    pub fn default_cut_offs(&self) -> &LenCutOffs {
        &self.default
    }
}

/// Which of the two length checks rejected a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LengthCheck {
    /// Right after primer trimming.
    First,
    /// After reverse primer trimming.
    Second,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LengthFailureKind {
    TooShort,
    TooLong,
}

impl fmt::Display for LengthCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LengthCheck::First => write!(f, "first"),
            LengthCheck::Second => write!(f, "second"),
        }
    }
}

impl fmt::Display for LengthFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LengthFailureKind::TooShort => write!(f, "tooShort"),
            LengthFailureKind::TooLong => write!(f, "tooLong"),
        }
    }
}

pub struct LengthOp {
    windows: LengthWindows,
    check: LengthCheck,
}

impl LengthOp {
    const NAME: &'static str = "LengthOp";

    /// Check both mates of a pair against its target's window.
    pub fn new(windows: LengthWindows, check: LengthCheck) -> Self {
        Self { windows, check }
    }
}

impl PairOp for LengthOp {
    fn run(&self, pair: &mut SequencePair, _aligner: &mut dyn Aligner) -> PairResult {
        let Some(target) = pair.target.as_deref() else {
            return Ok(());
        };
        let cut_offs = *self.windows.get(target);

        for (mate, window) in [(Mate::R1, cut_offs.r1), (Mate::R2, cut_offs.r2)] {
            let Some(kind) = window.check(pair.mate(mate).len()) else {
                continue;
            };
            let failure = PairFailure::Length {
                mate,
                check: self.check,
                kind,
            };

            if !cut_offs.mark_only {
                pair.reject(failure.to_string());
                return Err(failure);
            }

            pair.flag(failure.to_string());
            if !pair.name.ends_with(LEN_SUFFIX) {
                pair.name.push_str(LEN_SUFFIX);
            }
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }
}
