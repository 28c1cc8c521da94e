use serde::{Deserialize, Serialize};

use std::fmt;

use crate::align::Aligner;
use crate::patterns::Barcode;
use crate::pipeline::{PairFailure, PairOp, PairResult};
use crate::read::{bases_match, is_no_call, Mate, SequencePair};

/// Barcode given to every pair of a run without multiplexing.
pub const ALL_SAMPLES: &str = "all";

/// Why no barcode could be assigned to a pair.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum BarcodeFailure {
    /// No barcode within the mismatch budget.
    NoMatch,
    /// Two or more barcodes tie for the fewest mismatches.
    Ambiguous,
    /// The read is shorter than every barcode.
    TooShort,
    /// The run has no barcodes.
    NotApplicable,
}

impl BarcodeFailure {
    pub const ALL: [BarcodeFailure; 4] = [
        BarcodeFailure::NoMatch,
        BarcodeFailure::Ambiguous,
        BarcodeFailure::TooShort,
        BarcodeFailure::NotApplicable,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BarcodeFailure::NoMatch => "noMatch",
            BarcodeFailure::Ambiguous => "ambiguous",
            BarcodeFailure::TooShort => "tooShort",
            BarcodeFailure::NotApplicable => "notApplicable",
        }
    }
}

impl fmt::Display for BarcodeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A barcode found at the start of a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarcodeHit {
    /// Index into the barcode list.
    pub idx: usize,
    /// Mismatches at the start of R1.
    pub front: usize,
    /// Mismatches at the start of R2, for barcodes read again at the 3' end.
    pub back: Option<usize>,
}

impl BarcodeHit {
    pub fn mismatches(&self) -> usize {
        self.front + self.back.unwrap_or(0)
    }
}

// Hamming distance between a barcode and the start of a read; no-calls always count
fn mismatches(barcode: &[u8], read: &[u8]) -> usize {
    barcode
        .iter()
        .zip(read)
        .filter(|&(&b, &r)| is_no_call(r) || !bases_match(b, r))
        .count()
}

pub struct BarcodeOp {
    barcodes: Vec<Barcode>,
    max_mismatches: usize,
    single_sample: bool,
}

impl BarcodeOp {
    const NAME: &'static str = "BarcodeOp";

    /// Find one of `barcodes` at the start of R1 with at most `max_mismatches` mismatches
    /// (per end for barcodes also read at the start of R2) and trim it off.
    pub fn new(barcodes: &[Barcode], max_mismatches: usize) -> Self {
        Self {
            barcodes: barcodes.to_owned(),
            max_mismatches,
            single_sample: false,
        }
    }

    /// Tag every pair with [`ALL_SAMPLES`] without looking at its bases.
    pub fn single_sample() -> Self {
        Self {
            barcodes: Vec::new(),
            max_mismatches: 0,
            single_sample: true,
        }
    }

    pub fn barcode(&self, idx: usize) -> &Barcode {
        &self.barcodes[idx]
    }

    /// Locate the barcode of a pair without modifying it.
    pub fn find(&self, pair: &SequencePair) -> Result<BarcodeHit, BarcodeFailure> {
        let Some(shortest) = self.barcodes.iter().map(|b| b.bases.len()).min() else {
            return Err(BarcodeFailure::NotApplicable);
        };
        let needs_r2 = self.barcodes.iter().any(|b| b.ends_rev_comp);

        if pair.r1.len() < shortest || (needs_r2 && pair.r2.len() < shortest) {
            return Err(BarcodeFailure::TooShort);
        }

        let mut best: Option<BarcodeHit> = None;
        let mut tied = false;

        for (idx, barcode) in self.barcodes.iter().enumerate() {
            let len = barcode.bases.len();
            if pair.r1.len() < len || (barcode.ends_rev_comp && pair.r2.len() < len) {
                continue;
            }

            let front = mismatches(&barcode.bases, pair.r1.bases());
            if front > self.max_mismatches {
                continue;
            }

            let back = if barcode.ends_rev_comp {
                let m = mismatches(&barcode.bases, pair.r2.bases());
                if m > self.max_mismatches {
                    continue;
                }
                Some(m)
            } else {
                None
            };

            let hit = BarcodeHit { idx, front, back };
            match best {
                Some(b) if hit.mismatches() > b.mismatches() => (),
                Some(b) if hit.mismatches() == b.mismatches() => tied = true,
                _ => {
                    best = Some(hit);
                    tied = false;
                }
            }
        }

        match best {
            None => Err(BarcodeFailure::NoMatch),
            Some(_) if tied => Err(BarcodeFailure::Ambiguous),
            Some(hit) => Ok(hit),
        }
    }

    /// Find and trim the barcode, returning its name.
    pub fn assign(&self, pair: &mut SequencePair) -> Result<String, BarcodeFailure> {
        if self.single_sample {
            pair.barcode = Some(ALL_SAMPLES.to_owned());
            return Ok(ALL_SAMPLES.to_owned());
        }

        let hit = self.find(pair)?;
        let barcode = &self.barcodes[hit.idx];
        let len = barcode.bases.len();

        pair.trim_front(Mate::R1, len);
        if hit.back.is_some() {
            pair.trim_front(Mate::R2, len);
        }
        pair.barcode = Some(barcode.name.clone());

        Ok(barcode.name.clone())
    }
}

impl PairOp for BarcodeOp {
    fn run(&self, pair: &mut SequencePair, _aligner: &mut dyn Aligner) -> PairResult {
        self.assign(pair).map(|_| ()).map_err(PairFailure::Barcode)
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }
}
