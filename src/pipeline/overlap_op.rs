use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

use crate::align::{AlignMode, Aligner, Alignment};
use crate::read::{Sequence, SequencePair};

/// How the 3' end of R1 relates to R2 after alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OverlapStatus {
    #[serde(rename = "NOOVERLAP")]
    NoOverlap,
    #[serde(rename = "R1BEGINSINR2")]
    R1BeginsInR2,
    #[serde(rename = "R1ENDSINR2")]
    R1EndsInR2,
}

impl OverlapStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverlapStatus::NoOverlap => "NOOVERLAP",
            OverlapStatus::R1BeginsInR2 => "R1BEGINSINR2",
            OverlapStatus::R1EndsInR2 => "R1ENDSINR2",
        }
    }
}

impl fmt::Display for OverlapStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OverlapStatus {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "NOOVERLAP" => Ok(OverlapStatus::NoOverlap),
            "R1BEGINSINR2" => Ok(OverlapStatus::R1BeginsInR2),
            "R1ENDSINR2" => Ok(OverlapStatus::R1EndsInR2),
            _ => Err("expected one of NOOVERLAP, R1BEGINSINR2, or R1ENDSINR2"),
        }
    }
}

/// Unaligned material at one end of an overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OverhangKind {
    NoOverhang,
    R1Overhang,
    R2Overhang,
    /// Both mates have unaligned bases at the same end.
    Unhandled,
}

impl OverhangKind {
    fn from_flanks(r1: usize, r2: usize) -> Self {
        match (r1 > 0, r2 > 0) {
            (false, false) => OverhangKind::NoOverhang,
            (true, false) => OverhangKind::R1Overhang,
            (false, true) => OverhangKind::R2Overhang,
            (true, true) => OverhangKind::Unhandled,
        }
    }
}

/// Unaligned flank lengths around an overlap between R1 and reverse-complemented R2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flanks {
    pub r1_front: usize,
    pub r1_back: usize,
    pub r2_front: usize,
    pub r2_back: usize,
}

impl Flanks {
    pub fn of(aln: &Alignment) -> Self {
        Self {
            r1_front: aln.x_start,
            r1_back: aln.x_len - aln.x_end,
            r2_front: aln.y_start,
            r2_back: aln.y_len - aln.y_end,
        }
    }
}

/// Result of classifying one overlap alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlapCall {
    /// Too short or too many errors to be a real overlap.
    NoOverlap,
    /// A geometry that can be merged, either `R1EndsInR2` or `R1BeginsInR2`.
    Merge {
        status: OverlapStatus,
        front: OverhangKind,
        back: OverhangKind,
        flanks: Flanks,
    },
    /// A confident overlap whose overhangs do not fit either mergeable geometry.
    Overhang {
        front: OverhangKind,
        back: OverhangKind,
        flanks: Flanks,
    },
}

impl OverlapCall {
    pub fn status(&self) -> OverlapStatus {
        match self {
            OverlapCall::Merge { status, .. } => *status,
            _ => OverlapStatus::NoOverlap,
        }
    }

    /// Front and back overhang kinds, if the alignment was a confident overlap.
    pub fn overhangs(&self) -> Option<(OverhangKind, OverhangKind)> {
        match *self {
            OverlapCall::NoOverlap => None,
            OverlapCall::Merge { front, back, .. } | OverlapCall::Overhang { front, back, .. } => {
                Some((front, back))
            }
        }
    }

    /// Both mates cover exactly the same bases.
    pub fn is_perfect(&self) -> bool {
        matches!(
            self,
            OverlapCall::Merge {
                status: OverlapStatus::R1EndsInR2,
                front: OverhangKind::NoOverhang,
                back: OverhangKind::NoOverhang,
                ..
            }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlapParams {
    pub min_overlap: usize,
    /// Largest allowed fraction of errors in the overlap.
    pub error_allowed: f64,
    pub hard_mismatch_cutoff: usize,
    /// Bases removed from the 3' end of R1 before aligning.
    pub r1_trim: usize,
    /// Bases removed from the 3' end of R2 before aligning.
    pub r2_trim: usize,
}

impl Default for OverlapParams {
    fn default() -> Self {
        Self {
            min_overlap: 10,
            error_allowed: 0.01,
            hard_mismatch_cutoff: 10,
            r1_trim: 0,
            r2_trim: 0,
        }
    }
}

pub struct OverlapOp {
    params: OverlapParams,
}

impl OverlapOp {
    pub const NAME: &'static str = "OverlapOp";

    /// Align R1 against reverse-complemented R2 and classify their overlap.
    pub fn new(params: OverlapParams) -> Self {
        Self { params }
    }

    /// Trimmed R1 and reverse complement of trimmed R2, the two sequences that are aligned.
    pub fn prepare(&self, pair: &SequencePair) -> (Sequence, Sequence) {
        let r1 = pair.r1.trimmed(0, self.params.r1_trim);
        let rc_r2 = pair.r2.trimmed(0, self.params.r2_trim).revcomp();
        (r1, rc_r2)
    }

    pub fn align(
        &self,
        r1: &Sequence,
        rc_r2: &Sequence,
        aligner: &mut dyn Aligner,
    ) -> (OverlapCall, Alignment) {
        let aln = aligner.align(r1, rc_r2, AlignMode::Overlap);
        (self.classify(&aln), aln)
    }

    /// Classify an overlap alignment. Only depends on the alignment, so classifying the same
    /// alignment again always gives the same call.
    pub fn classify(&self, aln: &Alignment) -> OverlapCall {
        let overlap = aln.len();
        let errors = aln.errors();

        if overlap == 0
            || overlap < self.params.min_overlap
            || errors > self.params.hard_mismatch_cutoff
            || errors as f64 / overlap as f64 > self.params.error_allowed
        {
            return OverlapCall::NoOverlap;
        }

        let flanks = Flanks::of(aln);
        let front = OverhangKind::from_flanks(flanks.r1_front, flanks.r2_front);
        let back = OverhangKind::from_flanks(flanks.r1_back, flanks.r2_back);

        use OverhangKind::*;
        let status = match (front, back) {
            (NoOverhang | R1Overhang, NoOverhang | R2Overhang) => OverlapStatus::R1EndsInR2,
            (NoOverhang | R2Overhang, NoOverhang | R1Overhang) => OverlapStatus::R1BeginsInR2,
            _ => {
                return OverlapCall::Overhang {
                    front,
                    back,
                    flanks,
                }
            }
        };

        OverlapCall::Merge {
            status,
            front,
            back,
            flanks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;

    use crate::align::{AlnOp, PairwiseAligner};

    fn aln(x: (usize, usize, usize), y: (usize, usize, usize), ops: Vec<AlnOp>) -> Alignment {
        Alignment {
            score: 0,
            x_start: x.0,
            x_end: x.1,
            x_len: x.2,
            y_start: y.0,
            y_end: y.1,
            y_len: y.2,
            ops,
        }
    }

    fn op(min_overlap: usize) -> OverlapOp {
        OverlapOp::new(OverlapParams {
            min_overlap,
            ..Default::default()
        })
    }

    #[test]
    fn dovetail_is_r1_ends_in_r2() {
        let mut aligner = PairwiseAligner::default();
        let r1 = Sequence::uniform(*b"AAACCCGGG", 30);
        let rc_r2 = Sequence::uniform(*b"CCCGGGTTT", 30);
        let (call, _) = op(3).align(&r1, &rc_r2, &mut aligner);

        assert_eq!(call.status(), OverlapStatus::R1EndsInR2);
        assert_eq!(
            call.overhangs(),
            Some((OverhangKind::R1Overhang, OverhangKind::R2Overhang))
        );
        assert!(!call.is_perfect());
    }

    #[test]
    fn prepare_trims_then_reverse_complements() {
        let pair = SequencePair::new(
            "p",
            Sequence::uniform(*b"AAACCCGGGNN", 30),
            Sequence::uniform(*b"AAACCCGGGA", 30),
        );
        let o = OverlapOp::new(OverlapParams {
            r1_trim: 2,
            r2_trim: 1,
            ..Default::default()
        });
        let (r1, rc_r2) = o.prepare(&pair);
        assert_eq!(r1.bases(), b"AAACCCGGG");
        assert_eq!(rc_r2.bases(), b"CCCGGGTTT");
    }

    #[rstest]
    #[case((0, 10, 10), (0, 10, 10), OverlapStatus::R1EndsInR2, true)]
    #[case((0, 10, 14), (4, 14, 14), OverlapStatus::R1BeginsInR2, false)]
    #[case((0, 10, 10), (3, 13, 13), OverlapStatus::R1BeginsInR2, false)]
    #[case((0, 10, 10), (0, 10, 13), OverlapStatus::R1EndsInR2, false)]
    fn mergeable_geometries(
        #[case] x: (usize, usize, usize),
        #[case] y: (usize, usize, usize),
        #[case] status: OverlapStatus,
        #[case] perfect: bool,
    ) {
        let call = op(10).classify(&aln(x, y, vec![AlnOp::Match; 10]));
        assert_eq!(call.status(), status);
        assert_eq!(call.is_perfect(), perfect);
    }

    #[rstest]
    // R2 nested in R1
    #[case((2, 12, 14), (0, 10, 10), OverhangKind::R1Overhang, OverhangKind::R1Overhang)]
    // R1 nested in R2
    #[case((0, 10, 10), (2, 12, 14), OverhangKind::R2Overhang, OverhangKind::R2Overhang)]
    #[case((2, 12, 12), (2, 12, 12), OverhangKind::Unhandled, OverhangKind::NoOverhang)]
    fn overhang_failures(
        #[case] x: (usize, usize, usize),
        #[case] y: (usize, usize, usize),
        #[case] front: OverhangKind,
        #[case] back: OverhangKind,
    ) {
        let call = op(10).classify(&aln(x, y, vec![AlnOp::Match; 10]));
        assert!(matches!(call, OverlapCall::Overhang { .. }));
        assert_eq!(call.overhangs(), Some((front, back)));
        assert_eq!(call.status(), OverlapStatus::NoOverlap);
    }

    #[test]
    fn rejects_short_or_noisy_overlaps() {
        let mut ops = vec![AlnOp::Match; 10];
        assert_eq!(
            op(11).classify(&aln((0, 10, 10), (0, 10, 10), ops.clone())),
            OverlapCall::NoOverlap
        );
        ops[4] = AlnOp::Subst;
        // 1 error in 10 is above the default 1% allowance
        assert_eq!(
            op(10).classify(&aln((0, 10, 10), (0, 10, 10), ops)),
            OverlapCall::NoOverlap
        );
        assert_eq!(
            op(0).classify(&Alignment::empty(10, 10)),
            OverlapCall::NoOverlap
        );
    }

    #[test]
    fn classification_is_idempotent() {
        let o = op(3);
        let a = aln((3, 9, 9), (0, 6, 9), vec![AlnOp::Match; 6]);
        let first = o.classify(&a);
        assert_eq!(first, o.classify(&a));
        assert_eq!(first.status(), OverlapStatus::R1EndsInR2);
    }

    #[test]
    fn status_names() {
        assert_eq!("r1beginsinr2".parse::<OverlapStatus>(), Ok(OverlapStatus::R1BeginsInR2));
        assert!("overlap".parse::<OverlapStatus>().is_err());
        assert_eq!(OverlapStatus::R1EndsInR2.to_string(), "R1ENDSINR2");
    }
}
