//! Pairwise alignment used to find primers and mate overlaps.
//!
//! The pipeline only talks to the [`Aligner`] trait. [`PairwiseAligner`] is the default
//! engine, a dynamic programming aligner from `bio`; tests and callers can plug in any other
//! engine that reports the same [`Alignment`] shape.

use bio::alignment::pairwise::{self, MatchFunc, Scoring, MIN_SCORE};
use bio::alignment::AlignmentOperation;
use serde::{Deserialize, Serialize};

use crate::read::{bases_match, is_no_call, Sequence};

/// How the ends of the two sequences are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignMode {
    /// `x` (a primer) is aligned end to end and must start at the first base of `y`.
    /// Trailing bases of `y` are free.
    Anchored,
    /// Unaligned bases at either end of either sequence are free, which finds a dovetail
    /// or containment overlap between mates.
    Overlap,
}

/// One alignment column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlnOp {
    Match,
    Subst,
    /// Base in `x`, gap in `y`.
    Ins,
    /// Base in `y`, gap in `x`.
    Del,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alignment {
    pub score: i32,
    pub x_start: usize,
    pub x_end: usize,
    pub y_start: usize,
    pub y_end: usize,
    pub x_len: usize,
    pub y_len: usize,
    pub ops: Vec<AlnOp>,
}

/// Positions of one alignment column in `x` and `y`. `None` is a gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub op: AlnOp,
    pub x: Option<usize>,
    pub y: Option<usize>,
}

impl Alignment {
    /// Alignment with no columns, every base of both sequences unaligned.
    pub fn empty(x_len: usize, y_len: usize) -> Self {
        Self {
            score: 0,
            x_start: 0,
            x_end: 0,
            y_start: 0,
            y_end: 0,
            x_len,
            y_len,
            ops: Vec::new(),
        }
    }

    /// Number of alignment columns.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = Column> + '_ {
        let mut x = self.x_start;
        let mut y = self.y_start;

        self.ops.iter().map(move |&op| match op {
            AlnOp::Match | AlnOp::Subst => {
                let c = Column {
                    op,
                    x: Some(x),
                    y: Some(y),
                };
                x += 1;
                y += 1;
                c
            }
            AlnOp::Ins => {
                let c = Column {
                    op,
                    x: Some(x),
                    y: None,
                };
                x += 1;
                c
            }
            AlnOp::Del => {
                let c = Column {
                    op,
                    x: None,
                    y: Some(y),
                };
                y += 1;
                c
            }
        })
    }

    /// Substitutions plus gap columns.
    pub fn errors(&self) -> usize {
        self.ops.iter().filter(|&&op| op != AlnOp::Match).count()
    }

    pub fn gaps(&self) -> usize {
        self.ops
            .iter()
            .filter(|&&op| matches!(op, AlnOp::Ins | AlnOp::Del))
            .count()
    }

    /// The two rows of the alignment with `-` for gaps.
    pub fn aligned_strings(&self, x: &[u8], y: &[u8]) -> (Vec<u8>, Vec<u8>) {
        self.columns()
            .map(|c| (c.x.map_or(b'-', |i| x[i]), c.y.map_or(b'-', |i| y[i])))
            .unzip()
    }
}

/// The alignment capability the pipeline consumes.
pub trait Aligner {
    fn align(&mut self, x: &Sequence, y: &Sequence, mode: AlignMode) -> Alignment;
}

/// Substitution and gap scores.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringScheme {
    pub match_score: i32,
    pub mismatch_score: i32,
    pub gap_open: i32,
    pub gap_extend: i32,
}

impl Default for ScoringScheme {
    fn default() -> Self {
        Self {
            match_score: 2,
            mismatch_score: -2,
            gap_open: -5,
            gap_extend: -1,
        }
    }
}

/// Scores IUPAC codes as matches whenever they can be the same nucleotide.
#[derive(Debug, Clone, Copy)]
pub struct DegenerateMatch {
    match_score: i32,
    mismatch_score: i32,
}

impl MatchFunc for DegenerateMatch {
    #[inline]
    fn score(&self, a: u8, b: u8) -> i32 {
        if bases_match(a, b) {
            self.match_score
        } else {
            self.mismatch_score
        }
    }
}

/// End geometries tried in [`AlignMode::Overlap`]: which of `x` prefix, `x` suffix, `y` prefix
/// and `y` suffix may be left unaligned. Every overlap either dovetails or nests one sequence in
/// the other, so each side of the alignment must reach the end of at least one sequence.
const OVERLAP_GEOMETRIES: [[bool; 4]; 4] = [
    // x ends inside y
    [true, false, false, true],
    // y ends inside x
    [false, true, true, false],
    // y nested in x
    [true, true, false, false],
    // x nested in y
    [false, false, true, true],
];

/// Default [`Aligner`] built on `bio`'s pairwise aligner.
pub struct PairwiseAligner {
    anchored: pairwise::Aligner<DegenerateMatch>,
    overlap: Vec<pairwise::Aligner<DegenerateMatch>>,
}

impl PairwiseAligner {
    const INIT_LEN: usize = 256;

    pub fn new(scheme: ScoringScheme) -> Self {
        let match_fn = DegenerateMatch {
            match_score: scheme.match_score,
            mismatch_score: scheme.mismatch_score,
        };
        let scoring = |[x_pre, x_suf, y_pre, y_suf]: [bool; 4]| {
            let clip = |free: bool| if free { 0 } else { MIN_SCORE };
            let mut s = Scoring::new(scheme.gap_open, scheme.gap_extend, match_fn);
            s.xclip_prefix = clip(x_pre);
            s.xclip_suffix = clip(x_suf);
            s.yclip_prefix = clip(y_pre);
            s.yclip_suffix = clip(y_suf);
            pairwise::Aligner::with_capacity_and_scoring(Self::INIT_LEN, Self::INIT_LEN, s)
        };

        Self {
            anchored: scoring([false, false, false, true]),
            overlap: OVERLAP_GEOMETRIES.into_iter().map(scoring).collect(),
        }
    }
}

impl Default for PairwiseAligner {
    fn default() -> Self {
        Self::new(ScoringScheme::default())
    }
}

impl Aligner for PairwiseAligner {
    fn align(&mut self, x: &Sequence, y: &Sequence, mode: AlignMode) -> Alignment {
        let (xs, ys) = (x.bases(), y.bases());
        let aln = match mode {
            AlignMode::Anchored => self.anchored.custom(xs, ys),
            AlignMode::Overlap => {
                let mut best: Option<bio::alignment::Alignment> = None;
                // earliest geometry wins a score tie
                for a in &mut self.overlap {
                    let aln = a.custom(xs, ys);
                    if best.as_ref().map_or(true, |b| aln.score > b.score) {
                        best = Some(aln);
                    }
                }
                match best {
                    Some(b) => b,
                    None => return Alignment::empty(xs.len(), ys.len()),
                }
            }
        };

        let mut xi = aln.xstart;
        let mut yi = aln.ystart;
        let mut ops = Vec::with_capacity(aln.operations.len());

        // bio only reports exact byte equality as a match, so degenerate and
        // case-insensitive matches are recomputed here
        for op in &aln.operations {
            match op {
                AlignmentOperation::Match | AlignmentOperation::Subst => {
                    let (a, b) = (xs[xi], ys[yi]);
                    let same = bases_match(a, b) || is_no_call(a) || is_no_call(b);
                    ops.push(if same { AlnOp::Match } else { AlnOp::Subst });
                    xi += 1;
                    yi += 1;
                }
                AlignmentOperation::Ins => {
                    ops.push(AlnOp::Ins);
                    xi += 1;
                }
                AlignmentOperation::Del => {
                    ops.push(AlnOp::Del);
                    yi += 1;
                }
                AlignmentOperation::Xclip(_) | AlignmentOperation::Yclip(_) => (),
            }
        }

        Alignment {
            score: aln.score,
            x_start: aln.xstart,
            x_end: aln.xend,
            y_start: aln.ystart,
            y_end: aln.yend,
            x_len: xs.len(),
            y_len: ys.len(),
            ops,
        }
    }
}
