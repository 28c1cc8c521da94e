use crate::align::{AlnOp, Alignment};
use crate::pipeline::{OverhangKind, OverlapCall, OverlapStatus};
use crate::read::Sequence;

/// Quality given to a disagreeing column where both mates have the same quality.
pub const TIE_QUAL: u8 = 2;

/// Merges an accepted overlap into one sequence spanning the insert.
///
/// `r1` and `rc_r2` are the two aligned sequences (R1 and reverse-complemented R2), `aln` is
/// their overlap alignment and `call` its classification. Only called for
/// [`OverlapCall::Merge`].
pub trait ConsensusBuilder {
    fn build(&self, r1: &Sequence, rc_r2: &Sequence, aln: &Alignment, call: &OverlapCall)
        -> Sequence;
}

impl<F> ConsensusBuilder for F
where
    F: Fn(&Sequence, &Sequence, &Alignment, &OverlapCall) -> Sequence,
{
    fn build(
        &self,
        r1: &Sequence,
        rc_r2: &Sequence,
        aln: &Alignment,
        call: &OverlapCall,
    ) -> Sequence {
        self(r1, rc_r2, aln, call)
    }
}

/// Quality-aware consensus.
///
/// Agreeing bases keep the higher quality. On disagreement the base with the strictly higher
/// quality wins with quality `max(hi - lo, 2)`, and equal qualities keep the R1 base with
/// quality 2. A base opposite a gap is kept only if its quality reaches the mean quality of
/// the bases flanking the gap in the other mate.
#[derive(Debug, Clone, Copy, Default)]
pub struct QualityConsensus;

impl QualityConsensus {
    fn merge_column(a: u8, qa: u8, b: u8, qb: u8) -> (u8, u8) {
        if a.eq_ignore_ascii_case(&b) {
            (a, qa.max(qb))
        } else if qa > qb {
            (a, (qa - qb).max(TIE_QUAL))
        } else if qb > qa {
            (b, (qb - qa).max(TIE_QUAL))
        } else {
            (a, TIE_QUAL)
        }
    }

    // mean quality of the bases on either side of position `i` in `seq`
    fn flanking_mean(seq: &Sequence, i: usize) -> Option<f64> {
        let q = seq.quals();
        let around = [i.checked_sub(1).and_then(|j| q.get(j)), q.get(i)];
        let (sum, n) = around
            .into_iter()
            .flatten()
            .fold((0u32, 0u32), |(s, n), &q| (s + q as u32, n + 1));

        if n == 0 {
            None
        } else {
            Some(sum as f64 / n as f64)
        }
    }

    fn keep_gapped(q: u8, opposite: &Sequence, next: usize) -> bool {
        Self::flanking_mean(opposite, next).map_or(true, |mean| q as f64 >= mean)
    }
}

impl ConsensusBuilder for QualityConsensus {
    fn build(
        &self,
        r1: &Sequence,
        rc_r2: &Sequence,
        aln: &Alignment,
        call: &OverlapCall,
    ) -> Sequence {
        let mut res = Sequence::default();

        let (front, back) = match *call {
            OverlapCall::Merge {
                status: OverlapStatus::R1EndsInR2,
                front,
                back,
                ..
            } => (front, back),
            // read-through overhangs are adapter sequence and are left out
            _ => (OverhangKind::NoOverhang, OverhangKind::NoOverhang),
        };

        if front == OverhangKind::R1Overhang {
            res.extend_from(&r1.slice(0, aln.x_start));
        }

        let mut next_x = aln.x_start;
        let mut next_y = aln.y_start;

        for col in aln.columns() {
            match (col.op, col.x, col.y) {
                (AlnOp::Match | AlnOp::Subst, Some(x), Some(y)) => {
                    let (b, q) = Self::merge_column(
                        r1.bases()[x],
                        r1.quals()[x],
                        rc_r2.bases()[y],
                        rc_r2.quals()[y],
                    );
                    res.push(b, q);
                    next_x = x + 1;
                    next_y = y + 1;
                }
                (AlnOp::Ins, Some(x), None) => {
                    let q = r1.quals()[x];
                    if Self::keep_gapped(q, rc_r2, next_y) {
                        res.push(r1.bases()[x], q);
                    }
                    next_x = x + 1;
                }
                (AlnOp::Del, None, Some(y)) => {
                    let q = rc_r2.quals()[y];
                    if Self::keep_gapped(q, r1, next_x) {
                        res.push(rc_r2.bases()[y], q);
                    }
                    next_y = y + 1;
                }
                _ => unreachable!("alignment column does not match its operation"),
            }
        }

        if back == OverhangKind::R2Overhang {
            res.extend_from(&rc_r2.slice(aln.y_end, rc_r2.len()));
        }

        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;

    use crate::align::{AlignMode, Aligner, PairwiseAligner};
    use crate::pipeline::{OverlapOp, OverlapParams};

    fn merge(r1: &Sequence, rc_r2: &Sequence) -> Sequence {
        let mut aligner = PairwiseAligner::default();
        let op = OverlapOp::new(OverlapParams {
            min_overlap: 3,
            error_allowed: 0.5,
            ..Default::default()
        });
        let (call, aln) = op.align(r1, rc_r2, &mut aligner);
        QualityConsensus.build(r1, rc_r2, &aln, &call)
    }

    #[test]
    fn dovetail_keeps_both_flanks() {
        let r1 = Sequence::new(*b"AAACCCGGG", [30, 30, 30, 30, 30, 30, 20, 20, 20]);
        let rc_r2 = Sequence::new(*b"CCCGGGTTT", [25, 25, 25, 35, 35, 35, 10, 10, 10]);
        let c = merge(&r1, &rc_r2);

        assert_eq!(c.bases(), b"AAACCCGGGTTT");
        assert_eq!(c.quals(), &[30, 30, 30, 30, 30, 30, 35, 35, 35, 10, 10, 10]);
    }

    #[test]
    fn read_through_drops_overhangs() {
        // insert ACGTACGTAC, R1 reads into adapter TT, R2 into adapter GG
        let r1 = Sequence::uniform(*b"ACGTACGTACTT", 30);
        let rc_r2 = Sequence::uniform(*b"CCACGTACGTAC", 30);
        let c = merge(&r1, &rc_r2);
        assert_eq!(c.bases(), b"ACGTACGTAC");
    }

    #[rstest]
    #[case(b'A', 30, b'C', 20, b'A', 10)]
    #[case(b'A', 20, b'C', 30, b'C', 10)]
    #[case(b'A', 21, b'C', 20, b'A', 2)]
    #[case(b'A', 25, b'C', 25, b'A', 2)]
    #[case(b'a', 25, b'A', 35, b'a', 35)]
    fn column_rule(
        #[case] a: u8,
        #[case] qa: u8,
        #[case] b: u8,
        #[case] qb: u8,
        #[case] base: u8,
        #[case] qual: u8,
    ) {
        assert_eq!(QualityConsensus::merge_column(a, qa, b, qb), (base, qual));
    }

    #[test]
    fn gap_base_needs_flanking_quality() {
        let aln = Alignment {
            score: 0,
            x_start: 0,
            x_end: 5,
            y_start: 0,
            y_end: 4,
            x_len: 5,
            y_len: 4,
            ops: vec![
                AlnOp::Match,
                AlnOp::Match,
                AlnOp::Ins,
                AlnOp::Match,
                AlnOp::Match,
            ],
        };
        let call = OverlapCall::Merge {
            status: OverlapStatus::R1EndsInR2,
            front: OverhangKind::NoOverhang,
            back: OverhangKind::NoOverhang,
            flanks: Default::default(),
        };
        let rc_r2 = Sequence::new(*b"ACGT", [30, 30, 30, 30]);

        let low = Sequence::new(*b"ACTGT", [30, 30, 10, 30, 30]);
        assert_eq!(QualityConsensus.build(&low, &rc_r2, &aln, &call).bases(), b"ACGT");

        let high = Sequence::new(*b"ACTGT", [30, 30, 30, 30, 30]);
        assert_eq!(QualityConsensus.build(&high, &rc_r2, &aln, &call).bases(), b"ACTGT");
    }

    #[test]
    fn closures_are_builders() {
        let r1_only = |r1: &Sequence, _: &Sequence, _: &Alignment, _: &OverlapCall| r1.clone();
        let r1 = Sequence::uniform(*b"ACGT", 30);
        let mut aligner = PairwiseAligner::default();
        let aln = aligner.align(&r1, &r1, AlignMode::Overlap);
        let built = r1_only.build(&r1, &r1, &aln, &OverlapCall::NoOverlap);
        assert_eq!(built, r1);
    }
}
