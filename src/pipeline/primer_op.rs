use serde::{Deserialize, Serialize};

use std::fmt;

use crate::align::{AlignMode, Aligner};
use crate::errors::{Error, Result};
use crate::patterns::Catalog;
use crate::pipeline::*;
use crate::read::{Mate, Sequence, SequencePair};

/// Appended to the name of pairs that fail reverse primer confirmation.
pub const BAD_REVERSE_SUFFIX: &str = "_badReverse";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PrimerFailure {
    /// No target's primer matched within the error budget.
    Unrecognized,
    ReverseConfirmFailed,
}

impl fmt::Display for PrimerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimerFailure::Unrecognized => write!(f, "unrecognized"),
            PrimerFailure::ReverseConfirmFailed => write!(f, "badReverse"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrimerParams {
    /// Errors (substitutions and gap columns) allowed in the forward primer.
    pub fwd_primer_errors: usize,
    /// Errors allowed in the primer checked by reverse confirmation.
    pub rev_primer_errors: usize,
    /// Largest start offset tried for a primer. 0 only tries the first base.
    pub variable_stop: usize,
    /// Also look for reverse primers at the start of R1.
    pub check_complement: bool,
    /// Assign the only target to every pair without looking for its primer.
    pub no_forward_primer: bool,
    /// Skip reverse primer confirmation.
    pub no_reverse_primer: bool,
}

impl Default for PrimerParams {
    fn default() -> Self {
        Self {
            fwd_primer_errors: 2,
            rev_primer_errors: 2,
            variable_stop: 0,
            check_complement: false,
            no_forward_primer: false,
            no_reverse_primer: false,
        }
    }
}

/// Best placement of a primer at the start of a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrimerHit {
    pub offset: usize,
    /// Number of read bases up to the end of the primer, which are trimmed.
    pub end: usize,
    pub score: i32,
    pub errors: usize,
}

/// Align `primer` at every offset in `0..=max_offset` of `read` and keep the best scoring
/// placement with at most `max_errors` errors. The earliest offset wins a score tie.
pub fn find_primer(
    aligner: &mut dyn Aligner,
    primer: &Sequence,
    read: &Sequence,
    max_offset: usize,
    max_errors: usize,
) -> Option<PrimerHit> {
    let mut best: Option<PrimerHit> = None;

    for offset in 0..=max_offset {
        if offset >= read.len() {
            break;
        }

        let aln = aligner.align(primer, &read.trimmed(offset, 0), AlignMode::Anchored);
        let errors = aln.errors();
        if errors > max_errors || aln.is_empty() {
            continue;
        }

        if best.map_or(true, |b| aln.score > b.score) {
            best = Some(PrimerHit {
                offset,
                end: offset + aln.y_end,
                score: aln.score,
                errors,
            });
        }
    }

    best
}

struct PrimerPair {
    target: String,
    forward: Sequence,
    reverse: Option<Sequence>,
}

fn primer_pairs(catalog: &Catalog) -> Vec<PrimerPair> {
    catalog
        .targets()
        .iter()
        .map(|t| PrimerPair {
            target: t.name.clone(),
            forward: Sequence::uniform(t.forward.clone(), 40),
            reverse: t.reverse.clone().map(|r| Sequence::uniform(r, 40)),
        })
        .collect()
}

pub struct PrimerOp {
    primers: Vec<PrimerPair>,
    params: PrimerParams,
}

impl PrimerOp {
    const NAME: &'static str = "PrimerOp";

    /// Identify the target of a pair from the primer at the start of R1 and trim it.
    ///
    /// Pairs found through a reverse primer are re-oriented by swapping their mates, so R1
    /// always carries the forward primer side after this op, and their name gets the
    /// [`COMP_MARK`] suffix.
    pub fn new(catalog: &Catalog, params: PrimerParams) -> Result<Self> {
        if params.no_forward_primer && catalog.targets().len() != 1 {
            return Err(Error::NoForwardPrimerWithMultipleTargets {
                count: catalog.targets().len(),
                names: catalog.target_names().join(","),
            });
        }

        Ok(Self {
            primers: primer_pairs(catalog),
            params,
        })
    }

    // best target over all primers chosen by `which`; ties go to the first target by name
    fn best_target(
        &self,
        aligner: &mut dyn Aligner,
        read: &Sequence,
        which: impl Fn(&PrimerPair) -> Option<&Sequence>,
    ) -> Option<(usize, PrimerHit)> {
        let mut best: Option<(usize, PrimerHit)> = None;

        for (i, p) in self.primers.iter().enumerate() {
            let Some(primer) = which(p) else {
                continue;
            };
            let Some(hit) = find_primer(
                aligner,
                primer,
                read,
                self.params.variable_stop,
                self.params.fwd_primer_errors,
            ) else {
                continue;
            };

            if best.map_or(true, |(_, b)| hit.score > b.score) {
                best = Some((i, hit));
            }
        }

        best
    }
}

impl PairOp for PrimerOp {
    fn run(&self, pair: &mut SequencePair, aligner: &mut dyn Aligner) -> PairResult {
        if self.params.no_forward_primer {
            pair.target = Some(self.primers[0].target.clone());
            return Ok(());
        }

        if let Some((i, hit)) = self.best_target(aligner, &pair.r1, |p| Some(&p.forward)) {
            pair.trim_front(Mate::R1, hit.end);
            pair.target = Some(self.primers[i].target.clone());
            return Ok(());
        }

        if self.params.check_complement {
            if let Some((i, hit)) = self.best_target(aligner, &pair.r1, |p| p.reverse.as_ref()) {
                pair.trim_front(Mate::R1, hit.end);
                pair.swap_mates();
                pair.found_in_reverse = true;
                pair.name.push_str(COMP_MARK);
                pair.target = Some(self.primers[i].target.clone());
                return Ok(());
            }
        }

        let failure = PairFailure::Primer(PrimerFailure::Unrecognized);
        pair.reject(failure.to_string());
        Err(failure)
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }
}

pub struct ReversePrimerOp {
    primers: Vec<PrimerPair>,
    params: PrimerParams,
}

impl ReversePrimerOp {
    const NAME: &'static str = "ReversePrimerOp";

    /// Confirm the other primer of the pair's target at the start of the other mate and trim
    /// it. For pairs that were found in reverse, the forward primer is checked at the start of
    /// R1 instead.
    pub fn new(catalog: &Catalog, params: PrimerParams) -> Self {
        Self {
            primers: primer_pairs(catalog),
            params,
        }
    }
}

impl PairOp for ReversePrimerOp {
    fn run(&self, pair: &mut SequencePair, aligner: &mut dyn Aligner) -> PairResult {
        let Some(target) = pair.target.as_deref() else {
            return Ok(());
        };
        let Some(p) = self.primers.iter().find(|p| p.target == target) else {
            return Ok(());
        };

        let (primer, mate) = if pair.found_in_reverse {
            (&p.forward, Mate::R1)
        } else {
            match &p.reverse {
                Some(r) => (r, Mate::R2),
                None => return Ok(()),
            }
        };

        match find_primer(
            aligner,
            primer,
            pair.mate(mate),
            self.params.variable_stop,
            self.params.rev_primer_errors,
        ) {
            Some(hit) => {
                pair.trim_front(mate, hit.end);
                Ok(())
            }
            None => {
                let failure = PairFailure::Primer(PrimerFailure::ReverseConfirmFailed);
                pair.reject(failure.to_string());
                pair.name.push_str(BAD_REVERSE_SUFFIX);
                Err(failure)
            }
        }
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::align::PairwiseAligner;

    fn catalog() -> Catalog {
        let mut c = Catalog::new();
        c.add_target("T1", "GATTACA", Some(b"CCGGAATT".as_slice()))
            .unwrap();
        c.add_target("T2", "TTTTGGGG", Some(b"ACACACAC".as_slice()))
            .unwrap();
        c
    }

    fn pair(r1: &[u8], r2: &[u8]) -> SequencePair {
        SequencePair::new(
            "p",
            Sequence::uniform(r1.to_owned(), 30),
            Sequence::uniform(r2.to_owned(), 30),
        )
    }

    #[test]
    fn forward_primer_with_one_mismatch() {
        let params = PrimerParams {
            fwd_primer_errors: 1,
            ..Default::default()
        };
        let op = PrimerOp::new(&catalog(), params).unwrap();
        let mut aligner = PairwiseAligner::default();
        let mut p = pair(b"GATTAGACCGTACGTT", b"CCGGAATTAAA");

        assert_eq!(op.run(&mut p, &mut aligner), Ok(()));
        assert_eq!(p.target.as_deref(), Some("T1"));
        assert_eq!(p.r1.bases(), b"CCGTACGTT");
        assert!(!p.found_in_reverse);
    }

    #[test]
    fn unrecognized_primer() {
        let op = PrimerOp::new(&catalog(), PrimerParams::default()).unwrap();
        let mut aligner = PairwiseAligner::default();
        let mut p = pair(b"CGCGCGCGCGCGCGCG", b"CCGGAATTAAA");

        assert_eq!(
            op.run(&mut p, &mut aligner),
            Err(PairFailure::Primer(PrimerFailure::Unrecognized))
        );
        assert!(!p.accepted);
    }

    #[test]
    fn variable_start_finds_shifted_primer() {
        let mut aligner = PairwiseAligner::default();
        let primer = Sequence::uniform(*b"GATTACA", 40);
        let read = Sequence::uniform(*b"NNGATTACATTTT", 30);

        let hit = find_primer(&mut aligner, &primer, &read, 3, 0).unwrap();
        assert_eq!((hit.offset, hit.end), (2, 9));
        assert!(find_primer(&mut aligner, &primer, &read, 0, 0).is_none());
    }

    #[test]
    fn reverse_primer_reorients_pair() {
        let params = PrimerParams {
            check_complement: true,
            ..Default::default()
        };
        let op = PrimerOp::new(&catalog(), params).unwrap();
        let rev = ReversePrimerOp::new(&catalog(), params);
        let mut aligner = PairwiseAligner::default();
        let mut p = pair(b"ACACACACGGGCCCAAA", b"TTTTGGGGCCCTTT");

        assert_eq!(op.run(&mut p, &mut aligner), Ok(()));
        assert!(p.found_in_reverse);
        assert_eq!(p.name, "p_Comp");
        assert_eq!(p.target.as_deref(), Some("T2"));
        assert_eq!(p.r1.bases(), b"TTTTGGGGCCCTTT");
        assert_eq!(p.r2.bases(), b"GGGCCCAAA");

        assert_eq!(rev.run(&mut p, &mut aligner), Ok(()));
        assert_eq!(p.r1.bases(), b"CCCTTT");
    }

    #[test]
    fn failed_reverse_confirmation_renames() {
        let rev = ReversePrimerOp::new(&catalog(), PrimerParams::default());
        let mut aligner = PairwiseAligner::default();

        let mut good = pair(b"CCGTACGTT", b"CCGGAATTAAACCC");
        good.target = Some("T1".to_owned());
        assert_eq!(rev.run(&mut good, &mut aligner), Ok(()));
        assert_eq!(good.r2.bases(), b"AAACCC");

        let mut bad = pair(b"CCGTACGTT", b"GTGTGTGTGTGTGT");
        bad.target = Some("T1".to_owned());
        assert_eq!(
            rev.run(&mut bad, &mut aligner),
            Err(PairFailure::Primer(PrimerFailure::ReverseConfirmFailed))
        );
        assert_eq!(bad.name, "p_badReverse");
    }

    #[test]
    fn no_forward_primer_needs_one_target() {
        let params = PrimerParams {
            no_forward_primer: true,
            ..Default::default()
        };
        assert!(matches!(
            PrimerOp::new(&catalog(), params),
            Err(Error::NoForwardPrimerWithMultipleTargets { count: 2, .. })
        ));

        let mut c = Catalog::new();
        c.add_target("T1", "GATTACA", None).unwrap();
        let op = PrimerOp::new(&c, params).unwrap();
        let mut aligner = PairwiseAligner::default();
        let mut p = pair(b"CGCGCG", b"CGCG");
        assert_eq!(op.run(&mut p, &mut aligner), Ok(()));
        assert_eq!(p.target.as_deref(), Some("T1"));
        assert_eq!(p.r1.bases(), b"CGCGCG");
    }
}
