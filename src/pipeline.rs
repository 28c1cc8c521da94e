//! Stages that classify read pairs, and the two passes that drive them.
//!
//! The [`Splitter`] runs the first pass: it drops small fragments and splits pairs by barcode,
//! collecting mate lengths for the default length windows. The [`Demultiplexer`] runs the
//! second pass over each barcode's pairs: primer detection, length filtering, reverse primer
//! confirmation, and optionally overlap merging. Each pair ends in exactly one [`Bucket`].

mod barcode_op;
pub use barcode_op::*;

mod primer_op;
pub use primer_op::*;

mod length_op;
pub use length_op::*;

mod overlap_op;
pub use overlap_op::*;

mod consensus_op;
pub use consensus_op::*;

mod input_fastq_op;
pub use input_fastq_op::*;

mod output_fastq_op;
pub use output_fastq_op::*;

use rustc_hash::{FxHashMap, FxHashSet};

use std::collections::BTreeMap;
use std::fmt;

use crate::align::{Aligner, PairwiseAligner};
use crate::errors::{Error, Result};
use crate::params::ExtractorParams;
use crate::patterns::Catalog;
use crate::read::{LowerCaseBases, Mate, SequencePair};
use crate::results::ProcessedResults;

/// Names containing this mark reads from the complement strand. Renaming keeps it.
pub const COMP_MARK: &str = "_Comp";

pub type PairResult = std::result::Result<(), PairFailure>;

/// Why a pair was filtered off before overlap merging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PairFailure {
    SmallFragment,
    Barcode(BarcodeFailure),
    Primer(PrimerFailure),
    Length {
        mate: Mate,
        check: LengthCheck,
        kind: LengthFailureKind,
    },
}

impl fmt::Display for PairFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PairFailure::SmallFragment => write!(f, "smallFragment"),
            PairFailure::Barcode(b) => write!(f, "barcode:{b}"),
            PairFailure::Primer(p) => write!(f, "primer:{p}"),
            PairFailure::Length { mate, check, kind } => write!(f, "length:{mate}:{check}:{kind}"),
        }
    }
}

/// Terminal outcome of one pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PairOutcome {
    Failed(PairFailure),
    /// Passed every filter, merging was not attempted.
    Good,
    Merged(MergedKind),
    OverlapFail,
    OverhangFail,
}

/// One stage of the pipeline.
pub trait PairOp {
    /// Classify or transform a pair. An `Err` ends the pair in a failure bucket.
    fn run(&self, pair: &mut SequencePair, aligner: &mut dyn Aligner) -> PairResult;

    fn name(&self) -> &'static str;
}

pub struct LowerCaseOp {
    policy: LowerCaseBases,
}

impl LowerCaseOp {
    const NAME: &'static str = "LowerCaseOp";

    /// Keep, uppercase, or remove lowercase bases in both mates.
    pub fn new(policy: LowerCaseBases) -> Self {
        Self { policy }
    }
}

impl PairOp for LowerCaseOp {
    fn run(&self, pair: &mut SequencePair, _aligner: &mut dyn Aligner) -> PairResult {
        if self.policy != LowerCaseBases::Keep {
            pair.r1 = pair.r1.with_lower_case(self.policy);
            pair.r2 = pair.r2.with_lower_case(self.policy);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }
}

pub struct SmallFragmentOp {
    cutoff: usize,
}

impl SmallFragmentOp {
    const NAME: &'static str = "SmallFragmentOp";

    /// Fail pairs where either mate is shorter than `cutoff`.
    pub fn new(cutoff: usize) -> Self {
        Self { cutoff }
    }
}

impl PairOp for SmallFragmentOp {
    fn run(&self, pair: &mut SequencePair, _aligner: &mut dyn Aligner) -> PairResult {
        if pair.min_len() < self.cutoff {
            pair.reject(PairFailure::SmallFragment.to_string());
            return Err(PairFailure::SmallFragment);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }
}

/// Builds sample names from a target and a barcode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleNaming {
    pub multiplexed: bool,
    pub sample_name: Option<String>,
}

impl SampleNaming {
    /// `target + barcode` when multiplexed, otherwise `target + sample_name`.
    pub fn full_name(&self, target: &str, barcode: &str) -> String {
        if self.multiplexed {
            format!("{target}{barcode}")
        } else {
            format!("{target}{}", self.sample_name.as_deref().unwrap_or(""))
        }
    }
}

/// Renames good pairs to `sample.NNNN`.
#[derive(Debug, Clone, Default)]
struct Renamer {
    counts: FxHashMap<String, usize>,
    width: usize,
    key: Vec<(String, String)>,
}

impl Renamer {
    fn rename(&mut self, pair: &mut SequencePair, sample: &str) {
        let n = self.counts.entry(sample.to_owned()).or_default();
        let comp = pair.name.contains(COMP_MARK);
        let old = pair.name.replace(COMP_MARK, "");

        let mut new = format!("{sample}.{:0width$}", *n, width = self.width);
        if comp {
            new.push_str(COMP_MARK);
        }
        *n += 1;

        self.key.push((old, new.clone()));
        pair.name = new;
    }
}

fn split_failure_bucket(failure: PairFailure) -> Bucket {
    match failure {
        PairFailure::Barcode(b) => Bucket::UnrecognizedBarcode(b),
        _ => Bucket::SmallFragments,
    }
}

/// First pass results.
#[derive(Debug, Clone, Default)]
pub struct SplitResults {
    /// Pairs that ended in the first pass.
    pub results: ProcessedResults,
    /// Pairs accepted per barcode.
    pub barcode_counts: BTreeMap<String, usize>,
    pub lengths: ReadLengths,
}

impl SplitResults {
    pub fn accepted(&self) -> usize {
        self.barcode_counts.values().sum()
    }
}

/// Lowercase handling, small fragment removal, and barcode assignment.
pub struct Splitter {
    stages: Vec<Box<dyn PairOp>>,
    aligner: Box<dyn Aligner>,
}

impl Splitter {
    pub fn new(catalog: &Catalog, params: &ExtractorParams) -> Result<Self> {
        let barcode_op = if params.multiplex {
            if !catalog.contains_barcodes() {
                return Err(Error::NoBarcodes);
            }
            BarcodeOp::new(catalog.barcodes(), params.barcode_errors)
        } else {
            BarcodeOp::single_sample()
        };

        Ok(Self {
            stages: vec![
                Box::new(LowerCaseOp::new(params.lower_case)),
                Box::new(SmallFragmentOp::new(params.small_fragment_cutoff)),
                Box::new(barcode_op),
            ],
            aligner: Box::new(PairwiseAligner::new(params.scoring)),
        })
    }

    /// Run the first pass stages on one pair. On success `pair.barcode` is set.
    pub fn split_pair(&mut self, pair: &mut SequencePair) -> PairResult {
        for stage in &self.stages {
            stage.run(pair, self.aligner.as_mut())?;
        }
        Ok(())
    }

    /// Split every pair of `source` into raw per-barcode buckets.
    pub fn split(
        &mut self,
        source: &mut dyn PairSource,
        sink: &mut dyn BucketSink,
    ) -> Result<SplitResults> {
        let mut res = SplitResults::default();

        while let Some(mut pair) = source.next_pair()? {
            match self.split_pair(&mut pair) {
                Ok(()) => {
                    let barcode = pair.barcode.clone().unwrap_or_default();
                    res.lengths.push(&pair);
                    sink.write_pair(&Bucket::RawSplit { barcode: barcode.clone() }, &pair)?;
                    *res.barcode_counts.entry(barcode).or_default() += 1;
                }
                Err(failure) => {
                    sink.write_pair(&split_failure_bucket(failure), &pair)?;
                    res.results.record(PairOutcome::Failed(failure), None);
                }
            }
        }

        sink.finish()?;
        log::info!(
            "Split {} pairs: {} accepted, {} filtered off",
            res.results.total + res.accepted(),
            res.accepted(),
            res.results.total
        );

        Ok(res)
    }
}

/// Second pass: primer detection, length filtering, reverse primer confirmation, and
/// optionally overlap merging.
pub struct Demultiplexer {
    splitter: Splitter,
    stages: Vec<Box<dyn PairOp>>,
    overlap: Option<OverlapOp>,
    no_overlap_targets: FxHashSet<String>,
    consensus: Box<dyn ConsensusBuilder>,
    aligner: Box<dyn Aligner>,
    naming: SampleNaming,
    write_overhangs: bool,
    renamer: Option<Renamer>,
}

impl Demultiplexer {
    pub fn new(catalog: &Catalog, params: &ExtractorParams, windows: LengthWindows) -> Result<Self> {
        let mut stages: Vec<Box<dyn PairOp>> = vec![
            Box::new(PrimerOp::new(catalog, params.primers)?),
            Box::new(LengthOp::new(windows.clone(), LengthCheck::First)),
        ];
        if !params.primers.no_reverse_primer {
            stages.push(Box::new(ReversePrimerOp::new(catalog, params.primers)));
        }
        stages.push(Box::new(LengthOp::new(windows, LengthCheck::Second)));

        log::debug!(
            "Pair stages: {}",
            stages.iter().map(|s| s.name()).collect::<Vec<_>>().join(" -> ")
        );

        let no_overlap_targets = catalog
            .targets()
            .iter()
            .filter(|t| t.overlap_status == Some(OverlapStatus::NoOverlap))
            .map(|t| t.name.clone())
            .collect();

        Ok(Self {
            splitter: Splitter::new(catalog, params)?,
            stages,
            overlap: params.merge.then(|| OverlapOp::new(params.overlap)),
            no_overlap_targets,
            consensus: Box::new(QualityConsensus),
            aligner: Box::new(PairwiseAligner::new(params.scoring)),
            naming: SampleNaming {
                multiplexed: params.multiplex,
                sample_name: params.sample_name.clone(),
            },
            write_overhangs: params.write_overhangs,
            renamer: params.rename.then(Renamer::default),
        })
    }

    pub fn with_aligner(mut self, aligner: impl Aligner + 'static) -> Self {
        self.aligner = Box::new(aligner);
        self
    }

    pub fn with_consensus(mut self, consensus: impl ConsensusBuilder + 'static) -> Self {
        self.consensus = Box::new(consensus);
        self
    }

    /// Number of pairs expected in the next partition, which sets the zero padding of renamed
    /// pairs.
    pub fn set_expected_pairs(&mut self, n: usize) {
        if let Some(r) = &mut self.renamer {
            r.width = n.max(1).to_string().len();
        }
    }

    /// Original and new name of every renamed pair.
    pub fn rename_key(&self) -> &[(String, String)] {
        self.renamer
            .as_ref()
            .map(|r| r.key.as_slice())
            .unwrap_or(&[])
    }

    pub fn sample_naming(&self) -> &SampleNaming {
        &self.naming
    }

    /// Drive one barcode-assigned pair to its terminal bucket.
    pub fn process_pair(
        &mut self,
        mut pair: SequencePair,
        results: &mut ProcessedResults,
        sink: &mut dyn BucketSink,
    ) -> Result<PairOutcome> {
        let barcode = pair
            .barcode
            .clone()
            .unwrap_or_else(|| ALL_SAMPLES.to_owned());

        for stage in &self.stages {
            let Err(failure) = stage.run(&mut pair, self.aligner.as_mut()) else {
                continue;
            };
            log::trace!("{} failed {}: {failure}", stage.name(), pair.name);

            let outcome = PairOutcome::Failed(failure);
            match pair.target.as_deref() {
                Some(target) if failure != PairFailure::Primer(PrimerFailure::Unrecognized) => {
                    let sample = self.naming.full_name(target, &barcode);
                    sink.write_pair(&Bucket::Bad { sample: sample.clone() }, &pair)?;
                    results.record(outcome, Some(&sample));
                }
                _ => {
                    let bucket = Bucket::UnrecognizedPrimer {
                        barcode: barcode.clone(),
                    };
                    sink.write_pair(&bucket, &pair)?;
                    results.record(outcome, None);
                    if failure == PairFailure::Primer(PrimerFailure::Unrecognized) {
                        results.count_failed_primer(&barcode, pair.name.contains(COMP_MARK));
                    }
                }
            }
            return Ok(outcome);
        }

        let target = pair.target.clone().unwrap_or_default();
        let sample = self.naming.full_name(&target, &barcode);
        if let Some(r) = &mut self.renamer {
            r.rename(&mut pair, &sample);
        }

        let outcome = match &self.overlap {
            Some(op) if !self.no_overlap_targets.contains(&target) => {
                let (r1, rc_r2) = op.prepare(&pair);
                let (call, aln) = op.align(&r1, &rc_r2, self.aligner.as_mut());

                match call {
                    OverlapCall::Merge { status, .. } => {
                        let merged = self.consensus.build(&r1, &rc_r2, &aln, &call);
                        let kind = if call.is_perfect() {
                            MergedKind::PerfectOverlap
                        } else if status == OverlapStatus::R1EndsInR2 {
                            MergedKind::R1EndsInR2
                        } else {
                            MergedKind::R1BeginsInR2
                        };
                        let bucket = Bucket::Merged {
                            sample: sample.clone(),
                            kind,
                        };
                        sink.write_merged(&bucket, &pair.name, &merged)?;
                        PairOutcome::Merged(kind)
                    }
                    OverlapCall::NoOverlap => {
                        let bucket = Bucket::NotCombined {
                            sample: sample.clone(),
                        };
                        sink.write_pair(&bucket, &pair)?;
                        PairOutcome::OverlapFail
                    }
                    OverlapCall::Overhang { front, back, .. } => {
                        log::trace!("{} overhangs {front:?} {back:?}", pair.name);
                        let bucket = if self.write_overhangs {
                            Bucket::Overhangs {
                                sample: sample.clone(),
                            }
                        } else {
                            Bucket::NotCombined {
                                sample: sample.clone(),
                            }
                        };
                        sink.write_pair(&bucket, &pair)?;
                        PairOutcome::OverhangFail
                    }
                }
            }
            _ => {
                sink.write_pair(&Bucket::Good { sample: sample.clone() }, &pair)?;
                PairOutcome::Good
            }
        };

        results.record(outcome, Some(&sample));
        Ok(outcome)
    }

    /// Process every pair of `source`. The pairs must already carry their barcode.
    pub fn run(
        &mut self,
        source: &mut dyn PairSource,
        sink: &mut dyn BucketSink,
    ) -> Result<ProcessedResults> {
        let mut results = ProcessedResults::default();

        while let Some(pair) = source.next_pair()? {
            self.process_pair(pair, &mut results, sink)?;
        }

        sink.finish()?;
        Ok(results)
    }

    /// Drive a raw pair through barcode assignment and then every other stage. Only valid
    /// when the length windows were resolved without a first pass.
    pub fn process_raw_pair(
        &mut self,
        mut pair: SequencePair,
        results: &mut ProcessedResults,
        sink: &mut dyn BucketSink,
    ) -> Result<PairOutcome> {
        if let Err(failure) = self.splitter.split_pair(&mut pair) {
            sink.write_pair(&split_failure_bucket(failure), &pair)?;
            let outcome = PairOutcome::Failed(failure);
            results.record(outcome, None);
            return Ok(outcome);
        }

        self.process_pair(pair, results, sink)
    }

    /// Process every raw pair of `source` in a single pass.
    pub fn run_raw(
        &mut self,
        source: &mut dyn PairSource,
        sink: &mut dyn BucketSink,
    ) -> Result<ProcessedResults> {
        let mut results = ProcessedResults::default();

        while let Some(pair) = source.next_pair()? {
            self.process_raw_pair(pair, &mut results, sink)?;
        }

        sink.finish()?;
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;

    use crate::align::Alignment;
    use crate::patterns::LenCutOffs;
    use crate::read::Sequence;
    use crate::results::FailedPrimerCounts;

    fn catalog() -> Catalog {
        let mut c = Catalog::new();
        c.add_target("T1", "GATTACA", Some(b"CCGGAATT".as_slice()))
            .unwrap();
        c.add_barcode("BC1", "ACGT").unwrap();
        c.add_barcode("BC2", "TGCA").unwrap();
        c
    }

    fn params() -> ExtractorParams {
        ExtractorParams {
            multiplex: true,
            small_fragment_cutoff: 5,
            ..Default::default()
        }
    }

    fn windows() -> LengthWindows {
        LengthWindows::uniform(LenCutOffs {
            r1: LengthWindow::new(5, 100),
            r2: LengthWindow::new(5, 100),
            mark_only: false,
        })
    }

    fn pair(name: &str, r1: &[u8], r2: &[u8]) -> SequencePair {
        SequencePair::new(
            name,
            Sequence::uniform(r1.to_owned(), 30),
            Sequence::uniform(r2.to_owned(), 30),
        )
    }

    fn raw_pairs() -> Vec<SequencePair> {
        vec![
            pair("good", b"ACGTGATTACATTGGCCAAGG", b"CCGGAATTCCTTGGCCAA"),
            pair("nobc", b"GGGGGATTACATTGGCCAAGG", b"CCGGAATTCCTTGGCCAA"),
            pair("small", b"ACG", b"CCGGAATTCCTTGGCCAA"),
            pair("noprimer", b"ACGTCGCGCGCGCGCGCGCG", b"CCGGAATTCCTTGGCCAA"),
            pair("badrev", b"TGCAGATTACATTGGCCAAGG", b"GTGTGTGTGTGTGTGTGT"),
        ]
    }

    #[test]
    fn every_pair_ends_in_one_bucket() {
        let mut demux = Demultiplexer::new(&catalog(), &params(), windows()).unwrap();
        let mut source = VecPairSource::new(raw_pairs());
        let mut sink = MemoryBuckets::new();
        let res = demux.run_raw(&mut source, &mut sink).unwrap();

        assert_eq!(res.total, 5);
        assert_eq!(res.terminal_sum(), res.total);
        assert_eq!(sink.len(), 5);
        assert_eq!(res.good, 1);
        assert_eq!(
            res.failure_count(&PairFailure::Barcode(BarcodeFailure::NoMatch)),
            1
        );
        assert_eq!(res.failure_count(&PairFailure::SmallFragment), 1);
        assert_eq!(
            res.failure_count(&PairFailure::Primer(PrimerFailure::Unrecognized)),
            1
        );
        assert_eq!(
            res.failure_count(&PairFailure::Primer(PrimerFailure::ReverseConfirmFailed)),
            1
        );

        let good = sink.get(&Bucket::Good {
            sample: "T1BC1".to_owned(),
        });
        let BucketRecord::Pair(p) = &good[0] else {
            panic!("expected a pair");
        };
        assert_eq!(p.r1.bases(), b"TTGGCCAAGG");
        assert_eq!(p.r2.bases(), b"CCTTGGCCAA");

        let bad = sink.get(&Bucket::Bad {
            sample: "T1BC2".to_owned(),
        });
        let BucketRecord::Pair(p) = &bad[0] else {
            panic!("expected a pair");
        };
        assert_eq!(p.name, "badrev_badReverse");
    }

    #[test]
    fn two_passes_match_a_single_pass() {
        let mut splitter = Splitter::new(&catalog(), &params()).unwrap();
        let mut split_sink = MemoryBuckets::new();
        let split = splitter
            .split(&mut VecPairSource::new(raw_pairs()), &mut split_sink)
            .unwrap();
        assert_eq!(split.accepted(), 3);
        assert_eq!(split.lengths.r1.len(), 3);

        let mut demux = Demultiplexer::new(&catalog(), &params(), windows()).unwrap();
        let mut merged = split.results.clone();
        let mut sink = MemoryBuckets::new();

        for (bucket, records) in split_sink.buckets() {
            if !matches!(bucket, Bucket::RawSplit { .. }) {
                continue;
            }
            let pairs = records.iter().filter_map(|r| match r {
                BucketRecord::Pair(p) => Some(p.clone()),
                BucketRecord::Merged { .. } => None,
            });
            let res = demux.run(&mut VecPairSource::new(pairs), &mut sink).unwrap();
            merged.merge(res);
        }

        let mut single = Demultiplexer::new(&catalog(), &params(), windows()).unwrap();
        let single_res = single
            .run_raw(&mut VecPairSource::new(raw_pairs()), &mut MemoryBuckets::new())
            .unwrap();

        assert_eq!(merged, single_res);
    }

    #[test]
    fn merges_overlapping_pairs() {
        let mut c = Catalog::new();
        c.add_target("T1", "GATTACA", None).unwrap();
        let p = ExtractorParams {
            merge: true,
            overlap: OverlapParams {
                min_overlap: 3,
                ..Default::default()
            },
            ..Default::default()
        };
        let mut demux = Demultiplexer::new(&c, &p, windows()).unwrap();
        let mut sink = MemoryBuckets::new();
        let mut res = ProcessedResults::default();

        // R2 is the reverse complement of CCCGGGTTT
        let mut pr = pair("m", b"GATTACAAAACCCGGG", b"AAACCCGGG");
        pr.barcode = Some(ALL_SAMPLES.to_owned());
        let outcome = demux.process_pair(pr, &mut res, &mut sink).unwrap();

        assert_eq!(outcome, PairOutcome::Merged(MergedKind::R1EndsInR2));
        assert_eq!(res.r1_ends_in_r2_combined, 1);
        let merged = sink.get(&Bucket::Merged {
            sample: "T1".to_owned(),
            kind: MergedKind::R1EndsInR2,
        });
        let BucketRecord::Merged { seq, .. } = &merged[0] else {
            panic!("expected a merged read");
        };
        assert_eq!(seq.bases(), b"AAACCCGGGTTT");
    }

    // every case carries the insert TCAGGCATTC behind the forward primer
    #[rstest]
    // R1 reads into a TT adapter and R2 into a GG adapter
    #[case::read_through(
        b"GATTACATCAGGCATTCTT",
        b"GAATGCCTGAGG",
        false,
        PairOutcome::Merged(MergedKind::R1BeginsInR2),
        Bucket::Merged { sample: "T1".to_owned(), kind: MergedKind::R1BeginsInR2 }
    )]
    // R2 lies inside R1, leaving R1 bases at both ends
    #[case::nested_kept_apart(
        b"GATTACAAATCAGGCATTCGG",
        b"GAATGCCTGA",
        true,
        PairOutcome::OverhangFail,
        Bucket::Overhangs { sample: "T1".to_owned() }
    )]
    #[case::nested_not_combined(
        b"GATTACAAATCAGGCATTCGG",
        b"GAATGCCTGA",
        false,
        PairOutcome::OverhangFail,
        Bucket::NotCombined { sample: "T1".to_owned() }
    )]
    fn overlap_routing(
        #[case] r1: &[u8],
        #[case] r2: &[u8],
        #[case] write_overhangs: bool,
        #[case] expected: PairOutcome,
        #[case] bucket: Bucket,
    ) {
        let mut c = Catalog::new();
        c.add_target("T1", "GATTACA", None).unwrap();
        let p = ExtractorParams {
            merge: true,
            write_overhangs,
            ..Default::default()
        };
        let mut demux = Demultiplexer::new(&c, &p, windows()).unwrap();
        let mut sink = MemoryBuckets::new();
        let mut res = ProcessedResults::default();

        let mut pr = pair("o", r1, r2);
        pr.barcode = Some(ALL_SAMPLES.to_owned());
        let outcome = demux.process_pair(pr, &mut res, &mut sink).unwrap();

        assert_eq!(outcome, expected);
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.get(&bucket).len(), 1);
        assert_eq!(res.terminal_sum(), 1);

        match outcome {
            PairOutcome::Merged(_) => {
                assert_eq!(res.r1_begins_in_r2_combined, 1);
                assert_eq!(res.samples["T1"].merged, 1);
                let BucketRecord::Merged { seq, .. } = &sink.get(&bucket)[0] else {
                    panic!("expected a merged read");
                };
                // adapter overhangs are left out
                assert_eq!(seq.bases(), b"TCAGGCATTC");
            }
            _ => {
                assert_eq!(res.overhang_fail, 1);
                assert_eq!(res.overlap_fail, 0);
                assert_eq!(res.samples["T1"].overhang_fail, 1);
            }
        }
    }

    #[test]
    fn short_r2_fails_barcodes_read_at_both_ends() {
        let mut c = catalog();
        c.set_barcodes_end_rev_comp(true);
        let p = ExtractorParams {
            small_fragment_cutoff: 3,
            ..params()
        };
        let mut demux = Demultiplexer::new(&c, &p, windows()).unwrap();
        let mut sink = MemoryBuckets::new();
        let mut res = ProcessedResults::default();

        let pr = pair("short", b"ACGTGATTACATTGGCCAAGG", b"ACG");
        let outcome = demux.process_raw_pair(pr, &mut res, &mut sink).unwrap();

        let failure = PairFailure::Barcode(BarcodeFailure::TooShort);
        assert_eq!(outcome, PairOutcome::Failed(failure));
        assert_eq!(res.failure_count(&failure), 1);
        assert_eq!(
            sink.get(&Bucket::UnrecognizedBarcode(BarcodeFailure::TooShort))
                .len(),
            1
        );
    }

    #[test]
    fn failed_primers_are_counted_by_strand() {
        let mut demux = Demultiplexer::new(&catalog(), &params(), windows()).unwrap();
        let mut sink = MemoryBuckets::new();
        let mut res = ProcessedResults::default();

        for name in ["fwd", "rev_Comp"] {
            let mut pr = pair(name, b"CGCGCGCGCGCGCGCGCG", b"CCGGAATTCCTTGGCCAA");
            pr.barcode = Some("BC1".to_owned());
            demux.process_pair(pr, &mut res, &mut sink).unwrap();
        }

        assert_eq!(res.failed_forward(), 2);
        assert_eq!(
            res.unrecognized_primer["BC1"],
            FailedPrimerCounts {
                in_forward: 1,
                in_reverse: 1,
            }
        );
    }

    #[test]
    fn no_overlap_hint_skips_merging() {
        let mut c = Catalog::new();
        c.add_target("T1", "GATTACA", None).unwrap();
        c.add_overlap_statuses([("T1".to_owned(), OverlapStatus::NoOverlap)])
            .unwrap();
        let p = ExtractorParams {
            merge: true,
            ..Default::default()
        };
        let mut demux = Demultiplexer::new(&c, &p, windows()).unwrap();
        let mut res = ProcessedResults::default();
        let pr = pair("m", b"GATTACAAAACCCGGG", b"AAACCCGGG");

        let outcome = demux
            .process_pair(pr, &mut res, &mut MemoryBuckets::new())
            .unwrap();
        assert_eq!(outcome, PairOutcome::Good);
    }

    #[test]
    fn custom_consensus_and_renaming() {
        let mut c = Catalog::new();
        c.add_target("T1", "GATTACA", None).unwrap();
        let p = ExtractorParams {
            merge: true,
            rename: true,
            sample_name: Some("S1".to_owned()),
            overlap: OverlapParams {
                min_overlap: 3,
                ..Default::default()
            },
            ..Default::default()
        };
        let r1_only = |r1: &Sequence, _: &Sequence, _: &Alignment, _: &OverlapCall| r1.clone();
        let mut demux = Demultiplexer::new(&c, &p, windows())
            .unwrap()
            .with_consensus(r1_only);
        demux.set_expected_pairs(12);
        let mut sink = MemoryBuckets::new();
        let mut res = ProcessedResults::default();

        let pr = pair("read_Comp", b"GATTACAAAACCCGGG", b"AAACCCGGG");
        demux.process_pair(pr, &mut res, &mut sink).unwrap();

        let (_, records) = sink.buckets().next().unwrap();
        let BucketRecord::Merged { name, seq } = &records[0] else {
            panic!("expected a merged read");
        };
        assert_eq!(name, "T1S1.00_Comp");
        assert_eq!(seq.bases(), b"AAACCCGGG");
        assert_eq!(
            demux.rename_key(),
            &[("read".to_owned(), "T1S1.00_Comp".to_owned())]
        );
    }
}
