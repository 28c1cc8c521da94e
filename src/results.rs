use csv::WriterBuilder;
use serde::Serialize;

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::errors::*;
use crate::pipeline::{BarcodeFailure, MergedKind, PairFailure, PairOutcome, PrimerFailure};

pub const RESULTS_JSON: &str = "processedResults.json";
pub const EXTRACTION_STATS: &str = "extractionStats.tab.txt";
pub const EXTRACTION_PROFILE: &str = "extractionProfile.tab.txt";
pub const FAILED_BARCODE: &str = "failedBarcode.tab.txt";
pub const FAILED_FORWARD: &str = "failedForward.tab.txt";

/// Outcomes of the pairs of one sample (`target + barcode`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleCounts {
    pub good: usize,
    pub merged: usize,
    pub overlap_fail: usize,
    pub overhang_fail: usize,
    pub failed_length: usize,
    pub failed_reverse: usize,
}

impl SampleCounts {
    /// Pairs that passed every filter.
    pub fn extracted(&self) -> usize {
        self.good + self.merged + self.overlap_fail + self.overhang_fail
    }

    pub fn total(&self) -> usize {
        self.extracted() + self.failed_length + self.failed_reverse
    }

    fn merge(&mut self, other: &SampleCounts) {
        self.good += other.good;
        self.merged += other.merged;
        self.overlap_fail += other.overlap_fail;
        self.overhang_fail += other.overhang_fail;
        self.failed_length += other.failed_length;
        self.failed_reverse += other.failed_reverse;
    }
}

/// Unrecognized primers of one barcode, by the strand the pair was read from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedPrimerCounts {
    pub in_forward: usize,
    /// Pairs whose name carries the complement mark.
    pub in_reverse: usize,
}

impl FailedPrimerCounts {
    pub fn total(&self) -> usize {
        self.in_forward + self.in_reverse
    }
}

/// Counters of a run or of one partition of it.
///
/// Every recorded pair increments `total` and exactly one terminal counter: `good`, one of the
/// merged counters, `overlap_fail`, `overhang_fail`, or its entry in `failures`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessedResults {
    pub total: usize,
    pub good: usize,
    pub perfect_overlap_combined: usize,
    pub r1_ends_in_r2_combined: usize,
    pub r1_begins_in_r2_combined: usize,
    pub overlap_fail: usize,
    pub overhang_fail: usize,
    pub failures: BTreeMap<PairFailure, usize>,
    pub samples: BTreeMap<String, SampleCounts>,
    /// Pairs with an unrecognized primer, per barcode.
    pub unrecognized_primer: BTreeMap<String, FailedPrimerCounts>,
}

impl ProcessedResults {
    pub fn record(&mut self, outcome: PairOutcome, sample: Option<&str>) {
        self.total += 1;

        let mut sample_counts = sample.map(|s| self.samples.entry(s.to_owned()).or_default());

        match outcome {
            PairOutcome::Failed(f) => {
                *self.failures.entry(f).or_default() += 1;

                match (f, sample_counts) {
                    (PairFailure::Primer(PrimerFailure::ReverseConfirmFailed), Some(c)) => {
                        c.failed_reverse += 1
                    }
                    (PairFailure::Length { .. }, Some(c)) => c.failed_length += 1,
                    _ => (),
                }
            }
            PairOutcome::Good => {
                self.good += 1;
                if let Some(c) = &mut sample_counts {
                    c.good += 1;
                }
            }
            PairOutcome::Merged(kind) => {
                match kind {
                    MergedKind::PerfectOverlap => self.perfect_overlap_combined += 1,
                    MergedKind::R1EndsInR2 => self.r1_ends_in_r2_combined += 1,
                    MergedKind::R1BeginsInR2 => self.r1_begins_in_r2_combined += 1,
                }
                if let Some(c) = &mut sample_counts {
                    c.merged += 1;
                }
            }
            PairOutcome::OverlapFail => {
                self.overlap_fail += 1;
                if let Some(c) = &mut sample_counts {
                    c.overlap_fail += 1;
                }
            }
            PairOutcome::OverhangFail => {
                self.overhang_fail += 1;
                if let Some(c) = &mut sample_counts {
                    c.overhang_fail += 1;
                }
            }
        }
    }

    /// Count an unrecognized primer against its barcode. Only bookkeeping, the pair itself is
    /// counted by [`ProcessedResults::record`].
    pub fn count_failed_primer(&mut self, barcode: &str, in_reverse: bool) {
        let c = self.unrecognized_primer.entry(barcode.to_owned()).or_default();
        if in_reverse {
            c.in_reverse += 1;
        } else {
            c.in_forward += 1;
        }
    }

    /// Add the counters of an independent partition.
    pub fn merge(&mut self, other: ProcessedResults) {
        self.total += other.total;
        self.good += other.good;
        self.perfect_overlap_combined += other.perfect_overlap_combined;
        self.r1_ends_in_r2_combined += other.r1_ends_in_r2_combined;
        self.r1_begins_in_r2_combined += other.r1_begins_in_r2_combined;
        self.overlap_fail += other.overlap_fail;
        self.overhang_fail += other.overhang_fail;

        for (f, n) in other.failures {
            *self.failures.entry(f).or_default() += n;
        }
        for (s, c) in other.samples {
            self.samples.entry(s).or_default().merge(&c);
        }
        for (b, c) in other.unrecognized_primer {
            let e = self.unrecognized_primer.entry(b).or_default();
            e.in_forward += c.in_forward;
            e.in_reverse += c.in_reverse;
        }
    }

    pub fn merged(&self) -> usize {
        self.perfect_overlap_combined + self.r1_ends_in_r2_combined + self.r1_begins_in_r2_combined
    }

    /// Sum of every terminal counter. Equals `total`.
    pub fn terminal_sum(&self) -> usize {
        self.good
            + self.merged()
            + self.overlap_fail
            + self.overhang_fail
            + self.failures.values().sum::<usize>()
    }

    pub fn failure_count(&self, failure: &PairFailure) -> usize {
        self.failures.get(failure).copied().unwrap_or(0)
    }

    fn count_where(&self, pred: impl Fn(&PairFailure) -> bool) -> usize {
        self.failures
            .iter()
            .filter(|(f, _)| pred(f))
            .map(|(_, n)| n)
            .sum()
    }

    pub fn barcode_failures(&self) -> BTreeMap<BarcodeFailure, usize> {
        self.failures
            .iter()
            .filter_map(|(f, &n)| match f {
                PairFailure::Barcode(b) => Some((*b, n)),
                _ => None,
            })
            .collect()
    }

    pub fn not_matched_barcodes(&self) -> usize {
        self.count_where(|f| matches!(f, PairFailure::Barcode(_)))
    }

    pub fn small_fragments(&self) -> usize {
        self.failure_count(&PairFailure::SmallFragment)
    }

    pub fn failed_forward(&self) -> usize {
        self.failure_count(&PairFailure::Primer(PrimerFailure::Unrecognized))
    }

    /// Length and reverse primer failures.
    pub fn failed_filtering(&self) -> usize {
        self.count_where(|f| {
            matches!(
                f,
                PairFailure::Length { .. } | PairFailure::Primer(PrimerFailure::ReverseConfirmFailed)
            )
        })
    }

    /// Pairs that passed every filter.
    pub fn used(&self) -> usize {
        self.good + self.merged() + self.overlap_fail + self.overhang_fail
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| file_err(path, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &ResultsView::from(self))
            .map_err(|e| file_err(path, e))?;
        writer.flush().map_err(|e| file_err(path, e))
    }

    pub fn write_extraction_stats(
        &self,
        path: impl AsRef<Path>,
        small_fragment_cutoff: usize,
    ) -> Result<()> {
        let small = format!("SmallFragments(len<{small_fragment_cutoff})");
        let header = [
            "TotalReads",
            "ReadsNotMatchedBarcodes",
            small.as_str(),
            "failedForwardPrimer",
            "failedQualityFiltering",
            "used",
            "merged",
        ];
        let row = [
            self.total,
            self.not_matched_barcodes(),
            self.small_fragments(),
            self.failed_forward(),
            self.failed_filtering(),
            self.used(),
            self.merged(),
        ]
        .map(|n| n.to_string());

        write_table(path.as_ref(), &header, [row.to_vec()])
    }

    /// Per-sample breakdown, one row per sample.
    pub fn write_extraction_profile(&self, path: impl AsRef<Path>) -> Result<()> {
        let header = [
            "name",
            "totalReadsExtracted",
            "good",
            "merged",
            "notCombined",
            "overhangs",
            "failedLength",
            "failedReverse",
        ];
        let rows = self.samples.iter().map(|(name, c)| {
            let mut row = vec![name.clone()];
            row.extend(
                [
                    c.extracted(),
                    c.good,
                    c.merged,
                    c.overlap_fail,
                    c.overhang_fail,
                    c.failed_length,
                    c.failed_reverse,
                ]
                .map(|n| n.to_string()),
            );
            row
        });

        write_table(path.as_ref(), &header, rows)
    }

    /// Barcode failure reasons with their share of all barcode failures.
    pub fn write_failed_barcodes(&self, path: impl AsRef<Path>) -> Result<()> {
        let failures = self.barcode_failures();
        let total = self.not_matched_barcodes();
        let rows = BarcodeFailure::ALL.iter().map(|f| {
            let n = failures.get(f).copied().unwrap_or(0);
            vec![f.to_string(), percentage(n, total)]
        });

        write_table(path.as_ref(), &["Reason", "count"], rows)
    }

    /// Unrecognized primers per barcode, split by strand.
    pub fn write_failed_forward(&self, path: impl AsRef<Path>) -> Result<()> {
        let rows = self.unrecognized_primer.iter().map(|(barcode, c)| {
            let mut row = vec![barcode.clone()];
            row.extend([c.total(), c.in_forward, c.in_reverse].map(|n| n.to_string()));
            row
        });

        write_table(
            path.as_ref(),
            &["MidName", "totalFailed", "failedInFor", "failedInRev"],
            rows,
        )
    }

    /// Write the JSON and every tab summary into `dir`.
    pub fn write_summaries(
        &self,
        dir: impl AsRef<Path>,
        small_fragment_cutoff: usize,
        multiplex: bool,
    ) -> Result<()> {
        let dir = dir.as_ref();
        self.write_json(dir.join(RESULTS_JSON))?;
        self.write_extraction_stats(dir.join(EXTRACTION_STATS), small_fragment_cutoff)?;
        self.write_extraction_profile(dir.join(EXTRACTION_PROFILE))?;
        self.write_failed_forward(dir.join(FAILED_FORWARD))?;
        if multiplex {
            self.write_failed_barcodes(dir.join(FAILED_BARCODE))?;
        }
        Ok(())
    }
}

fn file_err(path: &Path, e: impl std::error::Error + Send + Sync + 'static) -> Error {
    Error::FileIo {
        file: path.to_owned(),
        source: Box::new(e),
    }
}

fn percentage(n: usize, total: usize) -> String {
    let pct = if total == 0 {
        0.0
    } else {
        n as f64 / total as f64 * 100.0
    };
    format!("{n}({pct:.2}%)")
}

/// Write a tab delimited table.
pub fn write_table<R, F>(path: &Path, header: &[&str], rows: R) -> Result<()>
where
    R: IntoIterator<Item = Vec<F>>,
    F: AsRef<[u8]>,
{
    let mut wtr = WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(path)
        .map_err(|e| file_err(path, e))?;

    wtr.write_record(header).map_err(|e| file_err(path, e))?;
    for row in rows {
        wtr.write_record(&row).map_err(|e| file_err(path, e))?;
    }
    wtr.flush().map_err(|e| file_err(path, e))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResultsView<'a> {
    total: usize,
    good: usize,
    perfect_overlap_combined: usize,
    r1_ends_in_r2_combined: usize,
    r1_begins_in_r2_combined: usize,
    overlap_fail: usize,
    overhang_fail: usize,
    failures: BTreeMap<String, usize>,
    samples: &'a BTreeMap<String, SampleCounts>,
    unrecognized_primer: &'a BTreeMap<String, FailedPrimerCounts>,
}

impl<'a> From<&'a ProcessedResults> for ResultsView<'a> {
    fn from(r: &'a ProcessedResults) -> Self {
        Self {
            total: r.total,
            good: r.good,
            perfect_overlap_combined: r.perfect_overlap_combined,
            r1_ends_in_r2_combined: r.r1_ends_in_r2_combined,
            r1_begins_in_r2_combined: r.r1_begins_in_r2_combined,
            overlap_fail: r.overlap_fail,
            overhang_fail: r.overhang_fail,
            failures: r.failures.iter().map(|(f, n)| (f.to_string(), *n)).collect(),
            samples: &r.samples,
            unrecognized_primer: &r.unrecognized_primer,
        }
    }
}
