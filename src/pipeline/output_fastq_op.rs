use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, IntoInnerError, Write};
use std::path::{Path, PathBuf};

use rustc_hash::{FxHashMap, FxHashSet};

use flate2::{write::GzEncoder, Compression};

use crate::errors::*;
use crate::pipeline::BarcodeFailure;
use crate::read::{Mate, Sequence, SequencePair};

/// Kind of merged read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MergedKind {
    PerfectOverlap,
    R1EndsInR2,
    R1BeginsInR2,
}

impl MergedKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MergedKind::PerfectOverlap => "perfectOverlap",
            MergedKind::R1EndsInR2 => "r1EndsInR2",
            MergedKind::R1BeginsInR2 => "r1BeginsInR2",
        }
    }
}

/// Logical destination of a read pair. Every pair is written to exactly one bucket.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Bucket {
    /// Barcode-accepted pairs, before primer matching.
    RawSplit { barcode: String },
    SmallFragments,
    UnrecognizedBarcode(BarcodeFailure),
    UnrecognizedPrimer { barcode: String },
    /// Length or reverse primer failures of one sample.
    Bad { sample: String },
    /// Pairs that passed every filter and were not merged.
    Good { sample: String },
    Merged { sample: String, kind: MergedKind },
    NotCombined { sample: String },
    Overhangs { sample: String },
}

impl Bucket {
    /// Path of the bucket relative to the output directory, without mate suffix or extension.
    pub fn stem(&self) -> PathBuf {
        match self {
            Bucket::RawSplit { barcode } => {
                ["unfilteredReads", "byBarcodes", barcode.as_str()].iter().collect()
            }
            Bucket::SmallFragments => ["filteredOff", "bad", "smallFragments"].iter().collect(),
            Bucket::UnrecognizedBarcode(f) => ["filteredOff", "bad"]
                .iter()
                .collect::<PathBuf>()
                .join(format!("unrecognizedBarcode_{f}")),
            Bucket::UnrecognizedPrimer { barcode } => {
                ["filteredOff", "unrecognizedPrimer", barcode.as_str()].iter().collect()
            }
            Bucket::Bad { sample } => ["filteredOff", "bad", sample.as_str()].iter().collect(),
            Bucket::Good { sample } => PathBuf::from(sample),
            Bucket::Merged { sample, kind } => PathBuf::from("merged")
                .join(format!("{sample}_{}", kind.as_str())),
            Bucket::NotCombined { sample } => {
                ["merged", "notCombined", sample.as_str()].iter().collect()
            }
            Bucket::Overhangs { sample } => {
                ["merged", "overhangs", sample.as_str()].iter().collect()
            }
        }
    }

    fn label(&self) -> String {
        self.stem().display().to_string()
    }
}

/// Destination for routed reads.
pub trait BucketSink {
    fn write_pair(&mut self, bucket: &Bucket, pair: &SequencePair) -> Result<()>;

    fn write_merged(&mut self, bucket: &Bucket, name: &str, seq: &Sequence) -> Result<()>;

    /// Flush every open bucket.
    fn finish(&mut self) -> Result<()>;
}

pub fn write_fastq_record(
    writer: &mut dyn Write,
    name: &str,
    seq: &Sequence,
) -> std::io::Result<()> {
    writer.write_all(b"@")?;
    writer.write_all(name.as_bytes())?;
    writer.write_all(b"\n")?;
    writer.write_all(seq.bases())?;
    writer.write_all(b"\n+\n")?;
    writer.write_all(&seq.phred33())?;
    writer.write_all(b"\n")
}

// one open bucket file
enum FastqFile {
    Plain(BufWriter<File>),
    Gzip(BufWriter<GzEncoder<File>>),
}

impl FastqFile {
    fn writer(&mut self) -> &mut dyn Write {
        match self {
            FastqFile::Plain(w) => w,
            FastqFile::Gzip(w) => w,
        }
    }

    // flush buffered records and write the gzip trailer
    fn close(self) -> io::Result<()> {
        match self {
            FastqFile::Plain(w) => {
                w.into_inner().map_err(IntoInnerError::into_error)?;
            }
            FastqFile::Gzip(w) => {
                w.into_inner().map_err(IntoInnerError::into_error)?.finish()?;
            }
        }
        Ok(())
    }
}

/// Writes buckets as fastq files under a directory, opening each file on its first write.
///
/// A file written again after [`BucketSink::finish`] is appended to, as a new gzip member when
/// compressing.
pub struct FastqBucketWriter {
    dir: PathBuf,
    gzip: bool,
    writers: FxHashMap<PathBuf, FastqFile>,
    created: FxHashSet<PathBuf>,
}

impl FastqBucketWriter {
    pub fn new(dir: impl Into<PathBuf>, gzip: bool) -> Self {
        Self {
            dir: dir.into(),
            gzip,
            writers: FxHashMap::default(),
            created: FxHashSet::default(),
        }
    }

    fn extension(&self) -> &'static str {
        if self.gzip {
            ".fastq.gz"
        } else {
            ".fastq"
        }
    }

    /// Files of a paired bucket.
    pub fn pair_paths(&self, bucket: &Bucket) -> [PathBuf; 2] {
        [Mate::R1, Mate::R2].map(|m| self.mate_path(bucket, Some(m)))
    }

    fn mate_path(&self, bucket: &Bucket, mate: Option<Mate>) -> PathBuf {
        let mut name = bucket.stem().into_os_string();
        if let Some(m) = mate {
            name.push(format!("_{m}"));
        }
        name.push(self.extension());
        self.dir.join(name)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    // get the writer for a file, creating the file and its directories on first use
    fn get_writer(&mut self, path: PathBuf) -> io::Result<&mut FastqFile> {
        use std::collections::hash_map::Entry::*;

        match self.writers.entry(path) {
            Occupied(e) => Ok(e.into_mut()),
            Vacant(e) => {
                if let Some(parent) = e.key().parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let reopen = !self.created.insert(e.key().clone());
                if !reopen {
                    log::debug!("Creating bucket file {}", e.key().display());
                }

                let file = OpenOptions::new()
                    .write(true)
                    .create(true)
                    .append(reopen)
                    .truncate(!reopen)
                    .open(e.key())?;
                let writer = if self.gzip {
                    FastqFile::Gzip(BufWriter::new(GzEncoder::new(file, Compression::default())))
                } else {
                    FastqFile::Plain(BufWriter::new(file))
                };

                Ok(e.insert(writer))
            }
        }
    }

    fn write(
        &mut self,
        bucket: &Bucket,
        mate: Option<Mate>,
        name: &str,
        seq: &Sequence,
    ) -> Result<()> {
        let path = self.mate_path(bucket, mate);
        let writer = self.get_writer(path).map_err(|e| Error::BucketIo {
            bucket: bucket.label(),
            source: Box::new(e),
        })?;

        write_fastq_record(writer.writer(), name, seq).map_err(|e| Error::BucketIo {
            bucket: bucket.label(),
            source: Box::new(e),
        })
    }
}

impl BucketSink for FastqBucketWriter {
    fn write_pair(&mut self, bucket: &Bucket, pair: &SequencePair) -> Result<()> {
        self.write(bucket, Some(Mate::R1), &pair.name, &pair.r1)?;
        self.write(bucket, Some(Mate::R2), &pair.name, &pair.r2)
    }

    fn write_merged(&mut self, bucket: &Bucket, name: &str, seq: &Sequence) -> Result<()> {
        self.write(bucket, None, name, seq)
    }

    fn finish(&mut self) -> Result<()> {
        let mut first_err = None;
        for (path, w) in self.writers.drain() {
            if let Err(e) = w.close() {
                first_err.get_or_insert(Error::FileIo {
                    file: path,
                    source: Box::new(e),
                });
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

impl Drop for FastqBucketWriter {
    fn drop(&mut self) {
        for (path, w) in self.writers.drain() {
            if let Err(e) = w.close() {
                log::error!("Failed to close {}: {e}", path.display());
            }
        }
    }
}

/// A record held by [`MemoryBuckets`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BucketRecord {
    Pair(SequencePair),
    Merged { name: String, seq: Sequence },
}

/// Keeps every routed record in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryBuckets {
    buckets: BTreeMap<Bucket, Vec<BucketRecord>>,
}

impl MemoryBuckets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, bucket: &Bucket) -> &[BucketRecord] {
        self.buckets.get(bucket).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn buckets(&self) -> impl Iterator<Item = (&Bucket, &[BucketRecord])> {
        self.buckets.iter().map(|(b, v)| (b, v.as_slice()))
    }

    /// Total records over all buckets.
    pub fn len(&self) -> usize {
        self.buckets.values().map(|v| v.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BucketSink for MemoryBuckets {
    fn write_pair(&mut self, bucket: &Bucket, pair: &SequencePair) -> Result<()> {
        self.buckets
            .entry(bucket.clone())
            .or_default()
            .push(BucketRecord::Pair(pair.clone()));
        Ok(())
    }

    fn write_merged(&mut self, bucket: &Bucket, name: &str, seq: &Sequence) -> Result<()> {
        self.buckets
            .entry(bucket.clone())
            .or_default()
            .push(BucketRecord::Merged {
                name: name.to_owned(),
                seq: seq.clone(),
            });
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_layout() {
        let w = FastqBucketWriter::new("out", false);
        let [r1, r2] = w.pair_paths(&Bucket::UnrecognizedBarcode(BarcodeFailure::NoMatch));
        assert_eq!(r1, Path::new("out/filteredOff/bad/unrecognizedBarcode_noMatch_R1.fastq"));
        assert_eq!(r2, Path::new("out/filteredOff/bad/unrecognizedBarcode_noMatch_R2.fastq"));

        let merged = Bucket::Merged {
            sample: "T1MID01".to_owned(),
            kind: MergedKind::R1EndsInR2,
        };
        assert_eq!(
            w.mate_path(&merged, None),
            Path::new("out/merged/T1MID01_r1EndsInR2.fastq")
        );

        let gz = FastqBucketWriter::new("out", true);
        let [r1, _] = gz.pair_paths(&Bucket::Good {
            sample: "T1all".to_owned(),
        });
        assert_eq!(r1, Path::new("out/T1all_R1.fastq.gz"));
    }

    #[test]
    fn files_are_created_lazily() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = FastqBucketWriter::new(dir.path(), false);
        let bucket = Bucket::RawSplit {
            barcode: "MID01".to_owned(),
        };
        let [r1, r2] = w.pair_paths(&bucket);
        assert!(!r1.exists());

        let pair = SequencePair::new(
            "read1",
            Sequence::uniform(*b"ACGT", 40),
            Sequence::uniform(*b"GG", 20),
        );
        w.write_pair(&bucket, &pair).unwrap();
        w.finish().unwrap();

        assert_eq!(std::fs::read_to_string(&r1).unwrap(), "@read1\nACGT\n+\nIIII\n");
        assert_eq!(std::fs::read_to_string(r2).unwrap(), "@read1\nGG\n+\n55\n");

        w.write_pair(&bucket, &pair).unwrap();
        w.finish().unwrap();
        assert_eq!(
            std::fs::read_to_string(r1).unwrap(),
            "@read1\nACGT\n+\nIIII\n@read1\nACGT\n+\nIIII\n"
        );
    }

    fn read_gz(path: &Path) -> String {
        use std::io::Read;

        let mut s = String::new();
        flate2::read::MultiGzDecoder::new(File::open(path).unwrap())
            .read_to_string(&mut s)
            .unwrap();
        s
    }

    #[test]
    fn gzip_streams_are_complete() {
        let dir = tempfile::tempdir().unwrap();
        let bucket = Bucket::Merged {
            sample: "T1".to_owned(),
            kind: MergedKind::R1BeginsInR2,
        };
        let seq = Sequence::uniform(*b"ACGT", 40);

        let mut w = FastqBucketWriter::new(dir.path(), true);
        let path = w.mate_path(&bucket, None);
        w.write_merged(&bucket, "a", &seq).unwrap();
        w.finish().unwrap();
        w.write_merged(&bucket, "b", &seq).unwrap();
        w.finish().unwrap();
        assert_eq!(read_gz(&path), "@a\nACGT\n+\nIIII\n@b\nACGT\n+\nIIII\n");

        // closed on drop when never finished
        let mut w = FastqBucketWriter::new(dir.path().join("dropped"), true);
        let path = w.mate_path(&bucket, None);
        w.write_merged(&bucket, "c", &seq).unwrap();
        drop(w);
        assert_eq!(read_gz(&path), "@c\nACGT\n+\nIIII\n");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn finish_reports_close_errors() {
        let full = Path::new("/dev/full");
        if !full.exists() {
            return;
        }

        let dir = tempfile::tempdir().unwrap();
        let mut w = FastqBucketWriter::new(dir.path(), false);
        let bucket = Bucket::Good {
            sample: "T1".to_owned(),
        };
        let [r1, _] = w.pair_paths(&bucket);
        std::os::unix::fs::symlink(full, &r1).unwrap();

        let pair = SequencePair::new(
            "read1",
            Sequence::uniform(*b"ACGT", 40),
            Sequence::uniform(*b"GG", 20),
        );
        // buffered, so the write itself succeeds
        w.write_pair(&bucket, &pair).unwrap();
        assert!(matches!(w.finish(), Err(Error::FileIo { file, .. }) if file == r1));
        assert!(w.finish().is_ok());
    }
}
