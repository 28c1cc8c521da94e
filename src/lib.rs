//! Demultiplexing and overlap merging of paired-end amplicon reads.
//!
//! # Overview
//! ampdemux recovers per-sample, per-target reads from a pooled, barcoded paired-end run.
//! Every read pair flows through a fixed series of stages:
//! 1. lowercase handling and small fragment removal
//! 2. barcode matching, which splits the run into one partition per barcode
//! 3. forward primer detection, which identifies the target (and re-orients pairs found
//!    through their reverse primer)
//! 4. length filtering, reverse primer confirmation, and length filtering again
//! 5. optionally, overlap detection between R1 and reverse-complemented R2 and a quality-aware
//!    consensus of the overlapping pairs
//!
//! Any stage can end a pair early. Each pair is written to exactly one [`Bucket`] and counted
//! exactly once in [`ProcessedResults`].
//!
//! ## Running an extraction
//! [`extract`] runs both passes over two fastq files, configured by [`ExtractorParams`]:
//! ```no_run
//! use ampdemux::*;
//!
//! let params = ExtractorParams {
//!     r1: "run_R1.fastq.gz".into(),
//!     r2: "run_R2.fastq.gz".into(),
//!     id_file: "ids.tab.txt".into(),
//!     out_dir: "extracted".into(),
//!     multiplex: true,
//!     merge: true,
//!     ..Default::default()
//! };
//! let extraction = extract(&params)?;
//! println!("{} pairs used", extraction.results.used());
//! # Ok::<(), ampdemux::errors::Error>(())
//! ```
//!
//! ## Driving the stages directly
//! The [`Demultiplexer`] processes one pair at a time into any [`BucketSink`]. Alignment is
//! behind the [`Aligner`] trait and consensus behind [`ConsensusBuilder`], so both can be
//! swapped out:
//! ```
//! use ampdemux::*;
//!
//! let mut catalog = Catalog::new();
//! catalog.add_target("T1", "GATTACA", None)?;
//!
//! let params = ExtractorParams {
//!     merge: true,
//!     ..Default::default()
//! };
//! let windows = LengthWindows::uniform(LenCutOffs {
//!     r1: LengthWindow::new(1, 300),
//!     r2: LengthWindow::new(1, 300),
//!     mark_only: false,
//! });
//! let mut demux = Demultiplexer::new(&catalog, &params, windows)?;
//!
//! let mut sink = MemoryBuckets::new();
//! let mut source = VecPairSource::new([SequencePair::new(
//!     "read1",
//!     Sequence::uniform(*b"GATTACAAAACCCGGG", 30),
//!     Sequence::uniform(*b"CCCGGGTTTT", 30),
//! )]);
//! let results = demux.run(&mut source, &mut sink)?;
//! assert_eq!(results.total, 1);
//! # Ok::<(), ampdemux::errors::Error>(())
//! ```

pub mod align;
pub mod errors;
pub mod extract;
pub mod params;
pub mod pipeline;
pub mod results;

mod patterns;
mod read;

mod parse_utils;

// commonly used functions and types

pub use crate::align::{Aligner, Alignment, PairwiseAligner};
pub use crate::extract::{extract, load_catalog, Extraction};
pub use crate::params::ExtractorParams;
pub use crate::parse_utils::{read_id_file, read_len_cut_offs, read_overlap_statuses};
pub use crate::patterns::*;
pub use crate::pipeline::*;
pub use crate::read::*;
pub use crate::results::{FailedPrimerCounts, ProcessedResults, SampleCounts};
