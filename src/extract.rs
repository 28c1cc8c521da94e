//! A complete extraction run: catalog loading, both passes, and the summaries.

use std::path::{Path, PathBuf};

use crate::errors::*;
use crate::params::{ExtractorParams, PARAMS_USED};
use crate::parse_utils::{read_id_file, read_len_cut_offs, read_overlap_statuses};
use crate::patterns::Catalog;
use crate::pipeline::*;
use crate::read::SequencePair;
use crate::results::{write_table, ProcessedResults};

/// Directory of the per-barcode split written by the first pass.
pub const UNFILTERED_DIR: &str = "unfilteredReads";
pub const RENAME_KEY: &str = "renameKey.tab.txt";

/// What a run produced, besides its output files.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub results: ProcessedResults,
    pub windows: LengthWindows,
    pub rename_key: Vec<(String, String)>,
}

/// Read the id file and the optional side files into one catalog.
pub fn load_catalog(params: &ExtractorParams) -> Result<Catalog> {
    let mut catalog = read_id_file(&params.id_file, params.id_delim_byte()?)?;
    catalog.set_barcodes_end_rev_comp(params.mid_ends_rev_comp);

    if let Some(path) = &params.len_cut_offs {
        catalog.add_len_cut_offs(read_len_cut_offs(path, params.mark_length_only)?)?;
    }
    if let Some(path) = &params.overlap_statuses {
        catalog.add_overlap_statuses(read_overlap_statuses(path)?)?;
    }

    log::debug!(
        "Loaded {} targets ({}) and {} barcodes",
        catalog.targets().len(),
        catalog.target_names().join(", "),
        catalog.barcodes().len()
    );

    Ok(catalog)
}

// tags every pair read back from a raw split file with the file's barcode
struct BarcodeTagged<S> {
    source: S,
    barcode: String,
}

impl<S: PairSource> PairSource for BarcodeTagged<S> {
    fn next_pair(&mut self) -> Result<Option<SequencePair>> {
        Ok(self.source.next_pair()?.map(|mut p| {
            p.barcode = Some(self.barcode.clone());
            p
        }))
    }
}

fn create_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| Error::FileIo {
        file: dir.to_owned(),
        source: Box::new(e),
    })
}

/// Run both passes over the R1/R2 files of `params` and write every output under `out_dir`.
///
/// Configuration errors are reported before any output is created.
pub fn extract(params: &ExtractorParams) -> Result<Extraction> {
    let catalog = load_catalog(params)?;
    params.validate(&catalog)?;

    let mut splitter = Splitter::new(&catalog, params)?;

    let out_dir = &params.out_dir;
    create_dir(out_dir)?;
    params.write_yaml(out_dir.join(PARAMS_USED))?;

    log::info!("Splitting reads by barcode");
    let mut source = FastqPairSource::from_files(&params.r1, &params.r2)?;
    let mut split_sink = FastqBucketWriter::new(out_dir, params.gzip);
    let split = splitter.split(&mut source, &mut split_sink)?;

    let windows = LengthWindows::resolve(
        &catalog,
        params.lengths,
        &split.lengths,
        params.mark_length_only,
    );
    let d = windows.default_cut_offs();
    log::info!(
        "Default length windows: R1 [{}, {}], R2 [{}, {}]",
        d.r1.min,
        d.r1.max,
        d.r2.min,
        d.r2.max
    );

    let mut demux = Demultiplexer::new(&catalog, params, windows.clone())?;
    let mut sink = FastqBucketWriter::new(out_dir, params.gzip);
    let mut results = split.results;

    if split.barcode_counts.is_empty() {
        log::warn!("No read pair was assigned a barcode");
    }

    for (barcode, &count) in &split.barcode_counts {
        log::info!("Extracting {count} pairs of barcode {barcode}");

        let bucket = Bucket::RawSplit {
            barcode: barcode.clone(),
        };
        let [r1, r2] = split_sink.pair_paths(&bucket);
        let mut partition = BarcodeTagged {
            source: FastqPairSource::from_files(&r1, &r2)?,
            barcode: barcode.clone(),
        };

        demux.set_expected_pairs(count);
        let res = demux.run(&mut partition, &mut sink)?;
        log::debug!(
            "Barcode {barcode}: {} used, {} merged",
            res.used(),
            res.merged()
        );
        results.merge(res);
    }

    results.write_summaries(out_dir, params.small_fragment_cutoff, params.multiplex)?;

    let rename_key = demux.rename_key().to_owned();
    if params.rename {
        let rows = rename_key.iter().map(|(old, new)| vec![old.as_str(), new.as_str()]);
        write_table(&out_dir.join(RENAME_KEY), &["originalName", "newName"], rows)?;
    }

    if !params.keep_intermediate {
        let unfiltered: PathBuf = out_dir.join(UNFILTERED_DIR);
        if unfiltered.exists() {
            std::fs::remove_dir_all(&unfiltered).map_err(|e| Error::FileIo {
                file: unfiltered.clone(),
                source: Box::new(e),
            })?;
        }
    }

    log::info!(
        "Processed {} pairs: {} used, {} merged",
        results.total,
        results.used(),
        results.merged()
    );

    Ok(Extraction {
        results,
        windows,
        rename_key,
    })
}
