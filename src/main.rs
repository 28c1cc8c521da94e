use anyhow::Context;
use clap::Parser;
use colored::Colorize;

use std::path::PathBuf;

use ampdemux::{extract, ExtractorParams, LowerCaseBases};

#[derive(Parser)]
#[command(name = "ampdemux")]
#[command(about = "Demultiplex paired-end amplicon reads by barcode and primer, and merge overlapping mates", long_about = None)]
#[command(version)]
struct Cli {
    /// YAML file with extraction parameters; flags override its values
    #[arg(short = 'c', long, value_name = "PARAMS.YAML")]
    config: Option<PathBuf>,

    /// R1 fastq file, optionally gzipped
    #[arg(long = "r1", value_name = "R1.FQ")]
    r1: Option<PathBuf>,

    /// R2 fastq file, optionally gzipped
    #[arg(long = "r2", value_name = "R2.FQ")]
    r2: Option<PathBuf>,

    /// Id file with the target and barcode sections
    #[arg(short = 'i', long = "id", value_name = "FILE")]
    id_file: Option<PathBuf>,

    /// Per-target length windows
    #[arg(long, value_name = "FILE")]
    len_cut_offs: Option<PathBuf>,

    /// Per-target overlap hints
    #[arg(long, value_name = "FILE")]
    overlap_statuses: Option<PathBuf>,

    /// Output directory
    #[arg(short = 'o', long, value_name = "DIR")]
    out_dir: Option<PathBuf>,

    // ===== Barcodes =====
    /// Split reads by the barcodes of the id file
    #[arg(long)]
    multiplex: bool,

    /// Mismatches allowed in a barcode
    #[arg(long, value_name = "INT")]
    barcode_errors: Option<usize>,

    /// Barcodes are also read at the start of R2
    #[arg(long)]
    mid_ends_rev_comp: bool,

    /// Sample name appended to target names when not multiplexing
    #[arg(long, value_name = "STR")]
    sample_name: Option<String>,

    /// Pairs with a mate shorter than this are filtered off first
    #[arg(long, value_name = "INT")]
    small_fragment_cutoff: Option<usize>,

    /// What to do with lowercase bases
    #[arg(long, value_enum, value_name = "POLICY")]
    lower_case: Option<LowerCase>,

    // ===== Primers =====
    /// Errors allowed in the forward primer
    #[arg(long, value_name = "INT")]
    fwd_primer_errors: Option<usize>,

    /// Errors allowed in the reverse primer
    #[arg(long, value_name = "INT")]
    rev_primer_errors: Option<usize>,

    /// Largest start offset tried for primers
    #[arg(long, value_name = "INT")]
    variable_stop: Option<usize>,

    /// Also look for reverse primers at the start of R1
    #[arg(long)]
    check_complement: bool,

    /// Assign the only target without looking for its forward primer
    #[arg(long)]
    no_forward_primer: bool,

    /// Skip reverse primer confirmation
    #[arg(long)]
    no_reverse_primer: bool,

    // ===== Lengths =====
    #[arg(long, value_name = "INT")]
    r1_min_len: Option<usize>,

    #[arg(long, value_name = "INT")]
    r1_max_len: Option<usize>,

    #[arg(long, value_name = "INT")]
    r2_min_len: Option<usize>,

    #[arg(long, value_name = "INT")]
    r2_max_len: Option<usize>,

    /// Only flag pairs outside of their length window
    #[arg(long)]
    mark_length_only: bool,

    // ===== Merging =====
    /// Merge overlapping mates into one sequence
    #[arg(long)]
    merge: bool,

    #[arg(long, value_name = "INT")]
    min_overlap: Option<usize>,

    /// Largest fraction of errors allowed in an overlap
    #[arg(long, value_name = "FLOAT")]
    error_allowed: Option<f64>,

    #[arg(long, value_name = "INT")]
    hard_mismatch_cutoff: Option<usize>,

    /// Bases removed from the 3' end of R1 before merging
    #[arg(long, value_name = "INT")]
    r1_trim: Option<usize>,

    /// Bases removed from the 3' end of R2 before merging
    #[arg(long, value_name = "INT")]
    r2_trim: Option<usize>,

    /// Write pairs with unmergeable overhangs to their own bucket
    #[arg(long)]
    write_overhangs: bool,

    // ===== Output =====
    /// Rename good reads to sample.NNNN
    #[arg(long)]
    rename: bool,

    /// Keep the per-barcode split files
    #[arg(long)]
    keep_intermediate: bool,

    /// Gzip the output fastq files
    #[arg(long)]
    gzip: bool,

    /// Verbosity: -v for debug, -vv for trace
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short = 'q', long)]
    quiet: bool,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum LowerCase {
    Keep,
    Upper,
    Remove,
}

impl From<LowerCase> for LowerCaseBases {
    fn from(l: LowerCase) -> Self {
        match l {
            LowerCase::Keep => LowerCaseBases::Keep,
            LowerCase::Upper => LowerCaseBases::Upper,
            LowerCase::Remove => LowerCaseBases::Remove,
        }
    }
}

impl Cli {
    fn params(self) -> anyhow::Result<ExtractorParams> {
        let mut p = match &self.config {
            Some(path) => ExtractorParams::from_yaml(path)
                .with_context(|| format!("Failed to load parameters from {}", path.display()))?,
            None => ExtractorParams::default(),
        };

        fn set<T>(dst: &mut T, v: Option<T>) {
            if let Some(v) = v {
                *dst = v;
            }
        }

        set(&mut p.r1, self.r1);
        set(&mut p.r2, self.r2);
        set(&mut p.id_file, self.id_file);
        set(&mut p.out_dir, self.out_dir);
        set(&mut p.barcode_errors, self.barcode_errors);
        set(&mut p.small_fragment_cutoff, self.small_fragment_cutoff);
        set(&mut p.lower_case, self.lower_case.map(Into::into));
        set(&mut p.primers.fwd_primer_errors, self.fwd_primer_errors);
        set(&mut p.primers.rev_primer_errors, self.rev_primer_errors);
        set(&mut p.primers.variable_stop, self.variable_stop);
        set(&mut p.overlap.min_overlap, self.min_overlap);
        set(&mut p.overlap.error_allowed, self.error_allowed);
        set(&mut p.overlap.hard_mismatch_cutoff, self.hard_mismatch_cutoff);
        set(&mut p.overlap.r1_trim, self.r1_trim);
        set(&mut p.overlap.r2_trim, self.r2_trim);

        if self.len_cut_offs.is_some() {
            p.len_cut_offs = self.len_cut_offs;
        }
        if self.overlap_statuses.is_some() {
            p.overlap_statuses = self.overlap_statuses;
        }
        if self.sample_name.is_some() {
            p.sample_name = self.sample_name;
        }
        for (dst, v) in [
            (&mut p.lengths.r1_min, self.r1_min_len),
            (&mut p.lengths.r1_max, self.r1_max_len),
            (&mut p.lengths.r2_min, self.r2_min_len),
            (&mut p.lengths.r2_max, self.r2_max_len),
        ] {
            if v.is_some() {
                *dst = v;
            }
        }

        p.multiplex |= self.multiplex;
        p.mid_ends_rev_comp |= self.mid_ends_rev_comp;
        p.primers.check_complement |= self.check_complement;
        p.primers.no_forward_primer |= self.no_forward_primer;
        p.primers.no_reverse_primer |= self.no_reverse_primer;
        p.mark_length_only |= self.mark_length_only;
        p.merge |= self.merge;
        p.write_overhangs |= self.write_overhangs;
        p.rename |= self.rename;
        p.keep_intermediate |= self.keep_intermediate;
        p.gzip |= self.gzip;

        for (name, path) in [("--r1", &p.r1), ("--r2", &p.r2), ("--id", &p.id_file)] {
            anyhow::ensure!(!path.as_os_str().is_empty(), "{name} is required");
        }

        Ok(p)
    }
}

fn run(params: &ExtractorParams) -> anyhow::Result<()> {
    log::info!("{}", "Extracting reads".bold().green());
    log::info!("R1: {}", params.r1.display());
    log::info!("R2: {}", params.r2.display());
    log::info!("Output: {}", params.out_dir.display());

    let extraction = extract(params).context("Extraction failed")?;
    let r = &extraction.results;

    log::info!("{}", "Extraction summary".bold().green());
    log::info!("Total pairs:         {}", r.total);
    log::info!("Unmatched barcodes:  {}", r.not_matched_barcodes());
    log::info!("Small fragments:     {}", r.small_fragments());
    log::info!("Failed primer:       {}", r.failed_forward());
    log::info!("Failed filtering:    {}", r.failed_filtering());
    log::info!("Used:                {}", r.used().to_string().bold());
    if params.merge {
        log::info!("Merged:              {}", r.merged());
        log::info!("Not combined:        {}", r.overlap_fail + r.overhang_fail);
    }

    Ok(())
}

fn main() {
    let cli = Cli::parse();

    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => log::LevelFilter::Error,
        (false, 0) => log::LevelFilter::Info,
        (false, 1) => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp(None)
        .format_target(false)
        .init();

    let params = match cli.params() {
        Ok(p) => p,
        Err(e) => {
            log::error!("{}", format!("{e:#}").red());
            std::process::exit(1);
        }
    };

    if let Err(e) = run(&params) {
        log::error!("{}", format!("{e:#}").red());
        std::process::exit(1);
    }
}
