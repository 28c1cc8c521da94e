use serde::{Deserialize, Serialize};

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::align::ScoringScheme;
use crate::errors::*;
use crate::patterns::Catalog;
use crate::pipeline::{GlobalLengthBounds, OverlapParams, PrimerParams};
use crate::read::LowerCaseBases;

pub const PARAMS_USED: &str = "parametersUsed.yaml";

/// Every knob of an extraction run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorParams {
    pub r1: PathBuf,
    pub r2: PathBuf,
    /// Target and barcode catalog.
    pub id_file: PathBuf,
    pub id_delim: char,
    /// Optional per-target length windows.
    pub len_cut_offs: Option<PathBuf>,
    /// Optional per-target overlap hints.
    pub overlap_statuses: Option<PathBuf>,
    pub out_dir: PathBuf,

    pub multiplex: bool,
    pub barcode_errors: usize,
    /// Barcodes are also read at the start of R2.
    pub mid_ends_rev_comp: bool,
    /// Appended to target names when not multiplexing.
    pub sample_name: Option<String>,
    pub small_fragment_cutoff: usize,
    pub lower_case: LowerCaseBases,

    pub primers: PrimerParams,
    pub lengths: GlobalLengthBounds,
    /// Only flag pairs outside of their length window.
    pub mark_length_only: bool,

    pub merge: bool,
    pub overlap: OverlapParams,
    pub write_overhangs: bool,

    pub rename: bool,
    pub keep_intermediate: bool,
    pub gzip: bool,
    pub scoring: ScoringScheme,
}

impl Default for ExtractorParams {
    fn default() -> Self {
        Self {
            r1: PathBuf::new(),
            r2: PathBuf::new(),
            id_file: PathBuf::new(),
            id_delim: '\t',
            len_cut_offs: None,
            overlap_statuses: None,
            out_dir: PathBuf::from("."),
            multiplex: false,
            barcode_errors: 0,
            mid_ends_rev_comp: false,
            sample_name: None,
            small_fragment_cutoff: 50,
            lower_case: LowerCaseBases::Keep,
            primers: PrimerParams::default(),
            lengths: GlobalLengthBounds::default(),
            mark_length_only: false,
            merge: false,
            overlap: OverlapParams::default(),
            write_overhangs: false,
            rename: false,
            keep_intermediate: false,
            gzip: false,
            scoring: ScoringScheme::default(),
        }
    }
}

fn invalid(param: &'static str, reason: impl Into<String>) -> Error {
    Error::InvalidParam {
        param,
        reason: reason.into(),
    }
}

impl ExtractorParams {
    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::FileIo {
            file: path.to_owned(),
            source: Box::new(e),
        })?;

        serde_yaml::from_reader(BufReader::new(file)).map_err(|e| Error::FileIo {
            file: path.to_owned(),
            source: Box::new(e),
        })
    }

    pub fn write_yaml(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| Error::FileIo {
            file: path.to_owned(),
            source: Box::new(e),
        })?;

        let mut writer = BufWriter::new(file);
        serde_yaml::to_writer(&mut writer, self).map_err(|e| Error::FileIo {
            file: path.to_owned(),
            source: Box::new(e),
        })?;
        writer.flush().map_err(|e| Error::FileIo {
            file: path.to_owned(),
            source: Box::new(e),
        })
    }

    /// Single byte delimiter of the id file.
    pub fn id_delim_byte(&self) -> Result<u8> {
        u8::try_from(self.id_delim)
            .ok()
            .filter(|b| b.is_ascii())
            .ok_or_else(|| invalid("id_delim", format!("{:?} is not an ASCII character", self.id_delim)))
    }

    /// Check the parameters against each other and against the catalog.
    pub fn validate(&self, catalog: &Catalog) -> Result<()> {
        if catalog.targets().is_empty() {
            return Err(Error::NoTargets);
        }
        if self.multiplex && !catalog.contains_barcodes() {
            return Err(Error::NoBarcodes);
        }
        if self.primers.no_forward_primer && catalog.targets().len() != 1 {
            return Err(Error::NoForwardPrimerWithMultipleTargets {
                count: catalog.targets().len(),
                names: catalog.target_names().join(","),
            });
        }
        self.id_delim_byte()?;

        let o = &self.overlap;
        if !(0.0..=1.0).contains(&o.error_allowed) {
            return Err(invalid(
                "overlap.error_allowed",
                format!("{} is not a fraction between 0 and 1", o.error_allowed),
            ));
        }
        if self.write_overhangs && !self.merge {
            return Err(invalid("write_overhangs", "overhangs are only found when merging"));
        }

        let l = &self.lengths;
        for (param, min, max) in [
            ("lengths.r1_min", l.r1_min, l.r1_max),
            ("lengths.r2_min", l.r2_min, l.r2_max),
        ] {
            if let (Some(min), Some(max)) = (min, max) {
                if min > max {
                    return Err(invalid(param, format!("{min} is above the maximum {max}")));
                }
            }
        }

        if !self.multiplex && self.mid_ends_rev_comp {
            log::warn!("Barcodes are only read when multiplexing, ignoring mid_ends_rev_comp");
        }
        if self.multiplex && self.sample_name.is_some() {
            log::warn!("Sample names come from barcodes when multiplexing, ignoring sample_name");
        }

        Ok(())
    }
}
