use crate::errors::*;
use crate::parse_utils::{check_valid_name, check_valid_primer};
use crate::pipeline::{LengthWindow, OverlapStatus};

/// A sample barcode (MID).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Barcode {
    pub name: String,
    pub bases: Vec<u8>,
    /// The barcode is also found at the 3' end of the fragment, so it is read again at the
    /// start of R2.
    pub ends_rev_comp: bool,
}

/// Explicit length window for one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LenCutOffs {
    pub r1: LengthWindow,
    pub r2: LengthWindow,
    /// Only flag reads outside of the window instead of rejecting them.
    pub mark_only: bool,
}

/// An amplicon target and its primers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub name: String,
    pub forward: Vec<u8>,
    pub reverse: Option<Vec<u8>>,
    pub len_cut_offs: Option<LenCutOffs>,
    /// Whether mates of this amplicon are expected to overlap. `None` means unknown.
    pub overlap_status: Option<OverlapStatus>,
}

impl Target {
    pub fn new(name: impl Into<String>, forward: impl AsRef<[u8]>, reverse: Option<&[u8]>) -> Self {
        Self {
            name: name.into(),
            forward: forward.as_ref().to_ascii_uppercase(),
            reverse: reverse
                .filter(|r| !r.is_empty())
                .map(|r| r.to_ascii_uppercase()),
            len_cut_offs: None,
            overlap_status: None,
        }
    }
}

/// Targets and barcodes of a run. Read-only once the run starts.
///
/// Both lists are kept sorted by name so every search over them is deterministic.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    targets: Vec<Target>,
    barcodes: Vec<Barcode>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_target(
        &mut self,
        name: impl AsRef<str>,
        forward: impl AsRef<[u8]>,
        reverse: Option<&[u8]>,
    ) -> Result<()> {
        let name = name.as_ref();
        check_valid_name(name.as_bytes()).ok_or_else(|| Error::InvalidName {
            string: name.to_owned(),
            context: "target names".to_owned(),
        })?;
        check_valid_primer(forward.as_ref(), name)?;
        let reverse = reverse.filter(|r| !r.is_empty());
        if let Some(r) = reverse {
            check_valid_primer(r, name)?;
        }

        match self.targets.binary_search_by(|t| t.name.as_str().cmp(name)) {
            Ok(_) => Err(Error::DuplicateName {
                kind: "target",
                name: name.to_owned(),
            }),
            Err(i) => {
                self.targets.insert(i, Target::new(name, forward, reverse));
                Ok(())
            }
        }
    }

    pub fn add_barcode(&mut self, name: impl AsRef<str>, bases: impl AsRef<[u8]>) -> Result<()> {
        let name = name.as_ref();
        check_valid_name(name.as_bytes()).ok_or_else(|| Error::InvalidName {
            string: name.to_owned(),
            context: "barcode names".to_owned(),
        })?;
        check_valid_primer(bases.as_ref(), name)?;

        match self.barcodes.binary_search_by(|b| b.name.as_str().cmp(name)) {
            Ok(_) => Err(Error::DuplicateName {
                kind: "barcode",
                name: name.to_owned(),
            }),
            Err(i) => {
                self.barcodes.insert(
                    i,
                    Barcode {
                        name: name.to_owned(),
                        bases: bases.as_ref().to_ascii_uppercase(),
                        ends_rev_comp: false,
                    },
                );
                Ok(())
            }
        }
    }

    pub fn set_barcodes_end_rev_comp(&mut self, ends_rev_comp: bool) {
        self.barcodes
            .iter_mut()
            .for_each(|b| b.ends_rev_comp = ends_rev_comp);
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn barcodes(&self) -> &[Barcode] {
        &self.barcodes
    }

    pub fn target(&self, name: &str) -> Option<&Target> {
        self.targets
            .binary_search_by(|t| t.name.as_str().cmp(name))
            .ok()
            .map(|i| &self.targets[i])
    }

    fn target_mut(&mut self, name: &str, context: &str) -> Result<&mut Target> {
        match self.targets.binary_search_by(|t| t.name.as_str().cmp(name)) {
            Ok(i) => Ok(&mut self.targets[i]),
            Err(_) => Err(Error::UnknownTarget {
                target: name.to_owned(),
                context: context.to_owned(),
            }),
        }
    }

    pub fn target_names(&self) -> Vec<&str> {
        self.targets.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn has_multiple_targets(&self) -> bool {
        self.targets.len() > 1
    }

    pub fn contains_barcodes(&self) -> bool {
        !self.barcodes.is_empty()
    }

    pub fn add_len_cut_offs(
        &mut self,
        cut_offs: impl IntoIterator<Item = (String, LenCutOffs)>,
    ) -> Result<()> {
        for (name, c) in cut_offs {
            self.target_mut(&name, "the length cutoff file")?.len_cut_offs = Some(c);
        }
        Ok(())
    }

    pub fn add_overlap_statuses(
        &mut self,
        statuses: impl IntoIterator<Item = (String, OverlapStatus)>,
    ) -> Result<()> {
        for (name, s) in statuses {
            self.target_mut(&name, "the overlap status file")?.overlap_status = Some(s);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn targets_are_sorted_and_unique() {
        let mut c = Catalog::new();
        c.add_target("T2", "ACGT", None).unwrap();
        c.add_target("T1", "gattaca", Some(b"CCGG".as_slice())).unwrap();
        assert_eq!(c.target_names(), vec!["T1", "T2"]);
        assert_eq!(c.target("T1").unwrap().forward, b"GATTACA");
        assert!(matches!(
            c.add_target("T1", "ACGT", None),
            Err(Error::DuplicateName { .. })
        ));
    }

    #[test]
    fn empty_reverse_primer_is_none() {
        let mut c = Catalog::new();
        c.add_target("T1", "ACGT", Some(b"".as_slice())).unwrap();
        assert!(c.target("T1").unwrap().reverse.is_none());
    }

    #[test]
    fn side_files_must_name_known_targets() {
        let mut c = Catalog::new();
        c.add_target("T1", "ACGT", None).unwrap();
        let res = c.add_overlap_statuses([("T9".to_owned(), OverlapStatus::NoOverlap)]);
        assert!(matches!(res, Err(Error::UnknownTarget { .. })));
        c.add_overlap_statuses([("T1".to_owned(), OverlapStatus::R1EndsInR2)])
            .unwrap();
        assert_eq!(
            c.target("T1").unwrap().overlap_status,
            Some(OverlapStatus::R1EndsInR2)
        );
    }

    #[test]
    fn rejects_bad_names_and_bases() {
        let mut c = Catalog::new();
        assert!(c.add_barcode("MID 1", "ACGT").is_err());
        assert!(c.add_barcode("MID1", "ACXT").is_err());
        c.add_barcode("MID1", "acgt").unwrap();
        assert_eq!(c.barcodes()[0].bases, b"ACGT");
    }
}
