use serde::{Deserialize, Serialize};

use std::fmt;

use crate::errors::*;

/// Offset of fastq quality characters.
pub const PHRED_OFFSET: u8 = 33;
/// Highest quality that can be written as a fastq character.
pub const MAX_PHRED: u8 = 93;

static COMP_LUT: [u8; 256] = {
    let mut l = [0u8; 256];
    let mut i = 0;

    while i < l.len() {
        l[i] = i as u8;
        i += 1;
    }

    let pairs: [(u8, u8); 11] = [
        (b'A', b'T'),
        (b'C', b'G'),
        (b'G', b'C'),
        (b'T', b'A'),
        (b'U', b'A'),
        (b'R', b'Y'),
        (b'Y', b'R'),
        (b'K', b'M'),
        (b'M', b'K'),
        (b'B', b'V'),
        (b'V', b'B'),
    ];
    let mut j = 0;

    while j < pairs.len() {
        let (a, b) = pairs[j];
        l[a as usize] = b;
        l[a.to_ascii_lowercase() as usize] = b.to_ascii_lowercase();
        j += 1;
    }

    l[b'D' as usize] = b'H';
    l[b'H' as usize] = b'D';
    l[b'd' as usize] = b'h';
    l[b'h' as usize] = b'd';
    l
};

// bit per nucleotide (A, C, G, T) for each IUPAC code
static IUPAC_BITS: [u8; 256] = {
    let mut l = [0u8; 256];
    let codes: [(u8, u8); 16] = [
        (b'A', 0b0001),
        (b'C', 0b0010),
        (b'G', 0b0100),
        (b'T', 0b1000),
        (b'U', 0b1000),
        (b'R', 0b0101),
        (b'Y', 0b1010),
        (b'S', 0b0110),
        (b'W', 0b1001),
        (b'K', 0b1100),
        (b'M', 0b0011),
        (b'B', 0b1110),
        (b'D', 0b1101),
        (b'H', 0b1011),
        (b'V', 0b0111),
        (b'N', 0b1111),
    ];
    let mut i = 0;

    while i < codes.len() {
        let (c, bits) = codes[i];
        l[c as usize] = bits;
        l[c.to_ascii_lowercase() as usize] = bits;
        i += 1;
    }

    l
};

/// Whether two bases can be the same nucleotide, treating IUPAC codes (including `N`) as
/// degenerate and ignoring case.
#[inline]
pub fn bases_match(a: u8, b: u8) -> bool {
    IUPAC_BITS[a as usize] & IUPAC_BITS[b as usize] != 0
}

#[inline]
pub fn is_no_call(b: u8) -> bool {
    matches!(b, b'N' | b'n' | b'.')
}

pub fn revcomp(bases: &[u8]) -> Vec<u8> {
    bases.iter().rev().map(|&b| COMP_LUT[b as usize]).collect()
}

/// What to do with lowercase bases, which mark soft-masked low quality tails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LowerCaseBases {
    #[default]
    Keep,
    Upper,
    Remove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Mate {
    R1,
    R2,
}

impl fmt::Display for Mate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mate::R1 => write!(f, "R1"),
            Mate::R2 => write!(f, "R2"),
        }
    }
}

/// Bases and their numeric quality scores. The two are always the same length.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Sequence {
    bases: Vec<u8>,
    quals: Vec<u8>,
}

impl Sequence {
    pub fn new(bases: impl Into<Vec<u8>>, quals: impl Into<Vec<u8>>) -> Self {
        let bases = bases.into();
        let quals = quals.into();
        assert_eq!(
            bases.len(),
            quals.len(),
            "Sequence and quality lengths differ"
        );
        Self { bases, quals }
    }

    /// Sequence where every base has the same quality.
    pub fn uniform(bases: impl Into<Vec<u8>>, qual: u8) -> Self {
        let bases = bases.into();
        let quals = vec![qual; bases.len()];
        Self { bases, quals }
    }

    /// Build from a fastq record's sequence and phred+33 quality line.
    pub fn from_phred33(name: &[u8], bases: &[u8], qual: &[u8]) -> Result<Self> {
        if bases.len() != qual.len() {
            return Err(Error::QualityLength {
                name: utf8(name),
                seq_len: bases.len(),
                qual_len: qual.len(),
            });
        }

        Ok(Self {
            bases: bases.to_owned(),
            quals: qual.iter().map(|&q| q.saturating_sub(PHRED_OFFSET)).collect(),
        })
    }

    pub fn bases(&self) -> &[u8] {
        &self.bases
    }

    pub fn quals(&self) -> &[u8] {
        &self.quals
    }

    pub fn len(&self) -> usize {
        self.bases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bases.is_empty()
    }

    pub fn phred33(&self) -> Vec<u8> {
        self.quals
            .iter()
            .map(|&q| q.min(MAX_PHRED) + PHRED_OFFSET)
            .collect()
    }

    /// New sequence with `front` bases removed from the start and `back` bases from the end.
    pub fn trimmed(&self, front: usize, back: usize) -> Sequence {
        let start = front.min(self.len());
        let end = self.len().saturating_sub(back).max(start);
        self.slice(start, end)
    }

    pub fn slice(&self, start: usize, end: usize) -> Sequence {
        Sequence {
            bases: self.bases[start..end].to_owned(),
            quals: self.quals[start..end].to_owned(),
        }
    }

    pub fn revcomp(&self) -> Sequence {
        Sequence {
            bases: revcomp(&self.bases),
            quals: self.quals.iter().rev().copied().collect(),
        }
    }

    pub fn push(&mut self, base: u8, qual: u8) {
        self.bases.push(base);
        self.quals.push(qual);
    }

    pub fn extend_from(&mut self, other: &Sequence) {
        self.bases.extend_from_slice(&other.bases);
        self.quals.extend_from_slice(&other.quals);
    }

    pub fn with_lower_case(&self, policy: LowerCaseBases) -> Sequence {
        match policy {
            LowerCaseBases::Keep => self.clone(),
            LowerCaseBases::Upper => Sequence {
                bases: self.bases.to_ascii_uppercase(),
                quals: self.quals.clone(),
            },
            LowerCaseBases::Remove => {
                let (bases, quals) = self
                    .bases
                    .iter()
                    .zip(&self.quals)
                    .filter(|(b, _)| !b.is_ascii_lowercase())
                    .map(|(&b, &q)| (b, q))
                    .unzip();
                Sequence { bases, quals }
            }
        }
    }
}

/// Both mates of one sequenced fragment, plus what the pipeline learned about them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencePair {
    pub name: String,
    pub r1: Sequence,
    pub r2: Sequence,
    pub accepted: bool,
    /// Why the pair was rejected or flagged.
    pub failure: Option<String>,
    pub barcode: Option<String>,
    pub target: Option<String>,
    /// The pair was identified through the reverse primer and has been re-oriented.
    pub found_in_reverse: bool,
}

impl SequencePair {
    pub fn new(name: impl Into<String>, r1: Sequence, r2: Sequence) -> Self {
        Self {
            name: name.into(),
            r1,
            r2,
            accepted: true,
            failure: None,
            barcode: None,
            target: None,
            found_in_reverse: false,
        }
    }

    pub fn mate(&self, mate: Mate) -> &Sequence {
        match mate {
            Mate::R1 => &self.r1,
            Mate::R2 => &self.r2,
        }
    }

    pub fn mate_mut(&mut self, mate: Mate) -> &mut Sequence {
        match mate {
            Mate::R1 => &mut self.r1,
            Mate::R2 => &mut self.r2,
        }
    }

    pub fn trim_front(&mut self, mate: Mate, n: usize) {
        let m = self.mate_mut(mate);
        *m = m.trimmed(n, 0);
    }

    pub fn reject(&mut self, reason: impl Into<String>) {
        self.accepted = false;
        self.failure = Some(reason.into());
    }

    /// Record a note about the pair without rejecting it.
    pub fn flag(&mut self, note: impl Into<String>) {
        let note = note.into();
        match &mut self.failure {
            Some(f) => {
                f.push(';');
                f.push_str(&note);
            }
            None => self.failure = Some(note),
        }
    }

    pub fn swap_mates(&mut self) {
        std::mem::swap(&mut self.r1, &mut self.r2);
    }

    pub fn min_len(&self) -> usize {
        self.r1.len().min(self.r2.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revcomp_keeps_case_and_reverses_quals() {
        let s = Sequence::new(*b"ACgtN", [1, 2, 3, 4, 5]);
        let rc = s.revcomp();
        assert_eq!(rc.bases(), b"NacGT");
        assert_eq!(rc.quals(), &[5, 4, 3, 2, 1]);
    }

    #[test]
    fn trimmed_never_overruns() {
        let s = Sequence::uniform(*b"ACGTACGT", 30);
        assert_eq!(s.trimmed(2, 3).bases(), b"GTA");
        assert!(s.trimmed(5, 5).is_empty());
        assert!(s.trimmed(20, 0).is_empty());
    }

    #[test]
    fn degenerate_bases_match() {
        assert!(bases_match(b'A', b'a'));
        assert!(bases_match(b'R', b'G'));
        assert!(bases_match(b'N', b'T'));
        assert!(!bases_match(b'Y', b'A'));
        assert!(!bases_match(b'C', b'G'));
    }

    #[test]
    fn lower_case_policies() {
        let s = Sequence::new(*b"ACGtt", [30, 30, 30, 2, 2]);
        assert_eq!(s.with_lower_case(LowerCaseBases::Remove).bases(), b"ACG");
        assert_eq!(s.with_lower_case(LowerCaseBases::Remove).quals(), &[30, 30, 30]);
        assert_eq!(s.with_lower_case(LowerCaseBases::Upper).bases(), b"ACGTT");
        assert_eq!(s.with_lower_case(LowerCaseBases::Keep), s);
    }

    #[test]
    fn phred33_round_trip_of_quality_line() {
        let s = Sequence::from_phred33(b"r", b"ACG", b"I#5").unwrap();
        assert_eq!(s.quals(), &[40, 2, 20]);
        assert_eq!(s.phred33(), b"I#5");
        assert!(Sequence::from_phred33(b"r", b"ACG", b"II").is_err());
    }

    #[test]
    fn flag_appends_notes() {
        let mut p = SequencePair::new("p", Sequence::default(), Sequence::default());
        p.flag("a");
        p.flag("b");
        assert!(p.accepted);
        assert_eq!(p.failure.as_deref(), Some("a;b"));
        p.reject("c");
        assert!(!p.accepted);
    }
}
