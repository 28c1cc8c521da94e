use needletail::*;

use std::collections::VecDeque;
use std::path::Path;

use crate::errors::*;
use crate::read::{Sequence, SequencePair};

/// Stream of read pairs. `Ok(None)` marks the end of input.
pub trait PairSource {
    fn next_pair(&mut self) -> Result<Option<SequencePair>>;
}

/// Pairs from two fastq files (or readers), one record from each per pair.
pub struct FastqPairSource<'reader> {
    readers: [(Box<dyn FastxReader + 'reader>, String); 2],
    idx: usize,
}

impl<'reader> FastqPairSource<'reader> {
    /// Stream pairs from R1 and R2 fastq files, which may be gzipped.
    pub fn from_files(r1: impl AsRef<Path>, r2: impl AsRef<Path>) -> Result<Self> {
        let open = |p: &Path| -> Result<(Box<dyn FastxReader + 'reader>, String)> {
            let reader = parse_fastx_file(p).map_err(|e| Error::FileIo {
                file: p.to_owned(),
                source: Box::new(e),
            })?;
            Ok((reader, p.display().to_string()))
        };

        Ok(Self {
            readers: [open(r1.as_ref())?, open(r2.as_ref())?],
            idx: 0,
        })
    }

    /// Stream pairs from two arbitrary `Read`ers.
    pub fn from_readers(
        r1: impl std::io::Read + Send + 'reader,
        r2: impl std::io::Read + Send + 'reader,
    ) -> Result<Self> {
        let open = |r: Box<dyn std::io::Read + Send + 'reader>, origin: &str| {
            parse_fastx_reader(r)
                .map(|reader| (reader, origin.to_owned()))
                .map_err(|e| Error::ParseRecord {
                    origin: origin.to_owned(),
                    idx: 0,
                    source: Box::new(e),
                })
        };

        Ok(Self {
            readers: [open(Box::new(r1), "R1 bytes")?, open(Box::new(r2), "R2 bytes")?],
            idx: 0,
        })
    }

    fn next_record(&mut self, mate: usize) -> Result<Option<(String, Sequence)>> {
        let idx = self.idx;
        let (reader, origin) = &mut self.readers[mate];
        let Some(record) = reader.next() else {
            return Ok(None);
        };
        let record = record.map_err(|e| Error::ParseRecord {
            origin: origin.clone(),
            idx,
            source: Box::new(e),
        })?;

        let Some(qual) = record.qual() else {
            return Err(Error::MissingQuality {
                origin: origin.clone(),
                idx,
            });
        };
        let name = read_name(record.id());
        let seq = Sequence::from_phred33(record.id(), &record.seq(), qual)?;

        Ok(Some((name, seq)))
    }
}

// first word of a fastq header, without a trailing /1 or /2
fn read_name(id: &[u8]) -> String {
    let end = memchr::memchr2(b' ', b'\t', id).unwrap_or(id.len());
    let name = &id[..end];
    let name = match name {
        [rest @ .., b'/', b'1' | b'2'] => rest,
        _ => name,
    };
    utf8(name)
}

impl<'reader> PairSource for FastqPairSource<'reader> {
    fn next_pair(&mut self) -> Result<Option<SequencePair>> {
        let r1 = self.next_record(0)?;
        let r2 = self.next_record(1)?;

        let pair = match (r1, r2) {
            (None, None) => return Ok(None),
            (Some((name, r1)), Some((_, r2))) => SequencePair::new(name, r1, r2),
            (Some(_), None) => Err(Error::UnpairedRead {
                origin: self.readers[1].1.clone(),
                idx: self.idx,
            })?,
            (None, Some(_)) => Err(Error::UnpairedRead {
                origin: self.readers[0].1.clone(),
                idx: self.idx,
            })?,
        };
        self.idx += 1;

        Ok(Some(pair))
    }
}

/// In-memory pairs.
#[derive(Debug, Clone, Default)]
pub struct VecPairSource {
    pairs: VecDeque<SequencePair>,
}

impl VecPairSource {
    pub fn new(pairs: impl IntoIterator<Item = SequencePair>) -> Self {
        Self {
            pairs: pairs.into_iter().collect(),
        }
    }
}

impl PairSource for VecPairSource {
    fn next_pair(&mut self) -> Result<Option<SequencePair>> {
        Ok(self.pairs.pop_front())
    }
}
