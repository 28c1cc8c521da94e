use csv::{ReaderBuilder, StringRecord, Trim};
use serde::Deserialize;

use std::path::Path;

use crate::errors::*;
use crate::patterns::*;
use crate::pipeline::{LengthWindow, OverlapStatus};

pub fn check_valid_name(b: &[u8]) -> Option<&[u8]> {
    if b.is_empty() {
        return None;
    }

    for &c in b {
        match c {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_' | b'-' | b'.' => (),
            _ => return None,
        }
    }

    Some(b)
}

/// Primers and barcodes may only hold IUPAC nucleotide codes.
pub fn check_valid_primer(b: &[u8], owner: &str) -> Result<()> {
    let valid = !b.is_empty()
        && b.iter().all(|c| {
            matches!(
                c.to_ascii_uppercase(),
                b'A' | b'C'
                    | b'G'
                    | b'T'
                    | b'U'
                    | b'N'
                    | b'R'
                    | b'Y'
                    | b'S'
                    | b'W'
                    | b'K'
                    | b'M'
                    | b'B'
                    | b'D'
                    | b'H'
                    | b'V'
            )
        });

    if valid {
        Ok(())
    } else {
        Err(Error::Parse {
            string: utf8(b),
            context: format!("the sequence for \"{owner}\""),
            reason: "expected a non-empty sequence of IUPAC nucleotide codes",
        })
    }
}

fn file_err(path: &Path, e: impl std::error::Error + Send + Sync + 'static) -> Error {
    Error::FileIo {
        file: path.to_owned(),
        source: Box::new(e),
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Targets,
    Barcodes,
}

fn section_header(first_cell: &str) -> Option<Section> {
    match first_cell.to_ascii_lowercase().as_str() {
        "target" | "gene" | "genename" => Some(Section::Targets),
        "id" | "mid" | "midname" | "barcode" => Some(Section::Barcodes),
        _ => None,
    }
}

/// Parse an id file: a target section (`target forward reverse`) and an optional barcode
/// section (`id barcode`), each introduced by its own header row.
pub fn read_id_file(path: impl AsRef<Path>, delim: u8) -> Result<Catalog> {
    let path = path.as_ref();
    let mut rdr = ReaderBuilder::new()
        .delimiter(delim)
        .comment(Some(b'#'))
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_path(path)
        .map_err(|e| file_err(path, e))?;

    let mut catalog = Catalog::new();
    let mut section = None;
    let context = format!("id file \"{}\"", path.display());

    for record in rdr.records() {
        let record = record.map_err(|e| file_err(path, e))?;
        let Some(first) = record.get(0).filter(|c| !c.is_empty()) else {
            continue;
        };

        if let Some(s) = section_header(first) {
            section = Some(s);
            continue;
        }

        match section {
            Some(Section::Targets) => {
                let forward = required_field(&record, 1, &context, "missing forward primer")?;
                let reverse = field(&record, 2).map(|r| r.as_bytes());
                catalog.add_target(first, forward, reverse)?;
            }
            Some(Section::Barcodes) => {
                let barcode = required_field(&record, 1, &context, "missing barcode sequence")?;
                catalog.add_barcode(first, barcode)?;
            }
            None => Err(Error::Parse {
                string: first.to_owned(),
                context: context.clone(),
                reason: "row appears before a target or barcode header",
            })?,
        }
    }

    if catalog.targets().is_empty() {
        return Err(Error::NoTargets);
    }

    Ok(catalog)
}

fn field(record: &StringRecord, i: usize) -> Option<&str> {
    record.get(i).filter(|c| !c.is_empty())
}

fn required_field<'a>(
    record: &'a StringRecord,
    i: usize,
    context: &str,
    reason: &'static str,
) -> Result<&'a str> {
    field(record, i).ok_or_else(|| Error::Parse {
        string: record.iter().collect::<Vec<_>>().join(" "),
        context: context.to_owned(),
        reason,
    })
}

#[derive(Debug, Deserialize)]
struct LenCutOffRecord {
    #[serde(alias = "geneName", alias = "gene")]
    target: String,
    #[serde(alias = "minLen")]
    minlen: usize,
    #[serde(alias = "maxLen")]
    maxlen: usize,
    #[serde(default, alias = "r2MinLen")]
    r2minlen: Option<usize>,
    #[serde(default, alias = "r2MaxLen")]
    r2maxlen: Option<usize>,
}

/// Parse a length cutoff file with a `target minlen maxlen` header and optional `r2minlen`
/// and `r2maxlen` columns. Without the R2 columns the same window is used for both mates.
pub fn read_len_cut_offs(
    path: impl AsRef<Path>,
    mark_only: bool,
) -> Result<Vec<(String, LenCutOffs)>> {
    let path = path.as_ref();
    let mut rdr = ReaderBuilder::new()
        .delimiter(b'\t')
        .comment(Some(b'#'))
        .trim(Trim::All)
        .from_path(path)
        .map_err(|e| file_err(path, e))?;

    let mut res = Vec::new();

    for record in rdr.deserialize() {
        let r: LenCutOffRecord = record.map_err(|e| file_err(path, e))?;
        let r1 = LengthWindow::new(r.minlen, r.maxlen);
        let r2 = LengthWindow::new(r.r2minlen.unwrap_or(r.minlen), r.r2maxlen.unwrap_or(r.maxlen));

        for w in [r1, r2] {
            if w.min > w.max {
                return Err(Error::Parse {
                    string: format!("{} {} {}", r.target, w.min, w.max),
                    context: format!("length cutoff file \"{}\"", path.display()),
                    reason: "minimum length is larger than maximum length",
                });
            }
        }

        res.push((r.target, LenCutOffs { r1, r2, mark_only }));
    }

    Ok(res)
}

#[derive(Debug, Deserialize)]
struct OverlapStatusRecord {
    #[serde(alias = "geneName", alias = "gene")]
    target: String,
    #[serde(alias = "overlapStatus")]
    status: String,
}

/// Parse an overlap status file with a `target status` header.
pub fn read_overlap_statuses(path: impl AsRef<Path>) -> Result<Vec<(String, OverlapStatus)>> {
    let path = path.as_ref();
    let mut rdr = ReaderBuilder::new()
        .delimiter(b'\t')
        .comment(Some(b'#'))
        .trim(Trim::All)
        .from_path(path)
        .map_err(|e| file_err(path, e))?;

    let mut res = Vec::new();

    for record in rdr.deserialize() {
        let r: OverlapStatusRecord = record.map_err(|e| file_err(path, e))?;
        let status = r.status.parse::<OverlapStatus>().map_err(|reason| Error::Parse {
            string: r.status.clone(),
            context: format!("overlap status file \"{}\"", path.display()),
            reason,
        })?;
        res.push((r.target, status));
    }

    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;

    fn write_tmp(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn id_file_with_both_sections() {
        let f = write_tmp(
            "target\tforward\treverse\n\
             T2\tACGTACGT\tTTGGCCAA\n\
             T1\tGATTACA\n\
             # comment\n\
             id\tbarcode\n\
             MID01\tACGT\n\
             MID02\tTGCA\n",
        );
        let c = read_id_file(f.path(), b'\t').unwrap();
        assert_eq!(c.target_names(), vec!["T1", "T2"]);
        assert!(c.target("T1").unwrap().reverse.is_none());
        assert_eq!(c.target("T2").unwrap().reverse.as_deref(), Some(b"TTGGCCAA".as_slice()));
        assert_eq!(c.barcodes().len(), 2);
        assert_eq!(c.barcodes()[1].bases, b"TGCA");
    }

    #[test]
    fn id_file_without_targets_fails() {
        let f = write_tmp("id\tbarcode\nMID01\tACGT\n");
        assert!(matches!(read_id_file(f.path(), b'\t'), Err(Error::NoTargets)));
    }

    #[test]
    fn id_file_rows_need_a_header() {
        let f = write_tmp("T1\tACGT\n");
        assert!(matches!(read_id_file(f.path(), b'\t'), Err(Error::Parse { .. })));
    }

    #[test]
    fn len_cut_offs_default_r2_to_r1() {
        let f = write_tmp("target\tminlen\tmaxlen\nT1\t100\t150\n");
        let c = read_len_cut_offs(f.path(), false).unwrap();
        assert_eq!(c.len(), 1);
        assert_eq!(c[0].1.r2, LengthWindow::new(100, 150));
    }

    #[test]
    fn len_cut_offs_reject_inverted_window() {
        let f = write_tmp("target\tminlen\tmaxlen\nT1\t200\t150\n");
        assert!(read_len_cut_offs(f.path(), false).is_err());
    }

    #[test]
    fn overlap_statuses_parse_case_insensitively() {
        let f = write_tmp("target\tstatus\nT1\tnooverlap\nT2\tR1ENDSINR2\n");
        let s = read_overlap_statuses(f.path()).unwrap();
        assert_eq!(s[0].1, OverlapStatus::NoOverlap);
        assert_eq!(s[1].1, OverlapStatus::R1EndsInR2);
    }
}
