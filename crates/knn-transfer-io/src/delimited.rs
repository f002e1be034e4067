//! Minimal delimited-text (CSV/TSV) reading and writing.
//!
//! Fields may be double-quoted; a quote inside a quoted field is written as
//! two quotes. Quoted fields may span lines.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use flate2::read::MultiGzDecoder;

use crate::error::{IoError, Result};

/// Field separator of a delimited file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Delimiter {
    #[default]
    Comma,
    Tab,
}

impl Delimiter {
    /// Infers the delimiter from a file name: `.tsv`/`.tab` (optionally
    /// followed by `.gz`) means tab, anything else comma.
    pub fn from_path(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let name = name.strip_suffix(".gz").unwrap_or(&name);
        if name.ends_with(".tsv") || name.ends_with(".tab") {
            Self::Tab
        } else {
            Self::Comma
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Self::Comma => ',',
            Self::Tab => '\t',
        }
    }
}

/// A parsed file: header fields and data records with their line numbers.
#[derive(Debug, Clone, PartialEq)]
pub struct Records {
    pub header: Vec<String>,
    pub rows: Vec<(usize, Vec<String>)>,
}

/// Opens a file for buffered reading, decompressing `.gz` files.
pub fn open(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = File::open(path).map_err(|e| IoError::io(path, e))?;
    let is_gzip = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"));

    if is_gzip {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Reads a header line and every non-empty data record.
///
/// A record starts on a new line and continues over line breaks inside
/// quoted fields; its line number is the line it starts on. Every record
/// must have as many fields as the header. `source` is only used in error
/// messages.
pub fn read_records<R: BufRead>(reader: R, delimiter: Delimiter, source: &Path) -> Result<Records> {
    let mut header: Option<Vec<String>> = None;
    let mut rows = Vec::new();
    let mut pending: Option<(usize, String)> = None;

    for (i, line) in reader.lines().enumerate() {
        let line_no = i + 1;
        let line = line.map_err(|e| IoError::io(source, e))?;
        let line = line.trim_end_matches('\r');

        let (start, record) = match pending.take() {
            Some((start, mut record)) => {
                record.push('\n');
                record.push_str(line);
                (start, record)
            }
            None if line.trim().is_empty() => continue,
            None => (line_no, line.to_string()),
        };

        let (fields, open_quote) = split_fields(&record, delimiter);
        if open_quote {
            pending = Some((start, record));
            continue;
        }

        match &header {
            None => header = Some(fields),
            Some(h) => {
                if fields.len() != h.len() {
                    return Err(IoError::malformed(
                        source,
                        start,
                        format!("expected {} fields, found {}", h.len(), fields.len()),
                    ));
                }
                rows.push((start, fields));
            }
        }
    }

    if let Some((start, _)) = pending {
        return Err(IoError::malformed(source, start, "unterminated quoted field"));
    }
    let header = header.ok_or_else(|| IoError::malformed(source, 1, "missing header line"))?;
    Ok(Records { header, rows })
}

/// Splits one complete record into fields, honouring double quotes.
pub fn split_line(line: &str, delimiter: Delimiter) -> std::result::Result<Vec<String>, String> {
    match split_fields(line, delimiter) {
        (_, true) => Err("unterminated quoted field".to_string()),
        (fields, false) => Ok(fields),
    }
}

/// Splits `text` into fields; the flag is set when a quoted field is still open
/// at the end of the text.
fn split_fields(text: &str, delimiter: Delimiter) -> (Vec<String>, bool) {
    let sep = delimiter.as_char();
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut chars = text.chars().peekable();
    let mut in_quotes = false;

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    field.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(c);
            }
        } else if c == '"' && field.is_empty() {
            in_quotes = true;
        } else if c == sep {
            fields.push(std::mem::take(&mut field));
        } else {
            field.push(c);
        }
    }

    fields.push(field);
    (fields, in_quotes)
}

/// Quotes a field if it contains the delimiter, a quote or a line break.
pub fn escape_field(field: &str, delimiter: Delimiter) -> String {
    let needs_quotes = field.contains(delimiter.as_char())
        || field.contains('"')
        || field.contains('\n')
        || field.contains('\r');
    if needs_quotes {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn delimiter_from_path() {
        assert_eq!(Delimiter::from_path(Path::new("ref.csv")), Delimiter::Comma);
        assert_eq!(Delimiter::from_path(Path::new("ref.tsv")), Delimiter::Tab);
        assert_eq!(Delimiter::from_path(Path::new("ref.TSV.gz")), Delimiter::Tab);
        assert_eq!(Delimiter::from_path(Path::new("ref.csv.gz")), Delimiter::Comma);
    }

    #[test]
    fn split_plain_and_quoted() {
        assert_eq!(split_line("a,b,,c", Delimiter::Comma).unwrap(), vec!["a", "b", "", "c"]);
        assert_eq!(
            split_line(r#"c1,"CD4+, naive","say ""hi""""#, Delimiter::Comma).unwrap(),
            vec!["c1", "CD4+, naive", r#"say "hi""#]
        );
        assert_eq!(split_line("a\tb c", Delimiter::Tab).unwrap(), vec!["a", "b c"]);
        assert!(split_line(r#"a,"open"#, Delimiter::Comma).is_err());
    }

    #[test]
    fn escape_roundtrips_through_split() {
        let fields = ["plain", "with,comma", "with \"quote\""];
        let line = fields
            .iter()
            .map(|f| escape_field(f, Delimiter::Comma))
            .collect::<Vec<_>>()
            .join(",");
        assert_eq!(split_line(&line, Delimiter::Comma).unwrap(), fields);
    }

    #[test]
    fn read_records_skips_blank_lines() {
        let text = "id,x\r\nc0,1.0\n\nc1,2.0\n";
        let records = read_records(Cursor::new(text), Delimiter::Comma, Path::new("t.csv")).unwrap();
        assert_eq!(records.header, vec!["id", "x"]);
        assert_eq!(records.rows.len(), 2);
        assert_eq!(records.rows[1], (4, vec!["c1".to_string(), "2.0".to_string()]));
    }

    #[test]
    fn read_records_reports_short_rows() {
        let text = "id,x,y\nc0,1.0\n";
        let err = read_records(Cursor::new(text), Delimiter::Comma, Path::new("t.csv")).unwrap_err();
        assert!(matches!(err, IoError::Malformed { line: 2, .. }));
    }

    #[test]
    fn read_records_joins_quoted_line_breaks() {
        let text = "id,label\nq0,\"T\ncell\"\n\nq1,\"B\r\n\r\ncell\"\nq2,NK\n";
        let records = read_records(Cursor::new(text), Delimiter::Comma, Path::new("t.csv")).unwrap();
        assert_eq!(records.rows.len(), 3);
        assert_eq!(records.rows[0], (2, vec!["q0".to_string(), "T\ncell".to_string()]));
        assert_eq!(records.rows[1], (5, vec!["q1".to_string(), "B\n\ncell".to_string()]));
        assert_eq!(records.rows[2].0, 8);
    }

    #[test]
    fn read_records_reports_unterminated_quote() {
        let text = "id,label\nq0,\"open\nq1,B\n";
        let err = read_records(Cursor::new(text), Delimiter::Comma, Path::new("t.csv")).unwrap_err();
        assert!(matches!(err, IoError::Malformed { line: 2, ref reason, .. } if reason.contains("unterminated")));
    }

    #[test]
    fn open_decompresses_gzip() {
        use std::io::Write;

        use flate2::write::GzEncoder;
        use flate2::Compression;

        let dir = std::env::temp_dir().join(format!("knn-transfer-io-open-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let text = "id\tx\nc0\t1.5\nc1\t2.5\n";

        let gz_path = dir.join("emb.tsv.gz");
        let mut encoder = GzEncoder::new(File::create(&gz_path).unwrap(), Compression::default());
        encoder.write_all(text.as_bytes()).unwrap();
        encoder.finish().unwrap();

        let plain_path = dir.join("emb.tsv");
        std::fs::write(&plain_path, text).unwrap();

        for path in [&gz_path, &plain_path] {
            let records =
                read_records(open(path).unwrap(), Delimiter::from_path(path), path).unwrap();
            assert_eq!(records.header, vec!["id", "x"]);
            assert_eq!(records.rows[1].1, vec!["c1", "2.5"]);
        }

        assert!(matches!(
            open(&dir.join("missing.csv")).err(),
            Some(IoError::Io { .. })
        ));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn read_records_requires_header() {
        let err = read_records(Cursor::new("\n\n"), Delimiter::Comma, Path::new("t.csv")).unwrap_err();
        assert!(matches!(err, IoError::Malformed { .. }));
    }
}
