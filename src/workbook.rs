//! Minimal OOXML spreadsheet (`.xlsx`) reading and writing.
//!
//! Reading returns the first worksheet as a dense grid of strings, resolving
//! shared strings (including rich-text runs), inline strings, and raw
//! values. Writing produces a single styled sheet: bold bordered header,
//! bordered cells, optional wrap-text columns, and column widths of
//! `min(80, longest cell + 5)`.

use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::Path;

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;
/// Maximum cells to read from a sheet.
const MAX_CELLS: usize = 1_000_000;
/// Excel's sheet limits.
const MAX_ROWS: usize = 1_048_576;
const MAX_COLUMNS: usize = 16_384;
const MAX_COLUMN_WIDTH: usize = 80;
const COLUMN_PADDING: usize = 5;

// Style indices into cellXfs in STYLES_XML.
const STYLE_HEADER: u32 = 1;
const STYLE_BORDERED: u32 = 2;
const STYLE_WRAPPED: u32 = 3;

/// Workbook error (read or write). Callers decide whether to skip or abort.
#[derive(Debug)]
pub enum WorkbookError {
    Zip(String),
    Xml(String),
    MissingPart(String),
    Io(std::io::Error),
}

impl std::fmt::Display for WorkbookError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkbookError::Zip(e) => write!(f, "xlsx container error: {}", e),
            WorkbookError::Xml(e) => write!(f, "xlsx XML error: {}", e),
            WorkbookError::MissingPart(p) => write!(f, "xlsx part not found: {}", p),
            WorkbookError::Io(e) => write!(f, "xlsx I/O error: {}", e),
        }
    }
}

impl std::error::Error for WorkbookError {}

impl From<std::io::Error> for WorkbookError {
    fn from(e: std::io::Error) -> Self {
        WorkbookError::Io(e)
    }
}

impl From<zip::result::ZipError> for WorkbookError {
    fn from(e: zip::result::ZipError) -> Self {
        WorkbookError::Zip(e.to_string())
    }
}

impl From<quick_xml::Error> for WorkbookError {
    fn from(e: quick_xml::Error) -> Self {
        WorkbookError::Xml(e.to_string())
    }
}

/// A single worksheet to be written.
#[derive(Debug, Clone, Default)]
pub struct Sheet {
    pub title: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Zero-based column indices whose body cells wrap text.
    pub wrap_columns: Vec<usize>,
}

impl Sheet {
    pub fn new(title: &str, headers: &[&str]) -> Self {
        Self {
            title: title.to_string(),
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
            wrap_columns: Vec::new(),
        }
    }

    pub fn wrap_column(mut self, col: usize) -> Self {
        self.wrap_columns.push(col);
        self
    }

    pub fn push_row(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    fn column_count(&self) -> usize {
        self.rows
            .iter()
            .map(Vec::len)
            .chain(std::iter::once(self.headers.len()))
            .max()
            .unwrap_or(0)
    }

    /// Column widths: longest cell (in characters) plus padding, capped.
    pub fn column_widths(&self) -> Vec<usize> {
        (0..self.column_count())
            .map(|col| {
                let longest = std::iter::once(&self.headers)
                    .chain(self.rows.iter())
                    .filter_map(|r| r.get(col))
                    .map(|v| v.chars().count())
                    .max()
                    .unwrap_or(0);
                (longest + COLUMN_PADDING).min(MAX_COLUMN_WIDTH)
            })
            .collect()
    }
}

// ============ Reading ============

/// Read the first worksheet of an xlsx file into rows of cell text.
///
/// Rows are dense: missing cells become empty strings and blank rows are
/// kept so that row positions match the sheet.
pub fn read_first_sheet(bytes: &[u8]) -> Result<Vec<Vec<String>>, WorkbookError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))?;
    let shared_strings = read_shared_strings(&mut archive)?;
    let sheet_name = list_worksheet_names(&archive)
        .into_iter()
        .next()
        .ok_or_else(|| WorkbookError::MissingPart("xl/worksheets/sheet*.xml".to_string()))?;
    let xml = read_zip_entry_bounded(&mut archive, &sheet_name)?;
    read_sheet_cells(&xml, &shared_strings, MAX_CELLS)
}

/// Read the first worksheet and return each body row as a header → value map.
///
/// The first non-blank row is the header row. Header names are trimmed.
pub fn read_records(bytes: &[u8]) -> Result<Vec<HashMap<String, String>>, WorkbookError> {
    let rows = read_first_sheet(bytes)?;
    let mut iter = rows
        .into_iter()
        .skip_while(|r| r.iter().all(|c| c.trim().is_empty()));
    let headers: Vec<String> = match iter.next() {
        Some(h) => h.into_iter().map(|c| c.trim().to_string()).collect(),
        None => return Ok(Vec::new()),
    };
    Ok(iter
        .filter(|r| r.iter().any(|c| !c.trim().is_empty()))
        .map(|row| {
            headers
                .iter()
                .enumerate()
                .filter(|(_, h)| !h.is_empty())
                .map(|(i, h)| (h.clone(), row.get(i).cloned().unwrap_or_default()))
                .collect()
        })
        .collect())
}

pub fn read_records_from_path(path: &Path) -> anyhow::Result<Vec<HashMap<String, String>>> {
    use anyhow::Context;
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read workbook: {}", path.display()))?;
    read_records(&bytes).with_context(|| format!("Failed to parse workbook: {}", path.display()))
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
) -> Result<Vec<u8>, WorkbookError> {
    let entry = archive
        .by_name(name)
        .map_err(|_| WorkbookError::MissingPart(name.to_string()))?;
    let mut out = Vec::new();
    entry.take(MAX_XML_ENTRY_BYTES).read_to_end(&mut out)?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(WorkbookError::Zip(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, MAX_XML_ENTRY_BYTES
        )));
    }
    Ok(out)
}

fn read_shared_strings(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
) -> Result<Vec<String>, WorkbookError> {
    if archive.index_for_name("xl/sharedStrings.xml").is_none() {
        return Ok(Vec::new());
    }
    let xml = read_zip_entry_bounded(archive, "xl/sharedStrings.xml")?;
    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    let mut buf = Vec::new();
    let mut current: Option<String> = None;
    let mut in_t = false;
    // Phonetic runs (<rPh>) repeat text that is not part of the value.
    let mut in_rph = false;
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"rPh" => in_rph = true,
                b"t" => in_t = !in_rph,
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Event::Text(te) if in_t => {
                if let Some(s) = current.as_mut() {
                    s.push_str(&te.unescape().map_err(quick_xml::Error::from)?);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"si" => strings.push(current.take().unwrap_or_default()),
                b"rPh" => in_rph = false,
                b"t" => in_t = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

fn list_worksheet_names(archive: &zip::ZipArchive<std::io::Cursor<&[u8]>>) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("xl/worksheets/sheet") && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches("xl/worksheets/sheet")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

#[derive(Default)]
struct CellState {
    col: usize,
    kind: CellKind,
    text: String,
}

#[derive(Default, Clone, Copy, PartialEq, Eq)]
enum CellKind {
    #[default]
    Value,
    Shared,
    Inline,
}

fn read_sheet_cells(
    xml: &[u8],
    shared_strings: &[String],
    max_cells: usize,
) -> Result<Vec<Vec<String>>, WorkbookError> {
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut cell: Option<CellState> = None;
    let mut in_text = false;
    let mut current_row = 0usize;
    let mut next_col = 0usize;
    let mut cell_count = 0usize;
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"row" => {
                    let idx = attr(&e, b"r")
                        .and_then(|r| r.parse::<usize>().ok())
                        .map(|r| r.saturating_sub(1))
                        .unwrap_or(rows.len());
                    if idx >= MAX_ROWS {
                        return Err(WorkbookError::Xml(format!(
                            "row {} exceeds the sheet limit of {} rows",
                            idx + 1,
                            MAX_ROWS
                        )));
                    }
                    while rows.len() <= idx {
                        rows.push(Vec::new());
                    }
                    current_row = idx;
                    next_col = 0;
                }
                b"c" => {
                    let state = start_cell(&e, next_col)?;
                    next_col = state.col + 1;
                    cell = Some(state);
                }
                b"v" | b"t" => in_text = cell.is_some(),
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"c" => {
                next_col = start_cell(&e, next_col)?.col + 1;
            }
            Event::Text(te) if in_text => {
                if let Some(state) = cell.as_mut() {
                    state.text.push_str(&te.unescape().map_err(quick_xml::Error::from)?);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"v" | b"t" => in_text = false,
                b"c" => {
                    if let Some(state) = cell.take() {
                        if cell_count == max_cells {
                            return Err(WorkbookError::Xml(format!(
                                "worksheet exceeds {} cells",
                                max_cells
                            )));
                        }
                        let value = resolve_cell(state.kind, &state.text, shared_strings);
                        while rows.len() <= current_row {
                            rows.push(Vec::new());
                        }
                        let row = &mut rows[current_row];
                        if row.len() <= state.col {
                            row.resize(state.col + 1, String::new());
                        }
                        row[state.col] = value;
                        cell_count += 1;
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(rows)
}

fn start_cell(e: &BytesStart<'_>, fallback_col: usize) -> Result<CellState, WorkbookError> {
    let col = match attr(e, b"r") {
        Some(r) => column_index(&r)?.unwrap_or(fallback_col),
        None => fallback_col,
    };
    if col >= MAX_COLUMNS {
        return Err(WorkbookError::Xml(format!(
            "column {} exceeds the sheet limit of {} columns",
            col + 1,
            MAX_COLUMNS
        )));
    }
    let kind = match attr(e, b"t").as_deref() {
        Some("s") => CellKind::Shared,
        Some("inlineStr") => CellKind::Inline,
        _ => CellKind::Value,
    };
    Ok(CellState {
        col,
        kind,
        text: String::new(),
    })
}

fn resolve_cell(kind: CellKind, text: &str, shared_strings: &[String]) -> String {
    match kind {
        CellKind::Shared => text
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|i| shared_strings.get(i).cloned())
            .unwrap_or_default(),
        CellKind::Inline | CellKind::Value => text.to_string(),
    }
}

fn attr(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

/// Zero-based column index from a cell reference such as `"AB12"`.
///
/// `None` when the reference has no column letters.
fn column_index(reference: &str) -> Result<Option<usize>, WorkbookError> {
    let mut n = 0usize;
    let mut letters = 0usize;
    for c in reference.chars().take_while(|c| c.is_ascii_alphabetic()) {
        letters += 1;
        let digit = c.to_ascii_uppercase() as usize - 'A' as usize + 1;
        n = n
            .checked_mul(26)
            .and_then(|n| n.checked_add(digit))
            .filter(|n| *n <= MAX_COLUMNS)
            .ok_or_else(|| {
                WorkbookError::Xml(format!("cell reference {} is out of range", reference))
            })?;
    }
    if letters == 0 {
        return Ok(None);
    }
    Ok(Some(n - 1))
}

/// Column letters for a zero-based index (`0` → `"A"`, `27` → `"AB"`).
fn column_letters(mut index: usize) -> String {
    let mut out = Vec::new();
    loop {
        out.push((b'A' + (index % 26) as u8) as char);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    out.iter().rev().collect()
}

// ============ Writing ============

const CONTENT_TYPES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/><Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/></Types>"#;

const ROOT_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const WORKBOOK_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/></Relationships>"#;

// cellXfs: 0 default, 1 bold + thin border, 2 thin border, 3 thin border + wrap.
const STYLES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><fonts count="2"><font><sz val="11"/><name val="Calibri"/></font><font><b/><sz val="11"/><name val="Calibri"/></font></fonts><fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills><borders count="2"><border><left/><right/><top/><bottom/><diagonal/></border><border><left style="thin"/><right style="thin"/><top style="thin"/><bottom style="thin"/><diagonal/></border></borders><cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs><cellXfs count="4"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/><xf numFmtId="0" fontId="1" fillId="0" borderId="1" xfId="0" applyFont="1" applyBorder="1"/><xf numFmtId="0" fontId="0" fillId="0" borderId="1" xfId="0" applyBorder="1"/><xf numFmtId="0" fontId="0" fillId="0" borderId="1" xfId="0" applyBorder="1" applyAlignment="1"><alignment wrapText="1"/></xf></cellXfs><cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles></styleSheet>"#;

/// Render a sheet as xlsx bytes.
pub fn to_xlsx_bytes(sheet: &Sheet) -> Result<Vec<u8>, WorkbookError> {
    let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    let parts: [(&str, String); 6] = [
        ("[Content_Types].xml", CONTENT_TYPES_XML.to_string()),
        ("_rels/.rels", ROOT_RELS_XML.to_string()),
        ("xl/workbook.xml", workbook_xml(&sheet.title)),
        ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS_XML.to_string()),
        ("xl/styles.xml", STYLES_XML.to_string()),
        ("xl/worksheets/sheet1.xml", worksheet_xml(sheet)),
    ];
    for (name, body) in parts {
        zip.start_file(name, options)?;
        zip.write_all(body.as_bytes())?;
    }
    Ok(zip.finish()?.into_inner())
}

/// Write a sheet to `path`, creating parent directories.
pub fn write_xlsx(path: &Path, sheet: &Sheet) -> anyhow::Result<()> {
    use anyhow::Context;
    let bytes = to_xlsx_bytes(sheet)
        .with_context(|| format!("Failed to render workbook: {}", path.display()))?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)
        .with_context(|| format!("Failed to write workbook: {}", path.display()))?;
    Ok(())
}

fn workbook_xml(title: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="{}" sheetId="1" r:id="rId1"/></sheets></workbook>"#,
        escape(&sheet_title(title))
    )
}

/// Excel limits sheet names to 31 characters and forbids `[]:*?/\`.
fn sheet_title(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter(|c| !matches!(c, '[' | ']' | ':' | '*' | '?' | '/' | '\\'))
        .take(31)
        .collect();
    if cleaned.trim().is_empty() {
        "Sheet1".to_string()
    } else {
        cleaned
    }
}

fn worksheet_xml(sheet: &Sheet) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#,
    );

    let widths = sheet.column_widths();
    if !widths.is_empty() {
        xml.push_str("<cols>");
        for (i, w) in widths.iter().enumerate() {
            xml.push_str(&format!(
                r#"<col min="{0}" max="{0}" width="{1}" customWidth="1"/>"#,
                i + 1,
                w
            ));
        }
        xml.push_str("</cols>");
    }

    xml.push_str("<sheetData>");
    push_row(&mut xml, 1, &sheet.headers, |_| STYLE_HEADER);
    for (i, row) in sheet.rows.iter().enumerate() {
        push_row(&mut xml, i + 2, row, |col| {
            if sheet.wrap_columns.contains(&col) {
                STYLE_WRAPPED
            } else {
                STYLE_BORDERED
            }
        });
    }
    xml.push_str("</sheetData></worksheet>");
    xml
}

fn push_row(xml: &mut String, row_num: usize, cells: &[String], style: impl Fn(usize) -> u32) {
    xml.push_str(&format!(r#"<row r="{}">"#, row_num));
    for (col, value) in cells.iter().enumerate() {
        xml.push_str(&format!(
            r#"<c r="{}{}" s="{}" t="inlineStr"><is><t xml:space="preserve">{}</t></is></c>"#,
            column_letters(col),
            row_num,
            style(col),
            escape(value.as_str())
        ));
    }
    xml.push_str("</row>");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_sheet() -> Sheet {
        let mut sheet = Sheet::new("CI to Repo Map", &["CI Number", "Repositories"]).wrap_column(1);
        sheet.push_row(vec!["CI00001234".into(), "alpha\nbeta & <gamma>".into()]);
        sheet.push_row(vec!["APM5555".into(), "delta".into()]);
        sheet
    }

    #[test]
    fn column_reference_conversion() {
        assert_eq!(column_index("A1").unwrap(), Some(0));
        assert_eq!(column_index("Z9").unwrap(), Some(25));
        assert_eq!(column_index("AA10").unwrap(), Some(26));
        assert_eq!(column_index("ab3").unwrap(), Some(27));
        assert_eq!(column_index("XFD1").unwrap(), Some(MAX_COLUMNS - 1));
        assert_eq!(column_index("12").unwrap(), None);
        assert_eq!(column_letters(0), "A");
        assert_eq!(column_letters(25), "Z");
        assert_eq!(column_letters(26), "AA");
        assert_eq!(column_letters(27), "AB");
        assert_eq!(column_letters(701), "ZZ");
        assert_eq!(column_letters(702), "AAA");
    }

    #[test]
    fn written_sheet_reads_back_with_multiline_cells() {
        let bytes = to_xlsx_bytes(&sample_sheet()).unwrap();
        let rows = read_first_sheet(&bytes).unwrap();
        assert_eq!(rows[0], vec!["CI Number", "Repositories"]);
        assert_eq!(rows[1], vec!["CI00001234", "alpha\nbeta & <gamma>"]);
        assert_eq!(rows[2], vec!["APM5555", "delta"]);
    }

    #[test]
    fn records_are_keyed_by_header() {
        let mut sheet = Sheet::new("Mapping", &["Repo Name", "Related CI Nums"]);
        sheet.push_row(vec!["org/alpha".into(), "CI1111".into()]);
        sheet.push_row(vec!["".into(), "".into()]);
        sheet.push_row(vec!["beta".into(), "N/A".into()]);
        let bytes = to_xlsx_bytes(&sheet).unwrap();

        let records = read_records(&bytes).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["Repo Name"], "org/alpha");
        assert_eq!(records[1]["Related CI Nums"], "N/A");
    }

    #[test]
    fn column_widths_are_capped() {
        let mut sheet = Sheet::new("S", &["A", "B"]);
        sheet.push_row(vec!["x".repeat(200), "abc".into()]);
        assert_eq!(sheet.column_widths(), vec![80, 6]);
    }

    #[test]
    fn styles_applied_per_row_kind() {
        let xml = worksheet_xml(&sample_sheet());
        assert!(xml.contains(r#"<c r="A1" s="1""#));
        assert!(xml.contains(r#"<c r="A2" s="2""#));
        assert!(xml.contains(r#"<c r="B2" s="3""#));
        assert!(xml.contains(r#"<col min="2" max="2" width="25" customWidth="1"/>"#));
    }

    #[test]
    fn shared_strings_with_rich_text_and_gaps() {
        // Hand-built workbook resembling what Excel writes: shared strings,
        // a rich-text run, a numeric cell, and a skipped column.
        let shared = r#"<?xml version="1.0"?><sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><si><t>Repo Name</t></si><si><t>Related CI Nums</t></si><si><r><t>pay</t></r><r><t>ments</t></r></si></sst>"#;
        let sheet = r#"<?xml version="1.0"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData><row r="1"><c r="A1" t="s"><v>0</v></c><c r="C1" t="s"><v>1</v></c></row><row r="3"><c r="A3" t="s"><v>2</v></c><c r="C3"><v>42</v></c></row></sheetData></worksheet>"#;
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        let opts = zip::write::SimpleFileOptions::default();
        zip.start_file("xl/sharedStrings.xml", opts).unwrap();
        zip.write_all(shared.as_bytes()).unwrap();
        zip.start_file("xl/worksheets/sheet1.xml", opts).unwrap();
        zip.write_all(sheet.as_bytes()).unwrap();
        let bytes = zip.finish().unwrap().into_inner();

        let rows = read_first_sheet(&bytes).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], vec!["Repo Name", "", "Related CI Nums"]);
        assert!(rows[1].is_empty());
        assert_eq!(rows[2], vec!["payments", "", "42"]);

        let records = read_records(&bytes).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["Repo Name"], "payments");
        assert_eq!(records[0]["Related CI Nums"], "42");
    }

    fn sheet_only_workbook(sheet_data: &str) -> Vec<u8> {
        let sheet = format!(
            r#"<?xml version="1.0"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>{}</sheetData></worksheet>"#,
            sheet_data
        );
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        let opts = zip::write::SimpleFileOptions::default();
        zip.start_file("xl/worksheets/sheet1.xml", opts).unwrap();
        zip.write_all(sheet.as_bytes()).unwrap();
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn overlong_column_reference_is_an_error() {
        assert!(matches!(column_index("XFE1"), Err(WorkbookError::Xml(_))));
        assert!(matches!(
            column_index("AAAAAAAAAAAAAAAA1"),
            Err(WorkbookError::Xml(_))
        ));

        let bytes =
            sheet_only_workbook(r#"<row r="1"><c r="AAAAAAAAAAAAAAAA1"><v>1</v></c></row>"#);
        let err = read_first_sheet(&bytes).unwrap_err();
        assert!(err.to_string().contains("AAAAAAAAAAAAAAAA1"));
    }

    #[test]
    fn row_beyond_sheet_limit_is_an_error() {
        let bytes =
            sheet_only_workbook(r#"<row r="300000000"><c r="A300000000"><v>1</v></c></row>"#);
        let err = read_first_sheet(&bytes).unwrap_err();
        assert!(matches!(err, WorkbookError::Xml(_)));
        assert!(err.to_string().contains("300000000"));
    }

    #[test]
    fn last_allowed_row_and_column_are_read() {
        let bytes = sheet_only_workbook(r#"<row r="3"><c r="XFD3"><v>edge</v></c></row>"#);
        let rows = read_first_sheet(&bytes).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2].len(), MAX_COLUMNS);
        assert_eq!(rows[2][MAX_COLUMNS - 1], "edge");
    }

    #[test]
    fn cell_limit_is_an_error_not_a_truncation() {
        let xml = br#"<worksheet><sheetData><row r="1"><c r="A1"><v>a</v></c><c r="B1"><v>b</v></c></row><row r="2"><c r="A2"><v>c</v></c></row></sheetData></worksheet>"#;
        let rows = read_sheet_cells(xml, &[], 3).unwrap();
        assert_eq!(rows.len(), 2);

        let err = read_sheet_cells(xml, &[], 2).unwrap_err();
        assert!(err.to_string().contains("exceeds 2 cells"));
    }

    #[test]
    fn invalid_zip_returns_error() {
        let err = read_first_sheet(b"not a zip").unwrap_err();
        assert!(matches!(err, WorkbookError::Zip(_)));
    }

    #[test]
    fn sheet_title_is_sanitized() {
        assert_eq!(sheet_title("a/b:c"), "abc");
        assert_eq!(sheet_title(""), "Sheet1");
        assert_eq!(sheet_title(&"x".repeat(40)).len(), 31);
    }
}
