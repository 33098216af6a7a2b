//! Minimal Office Open XML workbook writer.
//!
//! A workbook is a zip archive of SpreadsheetML parts. Only the worksheet is
//! generated per export; the package parts around it are fixed. Cells use
//! inline strings so no shared-string table is needed.

use std::io::{Cursor, Write};

use barscan_storage::StoredScan;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::ExportError;

/// Worksheet name shown in the workbook tab.
pub const SHEET_NAME: &str = "Scan Records";

/// Header row, in column order.
pub const EXPORT_HEADERS: [&str; 4] = ["ID", "Barcode", "Scanned At", "Notes"];

const COLUMNS: [&str; 4] = ["A", "B", "C", "D"];

const EXPORT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const SPREADSHEET_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";

const CONTENT_TYPES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#;

const ROOT_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const WORKBOOK_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#;

fn workbook_xml() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="{SPREADSHEET_NS}" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="{SHEET_NAME}" sheetId="1" r:id="rId1"/></sheets></workbook>"#
    )
}

#[derive(Clone, Copy)]
enum Cell<'a> {
    Number(i64),
    Text(&'a str),
}

/// Renders scans as an `.xlsx` workbook with a single worksheet.
///
/// With no scans the sheet still carries one blank data row under the
/// header, so the column layout survives in spreadsheet tools.
pub fn render_scans_xlsx(scans: &[StoredScan]) -> Result<Vec<u8>, ExportError> {
    let sheet = render_sheet(scans)?;
    let workbook = workbook_xml();

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

    for (name, body) in [
        ("[Content_Types].xml", CONTENT_TYPES_XML.as_bytes()),
        ("_rels/.rels", ROOT_RELS_XML.as_bytes()),
        ("xl/workbook.xml", workbook.as_bytes()),
        ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS_XML.as_bytes()),
        ("xl/worksheets/sheet1.xml", sheet.as_slice()),
    ] {
        zip.start_file(name, options)?;
        zip.write_all(body)?;
    }

    Ok(zip.finish()?.into_inner())
}

fn render_sheet(scans: &[StoredScan]) -> Result<Vec<u8>, ExportError> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    write(
        &mut writer,
        Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))),
    )?;
    write(
        &mut writer,
        Event::Start(BytesStart::new("worksheet").with_attributes([("xmlns", SPREADSHEET_NS)])),
    )?;
    write(&mut writer, Event::Start(BytesStart::new("sheetData")))?;

    write_row(&mut writer, 1, &EXPORT_HEADERS.map(Cell::Text))?;

    if scans.is_empty() {
        write_row(&mut writer, 2, &[Cell::Text(""); 4])?;
    }

    for (index, scan) in scans.iter().enumerate() {
        let scanned_at = scan.scanned_at.format(EXPORT_TIME_FORMAT).to_string();
        let cells = [
            Cell::Number(scan.id),
            Cell::Text(&scan.barcode),
            Cell::Text(&scanned_at),
            Cell::Text(scan.notes.as_deref().unwrap_or("")),
        ];
        write_row(&mut writer, index + 2, &cells)?;
    }

    write(&mut writer, Event::End(BytesEnd::new("sheetData")))?;
    write(&mut writer, Event::End(BytesEnd::new("worksheet")))?;

    Ok(writer.into_inner().into_inner())
}

fn write_row(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    row: usize,
    cells: &[Cell<'_>],
) -> Result<(), ExportError> {
    let row_ref = row.to_string();
    write(
        writer,
        Event::Start(BytesStart::new("row").with_attributes([("r", row_ref.as_str())])),
    )?;

    for (column, cell) in COLUMNS.iter().zip(cells) {
        let cell_ref = format!("{column}{row}");
        match cell {
            Cell::Number(value) => {
                write(
                    writer,
                    Event::Start(
                        BytesStart::new("c").with_attributes([("r", cell_ref.as_str())]),
                    ),
                )?;
                write(writer, Event::Start(BytesStart::new("v")))?;
                write(writer, Event::Text(BytesText::new(&value.to_string())))?;
                write(writer, Event::End(BytesEnd::new("v")))?;
            }
            Cell::Text(text) => {
                write(
                    writer,
                    Event::Start(
                        BytesStart::new("c")
                            .with_attributes([("r", cell_ref.as_str()), ("t", "inlineStr")]),
                    ),
                )?;
                write(writer, Event::Start(BytesStart::new("is")))?;
                write(
                    writer,
                    Event::Start(
                        BytesStart::new("t").with_attributes([("xml:space", "preserve")]),
                    ),
                )?;
                let text = escape_control_chars(text);
                write(writer, Event::Text(BytesText::new(&text)))?;
                write(writer, Event::End(BytesEnd::new("t")))?;
                write(writer, Event::End(BytesEnd::new("is")))?;
            }
        }
        write(writer, Event::End(BytesEnd::new("c")))?;
    }

    write(writer, Event::End(BytesEnd::new("row")))
}

fn write(writer: &mut Writer<Cursor<Vec<u8>>>, event: Event<'_>) -> Result<(), ExportError> {
    writer
        .write_event(event)
        .map_err(|e| ExportError::Xml(e.to_string()))
}

/// Replaces characters XML 1.0 cannot carry with Excel's `_xHHHH_` escape.
///
/// Scanners emit control characters such as the GS1 group separator
/// (U+001D) inside barcodes; written raw they make the file unreadable.
fn escape_control_chars(text: &str) -> std::borrow::Cow<'_, str> {
    let is_valid = |c: char| {
        matches!(c, '\t' | '\n' | '\r') || (c >= ' ' && c != '\u{FFFE}' && c != '\u{FFFF}')
    };
    if text.chars().all(is_valid) {
        return std::borrow::Cow::Borrowed(text);
    }
    let mut escaped = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        if is_valid(c) {
            escaped.push(c);
        } else {
            escaped.push_str(&format!("_x{:04X}_", c as u32));
        }
    }
    std::borrow::Cow::Owned(escaped)
}
