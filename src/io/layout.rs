//! Column widths straight from the xlsx package, which the cell reader does
//! not expose.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use zip::ZipArchive;

use crate::error::Result;
use crate::reference::MAX_COLUMN;

/// Width in pixels of one digit of the default font.
const MAX_DIGIT_WIDTH: f64 = 7.0;
/// Cell padding in pixels that the stored width includes.
const PADDING: f64 = 5.0;

/// Column widths (zero-based column → width in characters) per sheet name.
pub type SheetWidths = HashMap<String, BTreeMap<u16, f64>>;

/// Reads the `<col width>` entries of every worksheet in an xlsx file.
pub fn read_column_widths(path: &Path) -> Result<SheetWidths> {
    let file = File::open(path)?;
    let mut archive = ZipArchive::new(BufReader::new(file))?;

    let workbook_xml = read_part(&mut archive, "xl/workbook.xml")?;
    let rels_xml = read_part(&mut archive, "xl/_rels/workbook.xml.rels")?;
    let sheets = parse_sheet_ids(&workbook_xml)?;
    let targets = parse_relationships(&rels_xml)?;

    let mut widths = SheetWidths::new();
    for (name, relationship) in sheets {
        let Some(target) = targets.get(&relationship) else {
            continue;
        };
        let part = resolve_target(target);
        let Ok(sheet_xml) = read_part(&mut archive, &part) else {
            continue;
        };
        widths.insert(name, parse_column_widths(&sheet_xml)?);
    }
    Ok(widths)
}

fn read_part(archive: &mut ZipArchive<BufReader<File>>, name: &str) -> Result<String> {
    let mut file = archive.by_name(name)?;
    let mut content = String::new();
    file.read_to_string(&mut content)?;
    Ok(content)
}

/// Relationship targets are relative to `xl/` unless rooted.
fn resolve_target(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(rooted) => rooted.to_string(),
        None => format!("xl/{target}"),
    }
}

fn attribute(element: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>> {
    for attr in element.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        if attr.key.as_ref() == key {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

/// `(sheet name, relationship id)` in workbook order.
fn parse_sheet_ids(xml: &str) -> Result<Vec<(String, String)>> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut sheets = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"sheet" => {
                if let (Some(name), Some(id)) = (attribute(&e, b"name")?, attribute(&e, b"r:id")?)
                {
                    sheets.push((name, id));
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(sheets)
}

fn parse_relationships(xml: &str) -> Result<HashMap<String, String>> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut targets = HashMap::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                if let (Some(id), Some(target)) = (attribute(&e, b"Id")?, attribute(&e, b"Target")?)
                {
                    targets.insert(id, target);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(targets)
}

/// Converts a stored `<col width>` back to the character width that
/// produced it, so writing it again stores the same value.
fn character_width(stored: f64) -> f64 {
    let pixels = (stored * MAX_DIGIT_WIDTH).round();
    if pixels >= MAX_DIGIT_WIDTH + PADDING {
        (pixels - PADDING) / MAX_DIGIT_WIDTH
    } else {
        pixels / (MAX_DIGIT_WIDTH + PADDING)
    }
}

fn parse_column_widths(xml: &str) -> Result<BTreeMap<u16, f64>> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut widths = BTreeMap::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"col" => {
                let min = attribute(&e, b"min")?.and_then(|v| v.parse::<u32>().ok());
                let max = attribute(&e, b"max")?.and_then(|v| v.parse::<u32>().ok());
                let width = attribute(&e, b"width")?.and_then(|v| v.parse::<f64>().ok());
                if let (Some(min), Some(max), Some(width)) = (min, max, width) {
                    let width = character_width(width);
                    let last = max.min(MAX_COLUMN as u32 + 1);
                    for column in min.max(1)..=last {
                        widths.insert((column - 1) as u16, width);
                    }
                }
            }
            // Column definitions precede the cell data.
            Event::Start(e) if e.local_name().as_ref() == b"sheetData" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(widths)
}
