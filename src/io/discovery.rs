//! Locates the source workbooks of a period.
//!
//! A period's sources live either in a directory or in a zip archive of the
//! same name with a `.zip` suffix; the archive wins when both exist.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;
use zip::ZipArchive;

use crate::config::SearchPatterns;
use crate::error::Result;

/// Case-insensitive substring matching of a file name against the patterns.
///
/// Without optional files, any required pattern must occur. With optional
/// files, an optional pattern and a required pattern must both occur.
pub fn matches_patterns(file_name: &str, patterns: &SearchPatterns, include_optional: bool) -> bool {
    let name = file_name.to_lowercase();
    if name.starts_with("~$") {
        return false;
    }
    let contains = |pattern: &String| name.contains(&pattern.to_lowercase());
    let required = patterns.required.iter().any(contains);
    if include_optional {
        required && patterns.optional.iter().any(contains)
    } else {
        required
    }
}

/// Finds matching source files under `location`, extracting them first when
/// `location.zip` is an archive. Returns sorted absolute paths.
pub fn find_sources(
    location: &Path,
    patterns: &SearchPatterns,
    include_optional: bool,
) -> Result<Vec<PathBuf>> {
    let mut archive_path = OsString::from(location.as_os_str());
    archive_path.push(".zip");
    let archive_path = PathBuf::from(archive_path);

    let mut found = if archive_path.is_file() {
        match open_archive(&archive_path) {
            Some(archive) => extract_matching(archive, &archive_path, patterns, include_optional)?,
            None => walk_directory(location, patterns, include_optional)?,
        }
    } else {
        walk_directory(location, patterns, include_optional)?
    };

    found = found
        .into_iter()
        .map(std::path::absolute)
        .collect::<std::io::Result<Vec<_>>>()?;
    found.sort();
    Ok(found)
}

fn open_archive(path: &Path) -> Option<ZipArchive<BufReader<File>>> {
    let file = File::open(path).ok()?;
    match ZipArchive::new(BufReader::new(file)) {
        Ok(archive) => Some(archive),
        Err(error) => {
            warn!(archive = %path.display(), %error, "not a readable zip archive");
            None
        }
    }
}

fn extract_matching(
    mut archive: ZipArchive<BufReader<File>>,
    archive_path: &Path,
    patterns: &SearchPatterns,
    include_optional: bool,
) -> Result<Vec<PathBuf>> {
    let destination = archive_path.parent().unwrap_or(Path::new("."));
    let mut extracted = Vec::new();

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if entry.is_dir() {
            continue;
        }
        let Some(relative) = entry.enclosed_name() else {
            warn!(entry = entry.name(), "skipping archive entry outside the archive root");
            continue;
        };
        let file_name = relative
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        if !matches_patterns(&file_name, patterns, include_optional) {
            continue;
        }

        let target = destination.join(&relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut output = File::create(&target)?;
        std::io::copy(&mut entry, &mut output)?;
        debug!(file = %target.display(), "extracted source workbook");
        extracted.push(target);
    }

    Ok(extracted)
}

fn walk_directory(
    location: &Path,
    patterns: &SearchPatterns,
    include_optional: bool,
) -> Result<Vec<PathBuf>> {
    if !location.is_dir() {
        warn!(location = %location.display(), "no source directory or archive for period");
        return Ok(Vec::new());
    }

    let mut found = Vec::new();
    for entry in WalkDir::new(location) {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy();
        if matches_patterns(&file_name, patterns, include_optional) {
            found.push(entry.into_path());
        }
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::tempdir;
    use zip::write::SimpleFileOptions;

    use super::*;

    fn patterns() -> SearchPatterns {
        SearchPatterns {
            required: vec!["Свод".into()],
            optional: vec!["ГОС".into()],
        }
    }

    #[test]
    fn matching_is_case_insensitive_and_optional_needs_both() {
        let patterns = patterns();
        assert!(matches_patterns("2020_СВОД_вуз.xlsx", &patterns, false));
        assert!(!matches_patterns("other.xlsx", &patterns, false));
        assert!(!matches_patterns("~$свод.xlsx", &patterns, false));
        assert!(matches_patterns("свод_гос.xlsx", &patterns, true));
        assert!(!matches_patterns("свод.xlsx", &patterns, true));
        assert!(!matches_patterns("гос.xlsx", &patterns, true));
    }

    #[test]
    fn walks_period_directory_recursively() {
        let temp_dir = tempdir().expect("temporary directory");
        let period = temp_dir.path().join("VPO_1_2020");
        fs::create_dir_all(period.join("nested")).expect("dirs created");
        fs::write(period.join("nested").join("b_свод.xlsx"), b"x").expect("file written");
        fs::write(period.join("a_свод.xlsx"), b"x").expect("file written");
        fs::write(period.join("readme.txt"), b"x").expect("file written");

        let found = find_sources(&period, &patterns(), false).expect("sources found");
        let names: Vec<String> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a_свод.xlsx", "b_свод.xlsx"]);
        assert!(found.iter().all(|p| p.is_absolute()));
    }

    #[test]
    fn extracts_matching_entries_from_archive() {
        let temp_dir = tempdir().expect("temporary directory");
        let archive_path = temp_dir.path().join("VPO_1_2021.zip");
        let file = File::create(&archive_path).expect("archive created");
        let mut writer = zip::ZipWriter::new(file);
        for name in ["VPO_1_2021/свод_1.xlsx", "VPO_1_2021/прочее.xlsx"] {
            writer
                .start_file(name, SimpleFileOptions::default())
                .expect("entry started");
            writer.write_all(b"payload").expect("entry written");
        }
        writer.finish().expect("archive finished");

        let found = find_sources(&temp_dir.path().join("VPO_1_2021"), &patterns(), false)
            .expect("sources found");
        assert_eq!(found.len(), 1);
        assert!(found[0].ends_with("VPO_1_2021/свод_1.xlsx"));
        assert_eq!(fs::read(&found[0]).expect("extracted file read"), b"payload");
    }

    #[test]
    fn missing_location_yields_no_sources() {
        let temp_dir = tempdir().expect("temporary directory");
        let found = find_sources(&temp_dir.path().join("VPO_1_1999"), &patterns(), false)
            .expect("lookup succeeded");
        assert!(found.is_empty());
    }
}
