use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// A chapter file saved as `NNNN_<title>.txt`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterFile {
    pub index: i64,
    pub title: String,
    pub path: PathBuf,
}

impl ChapterFile {
    pub fn read(&self) -> Result<String> {
        fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read chapter file {}", self.path.display()))
    }
}

/// Split `0003_The Siege.txt` into `(3, "The Siege")`.
pub fn parse_file_name(name: &str) -> Option<(i64, String)> {
    let stem = name.strip_suffix(".txt")?;
    let (number, title) = stem.split_once('_')?;
    if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let index = number.parse().ok()?;
    Some((index, title.to_string()))
}

/// Chapter files under `dir`, ordered by chapter number then file name.
/// Files that do not follow the naming scheme are skipped.
pub fn list_chapters(dir: &Path) -> Result<Vec<ChapterFile>> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read chapters directory {}", dir.display()))?;

    let mut chapters = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            log::warn!("Skipping non UTF-8 file name {:?}", entry.path());
            continue;
        };
        match parse_file_name(name) {
            Some((index, title)) => chapters.push(ChapterFile {
                index,
                title,
                path: entry.path(),
            }),
            None => log::debug!("Skipping {name}: not a chapter file"),
        }
    }

    chapters.sort_by(|a, b| a.index.cmp(&b.index).then_with(|| a.path.cmp(&b.path)));
    Ok(chapters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn parses_numbered_file_names() {
        assert_eq!(
            parse_file_name("0000_Prologue.txt"),
            Some((0, "Prologue".to_string()))
        );
        assert_eq!(
            parse_file_name("0012_The Siege_Part 2.txt"),
            Some((12, "The Siege_Part 2".to_string()))
        );
        assert_eq!(parse_file_name("0001_.txt"), Some((1, String::new())));
    }

    #[test]
    fn rejects_other_files() {
        assert_eq!(parse_file_name("notes.txt"), None);
        assert_eq!(parse_file_name("0001_Prologue.md"), None);
        assert_eq!(parse_file_name("abcd_Prologue.txt"), None);
        assert_eq!(parse_file_name("-001_Prologue.txt"), None);
        assert_eq!(parse_file_name("_Prologue.txt"), None);
    }

    #[test]
    fn lists_chapters_in_numeric_order() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("0010_Ten.txt"), "ten").unwrap();
        fs::write(dir.path().join("0002_Two.txt"), "two").unwrap();
        fs::write(dir.path().join("0000_Prologue.txt"), "start").unwrap();
        fs::write(dir.path().join("settings.json"), "{}").unwrap();
        fs::create_dir(dir.path().join("0005_Dir.txt")).unwrap();

        let chapters = list_chapters(dir.path()).unwrap();
        let summary: Vec<(i64, &str)> = chapters
            .iter()
            .map(|c| (c.index, c.title.as_str()))
            .collect();
        assert_eq!(summary, vec![(0, "Prologue"), (2, "Two"), (10, "Ten")]);
        assert_eq!(chapters[1].read().unwrap(), "two");
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempdir().unwrap();
        let err = list_chapters(&dir.path().join("chapters")).unwrap_err();
        assert!(err.to_string().contains("chapters directory"));
    }
}
