//! Existing-file registry: which files are already on disk.
//!
//! Read-only. The path rule here is the one the executor writes with, so a
//! second run over an unchanged site skips everything the first run fetched.

use std::path::{Path, PathBuf};

use crate::classify::Category;

const SPREADSHEET_EXTENSIONS: [&str; 2] = ["xlsx", "xls"];

/// `<root>/<year>/<NN>_<Category>`
pub fn category_dir(root: &Path, year: i32, category: Category) -> PathBuf {
    root.join(year.to_string()).join(category.folder_name())
}

/// `<root>/<year>/<NN>_<Category>/<label>`
pub fn destination_path(root: &Path, year: i32, category: Category, label: &str) -> PathBuf {
    category_dir(root, year, category).join(label)
}

pub fn has_spreadsheet_extension(label: &str) -> bool {
    Path::new(label)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            SPREADSHEET_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// File name to store a download under: the label, plus the staged file's
/// extension (lower-cased, the form [`already_present`] looks for) when the
/// label has none of its own.
pub fn stored_file_name(label: &str, staged: &Path) -> String {
    if has_spreadsheet_extension(label) {
        return label.to_string();
    }
    match staged.extension().and_then(|ext| ext.to_str()) {
        Some(ext) => format!("{}.{}", label, ext.to_ascii_lowercase()),
        None => label.to_string(),
    }
}

pub fn already_present(root: &Path, year: i32, category: Category, label: &str) -> bool {
    let dest = destination_path(root, year, category, label);
    if dest.is_file() {
        return true;
    }
    if has_spreadsheet_extension(label) {
        return false;
    }
    let dir = category_dir(root, year, category);
    SPREADSHEET_EXTENSIONS
        .iter()
        .any(|ext| dir.join(format!("{}.{}", label, ext)).is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_path_is_deterministic() {
        let root = Path::new("/data/brimr");
        assert_eq!(
            destination_path(root, 2024, Category::ClinicalDepts, "Surgery Rankings.xlsx"),
            PathBuf::from("/data/brimr/2024/05_Clinical_Depts/Surgery Rankings.xlsx")
        );
    }

    #[test]
    fn test_already_present() {
        let root = tempfile::tempdir().unwrap();
        let label = "Surgery Rankings.xlsx";
        assert!(!already_present(root.path(), 2024, Category::ClinicalDepts, label));

        let dest = destination_path(root.path(), 2024, Category::ClinicalDepts, label);
        std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
        std::fs::write(&dest, b"xlsx").unwrap();

        assert!(already_present(root.path(), 2024, Category::ClinicalDepts, label));
        assert!(!already_present(root.path(), 2023, Category::ClinicalDepts, label));
        assert!(!already_present(root.path(), 2024, Category::Other, label));
    }

    #[test]
    fn test_label_without_extension_matches_stored_stem() {
        let root = tempfile::tempdir().unwrap();
        let dir = category_dir(root.path(), 2019, Category::PiRankings);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("Download PI list.xls"), b"xls").unwrap();

        assert!(already_present(root.path(), 2019, Category::PiRankings, "Download PI list"));
        assert!(!already_present(root.path(), 2019, Category::PiRankings, "Other list"));
    }

    #[test]
    fn test_stored_file_name() {
        assert_eq!(stored_file_name("a.xlsx", Path::new("/s/a (1).xlsx")), "a.xlsx");
        assert_eq!(stored_file_name("PI list", Path::new("/s/export.XLS")), "PI list.xls");
        assert_eq!(stored_file_name("PI list", Path::new("/s/export")), "PI list");
        assert!(has_spreadsheet_extension("x.XLSX"));
        assert!(!has_spreadsheet_extension("x.csv"));
    }
}
