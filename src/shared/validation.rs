use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Opaque stored filename: 32 lowercase hex chars, underscore, unix timestamp, `.php`
    /// - Valid: "0f1e2d3c4b5a69788796a5b4c3d2e1f0_1700000000.php"
    /// - Invalid: "../secret.php", "report.pdf", "ABC_1.php"
    pub static ref STORED_NAME_REGEX: Regex = Regex::new(r"^[0-9a-f]{32}_[0-9]+\.php$").unwrap();

    /// Characters not allowed in a sanitized filename
    pub static ref UNSAFE_FILENAME_CHARS: Regex = Regex::new(r"[^a-zA-Z0-9._-]").unwrap();

    /// File extension entry as accepted in settings: lowercase alphanumeric
    pub static ref EXTENSION_REGEX: Regex = Regex::new(r"^[a-z0-9]{1,10}$").unwrap();
}

/// Replace every character outside `[a-zA-Z0-9._-]` with `_` and strip leading dots.
///
/// Used for the `Content-Disposition` filename and for names written to the
/// incoming directory by the multipart endpoint.
pub fn sanitize_filename(name: &str) -> String {
    // Only the final path segment is kept
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned = UNSAFE_FILENAME_CHARS.replace_all(base, "_");
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Lowercased extension of a filename without the dot, if any.
pub fn extension_of(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let (stem, ext) = base.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fake::faker::filesystem::en::{FileName, FilePath};
    use fake::Fake;

    #[test]
    fn test_stored_name_regex() {
        assert!(STORED_NAME_REGEX.is_match("0f1e2d3c4b5a69788796a5b4c3d2e1f0_1700000000.php"));
        assert!(!STORED_NAME_REGEX.is_match("../0f1e2d3c4b5a69788796a5b4c3d2e1f0_1.php"));
        assert!(!STORED_NAME_REGEX.is_match("report.pdf"));
        assert!(!STORED_NAME_REGEX.is_match("0F1E2D3C4B5A69788796A5B4C3D2E1F0_1.php"));
        assert!(!STORED_NAME_REGEX.is_match(""));
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("report 2024 (final).pdf"), "report_2024__final_.pdf");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\Users\\me\\cv.docx"), "cv.docx");
        assert_eq!(sanitize_filename(".htaccess"), "htaccess");
        assert_eq!(sanitize_filename("\"quoted\".txt"), "_quoted_.txt");
        assert_eq!(sanitize_filename(""), "file");
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("Photo.JPG"), Some("jpg".to_string()));
        assert_eq!(extension_of("archive.tar.gz"), Some("gz".to_string()));
        assert_eq!(extension_of("README"), None);
        assert_eq!(extension_of(".bashrc"), None);
        assert_eq!(extension_of("dir.d/noext"), None);
    }

    #[test]
    fn test_extension_regex() {
        assert!(EXTENSION_REGEX.is_match("pdf"));
        assert!(EXTENSION_REGEX.is_match("7z"));
        assert!(!EXTENSION_REGEX.is_match(".pdf"));
        assert!(!EXTENSION_REGEX.is_match("PDF"));
    }

    #[test]
    fn test_sanitized_generated_names_are_safe() {
        let safe = Regex::new(r"^[a-zA-Z0-9_-][a-zA-Z0-9._-]*$").unwrap();
        for _ in 0..50 {
            let name: String = FileName().fake();
            let path: String = FilePath().fake();
            for candidate in [name, path] {
                let sanitized = sanitize_filename(&candidate);
                assert!(safe.is_match(&sanitized), "{candidate} -> {sanitized}");
            }
        }
    }
}
