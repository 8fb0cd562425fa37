//! MIME detection and the upload allow-lists.
//!
//! Detection sniffs magic bytes first. Container formats that share a signature
//! (OOXML and ODF inside ZIP, legacy Office inside OLE2, MP4 family) are refined by
//! extension. Unknown content falls back to the extension table.

use crate::shared::constants::DEFAULT_MIME_TYPE;

/// Extensions accepted when no administrator override is saved
pub const DEFAULT_ALLOWED_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "gif", "png", "bmp", "mp3", "wav", "ogg", "oga", "wma", "mka", "m4a", "ra",
    "mid", "midi", "avi", "divx", "flv", "mov", "ogv", "mkv", "mp4", "m4v", "mpg", "mpeg", "mpe",
    "pdf", "doc", "ppt", "pps", "xls", "mdb", "docx", "xlsx", "pptx", "odt", "odp", "ods", "odg",
    "odc", "odb", "odf", "rtf", "txt", "zip", "gz", "gzip", "rar", "7z", "exe", "csv",
];

/// MIME types accepted for uploads
pub const ALLOWED_MIME_TYPES: &[&str] = &[
    // Images
    "image/jpeg",
    "image/pjpeg",
    "image/png",
    "image/gif",
    "image/bmp",
    // Audio
    "audio/mpeg",
    "audio/mp3",
    "audio/wav",
    "audio/x-wav",
    "audio/ogg",
    "audio/vorbis",
    "audio/x-vorbis",
    "audio/oga",
    "audio/x-ms-wma",
    "audio/x-m4a",
    "audio/mp4",
    "audio/x-realaudio",
    "audio/x-pn-realaudio",
    "audio/mid",
    "audio/midi",
    "audio/x-midi",
    "audio/x-matroska",
    // Video
    "video/x-msvideo",
    "video/avi",
    "video/msvideo",
    "video/x-flv",
    "video/quicktime",
    "video/ogg",
    "video/x-matroska",
    "video/mp4",
    "video/x-m4v",
    "video/mpeg",
    "video/x-mpeg",
    "video/mpe",
    "video/mpg",
    "video/x-ms-wmv",
    // PDF
    "application/pdf",
    // Documents
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-powerpoint",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.ms-access",
    "application/vnd.oasis.opendocument.text",
    "application/vnd.oasis.opendocument.presentation",
    "application/vnd.oasis.opendocument.spreadsheet",
    "application/vnd.oasis.opendocument.graphics",
    "application/vnd.oasis.opendocument.chart",
    "application/vnd.oasis.opendocument.database",
    "application/vnd.oasis.opendocument.formula",
    "application/rtf",
    "text/plain",
    "text/csv",
    // Archives
    "application/zip",
    "application/x-zip-compressed",
    "application/x-gzip",
    "application/gzip",
    "application/x-rar-compressed",
    "application/x-7z-compressed",
    // Executables
    "application/x-msdownload",
    "application/x-msdos-program",
    "application/x-ms-installer",
    "application/x-exe",
    "application/x-executable",
    "application/x-dosexec",
    "application/octet-stream",
];

/// Number of leading bytes needed for detection
pub const SNIFF_LEN: usize = 512;

pub fn is_mime_type_allowed(mime: &str) -> bool {
    ALLOWED_MIME_TYPES.contains(&mime)
}

/// MIME type for a lowercase extension.
pub fn mime_from_extension(ext: &str) -> Option<&'static str> {
    let mime = match ext {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" | "oga" => "audio/ogg",
        "wma" => "audio/x-ms-wma",
        "mka" => "audio/x-matroska",
        "m4a" => "audio/x-m4a",
        "ra" => "audio/x-realaudio",
        "mid" | "midi" => "audio/midi",
        "avi" | "divx" => "video/x-msvideo",
        "flv" => "video/x-flv",
        "mov" => "video/quicktime",
        "ogv" => "video/ogg",
        "mkv" => "video/x-matroska",
        "mp4" => "video/mp4",
        "m4v" => "video/x-m4v",
        "mpg" | "mpeg" | "mpe" => "video/mpeg",
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "ppt" | "pps" => "application/vnd.ms-powerpoint",
        "xls" => "application/vnd.ms-excel",
        "mdb" => "application/vnd.ms-access",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "odt" => "application/vnd.oasis.opendocument.text",
        "odp" => "application/vnd.oasis.opendocument.presentation",
        "ods" => "application/vnd.oasis.opendocument.spreadsheet",
        "odg" => "application/vnd.oasis.opendocument.graphics",
        "odc" => "application/vnd.oasis.opendocument.chart",
        "odb" => "application/vnd.oasis.opendocument.database",
        "odf" => "application/vnd.oasis.opendocument.formula",
        "rtf" => "application/rtf",
        "txt" => "text/plain",
        "csv" => "text/csv",
        "zip" => "application/zip",
        "gz" | "gzip" => "application/gzip",
        "rar" => "application/x-rar-compressed",
        "7z" => "application/x-7z-compressed",
        "exe" => "application/x-msdownload",
        _ => return None,
    };
    Some(mime)
}

/// Detect the MIME type from the first bytes of a file and its extension.
pub fn detect_mime(head: &[u8], ext: Option<&str>) -> &'static str {
    let by_ext = ext.and_then(mime_from_extension);

    if let Some(sniffed) = sniff(head) {
        return match sniffed {
            // Office Open XML and ODF are ZIP containers
            "application/zip" => match by_ext {
                Some(m) if m.contains("openxmlformats") || m.contains("opendocument") => m,
                _ => sniffed,
            },
            // Legacy Office documents are OLE2 compound files
            "application/x-ole-storage" => match by_ext {
                Some(m) if m.starts_with("application/vnd.ms-") || m == "application/msword" => m,
                _ => DEFAULT_MIME_TYPE,
            },
            "video/mp4" => match by_ext {
                Some(m @ ("audio/x-m4a" | "video/quicktime" | "video/x-m4v")) => m,
                _ => sniffed,
            },
            "audio/ogg" => match by_ext {
                Some(m @ "video/ogg") => m,
                _ => sniffed,
            },
            "video/x-matroska" => match by_ext {
                Some(m @ "audio/x-matroska") => m,
                _ => sniffed,
            },
            other => other,
        };
    }

    if looks_like_text(head) {
        return match by_ext {
            Some(m @ ("text/csv" | "text/plain")) => m,
            _ => "text/plain",
        };
    }

    by_ext.unwrap_or(DEFAULT_MIME_TYPE)
}

fn sniff(head: &[u8]) -> Option<&'static str> {
    const SIGNATURES: &[(&[u8], &str)] = &[
        (b"%PDF-", "application/pdf"),
        (b"\x89PNG\r\n\x1a\n", "image/png"),
        (b"\xff\xd8\xff", "image/jpeg"),
        (b"GIF87a", "image/gif"),
        (b"GIF89a", "image/gif"),
        (b"BM", "image/bmp"),
        (b"PK\x03\x04", "application/zip"),
        (b"PK\x05\x06", "application/zip"),
        (b"\x1f\x8b", "application/gzip"),
        (b"Rar!\x1a\x07", "application/x-rar-compressed"),
        (b"7z\xbc\xaf\x27\x1c", "application/x-7z-compressed"),
        (b"\xd0\xcf\x11\xe0\xa1\xb1\x1a\xe1", "application/x-ole-storage"),
        (b"{\\rtf", "application/rtf"),
        (b"ID3", "audio/mpeg"),
        (b"OggS", "audio/ogg"),
        (b"MThd", "audio/midi"),
        (b"\x1a\x45\xdf\xa3", "video/x-matroska"),
        (b"FLV\x01", "video/x-flv"),
        (b"MZ", "application/x-msdownload"),
        (b"\x00\x00\x01\xba", "video/mpeg"),
        (b"\x00\x00\x01\xb3", "video/mpeg"),
    ];

    for (magic, mime) in SIGNATURES {
        if head.starts_with(magic) {
            return Some(mime);
        }
    }

    if head.len() >= 12 && &head[0..4] == b"RIFF" {
        match &head[8..12] {
            b"WAVE" => return Some("audio/wav"),
            b"AVI " => return Some("video/x-msvideo"),
            _ => {}
        }
    }
    if head.len() >= 12 && &head[4..8] == b"ftyp" {
        return Some("video/mp4");
    }
    // MPEG audio frame sync without ID3 tag
    if head.len() >= 2 && head[0] == 0xff && (head[1] & 0xe0) == 0xe0 {
        return Some("audio/mpeg");
    }
    None
}

fn looks_like_text(head: &[u8]) -> bool {
    if head.is_empty() || head.contains(&0) {
        return false;
    }
    // A multi-byte sequence may be cut at the sniff boundary
    match std::str::from_utf8(head) {
        Ok(_) => true,
        Err(e) => e.error_len().is_none(),
    }
}
