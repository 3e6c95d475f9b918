//! Validation for uploaded transcript files.
//!
//! Checks run in two phases: metadata (name, declared type) before any bytes
//! are read, and content (signature, active-content markers) once the
//! buffer is complete. Size is enforced while streaming by the caller.

use thiserror::Error;

pub const PDF_SIGNATURE: &[u8; 4] = b"%PDF";

/// How many leading bytes are scanned for active-content markers.
pub const CONTENT_SCAN_LIMIT: usize = 1024 * 1024;

const MAX_FILENAME_BYTES: usize = 255;

const ACTIVE_CONTENT_MARKERS: &[&str] = &[
    "/JavaScript",
    "/Launch",
    "/SubmitForm",
    "/RichMedia",
    "/XFA",
];

const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

const EXECUTABLE_EXTENSIONS: &[&str] = &[
    "exe", "bat", "cmd", "com", "scr", "msi", "dll", "sh", "bash", "ps1", "vbs", "vbe", "js",
    "jse", "jar", "app", "php", "py", "pl",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadRejection {
    #[error("No file uploaded. Please select a PDF transcript.")]
    MissingFile,
    #[error("Only one file may be uploaded per request")]
    TooManyFiles,
    #[error("Unexpected file field '{0}'")]
    UnexpectedField(String),
    #[error("File size exceeds the {limit_mb} MB limit")]
    TooLarge { limit_mb: usize },
    #[error("Uploaded file is empty")]
    Empty,
    #[error("Invalid file type. Only PDF files are allowed")]
    InvalidMimeType,
    #[error("Invalid file extension. Only .pdf files are allowed")]
    InvalidExtension,
    #[error("Invalid filename")]
    InvalidFilename,
    #[error("Filename contains path traversal sequences")]
    PathTraversal,
    #[error("Filename uses a reserved device name")]
    ReservedName,
    #[error("Filename contains an executable extension")]
    ExecutableExtension,
    #[error("File content is not a valid PDF")]
    InvalidSignature,
    #[error("PDF contains disallowed active content ({0})")]
    ActiveContent(&'static str),
}

impl UploadRejection {
    /// Stable machine-readable reason for logs and clients.
    pub fn reason(&self) -> &'static str {
        match self {
            UploadRejection::MissingFile => "missing_file",
            UploadRejection::TooManyFiles => "too_many_files",
            UploadRejection::UnexpectedField(_) => "unexpected_field",
            UploadRejection::TooLarge { .. } => "file_too_large",
            UploadRejection::Empty => "empty_file",
            UploadRejection::InvalidMimeType => "invalid_mime_type",
            UploadRejection::InvalidExtension => "invalid_extension",
            UploadRejection::InvalidFilename => "invalid_filename",
            UploadRejection::PathTraversal => "path_traversal",
            UploadRejection::ReservedName => "reserved_name",
            UploadRejection::ExecutableExtension => "executable_extension",
            UploadRejection::InvalidSignature => "invalid_signature",
            UploadRejection::ActiveContent(_) => "active_content",
        }
    }

    pub fn too_large(limit_bytes: usize) -> Self {
        UploadRejection::TooLarge {
            limit_mb: limit_bytes / (1024 * 1024),
        }
    }
}

/// Validate the filename and declared MIME type of an upload.
pub fn validate_metadata(
    file_name: Option<&str>,
    content_type: Option<&str>,
) -> Result<(), UploadRejection> {
    let name = file_name
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or(UploadRejection::InvalidFilename)?;

    validate_filename(name)?;

    let essence = content_type
        .and_then(|ct| ct.parse::<mime::Mime>().ok())
        .map(|m| m.essence_str().to_ascii_lowercase());
    if essence.as_deref() != Some(mime::APPLICATION_PDF.essence_str()) {
        return Err(UploadRejection::InvalidMimeType);
    }

    Ok(())
}

fn validate_filename(name: &str) -> Result<(), UploadRejection> {
    if name.len() > MAX_FILENAME_BYTES || name.chars().any(|c| c.is_control()) {
        return Err(UploadRejection::InvalidFilename);
    }
    if name.contains("..") || name.contains('/') || name.contains('\\') || name.contains(':') {
        return Err(UploadRejection::PathTraversal);
    }

    let lower = name.to_ascii_lowercase();
    let mut parts = lower.split('.');
    let stem = parts.next().unwrap_or_default();
    let extensions: Vec<&str> = parts.collect();

    if RESERVED_NAMES
        .iter()
        .any(|reserved| stem.eq_ignore_ascii_case(reserved))
    {
        return Err(UploadRejection::ReservedName);
    }
    if extensions
        .iter()
        .any(|ext| EXECUTABLE_EXTENSIONS.contains(&ext.trim()))
    {
        return Err(UploadRejection::ExecutableExtension);
    }
    if extensions.last().copied() != Some("pdf") {
        return Err(UploadRejection::InvalidExtension);
    }

    Ok(())
}

/// Validate the bytes of a complete upload.
pub fn validate_content(data: &[u8]) -> Result<(), UploadRejection> {
    if data.is_empty() {
        return Err(UploadRejection::Empty);
    }
    if data.len() < PDF_SIGNATURE.len() || &data[..PDF_SIGNATURE.len()] != PDF_SIGNATURE {
        return Err(UploadRejection::InvalidSignature);
    }

    let window = &data[..data.len().min(CONTENT_SCAN_LIMIT)];
    for &marker in ACTIVE_CONTENT_MARKERS {
        if contains_bytes(window, marker.as_bytes()) {
            return Err(UploadRejection::ActiveContent(marker.trim_start_matches('/')));
        }
    }

    Ok(())
}

fn contains_bytes(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PDF: Option<&str> = Some("application/pdf");

    #[test]
    fn test_accepts_plain_pdf() {
        assert!(validate_metadata(Some("Weekly Sync.pdf"), PDF).is_ok());
        assert!(validate_metadata(Some("notes.PDF"), PDF).is_ok());
        assert!(validate_content(b"%PDF-1.7\n1 0 obj\n<< /Type /Catalog >>").is_ok());
    }

    #[test]
    fn test_filename_rules() {
        assert_eq!(
            validate_metadata(Some("../etc/passwd.pdf"), PDF),
            Err(UploadRejection::PathTraversal)
        );
        assert_eq!(
            validate_metadata(Some("dir\\notes.pdf"), PDF),
            Err(UploadRejection::PathTraversal)
        );
        assert_eq!(
            validate_metadata(Some("con.pdf"), PDF),
            Err(UploadRejection::ReservedName)
        );
        assert_eq!(
            validate_metadata(Some("LPT1.pdf"), PDF),
            Err(UploadRejection::ReservedName)
        );
        assert_eq!(
            validate_metadata(Some("invoice.exe.pdf"), PDF),
            Err(UploadRejection::ExecutableExtension)
        );
        assert_eq!(
            validate_metadata(Some("notes.txt"), PDF),
            Err(UploadRejection::InvalidExtension)
        );
        assert_eq!(
            validate_metadata(None, PDF),
            Err(UploadRejection::InvalidFilename)
        );
        assert_eq!(
            validate_metadata(Some(&format!("{}.pdf", "a".repeat(300))), PDF),
            Err(UploadRejection::InvalidFilename)
        );
    }

    #[test]
    fn test_mime_type_required() {
        assert_eq!(
            validate_metadata(Some("notes.pdf"), Some("text/plain")),
            Err(UploadRejection::InvalidMimeType)
        );
        assert_eq!(
            validate_metadata(Some("notes.pdf"), None),
            Err(UploadRejection::InvalidMimeType)
        );
    }

    #[test]
    fn test_signature_checked_regardless_of_declared_type() {
        assert_eq!(
            validate_content(b"PK\x03\x04 not a pdf"),
            Err(UploadRejection::InvalidSignature)
        );
        assert_eq!(validate_content(b"%PD"), Err(UploadRejection::InvalidSignature));
        assert_eq!(validate_content(b""), Err(UploadRejection::Empty));
    }

    #[test]
    fn test_active_content_rejected() {
        for (marker, name) in [
            ("/JavaScript", "JavaScript"),
            ("/Launch", "Launch"),
            ("/SubmitForm", "SubmitForm"),
            ("/RichMedia", "RichMedia"),
            ("/XFA", "XFA"),
        ] {
            let data = format!("%PDF-1.4\n<< /S {} >>", marker);
            assert_eq!(
                validate_content(data.as_bytes()),
                Err(UploadRejection::ActiveContent(name))
            );
        }
    }

    #[test]
    fn test_markers_beyond_scan_window_ignored() {
        let mut data = b"%PDF-1.4\n".to_vec();
        data.resize(CONTENT_SCAN_LIMIT + 10, b' ');
        data.extend_from_slice(b"/JavaScript");
        assert!(validate_content(&data).is_ok());
    }

    #[test]
    fn test_reasons_are_stable() {
        assert_eq!(UploadRejection::too_large(10 * 1024 * 1024).reason(), "file_too_large");
        assert_eq!(
            UploadRejection::too_large(10 * 1024 * 1024).to_string(),
            "File size exceeds the 10 MB limit"
        );
        assert_eq!(UploadRejection::InvalidSignature.reason(), "invalid_signature");
    }
}
