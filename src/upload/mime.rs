//! Content types announced to the upload service in `set_metadata`

use std::path::Path;

/// Extension (lower-case, no dot) to content type
const MIME_TYPES: &[(&str, &str)] = &[
    ("aab", "application/x-authorware-bin"),
    ("apk", "application/vnd.android.package-archive"),
    ("appx", "application/x-appx"),
    ("appxbundle", "application/x-appxbundle"),
    ("appxupload", "application/vnd.ms-appx"),
    ("appxsym", "application/x-appxupload"),
    ("dmg", "application/x-apple-diskimage"),
    ("ipa", "application/octet-stream"),
    ("msi", "application/x-msi"),
    ("msix", "application/x-msix"),
    ("msixbundle", "application/x-msixbundle"),
    ("msixupload", "application/x-msixupload"),
    ("pkg", "application/vnd.apple.installer+xml"),
    ("zip", "application/zip"),
];

/// Look up the content type for a file by its extension
///
/// Returns `None` for unknown or missing extensions, in which case the
/// `content_type` parameter is left out of the request.
pub fn content_type_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    MIME_TYPES
        .iter()
        .find(|(known, _)| *known == ext)
        .map(|(_, mime)| *mime)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_extensions_resolve() {
        assert_eq!(
            content_type_for(Path::new("/out/app-release.apk")),
            Some("application/vnd.android.package-archive")
        );
        assert_eq!(
            content_type_for(Path::new("Build/App.IPA")),
            Some("application/octet-stream")
        );
    }

    #[test]
    fn unknown_or_missing_extension_has_no_type() {
        assert_eq!(content_type_for(Path::new("notes.txt")), None);
        assert_eq!(content_type_for(Path::new("Makefile")), None);
    }
}
