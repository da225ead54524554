//! MIME-type classification into source categories.
//!
//! Classification happens once per invocation and picks exactly one routine.
//! Types are compared on their essence (`type/subtype`), lowercased, with
//! parameters such as `; charset=utf-8` ignored.

use crate::error::DerivativeError;
use serde::{Deserialize, Serialize};
use std::fmt;

const IMAGE_TYPES: &[&str] = &[
    "image/png",
    "image/jpeg",
    "image/jpg",
    "image/jp2",
    "image/bmp",
    "image/gif",
    "image/tiff",
];

const PDF_TYPES: &[&str] = &["application/pdf"];

const OFFICE_TYPES: &[&str] = &[
    "text/rtf",
    "application/rtf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.oasis.opendocument.text",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.ms-powerpoint",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
];

const AUDIO_TYPES: &[&str] = &[
    "audio/mp3",
    "audio/mpeg",
    "audio/wav",
    "audio/x-wave",
    "audio/x-wav",
    "audio/ogg",
];

const VIDEO_TYPES: &[&str] = &[
    "video/mpeg",
    "video/mp4",
    "video/webm",
    "video/x-msvideo",
    "video/avi",
    "video/quicktime",
    "application/mxf",
];

/// The closed set of source categories, one routine each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MediaCategory {
    Image,
    Pdf,
    OfficeDocument,
    Audio,
    Video,
}

impl MediaCategory {
    pub const ALL: [MediaCategory; 5] = [
        MediaCategory::Image,
        MediaCategory::Pdf,
        MediaCategory::OfficeDocument,
        MediaCategory::Audio,
        MediaCategory::Video,
    ];

    /// Map a declared MIME type onto its category.
    ///
    /// # Errors
    /// [`DerivativeError::UnsupportedMimeType`] when the string does not parse
    /// or belongs to no category.
    pub fn classify(mime_type: &str) -> Result<Self, DerivativeError> {
        let unsupported = || DerivativeError::UnsupportedMimeType {
            mime: mime_type.to_string(),
        };
        let parsed: mime::Mime = mime_type.trim().parse().map_err(|_| unsupported())?;
        let essence = parsed.essence_str().to_ascii_lowercase();

        Self::ALL
            .into_iter()
            .find(|category| category.mime_types().contains(&essence.as_str()))
            .ok_or_else(unsupported)
    }

    /// Every MIME type (essence form) this category accepts.
    pub fn mime_types(self) -> &'static [&'static str] {
        match self {
            MediaCategory::Image => IMAGE_TYPES,
            MediaCategory::Pdf => PDF_TYPES,
            MediaCategory::OfficeDocument => OFFICE_TYPES,
            MediaCategory::Audio => AUDIO_TYPES,
            MediaCategory::Video => VIDEO_TYPES,
        }
    }
}

impl fmt::Display for MediaCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MediaCategory::Image => "image",
            MediaCategory::Pdf => "pdf",
            MediaCategory::OfficeDocument => "office-document",
            MediaCategory::Audio => "audio",
            MediaCategory::Video => "video",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_listed_type_classifies() {
        for category in MediaCategory::ALL {
            for mime in category.mime_types() {
                assert_eq!(MediaCategory::classify(mime).unwrap(), category, "{mime}");
            }
        }
    }

    #[test]
    fn sets_are_disjoint() {
        let mut seen = std::collections::HashSet::new();
        for category in MediaCategory::ALL {
            for mime in category.mime_types() {
                assert!(seen.insert(*mime), "{mime} listed twice");
            }
        }
    }

    #[test]
    fn parameters_and_case_are_ignored() {
        assert_eq!(
            MediaCategory::classify("Application/PDF; charset=binary").unwrap(),
            MediaCategory::Pdf
        );
        assert_eq!(
            MediaCategory::classify(" image/JPEG ").unwrap(),
            MediaCategory::Image
        );
    }

    #[test]
    fn unlisted_alias_is_rejected() {
        let err = MediaCategory::classify("image/x-ms-bmp").unwrap_err();
        assert!(matches!(err, DerivativeError::UnsupportedMimeType { .. }));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(MediaCategory::classify("not a mime").is_err());
        assert!(MediaCategory::classify("").is_err());
        assert!(MediaCategory::classify("text/plain").is_err());
    }
}
