//! Layout of the stored description.
//!
//! ```text
//! OCR:
//! <ocr text>
//! Caption:
//! <caption text>
//! ```

const OCR_HEADER: &str = "OCR:\n";
const CAPTION_HEADER: &str = "\nCaption:\n";

/// Build the description stored for an image.
pub fn compose(ocr: &str, caption: &str) -> String {
    format!("{OCR_HEADER}{ocr}{CAPTION_HEADER}{caption}")
}

/// Split a description back into `(ocr, caption)`.
///
/// The caption is taken after the last caption header, so OCR text that
/// happens to contain the header stays with the OCR part. The reverse case is
/// not recoverable: a caption that itself contains the header is cut at its
/// last occurrence and the head moves to the OCR part. Returns `None` for text
/// not produced by [`compose`].
pub fn split(description: &str) -> Option<(&str, &str)> {
    let body = description.strip_prefix(OCR_HEADER)?;
    let at = body.rfind(CAPTION_HEADER)?;
    Some((&body[..at], &body[at + CAPTION_HEADER.len()..]))
}
