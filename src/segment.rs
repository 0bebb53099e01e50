//! Window Segmenter: overlapping, bounded-length slices of extracted text.
//!
//! Long documents cannot fit one inference context, so text is cut into
//! windows of `window_size` chars advancing by `stride` chars. The overlap
//! (`window_size - stride`) keeps facts straddling a boundary visible in at
//! least one window.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SegmentError {
    #[error("stride must satisfy 0 < stride <= window_size (got {stride} / {window_size})")]
    InvalidStride { window_size: usize, stride: usize },
}

/// One bounded slice of a document's text. Offsets are char indices into the
/// extracted text, not byte offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    pub fingerprint: String,
    pub index: usize,
    pub start_char: usize,
    pub end_char: usize,
    pub text: String,
}

/// Split `text` into ordered windows. Deterministic for the same inputs:
/// empty text yields no windows, text shorter than `window_size` yields
/// exactly one, and the final window is truncated, never padded.
pub fn segment(
    fingerprint: &str,
    text: &str,
    window_size: usize,
    stride: usize,
) -> Result<Vec<Window>, SegmentError> {
    if stride == 0 || stride > window_size {
        return Err(SegmentError::InvalidStride {
            window_size,
            stride,
        });
    }

    // Windows are cut by scanning byte offsets of char boundaries, never by
    // materializing the text as a char vector: peak memory stays at one
    // window regardless of document size.
    let mut windows = Vec::new();
    let mut start_char = 0usize;
    let mut start_byte = 0usize;
    let mut index = 0usize;

    while start_byte < text.len() {
        let rest = &text[start_byte..];
        let mut chars_taken = 0usize;
        let mut window_bytes = rest.len();
        let mut stride_bytes = None;
        for (offset, _) in rest.char_indices() {
            if chars_taken == stride {
                stride_bytes = Some(offset);
            }
            if chars_taken == window_size {
                window_bytes = offset;
                break;
            }
            chars_taken += 1;
        }

        windows.push(Window {
            fingerprint: fingerprint.to_string(),
            index,
            start_char,
            end_char: start_char + chars_taken,
            text: rest[..window_bytes].to_string(),
        });
        if window_bytes == rest.len() {
            break;
        }
        // stride <= window_size, so the stride boundary was reached before
        // the window boundary; the fallback is unreachable but total.
        start_byte += stride_bytes.unwrap_or(window_bytes);
        start_char += stride;
        index += 1;
    }

    Ok(windows)
}
