//! Best-effort image format/dimension detection from raw bytes, so the
//! image selector (spec.md §4.5) can score a candidate without a full
//! image-decoding dependency. Reads only the header bytes a tiny
//! range-GET would return.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
    WebP,
    Gif,
    Svg,
    Ico,
    Unknown,
}

impl ImageFormat {
    /// Format score contribution (spec.md §4.5): JPEG/WebP +5; GIF/SVG/ICO
    /// disqualify outright.
    pub fn is_disqualifying(&self) -> bool {
        matches!(self, ImageFormat::Gif | ImageFormat::Svg | ImageFormat::Ico)
    }

    pub fn score_bonus(&self) -> i32 {
        match self {
            ImageFormat::Jpeg | ImageFormat::WebP => 5,
            _ => 0,
        }
    }
}

pub fn detect_format(bytes: &[u8]) -> ImageFormat {
    if bytes.len() >= 3 && bytes[0] == 0xFF && bytes[1] == 0xD8 && bytes[2] == 0xFF {
        return ImageFormat::Jpeg;
    }
    if bytes.len() >= 8 && bytes[0..8] == [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A] {
        return ImageFormat::Png;
    }
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return ImageFormat::WebP;
    }
    if bytes.len() >= 4 && (&bytes[0..4] == b"GIF8") {
        return ImageFormat::Gif;
    }
    if bytes.len() >= 4 && bytes[0] == 0 && bytes[1] == 0 && bytes[2] == 1 && bytes[3] == 0 {
        return ImageFormat::Ico;
    }
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(256)]);
    if head.contains("<svg") || head.contains("<?xml") {
        return ImageFormat::Svg;
    }
    ImageFormat::Unknown
}

/// Parses pixel dimensions from a PNG `IHDR` chunk or a JPEG `SOFn` marker.
/// Returns `None` for formats without header-decodable dimensions (WebP's
/// VP8 payload needs a heavier parser than is worth carrying here) or when
/// the buffer was truncated before the relevant marker.
pub fn parse_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    match detect_format(bytes) {
        ImageFormat::Png => parse_png_dimensions(bytes),
        ImageFormat::Jpeg => parse_jpeg_dimensions(bytes),
        _ => None,
    }
}

fn parse_png_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    if bytes.len() < 24 {
        return None;
    }
    let width = u32::from_be_bytes(bytes[16..20].try_into().ok()?);
    let height = u32::from_be_bytes(bytes[20..24].try_into().ok()?);
    Some((width, height))
}

fn parse_jpeg_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    let mut i = 2;
    while i + 9 < bytes.len() {
        if bytes[i] != 0xFF {
            i += 1;
            continue;
        }
        let marker = bytes[i + 1];
        let is_sof = (0xC0..=0xCF).contains(&marker) && ![0xC4, 0xC8, 0xCC].contains(&marker);
        if is_sof {
            let height = u16::from_be_bytes([bytes[i + 5], bytes[i + 6]]) as u32;
            let width = u16::from_be_bytes([bytes[i + 7], bytes[i + 8]]) as u32;
            return Some((width, height));
        }
        let len = u16::from_be_bytes([bytes[i + 2], bytes[i + 3]]) as usize;
        if len < 2 {
            break;
        }
        i += 2 + len;
    }
    None
}
