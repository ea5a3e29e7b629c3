//! Privacy/fixed mask loading (PGM P5) and word-parallel AND/OR
//! application. Grounded on `original_source/alg.cpp`'s `alg_apply_mask`
//! for the algorithm; mask I/O uses the `image` crate's PNM decoder.

use std::path::Path;

use image::GenericImageView;

/// Loads a PGM mask and rescales (nearest-neighbour) to `width`x`height`,
/// returning a single luma byte per pixel.
pub fn load_mask(path: &Path, width: u32, height: u32) -> anyhow::Result<Vec<u8>> {
    let img = image::open(path)?;
    let resized = if img.width() != width || img.height() != height {
        img.resize_exact(width, height, image::imageops::FilterType::Nearest)
    } else {
        img
    };
    let luma = resized.to_luma8();
    Ok(luma.into_raw())
}

/// Builds the privacy "or mask" companion buffer: 0x80 at masked
/// positions (forces chroma to neutral grey), 0x00 elsewhere.
pub fn build_or_mask(mask: &[u8]) -> Vec<u8> {
    mask.iter().map(|&m| if m == 0 { 0x80 } else { 0x00 }).collect()
}

/// Applies a privacy mask to one frame's luma and chroma planes in place.
/// `mask` and `or_mask` are sized to the luma plane; `chroma` is half
/// resolution in each axis (YUV420P 4:2:0 subsampling) so each mask byte
/// covers a 2x2 luma block -- addressed here by simply subsampling the
/// mask index by 2 in each axis, matching the legacy word-aligned pass's
/// effective granularity.
pub fn apply_privacy_mask(
    luma: &mut [u8],
    chroma: &mut [u8],
    mask: &[u8],
    or_mask: &[u8],
    width: usize,
) {
    for (i, px) in luma.iter_mut().enumerate() {
        *px &= mask[i];
    }

    let chroma_width = width / 2;
    for (ci, px) in chroma.iter_mut().enumerate() {
        let cx = ci % chroma_width;
        let cy = ci / chroma_width;
        let luma_idx = (cy * 2) * width + cx * 2;
        if luma_idx < mask.len() {
            *px &= mask[luma_idx];
            *px |= or_mask[luma_idx];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn or_mask_marks_masked_positions() {
        let mask = vec![0u8, 255, 0, 255];
        let or_mask = build_or_mask(&mask);
        assert_eq!(or_mask, vec![0x80, 0x00, 0x80, 0x00]);
    }

    #[test]
    fn apply_privacy_mask_zeroes_luma_and_neutralises_chroma() {
        // 8x8 frame split: left half masked (cols 0-3), right half passes.
        let width = 8usize;
        let height = 8usize;
        let mut mask = vec![0u8; width * height];
        for y in 0..height {
            for x in 4..width {
                mask[y * width + x] = 255;
            }
        }
        let or_mask = build_or_mask(&mask);

        let mut luma = vec![0x66u8; width * height];
        let mut chroma = vec![0x20u8; (width / 2) * (height / 2)];

        apply_privacy_mask(&mut luma, &mut chroma, &mask, &or_mask, width);

        assert_eq!(luma[0], 0); // masked column
        assert_eq!(luma[4], 0x66); // passing column
        assert_eq!(chroma[0], 0x80); // masked chroma neutralised
        assert_eq!(chroma[2], 0x20); // passing chroma untouched
    }
}
