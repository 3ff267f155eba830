//! RGBA -> BGR pixel conversion

/// Swap the first and third channel of every pixel and drop alpha.
///
/// `src` holds packed [R, G, B, A] pixels and `dst` receives packed [B, G, R].
/// Returns the number of pixels written. Trailing bytes that do not form a
/// whole pixel on either side are left untouched.
pub fn rgba_to_bgr(src: &[u8], dst: &mut [u8]) -> usize {
    debug_assert_eq!(src.len() / 4, dst.len() / 3);

    let mut pixels = 0;
    for (rgba, bgr) in src.chunks_exact(4).zip(dst.chunks_exact_mut(3)) {
        bgr[0] = rgba[2];
        bgr[1] = rgba[1];
        bgr[2] = rgba[0];
        pixels += 1;
    }
    pixels
}
