//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

/// Calculate the dimensions needed to fit an image within a longer-edge cap.
///
/// Returns `None` when the image already fits (no resize needed), otherwise
/// the scaled `(width, height)` preserving aspect ratio, with the longer
/// edge equal to `max_edge`. Dimensions never round down to zero.
///
/// # Examples
/// ```
/// # use pixlift::imaging::fit_within;
/// // 4000x3000 landscape capped at 1920 → 1920x1440
/// assert_eq!(fit_within((4000, 3000), 1920), Some((1920, 1440)));
///
/// // Already inside the cap → no resize
/// assert_eq!(fit_within((1280, 960), 1920), None);
/// ```
pub fn fit_within(original: (u32, u32), max_edge: u32) -> Option<(u32, u32)> {
    let (width, height) = original;
    let longer = width.max(height);
    if longer <= max_edge || longer == 0 {
        return None;
    }

    let scale = max_edge as f64 / longer as f64;
    let scaled_w = ((width as f64 * scale).round() as u32).max(1);
    let scaled_h = ((height as f64 * scale).round() as u32).max(1);
    Some((scaled_w, scaled_h))
}
