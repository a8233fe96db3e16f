//! In-memory decode and encode — pure Rust, zero external dependencies.
//!
//! All pipeline payloads live in memory; nothing here touches the
//! filesystem.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, TIFF, WebP, GIF, BMP) | `image` crate (pure Rust decoders) |
//! | Decode (HEIF family: heic/heif/avif) | `avif-parse` (container) + `rav1d` (AV1 decode) + custom YUV→RGB |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` at caller-chosen quality |
//!
//! HEIF caveat: `rav1d` decodes AV1-coded primary items (AVIF, and the
//! growing share of phones that produce AVIF). HEVC-coded HEIC has no pure
//! Rust decoder; the container parse fails and callers fall back to
//! passing the original through, which the normalizer's best-effort
//! contract allows.

use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use thiserror::Error;

use crate::types::extension_of;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("unrecognized source format")]
    Unrecognized,
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("encode failed: {0}")]
    Encode(String),
}

/// Format classes the normalizer distinguishes, detected from filename
/// extension and declared content type together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// Already the canonical encoding.
    Jpeg,
    /// An alternate web raster the `image` crate decodes directly.
    Raster(ImageFormat),
    /// HEIF container family (`heic`, `heif`, `avif`) — phone-camera
    /// territory, decoded via the container parser + AV1 decoder.
    HeifFamily,
    /// Nothing we know how to decode.
    Unknown,
}

/// Classify a file by extension first, declared type second.
///
/// The declared type alone is unreliable — phone-camera files routinely
/// arrive as `application/octet-stream` — so either signal is enough.
pub fn detect_format(name: &str, content_type: &str) -> SourceFormat {
    let by_extension = match extension_of(name).as_str() {
        "jpg" | "jpeg" => SourceFormat::Jpeg,
        "png" => SourceFormat::Raster(ImageFormat::Png),
        "webp" => SourceFormat::Raster(ImageFormat::WebP),
        "gif" => SourceFormat::Raster(ImageFormat::Gif),
        "bmp" => SourceFormat::Raster(ImageFormat::Bmp),
        "tif" | "tiff" => SourceFormat::Raster(ImageFormat::Tiff),
        "heic" | "heif" | "avif" => SourceFormat::HeifFamily,
        _ => SourceFormat::Unknown,
    };
    if by_extension != SourceFormat::Unknown {
        return by_extension;
    }

    match content_type.to_ascii_lowercase().as_str() {
        "image/jpeg" => SourceFormat::Jpeg,
        "image/png" => SourceFormat::Raster(ImageFormat::Png),
        "image/webp" => SourceFormat::Raster(ImageFormat::WebP),
        "image/gif" => SourceFormat::Raster(ImageFormat::Gif),
        "image/bmp" => SourceFormat::Raster(ImageFormat::Bmp),
        "image/tiff" => SourceFormat::Raster(ImageFormat::Tiff),
        "image/heic" | "image/heif" | "image/avif" => SourceFormat::HeifFamily,
        _ => SourceFormat::Unknown,
    }
}

/// Decode a payload of known format class into pixels.
pub fn decode(bytes: &[u8], format: SourceFormat) -> Result<DynamicImage, CodecError> {
    match format {
        SourceFormat::Jpeg => decode_with(bytes, ImageFormat::Jpeg),
        SourceFormat::Raster(image_format) => decode_with(bytes, image_format),
        SourceFormat::HeifFamily => decode_heif_family(bytes),
        SourceFormat::Unknown => Err(CodecError::Unrecognized),
    }
}

fn decode_with(bytes: &[u8], format: ImageFormat) -> Result<DynamicImage, CodecError> {
    image::load_from_memory_with_format(bytes, format)
        .map_err(|e| CodecError::Decode(e.to_string()))
}

/// Encode pixels as JPEG at the given quality (1–100).
pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, CodecError> {
    let rgb = img.to_rgb8();
    let mut buf = Vec::new();
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, quality);
    encoder
        .encode(
            rgb.as_raw(),
            rgb.width(),
            rgb.height(),
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|e| CodecError::Encode(e.to_string()))?;
    Ok(buf)
}

/// Decode a HEIF-family payload: parse the container with `avif-parse`,
/// then decode the primary item with `rav1d`.
///
/// The `image` crate's `"avif"` feature only provides the encoder (rav1e).
/// Decoding would require `"avif-native"` and the C library dav1d; `rav1d`
/// is its pure Rust port, driven directly. An HEVC-coded primary item
/// fails at the container parse and surfaces as a `Decode` error.
fn decode_heif_family(bytes: &[u8]) -> Result<DynamicImage, CodecError> {
    let parsed = avif_parse::read_avif(&mut Cursor::new(bytes))
        .map_err(|e| CodecError::Decode(format!("container parse failed: {e:?}")))?;
    decode_av1_item(&parsed.primary_item)
}

/// Decode one AV1-coded still image into RGB pixels.
fn decode_av1_item(av1_bytes: &[u8]) -> Result<DynamicImage, CodecError> {
    use rav1d::include::dav1d::data::Dav1dData;
    use rav1d::include::dav1d::dav1d::Dav1dSettings;
    use rav1d::include::dav1d::headers::{
        DAV1D_PIXEL_LAYOUT_I400, DAV1D_PIXEL_LAYOUT_I420, DAV1D_PIXEL_LAYOUT_I422,
        DAV1D_PIXEL_LAYOUT_I444,
    };
    use rav1d::include::dav1d::picture::Dav1dPicture;
    use std::ptr::NonNull;

    // One-shot decoder: a still image is a single temporal unit
    let mut settings = std::mem::MaybeUninit::<Dav1dSettings>::uninit();
    unsafe {
        rav1d::src::lib::dav1d_default_settings(NonNull::new(settings.as_mut_ptr()).unwrap())
    };
    let mut settings = unsafe { settings.assume_init() };
    settings.n_threads = 1;
    settings.max_frame_delay = 1;

    let mut ctx = None;
    let rc =
        unsafe { rav1d::src::lib::dav1d_open(NonNull::new(&mut ctx), NonNull::new(&mut settings)) };
    if rc.0 != 0 {
        return Err(CodecError::Decode(format!("av1 decoder open failed ({})", rc.0)));
    }

    let mut data = Dav1dData::default();
    let buf_ptr =
        unsafe { rav1d::src::lib::dav1d_data_create(NonNull::new(&mut data), av1_bytes.len()) };
    if buf_ptr.is_null() {
        unsafe { rav1d::src::lib::dav1d_close(NonNull::new(&mut ctx)) };
        return Err(CodecError::Decode("av1 data buffer allocation failed".into()));
    }
    unsafe { std::ptr::copy_nonoverlapping(av1_bytes.as_ptr(), buf_ptr, av1_bytes.len()) };

    let rc = unsafe { rav1d::src::lib::dav1d_send_data(ctx, NonNull::new(&mut data)) };
    if rc.0 != 0 {
        unsafe {
            rav1d::src::lib::dav1d_data_unref(NonNull::new(&mut data));
            rav1d::src::lib::dav1d_close(NonNull::new(&mut ctx));
        }
        return Err(CodecError::Decode(format!("av1 send_data failed ({})", rc.0)));
    }

    let mut pic: Dav1dPicture = unsafe { std::mem::zeroed() };
    let rc = unsafe { rav1d::src::lib::dav1d_get_picture(ctx, NonNull::new(&mut pic)) };
    if rc.0 != 0 {
        unsafe { rav1d::src::lib::dav1d_close(NonNull::new(&mut ctx)) };
        return Err(CodecError::Decode(format!("av1 get_picture failed ({})", rc.0)));
    }

    let width = pic.p.w as u32;
    let height = pic.p.h as u32;
    let bpc = pic.p.bpc as u32;
    let layout = pic.p.layout;
    let y_stride = pic.stride[0];
    let uv_stride = pic.stride[1];
    let y_ptr = pic.data[0].unwrap().as_ptr() as *const u8;

    let planes = if layout == DAV1D_PIXEL_LAYOUT_I400 {
        Ok(YuvPlanes {
            y_ptr,
            u_ptr: y_ptr,
            v_ptr: y_ptr,
            y_stride,
            uv_stride: 0,
            width,
            height,
            bpc,
            ss_x: false,
            ss_y: false,
            monochrome: true,
        })
    } else {
        let u_ptr = pic.data[1].unwrap().as_ptr() as *const u8;
        let v_ptr = pic.data[2].unwrap().as_ptr() as *const u8;
        match layout {
            DAV1D_PIXEL_LAYOUT_I420 => Ok((true, true)),
            DAV1D_PIXEL_LAYOUT_I422 => Ok((true, false)),
            DAV1D_PIXEL_LAYOUT_I444 => Ok((false, false)),
            _ => Err(CodecError::Decode(format!(
                "unsupported AV1 pixel layout: {layout}"
            ))),
        }
        .map(|(ss_x, ss_y)| YuvPlanes {
            y_ptr,
            u_ptr,
            v_ptr,
            y_stride,
            uv_stride,
            width,
            height,
            bpc,
            ss_x,
            ss_y,
            monochrome: false,
        })
    };

    // Convert while the picture's planes are still alive, then release
    let rgb = planes.as_ref().ok().map(YuvPlanes::to_rgb);

    unsafe {
        rav1d::src::lib::dav1d_picture_unref(NonNull::new(&mut pic));
        rav1d::src::lib::dav1d_close(NonNull::new(&mut ctx));
    }

    let rgb = match (rgb, planes) {
        (Some(rgb), _) => rgb,
        (None, Err(err)) => return Err(err),
        (None, Ok(_)) => unreachable!(),
    };

    image::RgbImage::from_raw(width, height, rgb)
        .map(DynamicImage::ImageRgb8)
        .ok_or_else(|| CodecError::Decode("decoded AV1 plane size mismatch".into()))
}

/// Borrowed YUV plane pointers from the decoder, ready for RGB conversion.
struct YuvPlanes {
    y_ptr: *const u8,
    u_ptr: *const u8,
    v_ptr: *const u8,
    y_stride: isize,
    uv_stride: isize,
    width: u32,
    height: u32,
    bpc: u32,
    /// Chroma subsampling: horizontal, vertical (e.g. I420 = true, true)
    ss_x: bool,
    ss_y: bool,
    monochrome: bool,
}

impl YuvPlanes {
    /// Convert to interleaved RGB8 using BT.601 coefficients.
    fn to_rgb(&self) -> Vec<u8> {
        let max_val = ((1u32 << self.bpc) - 1) as f32;
        let center = (1u32 << (self.bpc - 1)) as f32;
        let scale = 255.0 / max_val;

        let mut rgb = vec![0u8; (self.width * self.height * 3) as usize];

        for row in 0..self.height {
            for col in 0..self.width {
                let y_val = read_sample(self.y_ptr, self.y_stride, col, row, self.bpc);

                let (r, g, b) = if self.monochrome {
                    let v = (y_val * scale).clamp(0.0, 255.0);
                    (v, v, v)
                } else {
                    let u_col = if self.ss_x { col / 2 } else { col };
                    let u_row = if self.ss_y { row / 2 } else { row };
                    let cb = read_sample(self.u_ptr, self.uv_stride, u_col, u_row, self.bpc);
                    let cr = read_sample(self.v_ptr, self.uv_stride, u_col, u_row, self.bpc);

                    let cb_f = cb - center;
                    let cr_f = cr - center;

                    (
                        ((y_val + 1.402 * cr_f) * scale).clamp(0.0, 255.0),
                        ((y_val - 0.344136 * cb_f - 0.714136 * cr_f) * scale).clamp(0.0, 255.0),
                        ((y_val + 1.772 * cb_f) * scale).clamp(0.0, 255.0),
                    )
                };

                let idx = ((row * self.width + col) * 3) as usize;
                rgb[idx] = r as u8;
                rgb[idx + 1] = g as u8;
                rgb[idx + 2] = b as u8;
            }
        }

        rgb
    }
}

/// Read one sample from a plane, handling 8-bit and 10/12-bit (u16) storage.
#[inline]
fn read_sample(ptr: *const u8, stride: isize, x: u32, y: u32, bpc: u32) -> f32 {
    if bpc <= 8 {
        (unsafe { *ptr.offset(y as isize * stride + x as isize) }) as f32
    } else {
        let byte_offset = y as isize * stride + x as isize * 2;
        (unsafe { *(ptr.offset(byte_offset) as *const u16) }) as f32
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::RgbImage;

    /// Synthetic JPEG bytes at the given dimensions.
    pub(crate) fn test_jpeg(width: u32, height: u32, quality: u8) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        });
        encode_jpeg(&DynamicImage::ImageRgb8(img), quality).unwrap()
    }

    /// Synthetic PNG bytes at the given dimensions.
    pub(crate) fn test_png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        });
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    /// Synthetic AVIF bytes via the image crate's rav1e-based encoder.
    pub(crate) fn test_avif(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        });
        let mut buf = Vec::new();
        let encoder = image::codecs::avif::AvifEncoder::new_with_speed_quality(&mut buf, 6, 85);
        DynamicImage::ImageRgb8(img)
            .write_with_encoder(encoder)
            .unwrap();
        buf
    }

    #[test]
    fn detect_prefers_extension() {
        // Junk declared type, trustworthy extension
        assert_eq!(
            detect_format("IMG_0042.heic", "application/octet-stream"),
            SourceFormat::HeifFamily
        );
        assert_eq!(detect_format("a.jpg", ""), SourceFormat::Jpeg);
        assert_eq!(
            detect_format("a.png", "image/jpeg"),
            SourceFormat::Raster(ImageFormat::Png)
        );
    }

    #[test]
    fn detect_falls_back_to_content_type() {
        assert_eq!(detect_format("pasted", "image/webp"), SourceFormat::Raster(ImageFormat::WebP));
        assert_eq!(detect_format("pasted", "IMAGE/AVIF"), SourceFormat::HeifFamily);
        assert_eq!(detect_format("pasted", "text/plain"), SourceFormat::Unknown);
    }

    #[test]
    fn jpeg_roundtrip() {
        let bytes = test_jpeg(200, 150, 85);
        let img = decode(&bytes, SourceFormat::Jpeg).unwrap();
        assert_eq!((img.width(), img.height()), (200, 150));
    }

    #[test]
    fn png_decodes() {
        let bytes = test_png(64, 48);
        let img = decode(&bytes, SourceFormat::Raster(ImageFormat::Png)).unwrap();
        assert_eq!((img.width(), img.height()), (64, 48));
    }

    #[test]
    fn avif_decodes_through_rav1d() {
        let bytes = test_avif(64, 48);
        let img = decode(&bytes, SourceFormat::HeifFamily).unwrap();
        assert_eq!((img.width(), img.height()), (64, 48));
    }

    #[test]
    fn garbage_heif_is_a_decode_error() {
        let result = decode(b"definitely not a heif container", SourceFormat::HeifFamily);
        assert!(matches!(result, Err(CodecError::Decode(_))));
    }

    #[test]
    fn unknown_format_is_unrecognized() {
        let result = decode(b"whatever", SourceFormat::Unknown);
        assert!(matches!(result, Err(CodecError::Unrecognized)));
    }

    #[test]
    fn encode_jpeg_produces_decodable_output() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 32, image::Rgb([10, 20, 30])));
        let bytes = encode_jpeg(&img, 85).unwrap();
        let decoded = decode(&bytes, SourceFormat::Jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 32));
    }
}
