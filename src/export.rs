//! Export path: quantize float pipeline output and encode PNG files.

use std::path::Path;

use crate::foundation::core::PixelBuf;
use crate::foundation::error::{ArgentumError, ArgentumResult};

/// Quantize to tightly packed RGB8.
pub fn to_rgb8(buf: &PixelBuf) -> Vec<u8> {
    buf.as_slice()
        .chunks_exact(4)
        .flat_map(|px| {
            [
                quant8(px[0]),
                quant8(px[1]),
                quant8(px[2]),
            ]
        })
        .collect()
}

/// Quantize to tightly packed RGB16.
pub fn to_rgb16(buf: &PixelBuf) -> Vec<u16> {
    buf.as_slice()
        .chunks_exact(4)
        .flat_map(|px| {
            [
                quant16(px[0]),
                quant16(px[1]),
                quant16(px[2]),
            ]
        })
        .collect()
}

fn quant8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn quant16(v: f32) -> u16 {
    (v.clamp(0.0, 1.0) * 65535.0).round() as u16
}

/// Encode an 8-bit PNG.
pub fn write_png8(path: impl AsRef<Path>, buf: &PixelBuf) -> ArgentumResult<()> {
    let img: image::RgbImage =
        image::ImageBuffer::from_raw(buf.width(), buf.height(), to_rgb8(buf))
            .ok_or_else(|| ArgentumError::validation("export buffer shape mismatch"))?;
    img.save_with_format(path.as_ref(), image::ImageFormat::Png)
        .map_err(|e| ArgentumError::Other(anyhow::anyhow!("png encode: {e}")))
}

/// Encode a 16-bit PNG.
pub fn write_png16(path: impl AsRef<Path>, buf: &PixelBuf) -> ArgentumResult<()> {
    let img: image::ImageBuffer<image::Rgb<u16>, Vec<u16>> =
        image::ImageBuffer::from_raw(buf.width(), buf.height(), to_rgb16(buf))
            .ok_or_else(|| ArgentumError::validation("export buffer shape mismatch"))?;
    img.save_with_format(path.as_ref(), image::ImageFormat::Png)
        .map_err(|e| ArgentumError::Other(anyhow::anyhow!("png encode: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantization_clamps_and_scales() {
        let mut buf = PixelBuf::new(2, 1);
        buf.set_pixel(0, 0, [-0.5, 0.5, 2.0, 1.0]);
        buf.set_pixel(1, 0, [1.0, 0.0, 0.25, 1.0]);

        let rgb8 = to_rgb8(&buf);
        assert_eq!(&rgb8[0..3], &[0, 128, 255]);
        assert_eq!(rgb8[3], 255);

        let rgb16 = to_rgb16(&buf);
        assert_eq!(rgb16[0], 0);
        assert_eq!(rgb16[2], 65535);
    }

    #[test]
    fn png_round_trips_through_the_encoder() {
        let mut buf = PixelBuf::new(4, 4);
        buf.fill([0.5, 0.25, 0.75, 1.0]);
        let dir = std::env::temp_dir();
        let path8 = dir.join("argentum_export_test8.png");
        let path16 = dir.join("argentum_export_test16.png");

        write_png8(&path8, &buf).unwrap();
        write_png16(&path16, &buf).unwrap();

        let back = image::open(&path8).unwrap().to_rgb8();
        assert_eq!(back.dimensions(), (4, 4));
        assert_eq!(back.get_pixel(0, 0).0, [128, 64, 191]);

        let _ = std::fs::remove_file(path8);
        let _ = std::fs::remove_file(path16);
    }
}
