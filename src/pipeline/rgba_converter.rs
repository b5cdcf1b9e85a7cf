use anyhow::{Result, anyhow};
use image::DynamicImage;
use rayon::prelude::*;

#[derive(Debug)]
pub struct RgbaFrame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelLayout {
    Rgb,
    Bgr,
    Gray,
    Rgba,
}

pub fn convert_image(image: &DynamicImage) -> Result<RgbaFrame> {
    let (width, height) = (image.width(), image.height());
    match image {
        DynamicImage::ImageRgb8(buf) => convert_raw(buf.as_raw(), width, height, PixelLayout::Rgb),
        DynamicImage::ImageLuma8(buf) => {
            convert_raw(buf.as_raw(), width, height, PixelLayout::Gray)
        }
        DynamicImage::ImageRgba8(buf) => {
            convert_raw(buf.as_raw(), width, height, PixelLayout::Rgba)
        }
        other => Ok(RgbaFrame {
            rgba: other.to_rgba8().into_raw(),
            width,
            height,
        }),
    }
}

pub fn convert_raw(data: &[u8], width: u32, height: u32, layout: PixelLayout) -> Result<RgbaFrame> {
    let rgba = match layout {
        PixelLayout::Rgb => rgb_like_to_rgba(data, width, height, false)?,
        PixelLayout::Bgr => rgb_like_to_rgba(data, width, height, true)?,
        PixelLayout::Gray => gray_to_rgba(data, width, height)?,
        PixelLayout::Rgba => copy_rgba(data, width, height)?,
    };

    Ok(RgbaFrame {
        rgba,
        width,
        height,
    })
}

fn copy_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let expected_len = width as usize * height as usize * 4;
    if data.len() < expected_len {
        return Err(anyhow!(
            "RGBA buffer too small: got {}, expected {}",
            data.len(),
            expected_len
        ));
    }
    Ok(data[..expected_len].to_vec())
}

fn rgb_like_to_rgba(data: &[u8], width: u32, height: u32, swap_rb: bool) -> Result<Vec<u8>> {
    let expected_len = width as usize * height as usize * 3;
    if data.len() < expected_len {
        return Err(anyhow!(
            "RGB buffer too small: got {}, expected {}",
            data.len(),
            expected_len
        ));
    }

    let mut rgba = vec![0u8; (width as usize * height as usize) * 4];
    rgba.par_chunks_mut(4)
        .zip(data.par_chunks_exact(3))
        .for_each(|(dst, src)| {
            if swap_rb {
                dst[0] = src[2];
                dst[1] = src[1];
                dst[2] = src[0];
            } else {
                dst[..3].copy_from_slice(src);
            }
            dst[3] = 255;
        });

    Ok(rgba)
}

fn gray_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let expected_len = width as usize * height as usize;
    if data.len() < expected_len {
        return Err(anyhow!(
            "GRAY buffer too small: got {}, expected {}",
            data.len(),
            expected_len
        ));
    }

    let mut rgba = vec![0u8; expected_len * 4];
    rgba.par_chunks_mut(4)
        .zip(data.par_iter().copied())
        .for_each(|(dst, value)| {
            dst[0] = value;
            dst[1] = value;
            dst[2] = value;
            dst[3] = 255;
        });

    Ok(rgba)
}
