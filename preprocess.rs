use crate::error::{Error, Result};
use image::{DynamicImage, RgbImage};
use ndarray::{Array3, Array4, Axis};
use std::path::Path;

/// Side length of the square input the reference model was trained on.
pub const IMAGE_SIZE: u32 = 224;
pub const CHANNELS: usize = 3;

/// A normalized `[height, width, 3]` image with values in `[0.0, 1.0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor(Array3<f32>);

impl ImageTensor {
    pub fn new(data: Array3<f32>) -> Self {
        Self(data)
    }

    pub fn shape(&self) -> &[usize] {
        self.0.shape()
    }

    pub fn view(&self) -> ndarray::ArrayView3<'_, f32> {
        self.0.view()
    }

    /// Adds the batch axis, laid out the way the model reads its input.
    pub fn to_batch(&self, layout: InputLayout) -> Array4<f32> {
        match layout {
            InputLayout::Nhwc => self.view().insert_axis(Axis(0)).to_owned(),
            InputLayout::Nchw => self
                .view()
                .permuted_axes([2, 0, 1])
                .insert_axis(Axis(0))
                .as_standard_layout()
                .to_owned(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputLayout {
    /// `[1, H, W, 3]`, the layout of the reference model.
    Nhwc,
    /// `[1, 3, H, W]`
    Nchw,
}

impl InputLayout {
    /// Reads the layout from a model's declared input dims. Anything that is
    /// not clearly channels-first is treated as channels-last.
    pub fn from_dims(dims: &[i64]) -> Self {
        if dims.len() == 4 && dims[1] == CHANNELS as i64 && dims[3] != CHANNELS as i64 {
            InputLayout::Nchw
        } else {
            InputLayout::Nhwc
        }
    }
}

pub fn open_image(path: &Path) -> Result<DynamicImage> {
    if !path.is_file() {
        return Err(Error::Path(format!("Image not found: {}", path.display())));
    }
    // Sniff the format from the content so a missing or wrong extension still decodes.
    image::io::Reader::open(path)?
        .with_guessed_format()?
        .decode()
        .map_err(Error::Decode)
}

pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(bytes).map_err(Error::Decode)
}

/// Stretches the image to `size x size` with bilinear interpolation (aspect
/// ratio is not kept) and scales every channel from `[0, 255]` to `[0.0, 1.0]`.
pub fn preprocess(img: &DynamicImage, size: u32) -> ImageTensor {
    let rgb: RgbImage = img.to_rgb8();
    ImageTensor::new(resize_bilinear(&rgb, size, size))
}

/// Two-tap bilinear resample with half-pixel centres, clamped at the edges.
/// Every output pixel reads at most four source pixels, whatever the scale.
fn resize_bilinear(img: &RgbImage, out_w: u32, out_h: u32) -> Array3<f32> {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return Array3::zeros((out_h as usize, out_w as usize, CHANNELS));
    }
    let cols: Vec<Taps> = (0..out_w).map(|x| Taps::new(x, w, out_w)).collect();
    let rows: Vec<Taps> = (0..out_h).map(|y| Taps::new(y, h, out_h)).collect();
    Array3::from_shape_fn((out_h as usize, out_w as usize, CHANNELS), |(y, x, c)| {
        let (row, col) = (&rows[y], &cols[x]);
        let at = |sx: u32, sy: u32| img.get_pixel(sx, sy)[c] as f32;
        let top = lerp(at(col.lo, row.lo), at(col.hi, row.lo), col.frac);
        let bottom = lerp(at(col.lo, row.hi), at(col.hi, row.hi), col.frac);
        lerp(top, bottom, row.frac) / 255.0
    })
}

struct Taps {
    lo: u32,
    hi: u32,
    frac: f32,
}

impl Taps {
    fn new(dst: u32, src_len: u32, dst_len: u32) -> Self {
        let last = src_len - 1;
        let scale = src_len as f32 / dst_len as f32;
        let pos = ((dst as f32 + 0.5) * scale - 0.5).clamp(0.0, last as f32);
        let lo = pos.floor();
        Self {
            lo: lo as u32,
            hi: (lo as u32 + 1).min(last),
            frac: pos - lo,
        }
    }
}

// Exact when both taps are equal, so flat regions keep their value.
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}
