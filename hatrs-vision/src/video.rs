use anyhow::{Context, Result};
use image::RgbImage;
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, Format, FourCC};

/// Pixel layouts the camera may hand us
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb24,
    Yuyv,
    Grey,
}

impl PixelFormat {
    pub fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        match &fourcc.repr {
            b"RGB3" => Some(PixelFormat::Rgb24),
            b"YUYV" => Some(PixelFormat::Yuyv),
            b"GREY" => Some(PixelFormat::Grey),
            _ => None,
        }
    }

    fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb24 => 3,
            PixelFormat::Yuyv => 2,
            PixelFormat::Grey => 1,
        }
    }

    /// Convert one raw frame to packed RGB
    pub fn to_rgb(self, width: u32, height: u32, data: &[u8]) -> Result<RgbImage> {
        let pixels = (width * height) as usize;
        let needed = pixels * self.bytes_per_pixel();
        if data.len() < needed {
            anyhow::bail!(
                "short {:?} buffer: got {} bytes, expected {}",
                self,
                data.len(),
                needed
            );
        }
        if data.len() > needed {
            log::debug!("{:?} buffer larger than expected ({} > {})", self, data.len(), needed);
        }
        let data = &data[..needed];

        let rgb = match self {
            PixelFormat::Rgb24 => data.to_vec(),
            PixelFormat::Yuyv => yuyv_to_rgb(data, pixels),
            PixelFormat::Grey => data.iter().flat_map(|&y| [y, y, y]).collect(),
        };
        RgbImage::from_raw(width, height, rgb)
            .ok_or_else(|| anyhow::anyhow!("failed to build {}x{} frame", width, height))
    }
}

fn yuyv_to_rgb(data: &[u8], pixels: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(pixels * 3);
    for chunk in data.chunks_exact(4) {
        let u = chunk[1] as f32 - 128.0;
        let v = chunk[3] as f32 - 128.0;
        for y in [chunk[0] as f32, chunk[2] as f32] {
            out.push(clamp(y + 1.402 * v));
            out.push(clamp(y - 0.344136 * u - 0.714136 * v));
            out.push(clamp(y + 1.772 * u));
        }
    }
    out
}

fn clamp(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

pub struct Camera {
    stream: Stream<'static>,
    width: u32,
    height: u32,
    format: PixelFormat,
}

impl Camera {
    pub fn open(device: &str) -> Result<Self> {
        let dev = Device::with_path(device)
            .with_context(|| format!("open camera {} (is it present and readable?)", device))?;
        let mut fmt = dev.format().context("get format")?;
        // RGB if the driver can, then YUYV, then whatever is already set
        for fourcc in [b"RGB3", b"YUYV"] {
            if PixelFormat::from_fourcc(fmt.fourcc) == Some(PixelFormat::Rgb24) {
                break;
            }
            let wanted = Format::new(fmt.width, fmt.height, FourCC::new(fourcc));
            fmt = dev.set_format(&wanted).unwrap_or(fmt);
        }
        let format = PixelFormat::from_fourcc(fmt.fourcc)
            .ok_or_else(|| anyhow::anyhow!("unsupported camera pixel format {}", fmt.fourcc))?;

        log::info!("camera {}: {}x{} {:?}", device, fmt.width, fmt.height, format);
        let stream = Stream::with_buffers(&dev, Type::VideoCapture, 4).context("stream")?;
        Ok(Self {
            stream,
            width: fmt.width,
            height: fmt.height,
            format,
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn frame(&mut self) -> Result<RgbImage> {
        let (data, meta) = self.stream.next().context("capture frame")?;
        log::debug!(
            "captured frame: seq={} len={}",
            meta.sequence,
            data.len()
        );
        self.format.to_rgb(self.width, self.height, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grey_expands_to_rgb() {
        let img = PixelFormat::Grey.to_rgb(2, 1, &[10, 200]).unwrap();
        assert_eq!(img.as_raw(), &vec![10, 10, 10, 200, 200, 200]);
    }

    #[test]
    fn test_neutral_yuyv_is_grey() {
        let img = PixelFormat::Yuyv.to_rgb(2, 1, &[50, 128, 90, 128]).unwrap();
        assert_eq!(img.as_raw(), &vec![50, 50, 50, 90, 90, 90]);
    }

    #[test]
    fn test_short_buffer_rejected() {
        assert!(PixelFormat::Rgb24.to_rgb(2, 2, &[0; 11]).is_err());
    }

    #[test]
    fn test_fourcc_mapping() {
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"YUYV")), Some(PixelFormat::Yuyv));
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"MJPG")), None);
    }
}
