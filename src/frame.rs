use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{ImageFormat, RgbImage};
use std::io::Cursor;
use thiserror::Error;

pub const JPEG_DATA_URI_PREFIX: &str = "data:image/jpeg;base64,";

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Payload is not a data URI: missing `,` separator")]
    MissingSeparator,
    #[error("Failed to decode base64 payload: {0}")]
    Base64Decode(#[from] base64::DecodeError),
    #[error("Failed to decode image: {0}")]
    ImageDecode(image::ImageError),
    #[error("Failed to encode frame: {0}")]
    EncodeFrameFailed(image::ImageError),
}

/// Order of the three colour channels in a frame's pixel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    Rgb,
    Bgr,
}

/// Decoded 8-bit, 3-channel raster image.
#[derive(Debug, Clone)]
pub struct Frame {
    pixels: RgbImage,
    order: ChannelOrder,
}

impl Frame {
    pub fn new(pixels: RgbImage) -> Self {
        Self {
            pixels,
            order: ChannelOrder::Rgb,
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FrameError> {
        let image = image::load_from_memory(bytes).map_err(FrameError::ImageDecode)?;
        Ok(Self::new(image.to_rgb8()))
    }

    /// Decodes a `<prefix>,<base64 image bytes>` payload. The prefix is not inspected.
    pub fn from_data_uri(data_uri: &str) -> Result<Self, FrameError> {
        let (_, encoded) = data_uri
            .split_once(',')
            .ok_or(FrameError::MissingSeparator)?;
        let bytes = STANDARD.decode(encoded.trim())?;
        Self::from_bytes(&bytes)
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn channel_order(&self) -> ChannelOrder {
        self.order
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut RgbImage {
        &mut self.pixels
    }

    pub fn to_channel_order(&self, order: ChannelOrder) -> Frame {
        let mut converted = self.clone();
        converted.convert_channel_order(order);
        converted
    }

    pub fn convert_channel_order(&mut self, order: ChannelOrder) {
        if self.order == order {
            return;
        }
        for pixel in self.pixels.pixels_mut() {
            pixel.0.swap(0, 2);
        }
        self.order = order;
    }

    pub fn to_jpg(&self) -> Result<Vec<u8>, FrameError> {
        let rgb = self.to_channel_order(ChannelOrder::Rgb);
        let mut buf = Cursor::new(Vec::new());
        rgb.pixels
            .write_to(&mut buf, ImageFormat::Jpeg)
            .map_err(FrameError::EncodeFrameFailed)?;
        Ok(buf.into_inner())
    }

    pub fn to_data_uri(&self) -> Result<String, FrameError> {
        let jpg = self.to_jpg()?;
        Ok(format!("{}{}", JPEG_DATA_URI_PREFIX, STANDARD.encode(jpg)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn png_data_uri(image: &RgbImage) -> String {
        let mut buf = Cursor::new(Vec::new());
        image.write_to(&mut buf, ImageFormat::Png).unwrap();
        format!("data:image/png;base64,{}", STANDARD.encode(buf.into_inner()))
    }

    #[test]
    fn test_from_data_uri() {
        let image = RgbImage::from_pixel(8, 6, Rgb([255, 0, 0]));
        let frame = Frame::from_data_uri(&png_data_uri(&image)).unwrap();

        assert_eq!(frame.width(), 8);
        assert_eq!(frame.height(), 6);
        assert_eq!(frame.channel_order(), ChannelOrder::Rgb);
        assert_eq!(frame.pixels().get_pixel(0, 0), &Rgb([255, 0, 0]));
    }

    #[test]
    fn test_from_data_uri_rejects_malformed_payloads() {
        assert!(matches!(
            Frame::from_data_uri("no separator here"),
            Err(FrameError::MissingSeparator)
        ));
        assert!(matches!(
            Frame::from_data_uri("data:image/png;base64,@@@"),
            Err(FrameError::Base64Decode(_))
        ));
        let not_an_image = format!("data:image/png;base64,{}", STANDARD.encode(b"hello"));
        assert!(matches!(
            Frame::from_data_uri(&not_an_image),
            Err(FrameError::ImageDecode(_))
        ));
    }

    #[test]
    fn test_convert_channel_order_swaps_red_and_blue() {
        let mut frame = Frame::new(RgbImage::from_pixel(2, 2, Rgb([10, 20, 30])));
        frame.convert_channel_order(ChannelOrder::Bgr);
        assert_eq!(frame.pixels().get_pixel(1, 1), &Rgb([30, 20, 10]));

        // converting to the current order is a no-op
        frame.convert_channel_order(ChannelOrder::Bgr);
        assert_eq!(frame.pixels().get_pixel(1, 1), &Rgb([30, 20, 10]));

        let rgb = frame.to_channel_order(ChannelOrder::Rgb);
        assert_eq!(rgb.pixels().get_pixel(0, 0), &Rgb([10, 20, 30]));
    }

    #[test]
    fn test_to_data_uri_has_jpeg_prefix() {
        let frame = Frame::new(RgbImage::from_pixel(16, 16, Rgb([0, 128, 255])));
        let uri = frame.to_data_uri().unwrap();

        assert!(uri.starts_with(JPEG_DATA_URI_PREFIX));
        let decoded = Frame::from_data_uri(&uri).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 16));
    }
}
