use image::GrayImage;

use super::FrameDecoder;

/// QR decoder backed by `rqrr`.
///
/// Finder-pattern search and Reed-Solomon correction happen inside `rqrr`;
/// this type only adapts our luma buffer to it and picks the first grid
/// that decodes cleanly.
#[derive(Debug, Default, Clone, Copy)]
pub struct QrDecoder;

impl QrDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl FrameDecoder for QrDecoder {
    fn decode(&self, image: &GrayImage) -> Option<String> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return None;
        }

        let mut prepared =
            rqrr::PreparedImage::prepare_from_greyscale(width as usize, height as usize, |x, y| {
                image.get_pixel(x as u32, y as u32)[0]
            });

        prepared
            .detect_grids()
            .into_iter()
            .find_map(|grid| {
                grid.decode()
                    .ok()
                    .map(|(_meta, content)| content)
                    .filter(|content| !content.is_empty())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{Frame, Resolution};
    use crate::decoder::FrameBuffer;
    use image::Luma;
    use qrcode::{Color, QrCode};

    const QUIET_ZONE: u32 = 4;

    /// Renders `payload` as black-on-white modules of `module_px` pixels.
    fn render(payload: &str, module_px: u32) -> GrayImage {
        let code = QrCode::new(payload.as_bytes()).unwrap();
        let modules = code.width() as u32;
        let colors = code.to_colors();
        let side = (modules + 2 * QUIET_ZONE) * module_px;

        GrayImage::from_fn(side, side, |x, y| {
            let (mx, my) = (x / module_px, y / module_px);
            let inside = (QUIET_ZONE..QUIET_ZONE + modules).contains(&mx)
                && (QUIET_ZONE..QUIET_ZONE + modules).contains(&my);
            let dark = inside
                && colors[((my - QUIET_ZONE) * modules + (mx - QUIET_ZONE)) as usize]
                    == Color::Dark;
            Luma([if dark { 0 } else { 255 }])
        })
    }

    fn to_rgba_frame(image: &GrayImage) -> Frame {
        let pixels = image
            .pixels()
            .flat_map(|p| [p[0], p[0], p[0], 255])
            .collect();
        Frame::new(image.width(), image.height(), pixels)
    }

    #[test]
    fn decodes_a_rendered_code() {
        let image = render("BAG-001", 6);
        assert_eq!(QrDecoder::new().decode(&image), Some("BAG-001".to_string()));
    }

    #[test]
    fn decodes_after_frame_buffer_downscale() {
        let frame = to_rgba_frame(&render("BAG-042", 10));
        let target = Resolution::new(160, 160);
        assert!(!Resolution::new(frame.width, frame.height).fits_within(&target));

        let mut buffer = FrameBuffer::new(Some(target));
        let image = buffer.load(&frame).unwrap();
        assert_eq!(image.dimensions(), (160, 160));
        assert_eq!(QrDecoder::new().decode(image), Some("BAG-042".to_string()));
    }

    #[test]
    fn blank_frame_yields_nothing() {
        let blank = GrayImage::from_pixel(120, 120, image::Luma([255]));
        assert_eq!(QrDecoder::new().decode(&blank), None);
    }

    #[test]
    fn empty_frame_yields_nothing() {
        assert_eq!(QrDecoder::new().decode(&GrayImage::new(0, 0)), None);
    }
}
