//! QR code decoding for rasterised pages.

use image::DynamicImage;
use tracing::debug;

/// Decodes every QR code found in an image.
pub trait QrDecoder: Send + Sync {
    /// Payloads of all readable codes, in detection order. Unreadable grids
    /// are skipped.
    fn decode(&self, image: &DynamicImage) -> Vec<String>;
}

/// [`QrDecoder`] backed by `rqrr`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RqrrDecoder;

impl QrDecoder for RqrrDecoder {
    fn decode(&self, image: &DynamicImage) -> Vec<String> {
        let luma = image.to_luma8();
        let (width, height) = luma.dimensions();
        let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
            width as usize,
            height as usize,
            |x, y| luma.get_pixel(x as u32, y as u32)[0],
        );
        let grids = prepared.detect_grids();
        debug!("Found {} QR grid(s) in {}x{} image", grids.len(), width, height);
        grids
            .into_iter()
            .filter_map(|grid| match grid.decode() {
                Ok((_, content)) => Some(content),
                Err(e) => {
                    debug!("Skipping unreadable QR grid: {:?}", e);
                    None
                }
            })
            .collect()
    }
}
