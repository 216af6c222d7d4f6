//! Pairing QR rendering.

use crate::error::Error;
use crate::Result;
use base64::Engine;
use image::{ImageBuffer, Luma};
use qrcode::{Color, EcLevel, QrCode};

const MODULE_SIZE: u32 = 8;
const QUIET_ZONE: u32 = 4;

/// Render `payload` as a PNG QR code.
pub fn render_png(payload: &str) -> Result<Vec<u8>> {
    let code = QrCode::with_error_correction_level(payload.as_bytes(), EcLevel::L)
        .map_err(|e| Error::Qr(format!("QR generation failed: {e}")))?;

    let modules = code.width() as u32;
    let size = (modules + QUIET_ZONE * 2) * MODULE_SIZE;
    let img = ImageBuffer::from_fn(size, size, |x, y| {
        let (mx, my) = (x / MODULE_SIZE, y / MODULE_SIZE);
        if mx < QUIET_ZONE || my < QUIET_ZONE || mx - QUIET_ZONE >= modules || my - QUIET_ZONE >= modules {
            return Luma([255u8]);
        }
        match code[((mx - QUIET_ZONE) as usize, (my - QUIET_ZONE) as usize)] {
            Color::Dark => Luma([0u8]),
            Color::Light => Luma([255u8]),
        }
    });

    let mut buf = std::io::Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png)
        .map_err(|e| Error::Qr(format!("PNG encoding failed: {e}")))?;
    Ok(buf.into_inner())
}

/// Render `payload` as a `data:image/png;base64,...` URL.
pub fn render_data_url(payload: &str) -> Result<String> {
    let png = render_png(payload)?;
    Ok(format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(png)
    ))
}
