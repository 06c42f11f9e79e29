//! Code 128 barcode rasterisation.
//!
//! `barcoders` turns the text into a module pattern; the bars and the
//! human-readable line underneath are drawn onto an RGB canvas and encoded
//! as PNG. Output is a pure function of the text and the options.

use std::io::Cursor;

use barcoders::sym::code128::Code128;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use font8x8::{BASIC_FONTS, UnicodeFonts};
use image::{ImageFormat, Rgb, RgbImage};

use crate::error::BarcodeError;

/// Code set B selector understood by `barcoders`.
const CODE_SET_B: char = 'Ɓ';

/// Points per inch used when converting the bar height.
const POINTS_PER_INCH: f32 = 72.0;

const MM_PER_INCH: f32 = 25.4;

/// Glyph cell size of the bundled bitmap font.
const GLYPH_SIZE: u32 = 8;

/// Rendering options for a barcode image.
#[derive(Debug, Clone, PartialEq)]
pub struct BarcodeOptions {
    /// Pixel width of one module; also scales height, padding and text.
    pub scale: u32,
    /// Bar height in millimetres at 72 dpi before scaling.
    pub bar_height_mm: f32,
    /// Quiet zone around the symbol, in points before scaling.
    pub padding: u32,
    pub background: [u8; 3],
    pub foreground: [u8; 3],
    /// Draw the encoded text centered beneath the bars.
    pub include_text: bool,
}

impl Default for BarcodeOptions {
    fn default() -> Self {
        Self {
            scale: 3,
            bar_height_mm: 10.0,
            padding: 10,
            background: [0xFF, 0xFF, 0xFF],
            foreground: [0x00, 0x00, 0x00],
            include_text: true,
        }
    }
}

/// Text encoded into a participant's barcode.
pub fn barcode_text(event_id: &str, email: &str) -> String {
    format!("{event_id}_{email}")
}

/// Render `text` as a Code 128 PNG.
pub fn generate(text: &str, options: &BarcodeOptions) -> Result<Vec<u8>, BarcodeError> {
    validate(text)?;

    let modules = Code128::new(format!("{CODE_SET_B}{text}"))
        .map_err(|e| BarcodeError::Symbology(e.to_string()))?
        .encode();

    let scale = options.scale.max(1);
    let padding = options.padding * scale;
    let bar_height =
        ((options.bar_height_mm / MM_PER_INCH) * POINTS_PER_INCH * scale as f32).round() as u32;
    let bars_width = modules.len() as u32 * scale;

    let text_scale = text_scale(scale);
    let (text_width, text_block) = if options.include_text {
        let glyph = GLYPH_SIZE * text_scale;
        (text.chars().count() as u32 * glyph, glyph + 2 * text_scale)
    } else {
        (0, 0)
    };

    let width = bars_width.max(text_width) + 2 * padding;
    let height = bar_height + text_block + 2 * padding;

    let mut canvas = RgbImage::from_pixel(width, height, Rgb(options.background));
    let ink = Rgb(options.foreground);

    let bars_left = (width - bars_width) / 2;
    for (i, module) in modules.iter().enumerate() {
        if *module == 0 {
            continue;
        }
        let x0 = bars_left + i as u32 * scale;
        fill(&mut canvas, x0, padding, scale, bar_height, ink);
    }

    if options.include_text {
        let top = padding + bar_height + 2 * text_scale;
        let left = (width - text_width) / 2;
        draw_text(&mut canvas, text, left, top, text_scale, ink);
    }

    let mut png = Vec::new();
    canvas
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| BarcodeError::Image(e.to_string()))?;
    Ok(png)
}

/// Wrap PNG bytes in a `data:` URI for documents without `cid:` support.
pub fn data_uri(png: &[u8]) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(png))
}

/// Code set B covers printable ASCII only.
fn validate(text: &str) -> Result<(), BarcodeError> {
    if text.is_empty() {
        return Err(BarcodeError::Empty);
    }
    if let Some((position, ch)) = text
        .chars()
        .enumerate()
        .find(|(_, c)| !(' '..='~').contains(c))
    {
        return Err(BarcodeError::UnsupportedCharacter { ch, position });
    }
    Ok(())
}

fn text_scale(scale: u32) -> u32 {
    (scale.saturating_sub(1)).max(1)
}

fn fill(canvas: &mut RgbImage, x0: u32, y0: u32, w: u32, h: u32, color: Rgb<u8>) {
    for y in y0..(y0 + h).min(canvas.height()) {
        for x in x0..(x0 + w).min(canvas.width()) {
            canvas.put_pixel(x, y, color);
        }
    }
}

fn draw_text(canvas: &mut RgbImage, text: &str, left: u32, top: u32, scale: u32, color: Rgb<u8>) {
    let advance = GLYPH_SIZE * scale;
    for (i, ch) in text.chars().enumerate() {
        let Some(glyph) = BASIC_FONTS.get(ch) else {
            continue;
        };
        let origin = left + i as u32 * advance;
        for (row, bits) in glyph.iter().enumerate() {
            for col in 0..GLYPH_SIZE {
                // bit 0 is the leftmost pixel
                if *bits & (1u8 << col) != 0 {
                    fill(
                        canvas,
                        origin + col * scale,
                        top + row as u32 * scale,
                        scale,
                        scale,
                        color,
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(png: &[u8]) -> RgbImage {
        image::load_from_memory_with_format(png, ImageFormat::Png)
            .unwrap()
            .to_rgb8()
    }

    #[test]
    fn text_is_prefixed_with_event_id() {
        assert_eq!(
            barcode_text("ELAN_24", "asha@example.com"),
            "ELAN_24_asha@example.com"
        );
    }

    #[test]
    fn same_input_gives_identical_bytes() {
        let opts = BarcodeOptions::default();
        let a = generate("ELAN_24_asha@example.com", &opts).unwrap();
        let b = generate("ELAN_24_asha@example.com", &opts).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_input_gives_different_bytes() {
        let opts = BarcodeOptions::default();
        let a = generate("ELAN_24_asha@example.com", &opts).unwrap();
        let b = generate("ELAN_24_ravi@example.com", &opts).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn output_is_png_with_padding_background() {
        let opts = BarcodeOptions::default();
        let png = generate("ELAN_24_a@b.co", &opts).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");

        let img = decode(&png);
        assert_eq!(img.get_pixel(0, 0), &Rgb([0xFF, 0xFF, 0xFF]));
        assert_eq!(
            img.get_pixel(img.width() - 1, img.height() - 1),
            &Rgb([0xFF, 0xFF, 0xFF])
        );
        // 10mm at 72dpi times 3 is 85px of bars plus 30px padding each side
        assert!(img.height() >= 85 + 60);
    }

    #[test]
    fn bars_contain_ink() {
        let opts = BarcodeOptions {
            include_text: false,
            ..Default::default()
        };
        let img = decode(&generate("ELAN_24_x@y.z", &opts).unwrap());
        let mid = img.height() / 2;
        let dark = (0..img.width())
            .filter(|x| img.get_pixel(*x, mid) == &Rgb([0, 0, 0]))
            .count();
        assert!(dark > 0);
    }

    #[test]
    fn text_adds_height() {
        let with_text = decode(&generate("ELAN_24_x@y.z", &BarcodeOptions::default()).unwrap());
        let without = decode(
            &generate(
                "ELAN_24_x@y.z",
                &BarcodeOptions {
                    include_text: false,
                    ..Default::default()
                },
            )
            .unwrap(),
        );
        assert!(with_text.height() > without.height());
    }

    #[test]
    fn non_ascii_is_rejected() {
        let err = generate("ELAN_24_josé@example.com", &BarcodeOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            BarcodeError::UnsupportedCharacter { ch: 'é', position: 11 }
        ));
    }

    #[test]
    fn control_characters_are_rejected() {
        let err = generate("ELAN_24_a\tb@example.com", &BarcodeOptions::default()).unwrap_err();
        assert!(matches!(err, BarcodeError::UnsupportedCharacter { ch: '\t', .. }));
    }

    #[test]
    fn empty_text_is_rejected() {
        assert!(matches!(
            generate("", &BarcodeOptions::default()),
            Err(BarcodeError::Empty)
        ));
    }

    #[test]
    fn data_uri_prefix() {
        let uri = data_uri(&[1, 2, 3]);
        assert_eq!(uri, "data:image/png;base64,AQID");
    }
}
