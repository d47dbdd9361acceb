//! PDF serialisation: [`RenderedDocument`] → PDF bytes via `lopdf`.
//!
//! Text uses the standard-14 Helvetica faces with WinAnsiEncoding, so no font
//! program is embedded. JPEG images are embedded verbatim with `DCTDecode`;
//! PNG images are decoded and split into an RGB stream plus an `SMask` when
//! they carry transparency. Everything except the JPEG streams is
//! Flate-compressed at the end.

use crate::error::ReportError;
use crate::pipeline::layout::{DrawOp, Page, RenderedDocument, Rgb};
use crate::pipeline::metrics::Font;
use crate::pipeline::normalize::{ImageFormat, NormalizedImage};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use tracing::debug;

const PRODUCER: &str = concat!("visit-report ", env!("CARGO_PKG_VERSION"));

/// Write `doc` as a complete PDF file.
pub fn serialize(doc: &RenderedDocument) -> Result<Vec<u8>, ReportError> {
    let mut pdf = Document::with_version("1.5");
    let pages_id = pdf.new_object_id();

    let mut fonts = Dictionary::new();
    for font in [Font::Helvetica, Font::HelveticaBold] {
        let id = pdf.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => font.base_name(),
            "Encoding" => "WinAnsiEncoding",
        });
        fonts.set(font.resource_name(), id);
    }
    let fonts_id = pdf.add_object(fonts);

    let image_ids = doc
        .images
        .iter()
        .enumerate()
        .map(|(i, image)| embed_image(&mut pdf, image, i))
        .collect::<Result<Vec<ObjectId>, ReportError>>()?;

    let mut kids: Vec<Object> = Vec::with_capacity(doc.pages.len());
    for page in &doc.pages {
        kids.push(write_page(&mut pdf, page, pages_id, fonts_id, &image_ids)?.into());
    }

    let count = kids.len() as i64;
    pdf.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );

    let catalog_id = pdf.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    let info_id = pdf.add_object(dictionary! {
        "Title" => Object::string_literal(doc.title.as_str()),
        "Author" => Object::string_literal(doc.author.as_str()),
        "Producer" => Object::string_literal(PRODUCER),
    });
    pdf.trailer.set("Root", catalog_id);
    pdf.trailer.set("Info", info_id);

    pdf.compress();

    let mut out = Vec::new();
    pdf.save_to(&mut out).map_err(|e| ReportError::Serialization {
        detail: format!("write failed: {e}"),
    })?;
    debug!(
        "Serialised {} page(s), {} image(s) → {} bytes",
        doc.pages.len(),
        doc.images.len(),
        out.len()
    );
    Ok(out)
}

fn write_page(
    pdf: &mut Document,
    page: &Page,
    pages_id: ObjectId,
    fonts_id: ObjectId,
    image_ids: &[ObjectId],
) -> Result<ObjectId, ReportError> {
    let mut ops = Vec::new();
    let mut xobjects = Dictionary::new();

    for op in &page.ops {
        match op {
            DrawOp::Rect {
                x,
                y,
                width,
                height,
                color,
            } => {
                ops.push(fill_color(*color));
                ops.push(Operation::new(
                    "re",
                    vec![(*x).into(), (*y).into(), (*width).into(), (*height).into()],
                ));
                ops.push(Operation::new("f", vec![]));
            }
            DrawOp::Text {
                x,
                y,
                size,
                font,
                color,
                text,
            } => {
                ops.push(Operation::new("BT", vec![]));
                ops.push(Operation::new(
                    "Tf",
                    vec![Object::Name(font.resource_name().as_bytes().to_vec()), (*size).into()],
                ));
                ops.push(fill_color(*color));
                ops.push(Operation::new("Td", vec![(*x).into(), (*y).into()]));
                ops.push(Operation::new("Tj", vec![Object::string_literal(text.as_str())]));
                ops.push(Operation::new("ET", vec![]));
            }
            DrawOp::Image {
                x,
                y,
                width,
                height,
                image,
            } => {
                let object = image_ids.get(image.0).copied().ok_or_else(|| {
                    ReportError::Internal(format!("image {} was never embedded", image.0))
                })?;
                let name = format!("Im{}", image.0);
                xobjects.set(name.as_bytes(), object);
                ops.push(Operation::new("q", vec![]));
                ops.push(Operation::new(
                    "cm",
                    vec![
                        (*width).into(),
                        0.into(),
                        0.into(),
                        (*height).into(),
                        (*x).into(),
                        (*y).into(),
                    ],
                ));
                ops.push(Operation::new("Do", vec![Object::Name(name.into_bytes())]));
                ops.push(Operation::new("Q", vec![]));
            }
        }
    }

    let content = Content { operations: ops }
        .encode()
        .map_err(|e| ReportError::Serialization {
            detail: format!("content stream: {e}"),
        })?;
    let content_id = pdf.add_object(Stream::new(dictionary! {}, content));

    Ok(pdf.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), page.width.into(), page.height.into()],
        "Contents" => content_id,
        "Resources" => dictionary! {
            "Font" => fonts_id,
            "XObject" => xobjects,
        },
    }))
}

fn fill_color(c: Rgb) -> Operation {
    Operation::new("rg", vec![c.r.into(), c.g.into(), c.b.into()])
}

fn embed_image(pdf: &mut Document, image: &NormalizedImage, index: usize) -> Result<ObjectId, ReportError> {
    let width = i64::from(image.width_px);
    let height = i64::from(image.height_px);

    match image.format {
        ImageFormat::Jpeg => {
            let stream = Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => width,
                    "Height" => height,
                    "ColorSpace" => "DeviceRGB",
                    "BitsPerComponent" => 8,
                    "Filter" => "DCTDecode",
                },
                image.data.clone(),
            )
            .with_compression(false);
            Ok(pdf.add_object(stream))
        }
        ImageFormat::Png => {
            let rgba = image::load_from_memory_with_format(&image.data, image::ImageFormat::Png)
                .map_err(|e| ReportError::Serialization {
                    detail: format!("image {index}: {e}"),
                })?
                .to_rgba8();

            let mut rgb = Vec::with_capacity(rgba.as_raw().len() / 4 * 3);
            let mut alpha = Vec::with_capacity(rgba.as_raw().len() / 4);
            for px in rgba.pixels() {
                rgb.extend_from_slice(&px.0[..3]);
                alpha.push(px.0[3]);
            }

            let mut dict = dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width,
                "Height" => height,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
            };
            if alpha.iter().any(|&a| a < u8::MAX) {
                let mask_id = pdf.add_object(Stream::new(
                    dictionary! {
                        "Type" => "XObject",
                        "Subtype" => "Image",
                        "Width" => width,
                        "Height" => height,
                        "ColorSpace" => "DeviceGray",
                        "BitsPerComponent" => 8,
                    },
                    alpha,
                ));
                dict.set("SMask", mask_id);
            }
            Ok(pdf.add_object(Stream::new(dict, rgb)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::layout::{ImageId, PageKind};
    use image::{DynamicImage, Rgba, RgbaImage};
    use std::io::Cursor;

    fn png(alpha: u8) -> NormalizedImage {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 4, Rgba([10, 20, 30, alpha])));
        let mut data = Vec::new();
        img.write_to(&mut Cursor::new(&mut data), image::ImageFormat::Png)
            .unwrap();
        NormalizedImage {
            data,
            format: ImageFormat::Png,
            width_px: 8,
            height_px: 4,
        }
    }

    fn doc_with(pages: Vec<Page>, images: Vec<NormalizedImage>) -> RenderedDocument {
        RenderedDocument {
            title: "Rapport de visite - test".into(),
            author: "Test".into(),
            pages,
            images,
        }
    }

    fn text_page(text: &str) -> Page {
        let mut page = Page::new(PageKind::Cover);
        page.push(DrawOp::Text {
            x: 50.0,
            y: 700.0,
            size: 12.0,
            font: Font::Helvetica,
            color: Rgb::BLACK,
            text: text.into(),
        });
        page
    }

    #[test]
    fn writes_loadable_pdf_with_all_pages() {
        let doc = doc_with(vec![text_page("one"), text_page("two"), text_page("three")], vec![]);
        let bytes = serialize(&doc).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));
        let loaded = Document::load_mem(&bytes).unwrap();
        assert_eq!(loaded.get_pages().len(), 3);
    }

    #[test]
    fn text_is_extractable() {
        let doc = doc_with(vec![text_page("Fuite sous evier")], vec![]);
        let bytes = serialize(&doc).unwrap();
        let loaded = Document::load_mem(&bytes).unwrap();
        let text = loaded.extract_text(&[1]).unwrap();
        assert!(text.contains("Fuite sous evier"), "got {text:?}");
    }

    #[test]
    fn transparent_png_gets_soft_mask() {
        let mut page = Page::new(PageKind::Signature);
        page.push(DrawOp::Image {
            x: 50.0,
            y: 400.0,
            width: 40.0,
            height: 20.0,
            image: ImageId(0),
        });
        let bytes = serialize(&doc_with(vec![page], vec![png(0)])).unwrap();
        let loaded = Document::load_mem(&bytes).unwrap();
        let has_smask = loaded.objects.values().any(|o| match o {
            Object::Stream(s) => s.dict.has(b"SMask"),
            _ => false,
        });
        assert!(has_smask);
    }

    #[test]
    fn opaque_png_has_no_mask() {
        let mut page = Page::new(PageKind::Signature);
        page.push(DrawOp::Image {
            x: 50.0,
            y: 400.0,
            width: 40.0,
            height: 20.0,
            image: ImageId(0),
        });
        let bytes = serialize(&doc_with(vec![page], vec![png(255)])).unwrap();
        let loaded = Document::load_mem(&bytes).unwrap();
        assert!(!loaded.objects.values().any(|o| matches!(o, Object::Stream(s) if s.dict.has(b"SMask"))));
    }

    #[test]
    fn dangling_image_reference_is_internal_error() {
        let mut page = Page::new(PageKind::Cover);
        page.push(DrawOp::Image {
            x: 0.0,
            y: 0.0,
            width: 1.0,
            height: 1.0,
            image: ImageId(3),
        });
        let err = serialize(&doc_with(vec![page], vec![])).unwrap_err();
        assert!(matches!(err, ReportError::Internal(_)));
    }

    #[test]
    fn corrupt_png_is_serialization_error() {
        let bad = NormalizedImage {
            data: vec![0x89, b'P', b'N', b'G', 0, 0],
            format: ImageFormat::Png,
            width_px: 1,
            height_px: 1,
        };
        let err = serialize(&doc_with(vec![text_page("x")], vec![bad])).unwrap_err();
        assert!(matches!(err, ReportError::Serialization { .. }));
    }
}
