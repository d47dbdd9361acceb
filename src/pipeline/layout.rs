//! Page layout: request text + normalised images → positioned draw operations.
//!
//! The engine walks the report top to bottom with a single [`Cursor`]:
//!
//! ```text
//! Cover ──► Observation(0) ──► Photos(0) ──► Observation(1) ──► … ──► Signature
//! ```
//!
//! Every page except the first cover page carries the brand banner; observation
//! pages add the red OBSERVATIONS band. Description and action text that runs
//! past the bottom margin continues on a fresh observation page with the same
//! banners. Photos never share a page with text, so a gallery always gets the
//! full content area.
//!
//! Layout is pure: no I/O, no PDF objects. The result is a
//! [`RenderedDocument`] that the serialiser turns into bytes and tests can
//! inspect directly.

use crate::model::{Observation, ReportRequest};
use crate::pipeline::metrics::Font;
use crate::pipeline::normalize::NormalizedImage;
use crate::pipeline::sanitize::{sanitize, sanitize_paragraphs};
use crate::pipeline::wrap::{line_height, wrap_and_draw, wrap_lines, PARAGRAPH_GAP};
use serde::{Deserialize, Serialize};
use tracing::debug;

// ── Geometry ──────────────────────────────────────────────────────────────

/// A4 portrait, in points.
pub const PAGE_WIDTH: f32 = 595.28;
pub const PAGE_HEIGHT: f32 = 841.89;
pub const MARGIN_X: f32 = 50.0;
pub const BOTTOM_MARGIN: f32 = 50.0;
pub const CONTENT_WIDTH: f32 = PAGE_WIDTH - 2.0 * MARGIN_X;

/// Baseline of the running header.
const HEADER_Y: f32 = PAGE_HEIGHT - 50.0;
/// First content baseline on pages with the brand banner.
const CONTENT_TOP: f32 = HEADER_Y - 20.0;

const BRAND_NAME: &str = "ORPI Adimmo";
const REPORT_TITLE: &str = "RAPPORT DE VISITE";
const OBSERVATIONS_LABEL: &str = "OBSERVATIONS";
const VALIDATION_TITLE: &str = "Validation du rapport";
const ROLE_CAPTION: &str = "Gestionnaire de copropriété";

const BODY_SIZE: f32 = 12.0;
const HEADING_SIZE: f32 = 14.0;
const HEADING_ADVANCE: f32 = 20.0;
const GALLERY_GAP: f32 = 20.0;
const LEAD_PHOTO_GAP: f32 = 30.0;
const LEAD_PHOTO_MAX_HEIGHT: f32 = 380.0;

// ── Document model ────────────────────────────────────────────────────────

/// Fill colour, components in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::gray(0.0);
    pub const WHITE: Rgb = Rgb::gray(1.0);
    pub const BRAND_RED: Rgb = Rgb::new(1.0, 0.0, 0.0);
    pub const POSITIVE: Rgb = Rgb::new(0.0, 0.6, 0.0);
    pub const NEEDS_ATTENTION: Rgb = Rgb::new(0.8, 0.0, 0.0);
    pub const CAPTION_GRAY: Rgb = Rgb::gray(0.3);

    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    pub const fn gray(level: f32) -> Self {
        Self::new(level, level, level)
    }
}

/// Vertical write position on the current page, as a PDF y coordinate
/// (origin bottom-left). Moving down the page decreases `y`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cursor {
    y: f32,
}

impl Cursor {
    pub fn at(y: f32) -> Self {
        Self { y }
    }

    pub fn y(self) -> f32 {
        self.y
    }

    pub fn down(self, dy: f32) -> Self {
        Self { y: self.y - dy }
    }

    /// Space left above the bottom margin.
    pub fn room(self) -> f32 {
        (self.y - BOTTOM_MARGIN).max(0.0)
    }

    /// Whether a block `height` tall still fits above the bottom margin.
    pub fn fits(self, height: f32) -> bool {
        self.y - height >= BOTTOM_MARGIN
    }
}

/// Index into [`RenderedDocument::images`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageId(pub usize);

/// One positioned drawing primitive. Coordinates are PDF points; `y` of a
/// text run is its baseline, `y` of a rect or image its bottom edge.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    Rect {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        color: Rgb,
    },
    Text {
        x: f32,
        y: f32,
        size: f32,
        font: Font,
        color: Rgb,
        text: String,
    },
    Image {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        image: ImageId,
    },
}

/// What a page holds. Overflow pages repeat the kind of the page they
/// continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Cover,
    Observation { index: usize },
    Photos { index: usize },
    Signature,
}

/// Where an image lands on the page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub kind: PageKind,
    pub width: f32,
    pub height: f32,
    pub ops: Vec<DrawOp>,
}

impl Page {
    pub fn new(kind: PageKind) -> Self {
        Self {
            kind,
            width: PAGE_WIDTH,
            height: PAGE_HEIGHT,
            ops: Vec::new(),
        }
    }

    pub fn push(&mut self, op: DrawOp) {
        self.ops.push(op);
    }

    fn rect(&mut self, x: f32, y: f32, width: f32, height: f32, color: Rgb) {
        self.push(DrawOp::Rect {
            x,
            y,
            width,
            height,
            color,
        });
    }

    fn text(&mut self, x: f32, y: f32, size: f32, font: Font, color: Rgb, text: String) {
        if text.is_empty() {
            return;
        }
        self.push(DrawOp::Text {
            x,
            y,
            size,
            font,
            color,
            text,
        });
    }

    /// All text runs on the page, in drawing order.
    pub fn text_runs(&self) -> impl Iterator<Item = &str> {
        self.ops.iter().filter_map(|op| match op {
            DrawOp::Text { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }

    /// All placed images, in drawing order.
    pub fn image_placements(&self) -> Vec<(ImageId, Placement)> {
        self.ops
            .iter()
            .filter_map(|op| match *op {
                DrawOp::Image {
                    x,
                    y,
                    width,
                    height,
                    image,
                } => Some((
                    image,
                    Placement {
                        x,
                        y,
                        width,
                        height,
                    },
                )),
                _ => None,
            })
            .collect()
    }
}

/// The fully laid-out report, ready to serialise.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedDocument {
    /// Document title for the PDF info dictionary.
    pub title: String,
    pub author: String,
    pub pages: Vec<Page>,
    /// Embedded images, referenced by [`ImageId`].
    pub images: Vec<NormalizedImage>,
}

impl RenderedDocument {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn image(&self, id: ImageId) -> Option<&NormalizedImage> {
        self.images.get(id.0)
    }
}

/// Normalised images handed to the layout engine. Failed images are
/// already gone; survivors keep their input order.
#[derive(Debug, Clone, Default)]
pub struct PreparedImages {
    pub lead: Option<NormalizedImage>,
    /// One gallery per observation, indexed like the observations.
    pub galleries: Vec<Vec<NormalizedImage>>,
    pub signature: Option<NormalizedImage>,
}

// ── Galleries ─────────────────────────────────────────────────────────────

/// Area available to a gallery: `top` is the upper edge, `height` the space
/// below it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

/// Arrangement for a photo page, chosen by photo count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GalleryTemplate {
    /// One photo, centred.
    Single,
    /// Two photos side by side, bottoms aligned.
    SideBySide,
    /// One full-width photo on top of two half-width ones.
    FeatureAndPair,
}

impl GalleryTemplate {
    /// Photos beyond this are not laid out.
    pub const MAX_PHOTOS: usize = 3;

    pub fn for_count(count: usize) -> Option<Self> {
        match count {
            0 => None,
            1 => Some(GalleryTemplate::Single),
            2 => Some(GalleryTemplate::SideBySide),
            _ => Some(GalleryTemplate::FeatureAndPair),
        }
    }

    /// Place images with the given aspect ratios (width / height) in `frame`.
    /// Every placement stays inside the frame and keeps its aspect ratio.
    pub fn place(self, aspects: &[f32], frame: Frame) -> Vec<Placement> {
        let avail = frame.height.max(1.0);
        let column = (frame.width - GALLERY_GAP) / 2.0;
        let column_x = |i: usize, w: f32| frame.left + i as f32 * (column + GALLERY_GAP) + (column - w) / 2.0;

        match self {
            GalleryTemplate::Single => aspects
                .iter()
                .take(1)
                .map(|&a| {
                    let (w, h) = fit(a, frame.width, avail);
                    Placement {
                        x: frame.left + (frame.width - w) / 2.0,
                        y: frame.top - h,
                        width: w,
                        height: h,
                    }
                })
                .collect(),
            GalleryTemplate::SideBySide => {
                let sizes: Vec<(f32, f32)> =
                    aspects.iter().take(2).map(|&a| fit(a, column, avail)).collect();
                let row = sizes.iter().map(|s| s.1).fold(0.0, f32::max);
                sizes
                    .iter()
                    .enumerate()
                    .map(|(i, &(w, h))| Placement {
                        x: column_x(i, w),
                        y: frame.top - row,
                        width: w,
                        height: h,
                    })
                    .collect()
            }
            GalleryTemplate::FeatureAndPair => {
                let Some((&first, rest)) = aspects.split_first() else {
                    return Vec::new();
                };
                let (fw, fh) = fit(first, frame.width, f32::INFINITY);
                let pair: Vec<(f32, f32)> = rest
                    .iter()
                    .take(2)
                    .map(|&a| fit(a, column, f32::INFINITY))
                    .collect();
                let row = pair.iter().map(|s| s.1).fold(0.0, f32::max);
                let gap = if pair.is_empty() { 0.0 } else { GALLERY_GAP };
                let total = fh + gap + row;
                let k = if total > avail {
                    ((avail - gap) / (fh + row)).max(0.0)
                } else {
                    1.0
                };

                let mut out = vec![Placement {
                    x: frame.left + (frame.width - fw * k) / 2.0,
                    y: frame.top - fh * k,
                    width: fw * k,
                    height: fh * k,
                }];
                let row_bottom = frame.top - fh * k - gap - row * k;
                out.extend(pair.iter().enumerate().map(|(i, &(w, h))| Placement {
                    x: column_x(i, w * k),
                    y: row_bottom,
                    width: w * k,
                    height: h * k,
                }));
                out
            }
        }
    }
}

/// Largest size with aspect ratio `aspect` inside `max_w × max_h`.
fn fit(aspect: f32, max_w: f32, max_h: f32) -> (f32, f32) {
    let aspect = if aspect.is_finite() && aspect > 0.0 {
        aspect
    } else {
        1.0
    };
    let (w, h) = (max_w, max_w / aspect);
    if h > max_h {
        (max_h * aspect, max_h)
    } else {
        (w, h)
    }
}

// ── Engine ────────────────────────────────────────────────────────────────

/// Lay out the whole report.
///
/// `signature_scale` converts signature pixels to points before the
/// signature is fitted under the validation block.
pub fn lay_out(request: &ReportRequest, images: PreparedImages, signature_scale: f32) -> RenderedDocument {
    let PreparedImages {
        lead,
        galleries,
        signature,
    } = images;
    let mut galleries = galleries.into_iter();

    let mut engine = Engine::new();
    let cursor = engine.cover(request);
    if let Some(image) = lead {
        engine.lead_photo(cursor, image);
    }

    for (index, observation) in request.observations.iter().enumerate() {
        engine.observation(index, observation);
        let gallery = galleries.next().unwrap_or_default();
        engine.photos(index, gallery);
    }

    engine.signature(&request.visit.author, signature, signature_scale);

    let title = sanitize(&format!("Rapport de visite - {}", request.visit.address));
    engine.finish(title, sanitize(&request.visit.author))
}

struct Engine {
    done: Vec<Page>,
    current: Page,
    images: Vec<NormalizedImage>,
}

impl Engine {
    fn new() -> Self {
        Self {
            done: Vec::new(),
            current: Page::new(PageKind::Cover),
            images: Vec::new(),
        }
    }

    /// Close the current page and open a new one with the brand banner.
    fn start_page(&mut self, kind: PageKind) -> Cursor {
        let finished = std::mem::replace(&mut self.current, Page::new(kind));
        self.done.push(finished);
        self.current
            .rect(MARGIN_X, HEADER_Y + 10.0, 120.0, 25.0, Rgb::BRAND_RED);
        self.current.text(
            MARGIN_X + 5.0,
            HEADER_Y + 18.0,
            12.0,
            Font::HelveticaBold,
            Rgb::WHITE,
            BRAND_NAME.to_string(),
        );
        Cursor::at(CONTENT_TOP)
    }

    fn start_observation_page(&mut self, index: usize) -> Cursor {
        let cursor = self.start_page(PageKind::Observation { index });
        self.current
            .rect(MARGIN_X, cursor.y(), CONTENT_WIDTH, 30.0, Rgb::BRAND_RED);
        let label_width = Font::HelveticaBold.width_of(OBSERVATIONS_LABEL, HEADING_SIZE);
        self.current.text(
            (PAGE_WIDTH - label_width) / 2.0,
            cursor.y() + 8.0,
            HEADING_SIZE,
            Font::HelveticaBold,
            Rgb::WHITE,
            OBSERVATIONS_LABEL.to_string(),
        );
        cursor.down(50.0)
    }

    fn embed(&mut self, image: NormalizedImage) -> ImageId {
        self.images.push(image);
        ImageId(self.images.len() - 1)
    }

    fn cover(&mut self, request: &ReportRequest) -> Cursor {
        let top = PAGE_HEIGHT;
        self.current.rect(25.0, top - 60.0, 140.0, 30.0, Rgb::BRAND_RED);
        self.current.text(
            40.0,
            top - 42.0,
            14.0,
            Font::HelveticaBold,
            Rgb::WHITE,
            BRAND_NAME.to_string(),
        );
        self.current.text(
            200.0,
            HEADER_Y,
            18.0,
            Font::HelveticaBold,
            Rgb::BLACK,
            REPORT_TITLE.to_string(),
        );

        let mut cursor = Cursor::at(HEADER_Y - 40.0);
        for (label, value) in request.visit.cover_lines() {
            cursor = self.cover_field(cursor, &sanitize(&format!("{label} {value}")));
        }
        cursor
    }

    /// One metadata line; overflow continues on another cover page.
    fn cover_field(&mut self, mut cursor: Cursor, field: &str) -> Cursor {
        let step = line_height(BODY_SIZE);
        let lines = wrap_lines(field, CONTENT_WIDTH, Font::Helvetica, BODY_SIZE);
        if lines.is_empty() {
            return cursor.down(step + PARAGRAPH_GAP);
        }
        for line in lines {
            if !cursor.fits(step) {
                cursor = self.start_page(PageKind::Cover);
            }
            self.current
                .text(MARGIN_X, cursor.y(), BODY_SIZE, Font::Helvetica, Rgb::BLACK, line);
            cursor = cursor.down(step);
        }
        cursor.down(PARAGRAPH_GAP)
    }

    fn lead_photo(&mut self, cursor: Cursor, image: NormalizedImage) {
        let aspect = image.aspect_ratio();
        let mut cursor = cursor.down(LEAD_PHOTO_GAP);
        let (_, wanted) = fit(aspect, CONTENT_WIDTH, LEAD_PHOTO_MAX_HEIGHT);
        if !cursor.fits(wanted) {
            debug!("Lead photo does not fit under the cover block, moving it to a new page");
            cursor = self.start_page(PageKind::Cover);
        }
        let (w, h) = fit(aspect, CONTENT_WIDTH, wanted.min(cursor.room()));
        let id = self.embed(image);
        self.current.push(DrawOp::Image {
            x: (PAGE_WIDTH - w) / 2.0,
            y: cursor.y() - h,
            width: w,
            height: h,
            image: id,
        });
    }

    fn observation(&mut self, index: usize, observation: &Observation) {
        let cursor = self.start_observation_page(index);

        let kind = sanitize(&observation.kind);
        let title = if kind.is_empty() {
            format!("Observation {}", index + 1)
        } else {
            format!("Observation {} - {}", index + 1, kind)
        };
        let cursor = wrap_and_draw(
            &mut self.current,
            &title,
            MARGIN_X,
            cursor,
            CONTENT_WIDTH,
            Font::HelveticaBold,
            16.0,
            observation.tone().color(),
        );

        let cursor = self.labeled_block(index, cursor, "Description :", &observation.description);
        if let Some(action) = observation.action_text() {
            self.labeled_block(index, cursor.down(10.0), "Action à mener :", action);
        }
    }

    /// Bold heading followed by flowing body text. The heading never sits
    /// alone at the bottom of a page.
    fn labeled_block(&mut self, index: usize, cursor: Cursor, heading: &str, body: &str) -> Cursor {
        let step = line_height(BODY_SIZE);
        let cursor = if cursor.fits(HEADING_ADVANCE + step) {
            cursor
        } else {
            self.start_observation_page(index)
        };
        self.current.text(
            MARGIN_X,
            cursor.y(),
            HEADING_SIZE,
            Font::HelveticaBold,
            Rgb::BLACK,
            sanitize(heading),
        );
        self.flow_paragraphs(index, cursor.down(HEADING_ADVANCE), &sanitize_paragraphs(body))
    }

    fn flow_paragraphs(&mut self, index: usize, mut cursor: Cursor, paragraphs: &[String]) -> Cursor {
        let step = line_height(BODY_SIZE);
        if paragraphs.is_empty() {
            return cursor.down(step + PARAGRAPH_GAP);
        }
        for paragraph in paragraphs {
            let lines = wrap_lines(paragraph, CONTENT_WIDTH, Font::Helvetica, BODY_SIZE);
            if lines.is_empty() {
                cursor = cursor.down(step);
                continue;
            }
            for line in lines {
                if !cursor.fits(step) {
                    cursor = self.start_observation_page(index);
                }
                self.current
                    .text(MARGIN_X, cursor.y(), BODY_SIZE, Font::Helvetica, Rgb::BLACK, line);
                cursor = cursor.down(step);
            }
        }
        cursor.down(PARAGRAPH_GAP)
    }

    fn photos(&mut self, index: usize, mut gallery: Vec<NormalizedImage>) {
        let Some(template) = GalleryTemplate::for_count(gallery.len()) else {
            return;
        };
        if gallery.len() > GalleryTemplate::MAX_PHOTOS {
            debug!(
                "Observation {}: {} photos, only the first {} are laid out",
                index + 1,
                gallery.len(),
                GalleryTemplate::MAX_PHOTOS
            );
            gallery.truncate(GalleryTemplate::MAX_PHOTOS);
        }

        let cursor = self.start_page(PageKind::Photos { index });
        let cursor = wrap_and_draw(
            &mut self.current,
            &format!("Photos - Observation {}", index + 1),
            MARGIN_X,
            cursor,
            CONTENT_WIDTH,
            Font::HelveticaBold,
            HEADING_SIZE,
            Rgb::BLACK,
        );

        let frame = Frame {
            left: MARGIN_X,
            top: cursor.y(),
            width: CONTENT_WIDTH,
            height: cursor.room(),
        };
        let aspects: Vec<f32> = gallery.iter().map(NormalizedImage::aspect_ratio).collect();
        let placements = template.place(&aspects, frame);
        for (image, p) in gallery.into_iter().zip(placements) {
            let id = self.embed(image);
            self.current.push(DrawOp::Image {
                x: p.x,
                y: p.y,
                width: p.width,
                height: p.height,
                image: id,
            });
        }
    }

    fn signature(&mut self, author: &str, signature: Option<NormalizedImage>, scale: f32) {
        let cursor = self.start_page(PageKind::Signature).down(10.0);
        self.current.text(
            MARGIN_X,
            cursor.y(),
            18.0,
            Font::HelveticaBold,
            Rgb::BLACK,
            VALIDATION_TITLE.to_string(),
        );
        let cursor = cursor.down(40.0);
        self.current
            .text(MARGIN_X, cursor.y(), 14.0, Font::Helvetica, Rgb::BLACK, sanitize(author));
        let cursor = cursor.down(20.0);
        self.current.text(
            MARGIN_X,
            cursor.y(),
            BODY_SIZE,
            Font::Helvetica,
            Rgb::CAPTION_GRAY,
            sanitize(ROLE_CAPTION),
        );
        let cursor = cursor.down(40.0);

        if let Some(image) = signature {
            let max_w = (image.width_px as f32 * scale).min(CONTENT_WIDTH);
            let max_h = (image.height_px as f32 * scale).min(cursor.room());
            let (w, h) = fit(image.aspect_ratio(), max_w, max_h);
            let id = self.embed(image);
            self.current.push(DrawOp::Image {
                x: MARGIN_X,
                y: cursor.y() - h,
                width: w,
                height: h,
                image: id,
            });
        }
    }

    fn finish(mut self, title: String, author: String) -> RenderedDocument {
        self.done.push(self.current);
        RenderedDocument {
            title,
            author,
            pages: self.done,
            images: self.images,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::VisitMetadata;
    use crate::pipeline::normalize::ImageFormat;

    fn image(w: u32, h: u32) -> NormalizedImage {
        NormalizedImage {
            data: vec![0xFF, 0xD8, 0xFF],
            format: ImageFormat::Jpeg,
            width_px: w,
            height_px: h,
        }
    }

    fn request(observations: Vec<Observation>) -> ReportRequest {
        ReportRequest {
            visit: VisitMetadata {
                date: "2024-05-01".into(),
                address: "12 rue de l'Église".into(),
                author: "Elodie BONNAY".into(),
                ..Default::default()
            },
            observations,
            ..Default::default()
        }
    }

    fn observation(kind: &str, description: &str) -> Observation {
        Observation {
            kind: kind.into(),
            description: description.into(),
            ..Default::default()
        }
    }

    fn frame() -> Frame {
        Frame {
            left: MARGIN_X,
            top: 700.0,
            width: CONTENT_WIDTH,
            height: 650.0,
        }
    }

    fn inside(p: &Placement, f: &Frame) -> bool {
        p.x >= f.left - 1e-3
            && p.x + p.width <= f.left + f.width + 1e-3
            && p.y >= f.top - f.height - 1e-3
            && p.y + p.height <= f.top + 1e-3
    }

    #[test]
    fn cursor_moves_down() {
        let c = Cursor::at(100.0).down(30.0);
        assert_eq!(c.y(), 70.0);
        assert!(c.fits(20.0));
        assert!(!c.fits(21.0));
        assert_eq!(c.room(), 20.0);
    }

    #[test]
    fn template_by_count() {
        assert_eq!(GalleryTemplate::for_count(0), None);
        assert_eq!(GalleryTemplate::for_count(1), Some(GalleryTemplate::Single));
        assert_eq!(GalleryTemplate::for_count(2), Some(GalleryTemplate::SideBySide));
        assert_eq!(GalleryTemplate::for_count(3), Some(GalleryTemplate::FeatureAndPair));
        assert_eq!(GalleryTemplate::for_count(7), Some(GalleryTemplate::FeatureAndPair));
    }

    #[test]
    fn single_is_centred() {
        let f = frame();
        let p = GalleryTemplate::Single.place(&[1.5], f);
        assert_eq!(p.len(), 1);
        assert!((p[0].x + p[0].width / 2.0 - PAGE_WIDTH / 2.0).abs() < 1e-3);
        assert!((p[0].width / p[0].height - 1.5).abs() < 1e-3);
        assert!(inside(&p[0], &f));
    }

    #[test]
    fn side_by_side_shares_baseline() {
        let f = frame();
        let p = GalleryTemplate::SideBySide.place(&[1.5, 0.75], f);
        assert_eq!(p.len(), 2);
        assert_eq!(p[0].y, p[1].y);
        assert!(p[0].x + p[0].width <= p[1].x);
        assert!(p.iter().all(|pl| inside(pl, &f)));
    }

    #[test]
    fn feature_and_pair_scales_to_fit() {
        let f = Frame {
            height: 300.0,
            ..frame()
        };
        let p = GalleryTemplate::FeatureAndPair.place(&[0.5, 0.5, 0.5], f);
        assert_eq!(p.len(), 3);
        assert!(p[0].y > p[1].y);
        assert_eq!(p[1].y, p[2].y);
        assert!(p[1].x < p[2].x);
        assert!(p.iter().all(|pl| inside(pl, &f)), "{p:?}");
        assert!((p[0].width / p[0].height - 0.5).abs() < 1e-3);
    }

    #[test]
    fn empty_report_is_cover_and_signature() {
        let doc = lay_out(&request(vec![]), PreparedImages::default(), 0.5);
        let kinds: Vec<_> = doc.pages.iter().map(|p| p.kind).collect();
        assert_eq!(kinds, vec![PageKind::Cover, PageKind::Signature]);
        let cover: Vec<_> = doc.pages[0].text_runs().collect();
        assert!(cover.contains(&"Adresse : 12 rue de l'Eglise"));
        assert!(cover.contains(&"Redacteur : Elodie BONNAY"));
        assert_eq!(doc.title, "Rapport de visite - 12 rue de l'Eglise");
    }

    #[test]
    fn observation_title_colour_follows_tone() {
        let req = request(vec![
            observation("✅ Positive", "Parties communes propres"),
            observation("⚠️ À surveiller", "Fissure"),
        ]);
        let doc = lay_out(&req, PreparedImages::default(), 0.5);
        let title_color = |page: &Page| {
            page.ops.iter().find_map(|op| match op {
                DrawOp::Text { text, color, .. } if text.starts_with("Observation ") => Some(*color),
                _ => None,
            })
        };
        assert_eq!(title_color(&doc.pages[1]), Some(Rgb::POSITIVE));
        assert_eq!(title_color(&doc.pages[2]), Some(Rgb::NEEDS_ATTENTION));
        assert!(doc.pages[2].text_runs().any(|t| t == "Observation 2 - A surveiller"));
    }

    #[test]
    fn action_block_only_when_present() {
        let mut with_action = observation("Négatif", "Fuite");
        with_action.action = Some("Prévenir le plombier".into());
        let req = request(vec![with_action, observation("Négatif", "Fuite")]);
        let doc = lay_out(&req, PreparedImages::default(), 0.5);
        assert!(doc.pages[1].text_runs().any(|t| t == "Action a mener :"));
        assert!(doc.pages[1].text_runs().any(|t| t == "Prevenir le plombier"));
        assert!(!doc.pages[2].text_runs().any(|t| t == "Action a mener :"));
    }

    #[test]
    fn long_description_flows_onto_continuation_pages() {
        let long = vec!["Ligne de constat detaillee."; 120].join("\n");
        let doc = lay_out(&request(vec![observation("Négatif", &long)]), PreparedImages::default(), 0.5);
        let obs_pages = doc
            .pages
            .iter()
            .filter(|p| p.kind == PageKind::Observation { index: 0 })
            .count();
        assert!(obs_pages >= 2, "expected overflow, got {obs_pages} page(s)");
        for page in &doc.pages {
            for op in &page.ops {
                if let DrawOp::Text { y, .. } = op {
                    assert!(*y >= BOTTOM_MARGIN, "text below margin at {y}");
                }
            }
        }
        let lines: usize = doc
            .pages
            .iter()
            .map(|p| p.text_runs().filter(|t| *t == "Ligne de constat detaillee.").count())
            .sum();
        assert_eq!(lines, 120);
    }

    #[test]
    fn photos_get_their_own_page_in_order() {
        let req = request(vec![observation("Positive", "ok")]);
        let images = PreparedImages {
            galleries: vec![vec![image(600, 400), image(400, 400), image(300, 600)]],
            ..Default::default()
        };
        let doc = lay_out(&req, images, 0.5);
        assert_eq!(doc.pages[2].kind, PageKind::Photos { index: 0 });
        let placed = doc.pages[2].image_placements();
        assert_eq!(placed.len(), 3);
        let widths: Vec<u32> = placed
            .iter()
            .map(|(id, _)| doc.image(*id).unwrap().width_px)
            .collect();
        assert_eq!(widths, vec![600, 400, 300]);
        assert!(doc.pages[1].image_placements().is_empty());
    }

    #[test]
    fn extra_photos_are_ignored() {
        let req = request(vec![observation("Positive", "ok")]);
        let images = PreparedImages {
            galleries: vec![vec![image(100, 100); 5]],
            ..Default::default()
        };
        let doc = lay_out(&req, images, 0.5);
        assert_eq!(doc.pages[2].image_placements().len(), 3);
        assert_eq!(doc.images.len(), 3);
    }

    #[test]
    fn observation_without_photos_has_no_photo_page() {
        let req = request(vec![observation("Positive", "ok")]);
        let doc = lay_out(&req, PreparedImages::default(), 0.5);
        assert!(!doc.pages.iter().any(|p| matches!(p.kind, PageKind::Photos { .. })));
    }

    #[test]
    fn tall_lead_photo_moves_to_next_page() {
        let mut req = request(vec![]);
        req.visit.people_present = vec!["Monsieur Dupont, copropriétaire"; 60].join(", ");
        let images = PreparedImages {
            lead: Some(image(1000, 750)),
            ..Default::default()
        };
        let doc = lay_out(&req, images, 0.5);
        assert_eq!(doc.pages[0].kind, PageKind::Cover);
        assert_eq!(doc.pages[1].kind, PageKind::Cover);
        assert!(doc.pages[0].image_placements().is_empty());
        let (_, p) = doc.pages[1].image_placements()[0];
        assert!(p.y >= BOTTOM_MARGIN);
    }

    #[test]
    fn lead_photo_fits_on_cover() {
        let images = PreparedImages {
            lead: Some(image(1000, 750)),
            ..Default::default()
        };
        let doc = lay_out(&request(vec![]), images, 0.5);
        let placed = doc.pages[0].image_placements();
        assert_eq!(placed.len(), 1);
        assert!(placed[0].1.height <= LEAD_PHOTO_MAX_HEIGHT + 1e-3);
        assert!(placed[0].1.y >= BOTTOM_MARGIN);
    }

    #[test]
    fn signature_is_scaled_at_left_margin() {
        let images = PreparedImages {
            signature: Some(image(400, 200)),
            ..Default::default()
        };
        let doc = lay_out(&request(vec![]), images, 0.5);
        let page = doc.pages.last().unwrap();
        assert_eq!(page.kind, PageKind::Signature);
        let (_, p) = page.image_placements()[0];
        assert_eq!(p.x, MARGIN_X);
        assert!((p.width - 200.0).abs() < 1e-3);
        assert!((p.height - 100.0).abs() < 1e-3);
        assert!(page.text_runs().any(|t| t == "Elodie BONNAY"));
        assert!(page.text_runs().any(|t| t == "Gestionnaire de copropriete"));
    }

    #[test]
    fn every_later_page_has_brand_banner() {
        let req = request(vec![observation("Positive", "ok")]);
        let images = PreparedImages {
            galleries: vec![vec![image(100, 100)]],
            ..Default::default()
        };
        let doc = lay_out(&req, images, 0.5);
        for page in &doc.pages[1..] {
            assert!(matches!(
                page.ops.first(),
                Some(DrawOp::Rect { color, .. }) if *color == Rgb::BRAND_RED
            ));
            assert!(page.text_runs().any(|t| t == BRAND_NAME));
        }
    }

    #[test]
    fn long_cover_field_continues_on_next_cover_page() {
        let mut req = request(vec![observation("Positive", "ok")]);
        req.visit.people_present = vec!["Monsieur Dupont, coproprietaire"; 400].join(", ");
        let doc = lay_out(&req, PreparedImages::default(), 0.5);

        assert_eq!(doc.pages[0].kind, PageKind::Cover);
        assert_eq!(doc.pages[1].kind, PageKind::Cover);
        for page in &doc.pages {
            for op in &page.ops {
                if let DrawOp::Text { y, text, .. } = op {
                    assert!(*y >= BOTTOM_MARGIN, "'{text}' drawn at {y} on {:?}", page.kind);
                }
            }
        }
        let drawn = doc
            .pages
            .iter()
            .filter(|p| p.kind == PageKind::Cover)
            .flat_map(|p| p.text_runs())
            .filter(|t| t.contains("Dupont"))
            .map(|t| t.matches("Dupont").count())
            .sum::<usize>();
        assert_eq!(drawn, 400);
    }
}
