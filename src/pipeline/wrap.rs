//! Greedy word wrapping against measured Helvetica widths.
//!
//! [`wrap_lines`] is the pure line breaker; [`wrap_and_draw`] places the
//! lines on one page and hands back the next cursor, so labelled fields can
//! be chained without manual bookkeeping:
//!
//! ```rust
//! use visit_report::pipeline::layout::{Cursor, Page, PageKind, Rgb};
//! use visit_report::pipeline::metrics::Font;
//! use visit_report::pipeline::wrap::wrap_and_draw;
//!
//! let mut page = Page::new(PageKind::Cover);
//! let next = wrap_and_draw(&mut page, "Date : 2024-05-01", 50.0, Cursor::at(700.0),
//!                          495.0, Font::Helvetica, 12.0, Rgb::BLACK);
//! assert_eq!(next.y(), 680.0);
//! ```

use crate::pipeline::layout::{Cursor, DrawOp, Page, Rgb};
use crate::pipeline::metrics::Font;

/// Extra space added after every wrapped block.
pub const PARAGRAPH_GAP: f32 = 5.0;

/// Baseline-to-baseline distance for text set at `size` (15pt for 12pt body).
pub fn line_height(size: f32) -> f32 {
    size * 1.25
}

/// Break `text` into lines no wider than `max_width`.
///
/// Words are separated by any whitespace and re-joined with single spaces.
/// A word wider than `max_width` on its own is kept whole on its own line;
/// splitting it would change the text. Empty input yields no lines.
pub fn wrap_lines(text: &str, max_width: f32, font: Font, size: f32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.is_empty() {
            current.push_str(word);
            continue;
        }
        // Measure the joined line so the comparison matches how it is drawn.
        let candidate = format!("{current} {word}");
        if font.width_of(&candidate, size) <= max_width {
            current = candidate;
        } else {
            lines.push(std::mem::replace(&mut current, word.to_string()));
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Wrap `text` and draw it top-down starting at `start`.
///
/// The first baseline sits at `start.y()`; each further line is one
/// [`line_height`] lower. Returns the cursor below the last line plus
/// [`PARAGRAPH_GAP`]. Empty text draws nothing but still advances by one
/// line height and the gap, so an empty field keeps the rows below aligned.
#[allow(clippy::too_many_arguments)]
pub fn wrap_and_draw(
    page: &mut Page,
    text: &str,
    x: f32,
    start: Cursor,
    max_width: f32,
    font: Font,
    size: f32,
    color: Rgb,
) -> Cursor {
    let lines = wrap_lines(text, max_width, font, size);
    let step = line_height(size);

    if lines.is_empty() {
        return start.down(step + PARAGRAPH_GAP);
    }

    let mut cursor = start;
    for line in lines {
        page.push(DrawOp::Text {
            x,
            y: cursor.y(),
            size,
            font,
            color,
            text: line,
        });
        cursor = cursor.down(step);
    }
    cursor.down(PARAGRAPH_GAP)
}
