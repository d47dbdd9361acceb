//! Text sanitisation for the standard-14 PDF fonts.
//!
//! The report is drawn with the built-in Helvetica faces, which only cover a
//! single-byte encoding. Anything outside printable ASCII (emoji from the
//! observation type labels, accented French text, smart punctuation pasted
//! from a phone keyboard) is either folded to an ASCII equivalent or dropped
//! here, before it reaches the layout engine.
//!
//! ## Pass order
//!
//! 1. Fold typographic punctuation and ligatures to ASCII (`’` → `'`, `œ` → `oe`)
//! 2. Unicode NFD, then drop combining marks (`é` → `e`)
//! 3. Drop everything that is still not printable ASCII
//! 4. Collapse whitespace runs (line breaks included) to one space, trim
//!
//! Folding runs before the ASCII filter, otherwise curly quotes and dashes
//! would be deleted instead of mapped.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

static RE_FILE_UNSAFE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9_-]").unwrap());

/// Sanitise a string for a single-line field.
///
/// Never fails: on any input it returns best-effort printable ASCII
/// (`0x20..=0x7E`) with line breaks collapsed to spaces and no leading or
/// trailing whitespace.
pub fn sanitize(text: &str) -> String {
    let ascii = to_printable_ascii(text);
    RE_WHITESPACE.replace_all(&ascii, " ").trim().to_string()
}

/// Sanitise multi-line text into paragraphs.
///
/// Each input line becomes one sanitised paragraph. Blank lines are kept as
/// empty paragraphs so the layout engine can preserve the author's spacing;
/// leading and trailing blank lines are dropped.
pub fn sanitize_paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs: Vec<String> = text
        .split('\n')
        .map(|line| sanitize(line.trim_end_matches('\r')))
        .collect();

    while paragraphs.last().is_some_and(|p| p.is_empty()) {
        paragraphs.pop();
    }
    let leading = paragraphs.iter().take_while(|p| p.is_empty()).count();
    paragraphs.drain(..leading);
    paragraphs
}

/// Sanitise free text into a storage-key fragment.
///
/// Diacritics are stripped first so `Rue de l'Église` keeps its letters;
/// every remaining character outside `[A-Za-z0-9_-]` becomes `_`.
pub fn sanitize_file_name(name: &str) -> String {
    let stripped: String = name
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect();
    RE_FILE_UNSAFE.replace_all(&stripped, "_").into_owned()
}

/// Fold, decompose and filter to printable ASCII. Tabs and line breaks
/// become spaces.
fn to_printable_ascii(text: &str) -> String {
    let mut folded = String::with_capacity(text.len());
    for c in text.chars() {
        match fold_char(c) {
            Some(s) => folded.push_str(s),
            None => folded.push(c),
        }
    }

    folded
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .filter_map(|c| match c {
            ' '..='~' => Some(c),
            '\t' | '\n' | '\r' => Some(' '),
            _ => None,
        })
        .collect()
}

/// ASCII replacement for characters NFD cannot decompose.
fn fold_char(c: char) -> Option<&'static str> {
    let s = match c {
        '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{2032}' => "'",
        '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{00AB}' | '\u{00BB}' => "\"",
        '\u{2026}' => "...",
        '\u{2013}' | '\u{2014}' | '\u{2212}' => "-",
        '\u{2022}' => "-",
        '\u{00A0}' | '\u{202F}' | '\u{2009}' => " ",
        '\u{0153}' => "oe",
        '\u{0152}' => "OE",
        '\u{00E6}' => "ae",
        '\u{00C6}' => "AE",
        '\u{00DF}' => "ss",
        '\u{20AC}' => "EUR",
        _ => return None,
    };
    Some(s)
}
