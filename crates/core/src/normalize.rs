//! Canonicalization of raw extracted text.
//!
//! Output keeps single `\n` line separators (the segmenter anchors on line
//! starts) but is otherwise restricted to letters, digits, a small set of
//! ASCII punctuation and single spaces. `normalize` is idempotent.

use unicode_normalization::UnicodeNormalization;

const ZERO_WIDTH: [char; 6] = [
    '\u{200b}', // zero width space
    '\u{200c}', // zero width non-joiner
    '\u{200d}', // zero width joiner
    '\u{2060}', // word joiner
    '\u{feff}', // byte order mark
    '\u{00ad}', // soft hyphen
];

const WIDE_SPACES: [char; 4] = ['\u{00a0}', '\u{2007}', '\u{202f}', '\u{3000}'];

const MATH_NOISE: [char; 14] = [
    '±', '×', '÷', '√', '≈', '≠', '≤', '≥', '∞', '∑', '∫', '∂', '∆', '∏',
];

const KEPT_PUNCTUATION: [char; 14] = [
    '.', ',', ':', ';', '?', '!', '(', ')', '%', '-', '"', '\'', '/', '&',
];

const COLLAPSIBLE_PUNCTUATION: [char; 8] = ['.', ',', ':', ';', '?', '!', '-', '/'];

pub fn normalize(raw: &str) -> String {
    let composed: String = raw.nfkd().collect::<String>().nfc().collect();

    let mut plain = String::with_capacity(composed.len());
    for character in composed.chars() {
        match character {
            c if ZERO_WIDTH.contains(&c) => {}
            c if WIDE_SPACES.contains(&c) => plain.push(' '),
            '\r' | '\u{000c}' | '\u{2028}' | '\u{2029}' => plain.push('\n'),
            '\n' => plain.push('\n'),
            '\t' => plain.push(' '),
            c if c.is_control() => {}
            c => push_plain(&mut plain, c),
        }
    }

    let filtered: String = plain
        .chars()
        .map(|c| if is_retained(c) { c } else { ' ' })
        .collect();

    collapse_whitespace(&collapse_repeated_punctuation(&filtered))
}

/// Whitespace-only collapse, used for single-line question bodies.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn push_plain(out: &mut String, character: char) {
    let replacement = match character {
        '“' | '”' | '„' | '‟' | '«' | '»' => "\"",
        '‘' | '’' | '‚' | '‛' | '′' => "'",
        '–' | '—' | '‒' | '―' | '−' | '‐' | '‑' => "-",
        '…' => "...",
        '⁄' | '∕' => "/",
        '•' | '·' | '▪' | '◦' | '●' => "-",
        '°' => " degree ",
        '₹' => " Rs ",
        '€' => " Euro ",
        '£' => " Pound ",
        '$' => " USD ",
        c if MATH_NOISE.contains(&c) => " ",
        c => {
            out.push(c);
            return;
        }
    };
    out.push_str(replacement);
}

fn is_retained(character: char) -> bool {
    character == '\n'
        || character == ' '
        || character.is_alphanumeric()
        || KEPT_PUNCTUATION.contains(&character)
}

fn collapse_repeated_punctuation(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut previous: Option<char> = None;
    for character in text.chars() {
        if previous == Some(character) && COLLAPSIBLE_PUNCTUATION.contains(&character) {
            continue;
        }
        out.push(character);
        previous = Some(character);
    }
    out
}

fn collapse_whitespace(text: &str) -> String {
    text.lines()
        .map(normalize_whitespace)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
