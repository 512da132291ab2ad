//! Text frontend: normalization, number expansion and symbol-id encoding.
//!
//! The acoustic model was trained on lowercased LJSpeech transcripts, so the
//! frontend lowercases everything and expands numeric literals into their
//! spoken form before the character-level symbol lookup.

use super::vocab::SymbolVocabulary;

const UNITS: [&str; 20] = [
    "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
    "eleven", "twelve", "thirteen", "fourteen", "fifteen", "sixteen", "seventeen", "eighteen",
    "nineteen",
];

const TENS: [&str; 10] = [
    "", "", "twenty", "thirty", "forty", "fifty", "sixty", "seventy", "eighty", "ninety",
];

/// Normalize raw utterance text for symbol encoding.
///
/// Lowercases the input and replaces each numeric literal (a digit run with
/// an optional decimal fraction) with its spoken-word form. Literals too
/// large to represent are left verbatim; their digits are then dropped at
/// encode time as out-of-vocabulary symbols.
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    let mut rest = lowered.as_str();

    while let Some(pos) = rest.find(|c: char| c.is_ascii_digit()) {
        out.push_str(&rest[..pos]);
        let (literal, tail) = split_leading_number(&rest[pos..]);
        match expand_numeric_literal(literal) {
            Some(words) => out.push_str(&words),
            None => out.push_str(literal),
        }
        rest = tail;
    }

    out.push_str(rest);
    out
}

/// Split a string starting with a digit into the numeric literal and the rest.
///
/// The literal is `[0-9]+` optionally followed by `.[0-9]+`; a trailing dot
/// with no digit after it is sentence punctuation, not a fraction.
fn split_leading_number(s: &str) -> (&str, &str) {
    let bytes = s.as_bytes();
    let mut end = 0;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end + 1 < bytes.len() && bytes[end] == b'.' && bytes[end + 1].is_ascii_digit() {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
    }
    s.split_at(end)
}

fn expand_numeric_literal(literal: &str) -> Option<String> {
    let amount: f64 = literal.parse().ok()?;
    // i64 conversion of the integer part is only defined inside this range.
    if amount.trunc().abs() >= i64::MAX as f64 {
        return None;
    }
    Some(convert_amount(amount))
}

/// Render a decimal amount as spoken English.
///
/// The fractional part is rounded to two digits and spoken as a plain
/// number, so `19.5` becomes `"nineteen point fifty"`.
pub fn convert_amount(amount: f64) -> String {
    if amount < 0.0 {
        return format!("minus {}", convert_amount(-amount));
    }

    let int_part = amount.trunc() as i64;
    let frac_part = ((amount - int_part as f64) * 100.0).round() as i64;

    if frac_part == 0 {
        number_to_word(int_part)
    } else {
        format!(
            "{} point {}",
            number_to_word(int_part),
            number_to_word(frac_part)
        )
    }
}

/// Render an integer as spoken English, recursively by scale.
pub fn number_to_word(i: i64) -> String {
    if i < 0 {
        return format!("minus {}", to_words(i.unsigned_abs()));
    }
    to_words(i as u64)
}

fn to_words(i: u64) -> String {
    if i < 20 {
        return UNITS[i as usize].to_string();
    }

    if i < 100 {
        return match i % 10 {
            0 => TENS[(i / 10) as usize].to_string(),
            rem => format!("{} {}", TENS[(i / 10) as usize], to_words(rem)),
        };
    }

    if i < 1_000 {
        return match i % 100 {
            0 => format!("{} hundred", UNITS[(i / 100) as usize]),
            rem => format!("{} hundred and {}", UNITS[(i / 100) as usize], to_words(rem)),
        };
    }

    let (scale, word) = match i {
        0..=999_999 => (1_000, "thousand"),
        1_000_000..=999_999_999 => (1_000_000, "million"),
        1_000_000_000..=999_999_999_999 => (1_000_000_000, "billion"),
        _ => (1_000_000_000_000, "trillion"),
    };

    match i % scale {
        0 => format!("{} {word}", to_words(i / scale)),
        rem => format!("{} {word}, {}", to_words(i / scale), to_words(rem)),
    }
}

/// Encode normalized text into an ordered sequence of symbol ids.
///
/// Characters in the fixed exclusion set are skipped outright; characters
/// missing from the vocabulary are logged and skipped, never fatal. The
/// vocabulary's end-of-sequence id is always appended, so the result is
/// never empty.
pub fn encode(text: &str, vocab: &SymbolVocabulary) -> Vec<i32> {
    let mut sequence = Vec::with_capacity(text.len() + 1);
    let mut buf = [0u8; 4];

    for ch in text.chars() {
        if !should_keep_symbol(ch) {
            continue;
        }
        match vocab.id(ch.encode_utf8(&mut buf)) {
            Some(id) => sequence.push(id),
            None => log::warn!("Symbol not in vocabulary: {ch:?}"),
        }
    }

    sequence.push(vocab.eos_id());
    sequence
}

/// Padding, tilde and zero-width-space never reach the symbol lookup.
fn should_keep_symbol(symbol: char) -> bool {
    symbol != '_' && symbol != '~' && symbol != '\u{200B}'
}
