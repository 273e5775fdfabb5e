//! Encoding detection and UTF-8 transcoding for local inputs.
//!
//! Detection samples a bounded prefix of the file. BOMs win outright, then
//! binary content is rejected, then UTF-8 validity is checked, and finally a
//! handful of single-byte code pages are scored on how plausible their
//! decoded text looks.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

use encoding_rs::{
    CoderResult, DecoderResult, Encoding, UTF_8, UTF_16BE, UTF_16LE, WINDOWS_1250, WINDOWS_1251,
    WINDOWS_1252,
};
use log::debug;

use crate::error::NormalizeError;

pub const DETECTION_SAMPLE_BYTES: usize = 64 * 1024;
const CONTROL_BYTE_LIMIT_PERCENT: usize = 10;
const UTF16_NUL_RATIO_PERCENT: usize = 30;
const TRANSCODE_CHUNK_BYTES: usize = 64 * 1024;

const SINGLE_BYTE_CANDIDATES: &[&Encoding] = &[WINDOWS_1252, WINDOWS_1250, WINDOWS_1251];

const NEUTRAL_SYMBOLS: &[char] = &[
    '\u{a0}', '€', '£', '¥', '¢', '¤', '°', '§', '«', '»', '–', '—', '‘', '’', '‚', '“', '”', '„',
    '…', '©', '®', '™', 'µ', '·', '¡', '¿', 'ª', 'º', '±', '×', '÷', '¦', '¨', '¬', '¯', '²', '³',
    '¹', '¼', '½', '¾', '´', '¸', '†', '‡', '•', '‰', '¶',
];

/// Returns a lowercase encoding label for the file at `path`.
pub fn detect_encoding(path: &Path) -> Result<String, NormalizeError> {
    let mut sample = Vec::with_capacity(DETECTION_SAMPLE_BYTES);
    File::open(path)?
        .take(DETECTION_SAMPLE_BYTES as u64)
        .read_to_end(&mut sample)?;
    let label = detect_from_bytes(&sample).map_err(|reason| {
        NormalizeError::EncodingUndetectable {
            path: path.to_path_buf(),
            reason,
        }
    })?;
    debug!(
        "Detected encoding '{label}' for {:?} from {} sampled byte(s)",
        path,
        sample.len()
    );
    Ok(label.to_string())
}

pub fn detect_from_bytes(sample: &[u8]) -> Result<&'static str, String> {
    if sample.is_empty() {
        return Err("file is empty".to_string());
    }

    if let Some((encoding, _)) = Encoding::for_bom(sample) {
        if encoding == UTF_8 {
            return Ok("utf-8-sig");
        } else if encoding == UTF_16LE {
            return Ok("utf-16le");
        } else if encoding == UTF_16BE {
            return Ok("utf-16be");
        }
    }

    if sample.contains(&0) {
        return detect_bomless_utf16(sample)
            .ok_or_else(|| "binary content (NUL bytes) detected".to_string());
    }

    let control_bytes = sample
        .iter()
        .filter(|&&b| (b < 0x20 && !matches!(b, b'\t' | b'\n' | b'\r' | 0x0c)) || b == 0x7f)
        .count();
    if control_bytes * 100 > sample.len() * CONTROL_BYTE_LIMIT_PERCENT {
        return Err("binary content (control bytes) detected".to_string());
    }

    if sample.is_ascii() {
        return Ok("ascii");
    }

    match std::str::from_utf8(sample) {
        Ok(_) => return Ok("utf-8"),
        // A multi-byte sequence cut by the sample boundary is still UTF-8.
        Err(err) if err.error_len().is_none() && sample.len() >= DETECTION_SAMPLE_BYTES => {
            return Ok("utf-8");
        }
        Err(_) => {}
    }

    // Currency and unit symbols are common in windows-1252 files and decode to
    // letters under the other code pages, so outside of words they score zero
    // for every candidate. Ties go to windows-1252.
    let (western, _) = WINDOWS_1252.decode_without_bom_handling(sample);
    let western: Vec<char> = western.chars().collect();
    let neutral = neutral_positions(&western);

    let mut best: Option<(&'static Encoding, i64)> = None;
    for candidate in SINGLE_BYTE_CANDIDATES {
        let (text, had_errors) = candidate.decode_without_bom_handling(sample);
        if had_errors {
            continue;
        }
        let score = plausibility_score(&text, &neutral);
        debug!("Single-byte candidate {} scored {score}", candidate.name());
        if best.is_none_or(|(_, top)| score > top) {
            best = Some((candidate, score));
        }
    }

    match best {
        Some((encoding, score)) if score >= 0 => Ok(label_for(encoding)),
        _ => Err("confidence too low for any supported encoding".to_string()),
    }
}

/// Only the canonical UTF-8 family is passed through untouched.
pub fn needs_conversion(label: &str) -> bool {
    !matches!(
        label.trim().to_ascii_lowercase().as_str(),
        "utf-8" | "utf8" | "utf_8" | "ascii" | "us-ascii"
    )
}

pub fn resolve_label(label: &str) -> Option<&'static Encoding> {
    match label.trim().to_ascii_lowercase().as_str() {
        "utf-8-sig" | "utf_8_sig" => Some(UTF_8),
        other => Encoding::for_label(other.as_bytes()),
    }
}

/// Transcodes `source` into UTF-8 at `destination`, failing on malformed input.
pub fn convert_to_utf8(source: &Path, destination: &Path, label: &str) -> Result<(), NormalizeError> {
    let conversion_failed = |reason: String| NormalizeError::EncodingConversionFailed {
        encoding: label.to_string(),
        reason,
    };
    let encoding =
        resolve_label(label).ok_or_else(|| conversion_failed("unknown encoding".to_string()))?;

    let mut reader = BufReader::new(File::open(source)?);
    let mut writer = BufWriter::new(File::create(destination)?);
    let mut decoder = encoding.new_decoder_with_bom_removal();
    let mut input = vec![0u8; TRANSCODE_CHUNK_BYTES];
    let mut output = vec![
        0u8;
        decoder
            .max_utf8_buffer_length_without_replacement(TRANSCODE_CHUNK_BYTES)
            .unwrap_or(TRANSCODE_CHUNK_BYTES * 4)
    ];
    let mut offset = 0usize;

    loop {
        let read = reader.read(&mut input)?;
        let last = read == 0;
        let mut consumed = 0usize;
        loop {
            let (result, bytes_read, bytes_written) =
                decoder.decode_to_utf8_without_replacement(&input[consumed..read], &mut output, last);
            consumed += bytes_read;
            writer.write_all(&output[..bytes_written])?;
            match result {
                DecoderResult::InputEmpty => break,
                DecoderResult::OutputFull => continue,
                DecoderResult::Malformed(_, _) => {
                    return Err(conversion_failed(format!(
                        "malformed byte sequence near byte {}",
                        offset + consumed
                    )));
                }
            }
        }
        offset += read;
        if last {
            break;
        }
    }
    writer.flush()?;
    debug!(
        "Transcoded {} byte(s) from {} into {:?}",
        offset,
        encoding.name(),
        destination
    );
    Ok(())
}

fn label_for(encoding: &'static Encoding) -> &'static str {
    if encoding == WINDOWS_1250 {
        "windows-1250"
    } else if encoding == WINDOWS_1251 {
        "windows-1251"
    } else {
        "windows-1252"
    }
}

fn detect_bomless_utf16(sample: &[u8]) -> Option<&'static str> {
    let pairs = sample.len() / 2;
    if pairs == 0 {
        return None;
    }
    let even_nuls = sample.iter().step_by(2).filter(|&&b| b == 0).count();
    let odd_nuls = sample.iter().skip(1).step_by(2).filter(|&&b| b == 0).count();
    let threshold = pairs * UTF16_NUL_RATIO_PERCENT / 100;
    if odd_nuls > threshold && even_nuls == 0 && utf16_decodes(UTF_16LE, sample) {
        Some("utf-16le")
    } else if even_nuls > threshold && odd_nuls == 0 && utf16_decodes(UTF_16BE, sample) {
        Some("utf-16be")
    } else {
        None
    }
}

fn utf16_decodes(encoding: &'static Encoding, sample: &[u8]) -> bool {
    let even = &sample[..sample.len() - sample.len() % 2];
    let mut decoder = encoding.new_decoder_without_bom_handling();
    let mut scratch = String::with_capacity(even.len() * 2);
    let (result, _, had_errors) = decoder.decode_to_string(even, &mut scratch, false);
    // A trailing surrogate split by the sample boundary is tolerated.
    result == CoderResult::InputEmpty && !had_errors
}

/// Marks windows-1252 symbols that are not wedged between two letters.
fn neutral_positions(western: &[char]) -> Vec<bool> {
    (0..western.len())
        .map(|i| {
            if !NEUTRAL_SYMBOLS.contains(&western[i]) {
                return false;
            }
            let before = i.checked_sub(1).and_then(|j| western.get(j));
            let after = western.get(i + 1);
            !matches!((before, after), (Some(b), Some(a)) if b.is_alphabetic() && a.is_alphabetic())
        })
        .collect()
}

/// Scores decoded text on how much its non-ASCII content looks like language.
/// Single-byte code pages decode one char per byte, so `neutral` lines up
/// with `text`.
fn plausibility_score(text: &str, neutral: &[bool]) -> i64 {
    let mut score = 0i64;
    for (i, ch) in text.chars().enumerate() {
        if ch.is_ascii() || neutral.get(i).copied().unwrap_or(false) {
            continue;
        }
        score += if ('\u{80}'..='\u{9f}').contains(&ch) {
            -5
        } else if ch.is_alphabetic() {
            1
        } else if NEUTRAL_SYMBOLS.contains(&ch) {
            0
        } else {
            -2
        };
    }

    for word in text.split(|c: char| !c.is_alphanumeric()) {
        if word.is_ascii() {
            continue;
        }
        let has_ascii_letters = word.chars().any(|c| c.is_ascii_alphabetic());
        let has_cyrillic = word.chars().any(is_cyrillic);
        if has_cyrillic && has_ascii_letters {
            score -= 3;
        }
        if longest_latin_extended_run(word) >= 3 {
            score -= 3;
        }
    }
    score
}

fn is_cyrillic(ch: char) -> bool {
    ('\u{400}'..='\u{4ff}').contains(&ch)
}

fn longest_latin_extended_run(word: &str) -> usize {
    let mut longest = 0usize;
    let mut current = 0usize;
    for ch in word.chars() {
        if ('\u{c0}'..='\u{24f}').contains(&ch) {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}
