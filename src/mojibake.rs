//! Detection and repair of UTF-8 text that was decoded as windows-1252.
//!
//! A UTF-8 sequence misread as windows-1252 turns into a lead character
//! (`Â`..`ß`, `à`..`ï`, `ð`..`ô`) followed by one to three characters whose
//! windows-1252 byte lies in the continuation range 0x80..=0xBF. Repair
//! re-encodes each such run to windows-1252 and decodes the bytes as UTF-8.

use std::{
    borrow::Cow,
    fs::{self, File},
    io::{self, Read},
    path::Path,
    sync::OnceLock,
};

use encoding_rs::WINDOWS_1252;
use log::{debug, warn};
use regex::{Captures, Regex};

const CONTINUATION: &str = concat!(
    r"[\x{80}-\x{BF}\x{152}\x{153}\x{160}\x{161}\x{178}\x{17D}\x{17E}\x{192}\x{2C6}\x{2DC}",
    r"\x{2013}\x{2014}\x{2018}-\x{201A}\x{201C}-\x{201E}\x{2020}-\x{2022}\x{2026}\x{2030}",
    r"\x{2039}\x{203A}\x{20AC}\x{2122}]"
);

fn signature_regex() -> &'static Regex {
    static SIGNATURE: OnceLock<Regex> = OnceLock::new();
    SIGNATURE.get_or_init(|| {
        let c = CONTINUATION;
        let pattern = format!(
            r"(?:[\x{{C2}}-\x{{DF}}]{c}|[\x{{E0}}-\x{{EF}}]{c}{c}|[\x{{F0}}-\x{{F4}}]{c}{c}{c})+"
        );
        Regex::new(&pattern).expect("mojibake signature pattern is valid")
    })
}

pub fn has_mojibake(text: &str) -> bool {
    signature_regex().is_match(text)
}

/// Repairs every signature run that round-trips through windows-1252 into
/// valid UTF-8. Clean text is returned borrowed.
pub fn fix_text(text: &str) -> Cow<'_, str> {
    let mut changed = false;
    let fixed = signature_regex().replace_all(text, |caps: &Captures<'_>| {
        let run = &caps[0];
        match repair_run(run) {
            Some(repaired) => {
                changed = true;
                repaired
            }
            None => run.to_string(),
        }
    });
    if changed { fixed } else { Cow::Borrowed(text) }
}

fn repair_run(run: &str) -> Option<String> {
    let (bytes, _, had_errors) = WINDOWS_1252.encode(run);
    if had_errors {
        return None;
    }
    String::from_utf8(bytes.into_owned()).ok()
}

/// Samples `source` and, when mojibake is found, writes the repaired text to
/// `destination`. Returns whether a repaired copy was written.
pub fn repair_file(source: &Path, destination: &Path, sample_bytes: usize) -> io::Result<bool> {
    let mut sample = Vec::with_capacity(sample_bytes.min(1 << 20));
    File::open(source)?
        .take(sample_bytes as u64)
        .read_to_end(&mut sample)?;
    if !has_mojibake(&String::from_utf8_lossy(&sample)) {
        debug!("No mojibake signatures in first {} byte(s)", sample.len());
        return Ok(false);
    }

    let content = match fs::read_to_string(source) {
        Ok(content) => content,
        Err(err) if err.kind() == io::ErrorKind::InvalidData => {
            warn!("Skipping mojibake repair: {:?} is not valid UTF-8", source);
            return Ok(false);
        }
        Err(err) => return Err(err),
    };
    let fixed = fix_text(&content);
    if let Cow::Borrowed(_) = fixed {
        debug!("Mojibake signatures found but none round-trip to UTF-8");
        return Ok(false);
    }
    fs::write(destination, fixed.as_bytes())?;
    debug!("Wrote mojibake-repaired copy to {:?}", destination);
    Ok(true)
}
