//! FAT Short Name Mapping
//!
//! The storage layer uses 8.3 names, which caps the base name at eight
//! characters. `picture10` and up do not fit, so they are written under
//! a `pic<N>` alias and expanded back when listing. Core code and the
//! wire protocol only ever see the `picture<N>` form.

use heapless::String;

/// On-disk name for a logical image name
///
/// Returns `None` when the name cannot be represented, which bounds the
/// image index at five digits.
pub fn short_name_for(name: &str) -> Option<String<12>> {
    let (base, ext) = name.rsplit_once('.')?;
    if ext.len() > 3 {
        return None;
    }
    let mut short = String::new();
    if base.len() <= 8 {
        short.push_str(base).ok()?;
    } else {
        let digits = base.strip_prefix("picture")?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        short.push_str("pic").ok()?;
        short.push_str(digits).ok()?;
        if short.len() > 8 {
            return None;
        }
    }
    short.push('.').ok()?;
    short.push_str(ext).ok()?;
    Some(short)
}

/// Logical name for an on-disk 8.3 entry
///
/// Expands the `pic<N>` alias and lowercases everything else. Returns
/// `None` for entries that are not valid in a logical name (which the
/// index scan would ignore anyway).
pub fn long_name_for(base: &[u8], ext: &[u8]) -> Option<String<16>> {
    if base.is_empty() || base.len() > 8 || ext.len() > 3 {
        return None;
    }
    let mut name = String::new();
    let lowered = |b: u8| b.to_ascii_lowercase() as char;

    let is_alias = base.len() > 3
        && base[..3].eq_ignore_ascii_case(b"pic")
        && base[3..].iter().all(|b| b.is_ascii_digit());
    if is_alias {
        name.push_str("picture").ok()?;
        for &b in &base[3..] {
            name.push(b as char).ok()?;
        }
    } else {
        for &b in base {
            name.push(lowered(b)).ok()?;
        }
    }
    if !ext.is_empty() {
        name.push('.').ok()?;
        for &b in ext {
            name.push(lowered(b)).ok()?;
        }
    }
    Some(name)
}
