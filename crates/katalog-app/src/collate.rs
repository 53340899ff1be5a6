// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Locale-aware string ordering for catalog text.
//!
//! The catalog is mostly Russian, so Cyrillic sorts ahead of Latin, `ё`
//! shares a primary weight with `е`, and case only breaks ties. Keys are
//! compared level by level: primary weights, then accent-sensitive
//! lowercase text, then case, then raw code points.

use std::cmp::Ordering;

const GROUP_SPACE: u32 = 1;
const GROUP_DIGIT: u32 = 2;
const GROUP_CYRILLIC: u32 = 3;
const GROUP_LATIN: u32 = 4;
const GROUP_OTHER: u32 = 5;

/// Compares two strings the way a Russian-locale collator would at
/// default strength.
pub fn collate(left: &str, right: &str) -> Ordering {
    if left == right {
        return Ordering::Equal;
    }
    CollationKey::new(left).cmp(&CollationKey::new(right))
}

/// Precomputed sort key for one string. Field order is comparison order,
/// so sorting many values builds each key once instead of per comparison.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CollationKey {
    primary: Vec<u32>,
    lower: Vec<char>,
    case: Vec<bool>,
    raw: String,
}

impl CollationKey {
    pub fn new(value: &str) -> Self {
        Self {
            primary: primary_key(value),
            lower: lowercase(value),
            case: case_pattern(value),
            raw: value.to_owned(),
        }
    }
}

/// Primary sort key: one weight per folded lowercase char.
pub fn primary_key(value: &str) -> Vec<u32> {
    value
        .chars()
        .flat_map(char::to_lowercase)
        .map(|ch| primary_weight(fold(ch)))
        .collect()
}

fn primary_weight(ch: char) -> u32 {
    let group = if ch.is_whitespace() || ch.is_ascii_punctuation() {
        GROUP_SPACE
    } else if ch.is_ascii_digit() {
        GROUP_DIGIT
    } else if ('\u{0400}'..='\u{04FF}').contains(&ch) {
        GROUP_CYRILLIC
    } else if ch.is_ascii_alphabetic() {
        GROUP_LATIN
    } else {
        GROUP_OTHER
    };
    (group << 21) | ch as u32
}

fn fold(ch: char) -> char {
    match ch {
        'ё' => 'е',
        'à'..='å' => 'a',
        'è'..='ë' => 'e',
        'ì'..='ï' => 'i',
        'ò'..='ö' => 'o',
        'ù'..='ü' => 'u',
        'ç' => 'c',
        'ñ' => 'n',
        other => other,
    }
}

fn lowercase(value: &str) -> Vec<char> {
    value.chars().flat_map(char::to_lowercase).collect()
}

// Lowercase sorts ahead of uppercase at the tertiary level.
fn case_pattern(value: &str) -> Vec<bool> {
    value.chars().map(char::is_uppercase).collect()
}
