use std::collections::HashSet;

use async_trait::async_trait;
use rand::seq::SliceRandom;

use super::{VariantError, VariantSource};

/// Single-character leet substitutions
const LEET: &[(u8, &[u8])] = &[
    (b'a', b"@4"),
    (b'b', b"8"),
    (b'e', b"3"),
    (b'g', b"9"),
    (b'i', b"1!"),
    (b'l', b"1"),
    (b'o', b"0"),
    (b's', b"$5"),
    (b't', b"7"),
];

/// Reverse of the common leet substitutions
const UNLEET: &[(u8, u8)] = &[
    (b'@', b'a'),
    (b'4', b'a'),
    (b'3', b'e'),
    (b'1', b'i'),
    (b'!', b'i'),
    (b'0', b'o'),
    (b'$', b's'),
    (b'5', b's'),
    (b'7', b't'),
];

const SUFFIXES: &[&[u8]] = &[
    b"!", b"!!", b"?", b"@", b"#", b"$", b"*", b".", b"1", b"12", b"123", b"1234", b"01", b"69",
    b"007", b"2024",
];

const PREFIXES: &[&[u8]] = &[b"1", b"!", b"@", b"#"];

/// Rule-based password mutator
///
/// Applies the transformations people use when "changing" a password:
///  case flips, leet substitutions, appended digits and symbols,
///  dropped or doubled characters and bumped trailing numbers.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleMutator;

impl RuleMutator {
    pub fn new() -> Self {
        Self
    }

    /// Return exactly `count` distinct variants of `password`, none equal to it
    ///
    /// Rule outputs are drawn in random order; once the rules run dry
    ///  numeric suffixes fill the remainder.
    pub fn mutate(&self, password: &[u8], count: usize) -> Vec<Vec<u8>> {
        let mut candidates = rule_candidates(password);
        candidates.shuffle(&mut rand::rng());
        candidates.truncate(count);

        let mut seen: HashSet<Vec<u8>> = candidates.iter().cloned().collect();
        seen.insert(password.to_vec());

        let mut counter: u64 = 1;
        while candidates.len() < count {
            let mut candidate = password.to_vec();
            candidate.extend_from_slice(counter.to_string().as_bytes());
            counter += 1;
            if seen.insert(candidate.clone()) {
                candidates.push(candidate);
            }
        }
        candidates
    }
}

#[async_trait]
impl VariantSource for RuleMutator {
    async fn variants(&self, password: &[u8], count: usize) -> Result<Vec<Vec<u8>>, VariantError> {
        Ok(self.mutate(password, count))
    }
}

/// Every single-rule transformation of `password`, deduplicated
fn rule_candidates(password: &[u8]) -> Vec<Vec<u8>> {
    let mut out: Vec<Vec<u8>> = Vec::new();

    if let Some((first, rest)) = password.split_first() {
        let mut flipped = vec![flip_case(*first)];
        flipped.extend_from_slice(rest);
        out.push(flipped);
    }
    out.push(password.to_ascii_uppercase());
    out.push(password.to_ascii_lowercase());

    for (i, b) in password.iter().enumerate() {
        let lower = b.to_ascii_lowercase();
        if let Some((_, subs)) = LEET.iter().find(|(c, _)| *c == lower) {
            for sub in subs.iter() {
                let mut v = password.to_vec();
                v[i] = *sub;
                out.push(v);
            }
        }
        if let Some((_, plain)) = UNLEET.iter().find(|(c, _)| c == b) {
            let mut v = password.to_vec();
            v[i] = *plain;
            out.push(v);
        }
    }

    for suffix in SUFFIXES {
        let mut v = password.to_vec();
        v.extend_from_slice(suffix);
        out.push(v);
    }
    for digit in b'0'..=b'9' {
        let mut v = password.to_vec();
        v.push(digit);
        out.push(v);
    }
    for prefix in PREFIXES {
        let mut v = prefix.to_vec();
        v.extend_from_slice(password);
        out.push(v);
    }

    if password.len() > 1 {
        out.push(password[..password.len() - 1].to_vec());
        out.push(password[1..].to_vec());

        let mut swapped = password.to_vec();
        let n = swapped.len();
        swapped.swap(n - 1, n - 2);
        out.push(swapped);
    }
    if let Some(last) = password.last() {
        let mut v = password.to_vec();
        v.push(*last);
        out.push(v);
    }

    out.extend(bump_trailing_number(password));

    let mut seen = HashSet::new();
    out.retain(|v| !v.is_empty() && v.as_slice() != password && seen.insert(v.clone()));
    out
}

fn flip_case(b: u8) -> u8 {
    if b.is_ascii_lowercase() {
        b.to_ascii_uppercase()
    } else {
        b.to_ascii_lowercase()
    }
}

/// `pass123` -> `pass124` and `pass122`, keeping the digit width
fn bump_trailing_number(password: &[u8]) -> Vec<Vec<u8>> {
    let digits = password
        .iter()
        .rev()
        .take_while(|b| b.is_ascii_digit())
        .count();
    // 18 digits always fit a u64
    if digits == 0 || digits > 18 {
        return Vec::new();
    }

    let split = password.len() - digits;
    let Ok(text) = std::str::from_utf8(&password[split..]) else {
        return Vec::new();
    };
    let Ok(n) = text.parse::<u64>() else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for m in [n.checked_add(1), n.checked_sub(1)].into_iter().flatten() {
        let mut v = password[..split].to_vec();
        v.extend_from_slice(format!("{:0width$}", m, width = digits).as_bytes());
        out.push(v);
    }
    out
}
