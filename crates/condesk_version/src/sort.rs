use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

/// A single comparable unit of a version string.
///
/// Numeric runs stay numeric; anything else is an alphabetic tag whose weight
/// is only decided once the whole batch of versions is known.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Num(i64),
    Alpha(String),
}

/// Sort version number strings, placing pre-release tags (`a`, `dev`, `rc1`,
/// ...) below the corresponding final release.
///
/// Alphabetic tags are ranked relative to the other tags present in the same
/// call, and token lists are zero-padded to the longest list in the call, so
/// the ordering is scoped to the batch being sorted. Exact duplicates keep
/// their submission order; otherwise ties on the numeric key are broken by the
/// original string.
pub fn sort_versions<S: AsRef<str>>(versions: &[S], reverse: bool) -> Vec<String> {
    if versions.is_empty() {
        return Vec::new();
    }

    let tokenized: Vec<Vec<Token>> = versions
        .iter()
        .map(|version| tokenize(version.as_ref()))
        .collect();
    let keys = resolve_keys(&tokenized);

    let mut order: Vec<usize> = (0..versions.len()).collect();
    order.sort_by(|&a, &b| {
        let ord = keys[a]
            .cmp(&keys[b])
            .then_with(|| versions[a].as_ref().cmp(versions[b].as_ref()));
        if reverse { ord.reverse() } else { ord }
    });

    order
        .into_iter()
        .map(|i| versions[i].as_ref().to_string())
        .collect()
}

/// Compare two version strings through the same machinery as
/// [`sort_versions`], treating the pair as a two-element batch.
pub fn compare(a: &str, b: &str) -> Ordering {
    let tokenized = vec![tokenize(a), tokenize(b)];
    let keys = resolve_keys(&tokenized);
    keys[0].cmp(&keys[1]).then_with(|| a.cmp(b))
}

/// Split one version string into tokens.
///
/// Each `.`-separated segment is either a plain number or is broken into a
/// leading numeric run, the alphabetic middle, and a trailing numeric run
/// (`"0rc1"` becomes `0`, `"rc"`, `1`); empty sub-tokens are dropped.
fn tokenize(version: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    for segment in version.split('.') {
        if let Ok(num) = segment.parse::<i64>() {
            tokens.push(Token::Num(num));
            continue;
        }

        let head_len = segment.chars().take_while(|c| c.is_ascii_digit()).count();
        let tail_len = segment
            .chars()
            .rev()
            .take_while(|c| c.is_ascii_digit())
            .count()
            .min(segment.len() - head_len);
        let middle = &segment[head_len..segment.len() - tail_len];

        if head_len > 0 {
            if let Ok(num) = segment[..head_len].parse::<i64>() {
                tokens.push(Token::Num(num));
            }
        }
        if !middle.is_empty() {
            tokens.push(Token::Alpha(middle.to_string()));
        }
        if tail_len > 0 {
            if let Ok(num) = segment[segment.len() - tail_len..].parse::<i64>() {
                tokens.push(Token::Num(num));
            }
        }
    }
    tokens
}

/// Turn token lists into integer keys of equal length.
///
/// Alphabetic tags collected across the batch are ranked in reverse-sorted
/// order to the strictly negative integers (`-1` for the greatest tag), so
/// every tagged pre-release sorts below the untagged release it precedes.
fn resolve_keys(tokenized: &[Vec<Token>]) -> Vec<Vec<i64>> {
    let alpha: BTreeSet<&str> = tokenized
        .iter()
        .flatten()
        .filter_map(|token| match token {
            Token::Alpha(tag) => Some(tag.as_str()),
            Token::Num(_) => None,
        })
        .collect();
    // BTreeSet iterates ascending; the greatest tag gets rank -1.
    let ranks: HashMap<&str, i64> = alpha
        .iter()
        .rev()
        .enumerate()
        .map(|(position, tag)| (*tag, -(position as i64) - 1))
        .collect();

    let width = tokenized.iter().map(Vec::len).max().unwrap_or(0);
    tokenized
        .iter()
        .map(|tokens| {
            let mut key: Vec<i64> = tokens
                .iter()
                .map(|token| match token {
                    Token::Num(num) => *num,
                    Token::Alpha(tag) => ranks[tag.as_str()],
                })
                .collect();
            key.resize(width, 0);
            key
        })
        .collect()
}
