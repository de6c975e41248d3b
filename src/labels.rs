//! Channel label handling: alias tables, allow-list matching and
//! de-duplication of repeated labels.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{EdfError, Result};

/// Prefix (compared case-insensitively) that marks an EDF+ annotation channel.
pub const ANNOTATION_LABEL: &str = "EDF Annotation";

/// Label given to a synthesized time-track channel.
pub const TIME_TRACK_LABEL: &str = "EDF Annotations";

/// Returns true if `label` follows the annotation-channel naming convention.
pub fn is_annotation_label(label: &str) -> bool {
    let n = ANNOTATION_LABEL.len();
    label.len() >= n
        && label.is_char_boundary(n)
        && label[..n].eq_ignore_ascii_case(ANNOTATION_LABEL)
}

/// Canonical label to alternate labels.
///
/// Every alternate resolves to exactly one canonical label. Registering the
/// same alternate under two canonical labels is an error.
#[derive(Debug, Clone, Default)]
pub struct LabelAliases {
    primary: BTreeMap<String, Vec<String>>,
    reverse: BTreeMap<String, String>,
}

impl LabelAliases {
    pub fn new() -> Self {
        LabelAliases::default()
    }

    /// Registers `alternates` as other names for `canonical`.
    ///
    /// # Errors
    ///
    /// `AliasCollision` if one of the alternates already belongs to a
    /// different canonical label, or if an alternate is itself canonical.
    pub fn add(&mut self, canonical: &str, alternates: &[&str]) -> Result<()> {
        if let Some(other) = self.reverse.get(canonical) {
            return Err(EdfError::AliasCollision {
                alias: canonical.to_string(),
                labels: format!("{} is already an alternate of {}", canonical, other),
            });
        }

        for &alt in alternates {
            if alt == canonical {
                continue;
            }
            if self.primary.contains_key(alt) {
                return Err(EdfError::AliasCollision {
                    alias: alt.to_string(),
                    labels: format!("{} is itself a canonical label", alt),
                });
            }
            match self.reverse.get(alt) {
                Some(existing) if existing != canonical => {
                    return Err(EdfError::AliasCollision {
                        alias: alt.to_string(),
                        labels: format!("{} | {}", existing, canonical),
                    });
                }
                Some(_) => continue,
                None => {}
            }
            self.reverse.insert(alt.to_string(), canonical.to_string());
            self.primary
                .entry(canonical.to_string())
                .or_default()
                .push(alt.to_string());
        }
        self.primary.entry(canonical.to_string()).or_default();
        Ok(())
    }

    /// Canonical label for an alternate, if one is registered.
    pub fn canonical(&self, label: &str) -> Option<&str> {
        self.reverse.get(label).map(String::as_str)
    }

    pub fn alternates(&self, canonical: &str) -> Option<&[String]> {
        self.primary.get(canonical).map(Vec::as_slice)
    }

    pub fn is_canonical(&self, label: &str) -> bool {
        self.primary.contains_key(label)
    }

    pub fn is_empty(&self) -> bool {
        self.primary.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.primary.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Expands a pipe-separated list of alternatives so that, when any token
    /// is an alias, the canonical label comes first followed by all of its
    /// alternates and then the remaining tokens.
    ///
    /// # Errors
    ///
    /// `AliasCollision` when the tokens imply two different canonical labels.
    pub fn expand(&self, tokens: &[String]) -> Result<Vec<String>> {
        let mut implied: Option<&str> = None;
        for token in tokens {
            let canonical = if self.is_canonical(token) {
                Some(token.as_str())
            } else {
                self.canonical(token)
            };
            if let Some(c) = canonical {
                match implied {
                    None => implied = Some(c),
                    Some(prev) if prev != c => {
                        return Err(EdfError::AliasCollision {
                            alias: token.clone(),
                            labels: format!("{} | {}", prev, c),
                        });
                    }
                    Some(_) => {}
                }
            }
        }

        let Some(canonical) = implied else {
            return Ok(tokens.to_vec());
        };

        let mut expanded = vec![canonical.to_string()];
        if let Some(alts) = self.alternates(canonical) {
            expanded.extend(alts.iter().cloned());
        }
        for token in tokens {
            if !expanded.contains(token) {
                expanded.push(token.clone());
            }
        }
        Ok(expanded)
    }
}

/// Splits a label specification on `sep`, trimming whitespace and dropping
/// empty tokens. Double quotes protect separators inside a label.
pub fn split_spec(spec: &str, sep: char) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    for c in spec.chars() {
        if c == '"' {
            quoted = !quoted;
        } else if c == sep && !quoted {
            tokens.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    tokens.push(current);
    tokens
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Glob match supporting `*` (any run) and `?` (any single character).
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|&c| c == '*')
}

fn is_wildcard(token: &str) -> bool {
    token.contains('*') || token.contains('?')
}

/// Channel allow-list used when attaching a file.
///
/// Each entry is an exact label, a `|`-separated list of alternatives (the
/// first one present in the file wins) or a wildcard pattern.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    entries: Vec<Vec<String>>,
}

impl Selection {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Self {
        let entries = patterns
            .iter()
            .flat_map(|p| split_spec(p.as_ref(), ','))
            .map(|p| split_spec(&p, '|'))
            .filter(|alts| !alts.is_empty())
            .collect();
        Selection { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Decides whether `label` is selected, given every label in the file.
    ///
    /// A non-first alternative only matches when no earlier alternative of
    /// the same entry is present in the file.
    pub fn matches(&self, label: &str, present: &BTreeSet<String>, aliases: &LabelAliases) -> Result<bool> {
        for entry in &self.entries {
            let alts = aliases.expand(entry)?;
            for token in &alts {
                if is_wildcard(token) {
                    if wildcard_match(token, label) {
                        return Ok(true);
                    }
                    continue;
                }
                if token == label {
                    return Ok(true);
                }
                if present.contains(token) {
                    // an earlier alternative is in the file; later ones lose
                    break;
                }
            }
        }
        Ok(false)
    }
}

/// Returns `label`, or `label.N` for the smallest `N >= 1` not yet in `taken`.
pub fn uniquify(label: &str, taken: &BTreeSet<String>) -> String {
    if !taken.contains(label) {
        return label.to_string();
    }
    let mut inc = 1;
    loop {
        let candidate = format!("{}.{}", label, inc);
        if !taken.contains(&candidate) {
            return candidate;
        }
        inc += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(labels: &[&str]) -> BTreeSet<String> {
        labels.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_annotation_label() {
        assert!(is_annotation_label("EDF Annotations"));
        assert!(is_annotation_label("edf annotations 2"));
        assert!(!is_annotation_label("EDF Annot"));
        assert!(!is_annotation_label("EEG C4"));
    }

    #[test]
    fn test_uniquify() {
        let taken = set(&["C4", "C4.1"]);
        assert_eq!(uniquify("C4", &taken), "C4.2");
        assert_eq!(uniquify("C3", &taken), "C3");
    }

    #[test]
    fn test_wildcards() {
        assert!(wildcard_match("EEG*", "EEG C4"));
        assert!(wildcard_match("C?", "C4"));
        assert!(wildcard_match("*", ""));
        assert!(!wildcard_match("C?", "C44"));
        assert!(wildcard_match("*M?", "EEG M1"));
    }

    #[test]
    fn test_pipe_alternatives_prefer_first_present() {
        let aliases = LabelAliases::new();
        let present = set(&["C4", "C4-M1", "M1"]);
        let sel = Selection::new(&["C4|C4-M1"]);
        assert!(sel.matches("C4", &present, &aliases).unwrap());
        assert!(!sel.matches("C4-M1", &present, &aliases).unwrap());
        assert!(!sel.matches("M1", &present, &aliases).unwrap());

        let present = set(&["C4-M1", "M1"]);
        assert!(sel.matches("C4-M1", &present, &aliases).unwrap());
    }

    #[test]
    fn test_aliases() {
        let mut aliases = LabelAliases::new();
        aliases.add("C4", &["EEG C4", "C4-M1"]).unwrap();
        assert_eq!(aliases.canonical("EEG C4"), Some("C4"));
        assert!(aliases.is_canonical("C4"));

        let err = aliases.add("C3", &["EEG C4"]).unwrap_err();
        assert!(matches!(err, EdfError::AliasCollision { .. }));

        // selecting by canonical name picks up any alternate in the file
        let present = set(&["EEG C4", "M1"]);
        let sel = Selection::new(&["C4"]);
        assert!(sel.matches("EEG C4", &present, &aliases).unwrap());
        assert!(!sel.matches("M1", &present, &aliases).unwrap());
    }

    #[test]
    fn test_split_spec_respects_quotes() {
        assert_eq!(split_spec("a, b ,\"c,d\"", ','), vec!["a", "b", "c,d"]);
        assert!(split_spec(" , ", ',').is_empty());
    }
}
