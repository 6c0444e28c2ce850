//! Secret redaction for collected diagnostics.
//!
//! Everything that ends up in a diags bundle is uploaded to a public,
//! unauthenticated host, so environment values, config lines and URLs are
//! scrubbed before they are staged.

pub const REDACTED: &str = "<redacted>";

/// Key patterns matched case-insensitively against env names and `key=value` lines.
pub const DEFAULT_KEY_PATTERNS: &[&str] = &[
    "*TOKEN*",
    "*PASSWORD*",
    "*PASSWD*",
    "*SECRET*",
    "*_KEY",
    "*CREDENTIAL*",
    "AWS_*",
    "ETCD_*_KEY*",
];

const SECRET_QUERY_PARAMS: &[&str] = &["token", "password", "secret", "key", "access_token"];

#[derive(Debug, Clone)]
pub struct Redactor {
    patterns: Vec<String>,
}

impl Default for Redactor {
    fn default() -> Self {
        Self::with_patterns(DEFAULT_KEY_PATTERNS.iter().copied())
    }
}

impl Redactor {
    pub fn with_patterns<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns
                .into_iter()
                .map(|pattern| pattern.into().to_ascii_uppercase())
                .collect(),
        }
    }

    pub fn is_secret_key(&self, key: &str) -> bool {
        let key = key.trim().to_ascii_uppercase();
        self.patterns.iter().any(|pattern| wildcard_match(pattern, &key))
    }

    /// Redact a single env-style value; the whole value is dropped when the key looks secret.
    pub fn redact_pair(&self, key: &str, value: &str) -> (String, usize) {
        if self.is_secret_key(key) {
            return (REDACTED.to_string(), 1);
        }
        self.redact_text(value)
    }

    /// Redact free text line by line. Returns the scrubbed text and the number of redactions.
    pub fn redact_text(&self, text: &str) -> (String, usize) {
        let mut count = 0usize;
        let lines: Vec<String> = text
            .split('\n')
            .map(|line| {
                let mut line = match split_assignment(line) {
                    Some((key, sep)) if self.is_secret_key(key) => {
                        count += 1;
                        format!("{key}{sep}{REDACTED}")
                    }
                    _ => line.to_string(),
                };
                count += scrub_url_userinfo(&mut line);
                count += scrub_query_params(&mut line);
                line
            })
            .collect();
        (lines.join("\n"), count)
    }
}

/// `KEY=value` or `key: value`; the key must look like an identifier.
fn split_assignment(line: &str) -> Option<(&str, &str)> {
    let pos = line.find(['=', ':'])?;
    let key = line[..pos].trim().trim_matches('"');
    if key.is_empty()
        || !key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return None;
    }
    Some((&line[..pos], &line[pos..=pos]))
}

fn wildcard_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == text;
    }

    let first = parts[0];
    let last = parts[parts.len() - 1];
    if !text.starts_with(first) || text.len() < first.len() + last.len() {
        return false;
    }
    let mut rest = &text[first.len()..];
    if !rest.ends_with(last) {
        return false;
    }
    rest = &rest[..rest.len() - last.len()];

    for part in &parts[1..parts.len() - 1] {
        match rest.find(part) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
    }
    true
}

fn scrub_url_userinfo(line: &mut String) -> usize {
    let mut count = 0;
    let mut cursor = 0;
    while let Some(found) = line[cursor..].find("://") {
        let authority_start = cursor + found + 3;
        let authority_end = line[authority_start..]
            .find(|c: char| c == '/' || c.is_whitespace())
            .map(|idx| authority_start + idx)
            .unwrap_or(line.len());
        match line[authority_start..authority_end].rfind('@') {
            Some(at) if at > 0 => {
                line.replace_range(authority_start..authority_start + at, REDACTED);
                count += 1;
                cursor = authority_start + REDACTED.len() + 1;
            }
            _ => cursor = authority_end,
        }
    }
    count
}

fn scrub_query_params(line: &mut String) -> usize {
    let mut count = 0;
    for param in SECRET_QUERY_PARAMS {
        let needle = format!("{param}=");
        let mut cursor = 0;
        while let Some(found) = line.to_ascii_lowercase()[cursor..].find(&needle) {
            let start = cursor + found;
            let preceded_ok = start == 0 || matches!(line.as_bytes()[start - 1], b'?' | b'&');
            let value_start = start + needle.len();
            if !preceded_ok {
                cursor = value_start;
                continue;
            }
            let value_end = line[value_start..]
                .find(['&', ' ', '"', '#'])
                .map(|idx| value_start + idx)
                .unwrap_or(line.len());
            line.replace_range(value_start..value_end, REDACTED);
            count += 1;
            cursor = value_start + REDACTED.len();
        }
    }
    count
}
