//! Host patterns for peer profile mappings.

use crate::security::ip_filter::normalize_host;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    /// `*`: any run of characters, dots included
    Star,
    /// `?`: exactly one character
    Any,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Matcher {
    Exact,
    Glob(Vec<Token>),
}

/// A compiled host pattern: exact host or glob (`*.nextcloud.com`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPattern {
    source: String,
    matcher: Matcher,
}

impl HostPattern {
    pub fn parse(pattern: &str) -> Result<Self, String> {
        let normalized = normalize_host(pattern);
        if normalized.is_empty() {
            return Err("empty pattern".to_string());
        }
        if normalized.chars().any(char::is_whitespace) {
            return Err(format!("pattern {pattern:?} contains whitespace"));
        }
        if !normalized.contains(['*', '?']) {
            return Ok(HostPattern { source: normalized, matcher: Matcher::Exact });
        }

        let mut tokens = Vec::new();
        let mut literal = String::new();
        for c in normalized.chars() {
            match c {
                '*' | '?' => {
                    if !literal.is_empty() {
                        tokens.push(Token::Literal(std::mem::take(&mut literal)));
                    }
                    let token = if c == '*' { Token::Star } else { Token::Any };
                    // Runs of `*` collapse into one.
                    if !(token == Token::Star && tokens.last() == Some(&Token::Star)) {
                        tokens.push(token);
                    }
                }
                _ => literal.push(c),
            }
        }
        if !literal.is_empty() {
            tokens.push(Token::Literal(literal));
        }
        Ok(HostPattern { source: normalized, matcher: Matcher::Glob(tokens) })
    }

    pub fn is_exact(&self) -> bool {
        self.matcher == Matcher::Exact
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Match an already-normalized host.
    pub fn matches(&self, host: &str) -> bool {
        match &self.matcher {
            Matcher::Exact => self.source == host,
            Matcher::Glob(tokens) => glob_match(tokens, host),
        }
    }
}

impl fmt::Display for HostPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Iterative matcher with single-star backtracking.
fn glob_match(tokens: &[Token], text: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let mut ti = 0;
    let mut pos = 0;
    // (token index after the star, text position the star currently covers up to)
    let mut backtrack: Option<(usize, usize)> = None;

    loop {
        if ti == tokens.len() && pos == text.len() {
            return true;
        }
        let step = match tokens.get(ti) {
            Some(Token::Star) => {
                backtrack = Some((ti + 1, pos));
                ti += 1;
                continue;
            }
            Some(Token::Any) if pos < text.len() => Some(1),
            Some(Token::Literal(lit)) => {
                let lit: Vec<char> = lit.chars().collect();
                let end = pos + lit.len();
                (end <= text.len() && text[pos..end] == lit[..]).then_some(lit.len())
            }
            _ => None,
        };

        match step {
            Some(n) => {
                ti += 1;
                pos += n;
            }
            None => match backtrack {
                Some((after_star, covered)) if covered < text.len() => {
                    backtrack = Some((after_star, covered + 1));
                    ti = after_star;
                    pos = covered + 1;
                }
                _ => return false,
            },
        }
    }
}
