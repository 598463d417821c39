//! `WWW-Authenticate` / `Proxy-Authenticate` parsing.
//!
//! A header may carry several challenges separated by commas, and the
//! parameters of each challenge are comma separated as well. A list element
//! whose first token is not followed by `=` starts a new challenge.

use crate::socket::authcache::AuthScheme;

/// One parsed challenge, bound to the host that issued it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub scheme: AuthScheme,
    pub realm: String,
    /// Remaining `name=value` parameters, names lowercased.
    pub params: Vec<(String, String)>,
    /// Single opaque token (`Negotiate abc==`).
    pub token68: Option<String>,
    pub host: String,
    pub port: u16,
}

impl Challenge {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

impl std::fmt::Display for Challenge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} realm=\"{}\" at {}:{}", self.scheme, self.realm, self.host, self.port)
    }
}

/// Parse every challenge in `header`. Elements that fit no challenge are
/// dropped.
pub fn parse_challenges(header: &str, host: &str, port: u16) -> Vec<Challenge> {
    let mut challenges: Vec<Challenge> = Vec::new();

    for element in split_list(header) {
        let first_end = element
            .find(|c: char| c.is_ascii_whitespace() || c == '=')
            .unwrap_or(element.len());
        let starts_challenge = !element[first_end..].trim_start().starts_with('=');

        if starts_challenge {
            let scheme = &element[..first_end];
            let mut challenge = Challenge {
                scheme: AuthScheme::parse(scheme),
                realm: String::new(),
                params: Vec::new(),
                token68: None,
                host: host.to_ascii_lowercase(),
                port,
            };
            let rest = element[first_end..].trim();
            if !rest.is_empty() {
                if is_token68(rest) {
                    challenge.token68 = Some(rest.to_string());
                } else if let Some((name, value)) = parse_param(rest) {
                    push_param(&mut challenge, name, value);
                }
            }
            challenges.push(challenge);
        } else if let (Some(current), Some((name, value))) =
            (challenges.last_mut(), parse_param(element))
        {
            push_param(current, name, value);
        }
    }

    challenges
}

/// Parse `a=b, c="d"` style parameter lists, e.g. `Authentication-Info`.
pub fn parse_params(list: &str) -> Vec<(String, String)> {
    split_list(list)
        .into_iter()
        .filter_map(parse_param)
        .map(|(n, v)| (n.to_ascii_lowercase(), v))
        .collect()
}

fn push_param(challenge: &mut Challenge, name: &str, value: String) {
    if name.eq_ignore_ascii_case("realm") {
        challenge.realm = value;
    } else {
        challenge.params.push((name.to_ascii_lowercase(), value));
    }
}

/// Split on commas that are not inside a quoted string.
fn split_list(header: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut escaped = false;

    for (i, c) in header.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                let part = header[start..i].trim();
                if !part.is_empty() {
                    parts.push(part);
                }
                start = i + 1;
            }
            _ => {}
        }
    }

    let part = header[start..].trim();
    if !part.is_empty() {
        parts.push(part);
    }
    parts
}

fn parse_param(param: &str) -> Option<(&str, String)> {
    let (name, value) = param.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name, unquote(value.trim())))
}

fn unquote(value: &str) -> String {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        let mut out = String::with_capacity(value.len() - 2);
        let mut chars = value[1..value.len() - 1].chars();
        while let Some(c) = chars.next() {
            if c == '\\' {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            } else {
                out.push(c);
            }
        }
        out
    } else {
        value.to_string()
    }
}

/// `1*( ALPHA / DIGIT / "-" / "." / "_" / "~" / "+" / "/" ) *"="`
fn is_token68(s: &str) -> bool {
    let body = s.trim_end_matches('=');
    !body.is_empty()
        && body
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~' | '+' | '/'))
}
