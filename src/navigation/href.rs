use std::fmt;

use crate::error::{Error, Result};

/// A URL split into origin, path, query and fragment.
///
/// Relative URLs are kept relative (empty origin). The query keeps its
/// leading `?` and the fragment its leading `#`, so concatenating the parts
/// reproduces the href.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Href {
    origin: String,
    path: String,
    query: String,
    fragment: String,
}

impl Href {
    /// Split `input` into its components.
    ///
    /// Fails on control characters and on malformed schemes such as
    /// `"://host"`.
    pub fn parse(input: &str) -> Result<Self> {
        if input.chars().any(char::is_control) {
            return Err(Error::InvalidHref(input.to_string()));
        }

        let (origin, rest) = split_origin(input)?;

        let (rest, fragment) = match rest.find('#') {
            Some(at) => rest.split_at(at),
            None => (rest, ""),
        };
        let (path, query) = match rest.find('?') {
            Some(at) => rest.split_at(at),
            None => (rest, ""),
        };

        Ok(Self {
            origin,
            path: path.to_string(),
            query: query.to_string(),
            fragment: fragment.to_string(),
        })
    }

    /// `scheme://authority`, lowercased and without a default port, or empty
    /// for relative URLs. Scheme-relative URLs keep a bare `//authority`.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Query string including the leading `?`, or empty.
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Fragment including the leading `#`, or empty.
    pub fn fragment(&self) -> &str {
        &self.fragment
    }

    pub fn is_relative(&self) -> bool {
        self.origin.is_empty()
    }

    pub fn set_path(&mut self, path: &str) {
        self.path = if path.is_empty() || path.starts_with('/') || self.origin.is_empty() {
            path.to_string()
        } else {
            format!("/{path}")
        };
    }

    pub fn set_query(&mut self, query: &str) {
        self.query = prefixed('?', query);
    }

    pub fn set_fragment(&mut self, fragment: &str) {
        self.fragment = prefixed('#', fragment);
    }

    /// Give a scheme-relative URL the scheme of `origin`.
    pub fn qualify(&mut self, origin: &str) {
        if let Some(authority) = self.origin.strip_prefix("//") {
            let scheme = origin.split("://").next().unwrap_or("").to_ascii_lowercase();
            self.origin = canonical_origin(&scheme, authority);
        }
    }

    /// Whether this URL stays on `origin`. Relative URLs always do.
    pub fn is_same_origin(&self, origin: &str) -> bool {
        if self.is_relative() {
            return true;
        }
        let mut qualified = self.clone();
        qualified.qualify(origin);
        qualified.origin == canonical(origin)
    }

    /// Drop the origin when it equals `origin`.
    pub fn strip_origin(&mut self, origin: &str) {
        if !self.is_relative() && self.is_same_origin(origin) {
            self.origin.clear();
            if self.path.is_empty() {
                self.path.push('/');
            }
        }
    }

    /// Make a root-relative URL absolute against `origin`.
    pub fn resolve(&self, origin: &str) -> Href {
        let mut resolved = self.clone();
        if resolved.origin.is_empty() && (resolved.path.is_empty() || resolved.path.starts_with('/')) {
            resolved.origin = canonical(origin);
        } else {
            resolved.qualify(origin);
        }
        resolved
    }
}

impl fmt::Display for Href {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}{}", self.origin, self.path, self.query, self.fragment)
    }
}

fn prefixed(prefix: char, value: &str) -> String {
    if value.is_empty() || value == prefix.to_string() {
        String::new()
    } else if value.starts_with(prefix) {
        value.to_string()
    } else {
        format!("{prefix}{value}")
    }
}

fn split_origin(input: &str) -> Result<(String, &str)> {
    if let Some(rest) = input.strip_prefix("//") {
        let end = authority_end(rest);
        return Ok((format!("//{}", rest[..end].to_ascii_lowercase()), &rest[end..]));
    }

    let Some(colon) = input.find(':') else {
        return Ok((String::new(), input));
    };

    let scheme = &input[..colon];
    // A colon after the first path, query or fragment delimiter is not a scheme.
    if scheme.contains(['/', '?', '#']) {
        return Ok((String::new(), input));
    }
    if !is_scheme(scheme) {
        return Err(Error::InvalidHref(input.to_string()));
    }

    let after = &input[colon + 1..];
    match after.strip_prefix("//") {
        Some(rest) => {
            let end = authority_end(rest);
            Ok((canonical_origin(&scheme.to_ascii_lowercase(), &rest[..end]), &rest[end..]))
        }
        // Opaque URLs (mailto:, tel:, ...) carry their scheme as the origin.
        None => Ok((format!("{}:", scheme.to_ascii_lowercase()), after)),
    }
}

/// `scheme://authority` with the authority lowercased and the scheme's
/// default port dropped.
fn canonical_origin(scheme: &str, authority: &str) -> String {
    let authority = authority.to_ascii_lowercase();
    let default_port = match scheme {
        "http" | "ws" => Some(":80"),
        "https" | "wss" => Some(":443"),
        _ => None,
    };
    let host = default_port
        .and_then(|port| authority.strip_suffix(port))
        .unwrap_or(&authority);
    format!("{scheme}://{host}")
}

/// Canonical form of a host origin such as `"https://site.example:443"`.
fn canonical(origin: &str) -> String {
    Href::parse(origin)
        .map(|href| href.origin)
        .unwrap_or_else(|_| origin.trim_end_matches('/').to_ascii_lowercase())
}

fn authority_end(rest: &str) -> usize {
    rest.find(['/', '?', '#']).unwrap_or(rest.len())
}

fn is_scheme(candidate: &str) -> bool {
    let mut chars = candidate.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Normalize `value` against the host location.
///
/// An empty value stands for `location`. Scheme-relative values take the
/// scheme of `origin`; an origin equal to `origin` is stripped and anything
/// cross-origin is kept fully qualified.
pub fn normalize(value: &str, location: &str, origin: &str) -> Result<String> {
    let source = if value.is_empty() { location } else { value };
    let mut href = Href::parse(source)?;
    href.qualify(origin);
    href.strip_origin(origin);
    Ok(href.to_string())
}
