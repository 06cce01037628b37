//! Resource handles.
//!
//! The resolver reads a resource only through [`ResourceHandle`]; it never
//! parses raw path text itself. [`ResourcePath`] is the stock implementation:
//!
//! ```text
//! scheme:[//host]path[?name=value&flag&...]
//! vfile:/data/run42.bin?enc&pwfile=projects/run42&cipher=aes
//! /plain/file            (no scheme: file)
//! ```

use std::fmt;
use std::str::FromStr;

use crate::error::{ResolveError, ResolveResult};

/// Read-only view of a resource's scheme and parameters.
pub trait ResourceHandle {
    fn scheme(&self) -> &str;

    fn path(&self) -> &str;

    fn host(&self) -> Option<&str> {
        None
    }

    /// Value of a named parameter; bare flags yield `Some("")`.
    fn param(&self, name: &str) -> Option<&str>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePath {
    scheme: String,
    host: Option<String>,
    path: String,
    params: Vec<(String, String)>,
}

impl ResourcePath {
    pub fn new(scheme: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into().to_ascii_lowercase(),
            host: None,
            path: path.into(),
            params: Vec::new(),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Set `name` to `value`, replacing an existing value.
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.params.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.params.push((name, value)),
        }
        self
    }

    pub fn params(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn parse(input: &str) -> ResolveResult<Self> {
        let raw = input.trim();
        let invalid = |reason: &str| ResolveError::InvalidPath {
            path: raw.to_string(),
            reason: reason.to_string(),
        };
        if raw.is_empty() {
            return Err(invalid("empty"));
        }

        let (scheme, rest) = match split_scheme(raw) {
            Some((scheme, rest)) => (scheme.to_ascii_lowercase(), rest),
            None => ("file".to_string(), raw),
        };

        let (locator, query) = match rest.split_once('?') {
            Some((locator, query)) => (locator, Some(query)),
            None => (rest, None),
        };

        let (host, path) = match locator.strip_prefix("//") {
            Some(authority) => {
                let end = authority.find('/').unwrap_or(authority.len());
                let host = &authority[..end];
                if host.is_empty() {
                    (None, &authority[end..])
                } else {
                    (Some(percent_decode(host).map_err(|r| invalid(&r))?), &authority[end..])
                }
            }
            None => (None, locator),
        };
        let path = percent_decode(path).map_err(|r| invalid(&r))?;
        if path.is_empty() && host.is_none() {
            return Err(invalid("no path"));
        }

        let mut resource = ResourcePath {
            scheme,
            host,
            path,
            params: Vec::new(),
        };
        for pair in query.unwrap_or("").split('&').filter(|p| !p.is_empty()) {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            let name = percent_decode(name).map_err(|r| invalid(&r))?;
            let value = percent_decode(value).map_err(|r| invalid(&r))?;
            if name.is_empty() {
                return Err(invalid("parameter without a name"));
            }
            resource = resource.with_param(name, value);
        }
        Ok(resource)
    }
}

impl ResourceHandle for ResourcePath {
    fn scheme(&self) -> &str {
        &self.scheme
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

impl FromStr for ResourcePath {
    type Err = ResolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.scheme)?;
        if let Some(host) = &self.host {
            write!(f, "//{}", percent_encode(host))?;
        }
        write!(f, "{}", percent_encode(&self.path))?;
        for (i, (name, value)) in self.params.iter().enumerate() {
            f.write_str(if i == 0 { "?" } else { "&" })?;
            f.write_str(&percent_encode(name))?;
            if !value.is_empty() {
                write!(f, "={}", percent_encode(value))?;
            }
        }
        Ok(())
    }
}

/// `scheme:rest` when the prefix is a valid scheme name of two or more
/// characters (a single letter is a drive, not a scheme).
fn split_scheme(raw: &str) -> Option<(&str, &str)> {
    let (scheme, rest) = raw.split_once(':')?;
    let mut chars = scheme.chars();
    let first = chars.next()?;
    let valid = scheme.len() >= 2
        && first.is_ascii_alphabetic()
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then_some((scheme, rest))
}

fn percent_decode(s: &str) -> Result<String, String> {
    if !s.contains('%') {
        return Ok(s.to_string());
    }
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes
                .get(i + 1..i + 3)
                .and_then(|h| std::str::from_utf8(h).ok())
                .and_then(|h| u8::from_str_radix(h, 16).ok())
                .ok_or_else(|| format!("bad percent escape at offset {i}"))?;
            out.push(hex);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| "percent escapes do not decode to UTF-8".to_string())
}

fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            // non-ASCII bytes are escaped one UTF-8 byte at a time
            b'%' | b'?' | b'&' | b'=' | b'#' | b' ' | 0x00..=0x1F | 0x7F..=0xFF => {
                out.push_str(&format!("%{b:02X}"))
            }
            _ => out.push(char::from(b)),
        }
    }
    out
}
