use http::header::{HeaderMap, HeaderValue, SET_COOKIE};
use std::fmt;

use crate::session::errors::SessionError;
use crate::session::types::SameSite;

/// One parsed `Set-Cookie` value.
///
/// Attribute segments are kept verbatim, so writing the cookie back only changes what was
/// explicitly modified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieAttributes {
    name: String,
    value: String,
    /// `name=value` exactly as received
    pair: String,
    /// Everything between `;` separators after the pair, including surrounding whitespace
    segments: Vec<String>,
}

impl CookieAttributes {
    pub fn parse(header: &str) -> Result<Self, SessionError> {
        let mut parts = header.split(';');
        let pair = parts.next().unwrap_or_default();

        let Some((name, value)) = pair.split_once('=') else {
            return Err(SessionError::InvalidCookieHeader(
                "missing '=' in cookie name/value pair".to_string(),
            ));
        };
        let name = name.trim();
        if name.is_empty() {
            return Err(SessionError::InvalidCookieHeader(
                "empty cookie name".to_string(),
            ));
        }
        if let Some(c) = name.chars().find(|c| !is_token_char(*c)) {
            return Err(SessionError::InvalidCookieHeader(format!(
                "invalid character {c:?} in cookie name"
            )));
        }

        Ok(Self {
            name: name.to_string(),
            value: value.trim().to_string(),
            pair: pair.to_string(),
            segments: parts.map(str::to_string).collect(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn is_secure(&self) -> bool {
        self.has_flag("Secure")
    }

    pub fn is_http_only(&self) -> bool {
        self.has_flag("HttpOnly")
    }

    /// Value of an attribute such as `Path` or `Max-Age`, matched case-insensitively.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.segments.iter().find_map(|segment| {
            let (key, value) = segment.split_once('=')?;
            key.trim()
                .eq_ignore_ascii_case(name)
                .then_some(value.trim())
        })
    }

    pub fn same_site(&self) -> Option<SameSite> {
        self.attribute("SameSite").and_then(|v| v.parse().ok())
    }

    /// Replace the `SameSite` attribute in place, or append one if absent.
    pub fn set_same_site(&mut self, same_site: SameSite) {
        let mut replaced = false;
        let mut i = 0;
        while i < self.segments.len() {
            if segment_name(&self.segments[i]).eq_ignore_ascii_case("SameSite") {
                if replaced {
                    // a later duplicate would override the one we just wrote
                    self.segments.remove(i);
                    continue;
                }
                let segment = &self.segments[i];
                let lead = &segment[..segment.len() - segment.trim_start().len()];
                self.segments[i] = format!("{lead}SameSite={same_site}");
                replaced = true;
            }
            i += 1;
        }

        if !replaced {
            // keep a trailing empty segment ("...; Path=/;") at the end
            let at = if self
                .segments
                .last()
                .is_some_and(|s| s.trim().is_empty())
            {
                self.segments.len() - 1
            } else {
                self.segments.len()
            };
            self.segments.insert(at, format!(" SameSite={same_site}"));
        }
    }

    fn has_flag(&self, flag: &str) -> bool {
        self.segments
            .iter()
            .any(|segment| segment_name(segment).eq_ignore_ascii_case(flag))
    }
}

impl fmt::Display for CookieAttributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pair)?;
        for segment in &self.segments {
            write!(f, ";{segment}")?;
        }
        Ok(())
    }
}

fn segment_name(segment: &str) -> &str {
    segment.split('=').next().unwrap_or_default().trim()
}

// RFC 6265 cookie-name is an RFC 2616 token
pub(crate) fn is_token_char(c: char) -> bool {
    c.is_ascii_graphic() && !"()<>@,;:\\\"/[]?={}".contains(c)
}

/// Non-fatal problem found while rewriting the session cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CookieWarning {
    /// Browsers reject `SameSite=None` cookies that are not `Secure`.
    SameSiteNoneWithoutSecure,
}

impl fmt::Display for CookieWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SameSiteNoneWithoutSecure => write!(
                f,
                "SameSite=None without the Secure attribute is rejected by browsers; \
                 enable secure session cookies"
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteOutcome {
    /// No pending `Set-Cookie` for the session cookie
    NotFound,
    Rewritten {
        header: String,
        warning: Option<CookieWarning>,
    },
    /// The session cookie was found but could not be parsed and was left alone
    Unparsed,
}

/// Enforces the `SameSite` policy on the session cookie among pending response headers.
#[derive(Debug, Clone)]
pub struct CookieRewriter {
    cookie_name: String,
}

impl CookieRewriter {
    pub fn new(cookie_name: impl Into<String>) -> Self {
        Self {
            cookie_name: cookie_name.into(),
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// First pending `Set-Cookie` value for the session cookie, if any.
    pub fn pending<'h>(&self, headers: &'h HeaderMap) -> Option<&'h HeaderValue> {
        let prefix = format!("{}=", self.cookie_name);
        headers
            .get_all(SET_COOKIE)
            .iter()
            .find(|v| v.as_bytes().starts_with(prefix.as_bytes()))
    }

    /// Rewrite the first pending `Set-Cookie` for the session cookie with `same_site`.
    ///
    /// Other `Set-Cookie` values keep their relative order; the rewritten one is appended
    /// last. Missing or unparseable session cookies never fail the response.
    pub fn apply(&self, headers: &mut HeaderMap, same_site: SameSite) -> RewriteOutcome {
        let prefix = format!("{}=", self.cookie_name);
        let values: Vec<HeaderValue> = headers.get_all(SET_COOKIE).iter().cloned().collect();

        let Some(index) = values
            .iter()
            .position(|v| v.as_bytes().starts_with(prefix.as_bytes()))
        else {
            tracing::trace!("No Set-Cookie for {} pending, nothing to rewrite", self.cookie_name);
            return RewriteOutcome::NotFound;
        };

        let mut cookie = match values[index]
            .to_str()
            .map_err(|e| SessionError::InvalidCookieHeader(e.to_string()))
            .and_then(CookieAttributes::parse)
        {
            Ok(cookie) => cookie,
            Err(e) => {
                tracing::warn!("Leaving session cookie header untouched: {e}");
                return RewriteOutcome::Unparsed;
            }
        };

        cookie.set_same_site(same_site);
        let header = cookie.to_string();
        let rewritten = match HeaderValue::from_str(&header) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Leaving session cookie header untouched: {e}");
                return RewriteOutcome::Unparsed;
            }
        };

        let warning = (same_site == SameSite::None && !cookie.is_secure())
            .then_some(CookieWarning::SameSiteNoneWithoutSecure);
        if let Some(warning) = warning {
            tracing::warn!("{warning}");
        }

        headers.remove(SET_COOKIE);
        for (i, value) in values.into_iter().enumerate() {
            if i != index {
                headers.append(SET_COOKIE, value);
            }
        }
        headers.append(SET_COOKIE, rewritten);

        tracing::debug!("Rewrote {} cookie with SameSite={same_site}", self.cookie_name);
        RewriteOutcome::Rewritten { header, warning }
    }
}
