//! Subject addressing in upstream paths.
//!
//! The browser addresses its own resources with a placeholder segment
//! (`/users/me/preferences`); the proxy replaces it with the session's subject
//! id so the browser never needs to know that id.

/// Declares which placeholder stands for the current subject, and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectTemplate {
    placeholder: String,
    scope_markers: Vec<String>,
}

impl SubjectTemplate {
    pub fn new(placeholder: impl Into<String>, scope_markers: Vec<String>) -> Self {
        Self {
            placeholder: placeholder.into(),
            scope_markers,
        }
    }

    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    /// Replace every placeholder segment that directly follows a scope marker.
    ///
    /// Applying the template to its own output yields the same output.
    pub fn apply(&self, path: &str, subject_id: &str) -> String {
        let subject = encode_segment(subject_id);
        let mut out = String::with_capacity(path.len() + subject.len());
        let mut previous: Option<&str> = None;

        for (i, segment) in path.split('/').enumerate() {
            if i > 0 {
                out.push('/');
            }
            let scoped = previous.is_some_and(|p| self.scope_markers.iter().any(|m| m == p));
            if scoped && segment == self.placeholder {
                out.push_str(&subject);
            } else {
                out.push_str(segment);
            }
            previous = Some(segment);
        }
        out
    }
}

/// Percent-encode everything outside the RFC 3986 unreserved set.
fn encode_segment(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}
