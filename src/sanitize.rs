use regex::Regex;
use std::sync::OnceLock;

/// Replace disallowed characters with "_" so that UID values coming off the
/// wire can be used as path components.
///
/// Also, it's necessary to handle NUL bytes...
pub(crate) fn sanitize<S: AsRef<str>>(s: S) -> String {
    let s_nonull = s.as_ref().replace('\0', "");
    let cleaned = VALID_CHARS_RE
        .get_or_init(|| Regex::new(r#"[^A-Za-z0-9\.\-]+"#).unwrap())
        .replace_all(&s_nonull, "_")
        .to_string();
    // a component of only dots would escape the storage root
    if cleaned.is_empty() || cleaned.bytes().all(|b| b == b'.') {
        "_".to_string()
    } else {
        cleaned
    }
}

static VALID_CHARS_RE: OnceLock<Regex> = OnceLock::new();
