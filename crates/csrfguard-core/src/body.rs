//! Locating a token inside a form body
//!
//! Only a bounded prefix of the body is ever inspected. When the body was cut
//! short, fields that might continue past the end of the prefix are ignored,
//! so a token is either found whole or not at all.

use crate::policy::media_type;
use http::header::{HeaderMap, CONTENT_TYPE};

/// Form encodings that can carry a token field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FormKind {
    /// `application/x-www-form-urlencoded`
    UrlEncoded,
    /// `multipart/form-data` with its boundary
    Multipart {
        /// Part delimiter, without the leading dashes
        boundary: String,
    },
}

impl FormKind {
    /// Detect the form encoding from the request's content type.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        match media_type(headers)?.as_str() {
            "application/x-www-form-urlencoded" => Some(Self::UrlEncoded),
            "multipart/form-data" => {
                let content_type = headers.get(CONTENT_TYPE)?.to_str().ok()?;
                extract_boundary(content_type).map(|boundary| Self::Multipart { boundary })
            }
            _ => None,
        }
    }

    /// Find the field `name` in a body prefix.
    ///
    /// `complete` tells whether the prefix is the whole body.
    pub fn find_field(&self, prefix: &[u8], complete: bool, name: &str) -> Option<String> {
        match self {
            Self::UrlEncoded => find_urlencoded(prefix, complete, name),
            Self::Multipart { boundary } => find_multipart(prefix, boundary, name),
        }
    }
}

fn extract_boundary(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("boundary") {
            return None;
        }
        let boundary = value.trim().trim_matches('"');
        (!boundary.is_empty()).then(|| boundary.to_string())
    })
}

fn find_urlencoded(prefix: &[u8], complete: bool, name: &str) -> Option<String> {
    // a truncated body may end mid-pair; keep only pairs followed by `&`
    let usable = if complete {
        prefix
    } else {
        let end = prefix.iter().rposition(|&b| b == b'&')?;
        &prefix[..end]
    };

    serde_urlencoded::from_bytes::<Vec<(String, String)>>(usable)
        .ok()?
        .into_iter()
        .find(|(key, value)| key == name && !value.is_empty())
        .map(|(_, value)| value)
}

fn find_multipart(prefix: &[u8], boundary: &str, name: &str) -> Option<String> {
    let delimiter = format!("--{boundary}");
    let sections = split(prefix, delimiter.as_bytes());

    // the first section is the preamble and the last one is either the
    // epilogue or a part cut off by the buffer limit
    if sections.len() < 3 {
        return None;
    }
    sections[1..sections.len() - 1]
        .iter()
        .find_map(|part| form_field(part, name))
}

fn form_field(part: &[u8], name: &str) -> Option<String> {
    // some clients frame parts with bare `\n`
    let part = part
        .strip_prefix(b"\r\n")
        .or_else(|| part.strip_prefix(b"\n"))?;
    let (head, body) = match find(part, b"\r\n\r\n") {
        Some(end) => (&part[..end], &part[end + 4..]),
        None => {
            let end = find(part, b"\n\n")?;
            (&part[..end], &part[end + 2..])
        }
    };
    let head = std::str::from_utf8(head).ok()?;

    let disposition = head.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim()
            .eq_ignore_ascii_case("content-disposition")
            .then_some(value)
    })?;

    let mut field_name = None;
    for param in disposition.split(';').skip(1) {
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        match key.trim().to_ascii_lowercase().as_str() {
            "name" => field_name = Some(value.trim().trim_matches('"')),
            // file uploads never carry the token
            "filename" => return None,
            _ => {}
        }
    }
    if field_name != Some(name) {
        return None;
    }

    let value = body
        .strip_suffix(b"\r\n")
        .or_else(|| body.strip_suffix(b"\n"))
        .unwrap_or(body);
    let value = std::str::from_utf8(value).ok()?.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|window| window == needle)
}

fn split<'a>(mut haystack: &'a [u8], delimiter: &[u8]) -> Vec<&'a [u8]> {
    let mut sections = Vec::new();
    while let Some(at) = find(haystack, delimiter) {
        sections.push(&haystack[..at]);
        haystack = &haystack[at + delimiter.len()..];
    }
    sections.push(haystack);
    sections
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn headers(content_type: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, content_type.parse().unwrap());
        headers
    }

    fn multipart_body(boundary: &str, fields: &[(&str, &str)]) -> Vec<u8> {
        let mut body = String::new();
        for (name, value) in fields {
            body.push_str(&format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            ));
        }
        body.push_str(&format!("--{boundary}--\r\n"));
        body.into_bytes()
    }

    #[test]
    fn test_form_kind_detection() {
        assert_eq!(
            FormKind::from_headers(&headers("application/x-www-form-urlencoded; charset=UTF-8")),
            Some(FormKind::UrlEncoded)
        );
        assert_eq!(
            FormKind::from_headers(&headers("multipart/form-data; boundary=\"abc123\"")),
            Some(FormKind::Multipart {
                boundary: "abc123".to_string()
            })
        );
        assert_eq!(FormKind::from_headers(&headers("multipart/form-data")), None);
        assert_eq!(FormKind::from_headers(&headers("application/json")), None);
        assert_eq!(FormKind::from_headers(&HeaderMap::new()), None);
    }

    #[test]
    fn test_urlencoded() {
        let body = b"name=alice&csrfToken=a%2Db-c&age=3";
        assert_eq!(
            FormKind::UrlEncoded.find_field(body, true, "csrfToken").as_deref(),
            Some("a-b-c")
        );
        assert_eq!(FormKind::UrlEncoded.find_field(body, true, "missing"), None);
    }

    #[test]
    fn test_urlencoded_truncated_pair_is_ignored() {
        // the token value might continue past the prefix
        let prefix = b"name=alice&csrfToken=abc";
        assert_eq!(FormKind::UrlEncoded.find_field(prefix, false, "csrfToken"), None);

        let prefix = b"csrfToken=abc&comment=very-long";
        assert_eq!(
            FormKind::UrlEncoded.find_field(prefix, false, "csrfToken").as_deref(),
            Some("abc")
        );
    }

    #[test]
    fn test_multipart() {
        let body = multipart_body("XyZ", &[("title", "hello"), ("csrfToken", "tok-1")]);
        let kind = FormKind::Multipart {
            boundary: "XyZ".to_string(),
        };
        assert_eq!(kind.find_field(&body, true, "csrfToken").as_deref(), Some("tok-1"));
        assert_eq!(kind.find_field(&body, true, "other"), None);
    }

    #[test]
    fn test_multipart_skips_files_and_cut_parts() {
        let kind = FormKind::Multipart {
            boundary: "b".to_string(),
        };
        let file = b"--b\r\nContent-Disposition: form-data; name=\"csrfToken\"; filename=\"t.txt\"\r\n\r\nnope\r\n--b--\r\n";
        assert_eq!(kind.find_field(file, true, "csrfToken"), None);

        let body = multipart_body("b", &[("csrfToken", "tok-1")]);
        let cut = &body[..body.len() - 12];
        assert_eq!(kind.find_field(cut, false, "csrfToken"), None);
    }

    #[test]
    fn test_multipart_with_bare_newlines() {
        let kind = FormKind::Multipart {
            boundary: "b".to_string(),
        };
        let body = b"--b\nContent-Disposition: form-data; name=\"title\"\n\nhello\n--b\nContent-Disposition: form-data; name=\"csrfToken\"\n\ntok-1\n--b--\n";
        assert_eq!(kind.find_field(body, true, "csrfToken").as_deref(), Some("tok-1"));
        assert_eq!(kind.find_field(body, true, "title").as_deref(), Some("hello"));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_prefix_never_yields_partial_token(
            filler in "[a-z]{0,40}",
            token in "[0-9a-f]{24}",
            cut in 0usize..80,
        ) {
            let body = format!("a={filler}&csrfToken={token}&z=1");
            let cut = cut.min(body.len());
            let found = FormKind::UrlEncoded.find_field(&body.as_bytes()[..cut], false, "csrfToken");
            if let Some(found) = found {
                prop_assert_eq!(found, token);
            }
        }
    }
}
