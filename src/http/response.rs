//! Response assembly: fixed status titles/bodies, builder-style header/body setters, and a
//! streamed `File` handle for large bodies instead of a mapped region
//! (`ActiveAction::FileDownload`).

use crate::prelude::*;

#[derive(Debug)]
pub struct HttpResponse {
    pub version: String,
    pub status_code: u16,
    pub status_text: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status_code: u16, status_text: &str) -> Self {
        Self {
            version: "HTTP/1.1".to_string(),
            status_code,
            status_text: status_text.to_string(),
            headers: HashMap::from([("content-length".to_string(), "0".to_string())]),
            body: Vec::new(),
        }
    }

    pub fn set_header(&mut self, key: &str, value: &str) -> &mut Self {
        self.headers.insert(key.to_lowercase(), value.to_string());
        self
    }

    pub fn set_body(&mut self, body: Vec<u8>, content_type: &str) -> &mut Self {
        self.headers
            .insert("content-length".to_string(), body.len().to_string());
        self.headers
            .insert("content-type".to_string(), content_type.to_string());
        self.body = body;
        self
    }

    /// Status line + headers + blank line + body, all in one buffer. Used for responses whose
    /// body is a small in-memory HTML string (errors, login/register redirects) rather than a
    /// streamed file.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut res = self.to_bytes_headers_only();
        res.extend_from_slice(&self.body);
        res
    }

    /// Status line + headers + blank line, no body — the head of the gather-write for a
    /// streamed `ActiveAction::FileDownload` response.
    pub fn to_bytes_headers_only(&self) -> Vec<u8> {
        let mut res = format!(
            "{} {} {}\r\n",
            self.version, self.status_code, self.status_text
        );
        for (key, val) in &self.headers {
            res.push_str(&format!("{}: {}\r\n", Self::to_pascal_case(key), val));
        }
        res.push_str("\r\n");
        res.into_bytes()
    }

    pub fn status_text(code: u16) -> &'static str {
        match code {
            HTTP_OK => "OK",
            HTTP_BAD_REQUEST => "Bad Request",
            HTTP_FORBIDDEN => "Forbidden",
            HTTP_NOT_FOUND => "Not Found",
            HTTP_INTERNAL_SERVER_ERROR => "Internal Error",
            _ => "OK",
        }
    }

    pub fn set_status_code(&mut self, code: u16) -> &mut Self {
        self.status_code = code;
        self.status_text = HttpResponse::status_text(code).to_string();
        self
    }

    fn to_pascal_case(s: &str) -> String {
        s.split('-')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    None => String::new(),
                    Some(f) => f.to_uppercase().collect::<String>() + chars.as_str(),
                }
            })
            .collect::<Vec<String>>()
            .join("-")
    }
}

pub fn get_mime_type(extension: Option<&str>) -> &'static str {
    match extension {
        Some("css") => "text/css",
        Some("js") => "application/javascript",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("mp4") => "video/mp4",
        _ => "text/html",
    }
}

/// Fixed-wording error response for a status code. Every error response this builds closes
/// the connection; the caller may override with its own `Connection` header
/// (see `HttpConnection::apply_response`).
pub fn handle_error(code: u16) -> HttpResponse {
    let (title, body): (&str, &str) = match code {
        HTTP_BAD_REQUEST => (
            "Bad Request",
            "Your request has bad syntax or is inherently impossible to satisfy.\n",
        ),
        HTTP_FORBIDDEN => (
            "Forbidden",
            "You do not have permission to get file form this server.\n",
        ),
        HTTP_NOT_FOUND => (
            "Not Found",
            "The requested file was not found on this server.\n",
        ),
        _ => (
            "Internal Error",
            "There was an unusual problem serving the request file.\n",
        ),
    };

    let mut res = HttpResponse::new(code, title);
    res.set_body(body.as_bytes().to_vec(), "text/html");
    res
}
