//! Fixed CGI-tag routing table: the segment after the last `/` in the URL is a single
//! character selecting a canned HTML page or a credential-store action.

use crate::http::HttpRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Serve a canned page by path relative to the document root.
    Page(&'static str),
    /// Tag `2`: parse `user=<u>&password=<p>` from the body and attempt login.
    Login,
    /// Tag `3`: parse the same body shape and attempt registration.
    Register,
    /// Any other tag: append the raw URL to the document root.
    Raw,
}

/// `request.url` has already been canonicalised (absolute-URL scheme stripped, bare `/`
/// rewritten to `/judge.html`), so a bare `/` never reaches here — it arrives as tag `j` and
/// falls through to `Raw`, which resolves `/judge.html` under the document root like any
/// other page.
pub fn resolve_route(request: &HttpRequest) -> Route {
    match request.routing_tag() {
        Some('0') => Route::Page("/register.html"),
        Some('1') => Route::Page("/log.html"),
        Some('2') => Route::Login,
        Some('3') => Route::Register,
        Some('5') => Route::Page("/picture.html"),
        Some('6') => Route::Page("/video.html"),
        Some('7') => Route::Page("/fans.html"),
        _ => Route::Raw,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginBody {
    pub username: String,
    pub password: String,
}

/// Parses `user=<name>&password=<pw>`. A missing `user=`/`password=` prefix, a missing `&`
/// separator, or an empty field all return `None`, which the caller turns into `BAD_REQUEST`.
pub fn parse_login_body(body: &[u8]) -> Option<LoginBody> {
    let s = std::str::from_utf8(body).ok()?;
    let rest = s.strip_prefix("user=")?;
    let amp = rest.find('&')?;
    let username = &rest[..amp];
    let rest = rest[amp + 1..].strip_prefix("password=")?;
    let password = rest;
    if username.is_empty() || password.is_empty() {
        return None;
    }
    Some(LoginBody {
        username: username.to_string(),
        password: password.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Method;

    fn request_for(url: &str) -> HttpRequest {
        let mut req = HttpRequest::new();
        req.buffer
            .extend_from_slice(format!("GET {} HTTP/1.1\r\n\r\n", url).as_bytes());
        req.advance().unwrap();
        req
    }

    #[test]
    fn tag_0_serves_register_page() {
        assert_eq!(resolve_route(&request_for("/0")), Route::Page("/register.html"));
    }

    #[test]
    fn tag_1_serves_log_page() {
        assert_eq!(resolve_route(&request_for("/1")), Route::Page("/log.html"));
    }

    #[test]
    fn tag_2_is_login() {
        assert_eq!(resolve_route(&request_for("/2CGISQL.cgi")), Route::Login);
    }

    #[test]
    fn tag_3_is_register() {
        assert_eq!(resolve_route(&request_for("/3CGISQL.cgi")), Route::Register);
    }

    #[test]
    fn tags_5_6_7_serve_media_pages() {
        assert_eq!(resolve_route(&request_for("/5")), Route::Page("/picture.html"));
        assert_eq!(resolve_route(&request_for("/6")), Route::Page("/video.html"));
        assert_eq!(resolve_route(&request_for("/7")), Route::Page("/fans.html"));
    }

    #[test]
    fn unknown_tag_and_bare_slash_fall_through_to_raw() {
        assert_eq!(resolve_route(&request_for("/style.css")), Route::Raw);
        assert_eq!(resolve_route(&request_for("/")), Route::Raw);
        let mut req = request_for("/");
        assert_eq!(req.url, "/judge.html");
        let _ = Method::GET;
    }

    #[test]
    fn parses_well_formed_login_body() {
        let body = parse_login_body(b"user=alice&password=secret").unwrap();
        assert_eq!(body.username, "alice");
        assert_eq!(body.password, "secret");
    }

    #[test]
    fn rejects_missing_ampersand() {
        assert!(parse_login_body(b"user=alicepassword=secret").is_none());
    }

    #[test]
    fn rejects_missing_user_prefix() {
        assert!(parse_login_body(b"name=alice&password=secret").is_none());
    }

    #[test]
    fn rejects_missing_password_prefix() {
        assert!(parse_login_body(b"user=alice&pw=secret").is_none());
    }

    #[test]
    fn rejects_empty_fields() {
        assert!(parse_login_body(b"user=&password=secret").is_none());
        assert!(parse_login_body(b"user=alice&password=").is_none());
    }
}
