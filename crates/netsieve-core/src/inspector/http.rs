//! HTTP request and response rules.

use std::io::Write;

use crate::error::Result;
use crate::header::Header;
use crate::object::{HttpStream, ObjectType, ProtocolObject, EXHDR_RESPONSE_HOST, EXHDR_RESPONSE_REQUEST};
use crate::params::FilterConfig;
use crate::text::{decode_ansi, decode_utf8, inflate, ContentEncoding};

use super::{BlockReason, Inspection, InspectionRule};

/// Status line of the synthesized block page.
pub const BLOCK_STATUS_LINE: &str = "HTTP/1.1 404 Not OK\r\n";

/// Number of leading body bytes needed for content sniffing.
pub const SNIFF_LEN: usize = 5;

/// Builds the URL an HTTP object refers to.
///
/// Requests use their `Host` header and request line; responses use the
/// `X-EXHDR-*` headers copied from the request they answer. Returns an
/// empty string when the URL cannot be derived.
pub fn derive_url(object: &ProtocolObject) -> String {
    if !object.object_type().is_http() {
        return String::new();
    }
    let Ok(header_stream) = object.stream(HttpStream::Header) else {
        return String::new();
    };
    let header = Header::read_from(header_stream);

    let (host, status) = if object.object_type() == ObjectType::HttpRequest {
        let status = object
            .stream(HttpStream::Status)
            .map(|s| decode_utf8(s.as_bytes()))
            .unwrap_or_default();
        (header.get("Host").unwrap_or_default().to_string(), status)
    } else {
        (
            header.get(EXHDR_RESPONSE_HOST).unwrap_or_default().to_string(),
            header.get(EXHDR_RESPONSE_REQUEST).unwrap_or_default().to_string(),
        )
    };

    let mut parts = status.splitn(3, ' ');
    let _method = parts.next();
    let (Some(uri), Some(_version)) = (parts.next(), parts.next()) else {
        return String::new();
    };

    if uri.starts_with("http://") {
        uri.to_string()
    } else {
        format!("http://{}{}", host, uri)
    }
}

/// Returns the `Content-Type` header value of an HTTP object.
pub fn content_type(object: &ProtocolObject) -> Option<String> {
    let stream = object.stream(HttpStream::Header).ok()?;
    Header::read_from(stream).get("Content-Type").map(str::to_string)
}

/// Returns true if the content type denotes an HTML document.
pub fn is_html(content_type: &str) -> bool {
    content_type.contains("text/html")
}

/// Returns true if the skip-domain allowlist matches the object's URL.
pub fn is_skipped(object: &ProtocolObject, config: &FilterConfig) -> bool {
    if config.skip_domain.is_empty() {
        return false;
    }
    let url = derive_url(object).to_lowercase();
    url.contains(&config.skip_domain.to_lowercase())
}

/// Synthesizes the 404 block page response.
pub fn block_page(body: &str) -> Result<ProtocolObject> {
    let mut obj = ProtocolObject::new(ObjectType::HttpResponse);

    obj.stream_mut(HttpStream::Status)?
        .write_all(BLOCK_STATUS_LINE.as_bytes())?;

    let mut header = Header::new();
    header.add("Content-Type", "text/html");
    header.add("Content-Length", body.len().to_string());
    header.add("Connection", "close");
    header.write_to(obj.stream_mut(HttpStream::Header)?)?;

    obj.stream_mut(HttpStream::Content)?
        .write_all(body.as_bytes())?;

    obj.rewind_all();
    Ok(obj)
}

/// Lower-cased body text of an HTML response, one char per inflated byte.
fn html_text(object: &ProtocolObject, header: &Header) -> Result<String> {
    let body = object.stream(HttpStream::Content)?.as_bytes();
    let encoding = ContentEncoding::from_header(header.get("Content-Encoding"));
    Ok(decode_ansi(&inflate(body, encoding)).to_lowercase())
}

fn sniff_binary(head: &[u8], config: &FilterConfig) -> Option<BlockReason> {
    if config.block_flash && head.starts_with(b"FLV") {
        return Some(BlockReason::FlashContent);
    }
    if config.block_images && (head.starts_with(b"GIF") || head.starts_with(&[0xFF, 0xD8, 0xFF])) {
        return Some(BlockReason::ImageContent);
    }
    None
}

/// Blocks responses by HTML stop word or by sniffed media type.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpResponseRule;

impl HttpResponseRule {
    fn check(&self, object: &ProtocolObject, config: &FilterConfig) -> Result<Option<BlockReason>> {
        if is_skipped(object, config) {
            tracing::debug!("Skip domain matched, allowing response");
            return Ok(None);
        }

        let header = Header::read_from(object.stream(HttpStream::Header)?);

        if header.get("Content-Type").is_some_and(is_html) {
            if config.html_stop_word.is_empty() {
                return Ok(None);
            }
            let stop_word = config.html_stop_word.to_lowercase();
            let html = html_text(object, &header)?;
            return Ok(html.contains(&stop_word).then_some(BlockReason::HtmlStopWord));
        }

        let content = object.stream(HttpStream::Content)?.as_bytes();
        if content.len() < SNIFF_LEN {
            return Ok(None);
        }
        Ok(sniff_binary(&content[..SNIFF_LEN], config))
    }
}

impl InspectionRule for HttpResponseRule {
    fn name(&self) -> &'static str {
        "http-response"
    }

    fn inspect(&self, object: &mut ProtocolObject, config: &FilterConfig) -> Result<Inspection> {
        match self.check(object, config)? {
            Some(reason) => Ok(Inspection::block(reason, Some(block_page(&config.block_page)?))),
            None => Ok(Inspection::allow()),
        }
    }
}

/// Blocks requests whose URL contains the URL stop word.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpRequestRule;

impl InspectionRule for HttpRequestRule {
    fn name(&self) -> &'static str {
        "http-request"
    }

    fn inspect(&self, object: &mut ProtocolObject, config: &FilterConfig) -> Result<Inspection> {
        let url = derive_url(object).to_lowercase();

        if !config.skip_domain.is_empty() && url.contains(&config.skip_domain.to_lowercase()) {
            return Ok(Inspection::allow());
        }

        if !config.url_stop_word.is_empty() && url.contains(&config.url_stop_word.to_lowercase()) {
            tracing::debug!("URL stop word matched in {}", url);
            return Ok(Inspection::block(
                BlockReason::UrlStopWord,
                Some(block_page(&config.block_page)?),
            ));
        }

        Ok(Inspection::allow())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::Stream;

    fn request(line: &str, host: &str) -> ProtocolObject {
        ProtocolObject::from_streams(
            ObjectType::HttpRequest,
            vec![
                Stream::from_bytes(format!("{}\r\n", line)),
                Stream::from_bytes(format!("Host: {}\r\n\r\n", host)),
                Stream::new(),
            ],
        )
    }

    fn response(content_type: Option<&str>, url: (&str, &str), body: &[u8]) -> ProtocolObject {
        let mut header = format!(
            "{}: {}\r\n{}: GET {} HTTP/1.1\r\n",
            EXHDR_RESPONSE_HOST, url.0, EXHDR_RESPONSE_REQUEST, url.1
        );
        if let Some(ct) = content_type {
            header.push_str(&format!("Content-Type: {}\r\n", ct));
        }
        header.push_str("\r\n");
        ProtocolObject::from_streams(
            ObjectType::HttpResponse,
            vec![
                Stream::from_bytes(b"HTTP/1.1 200 OK\r\n".to_vec()),
                Stream::from_bytes(header),
                Stream::from_bytes(body.to_vec()),
            ],
        )
    }

    fn config() -> FilterConfig {
        FilterConfig {
            block_page: "<b>nope</b>".into(),
            ..FilterConfig::default()
        }
    }

    #[test]
    fn url_from_request_line_and_host() {
        let obj = request("GET /index.html HTTP/1.1", "example.com");
        assert_eq!(derive_url(&obj), "http://example.com/index.html");
    }

    #[test]
    fn absolute_uri_is_used_verbatim() {
        let obj = request("GET http://proxy.test/a HTTP/1.1", "ignored.com");
        assert_eq!(derive_url(&obj), "http://proxy.test/a");
    }

    #[test]
    fn url_from_response_extension_headers() {
        let obj = response(None, ("example.org", "/img.gif"), b"");
        assert_eq!(derive_url(&obj), "http://example.org/img.gif");
    }

    #[test]
    fn malformed_request_line_gives_empty_url() {
        let obj = request("GARBAGE", "example.com");
        assert_eq!(derive_url(&obj), "");
        assert_eq!(derive_url(&ProtocolObject::new(ObjectType::RawOutgoing)), "");
    }

    #[test]
    fn block_page_shape() {
        let page = block_page("blocked!").unwrap();
        assert_eq!(page.object_type(), ObjectType::HttpResponse);
        assert_eq!(page.stream(HttpStream::Status).unwrap().as_bytes(), BLOCK_STATUS_LINE.as_bytes());
        let header = Header::read_from(page.stream(HttpStream::Header).unwrap());
        assert_eq!(header.get("Content-Type"), Some("text/html"));
        assert_eq!(header.get("Content-Length"), Some("8"));
        assert_eq!(header.get("Connection"), Some("close"));
        assert_eq!(page.stream(HttpStream::Content).unwrap().as_bytes(), b"blocked!");
    }

    #[test]
    fn gif_blocked_when_images_blocked() {
        let mut cfg = config();
        cfg.block_images = true;
        let mut obj = response(Some("image/gif"), ("example.org", "/a.gif"), b"GIF89a....");

        let result = HttpResponseRule.inspect(&mut obj, &cfg).unwrap();
        assert!(result.blocked);
        assert_eq!(result.reason, Some(BlockReason::ImageContent));

        let page = result.injected.unwrap();
        assert_eq!(page.stream(HttpStream::Status).unwrap().as_bytes(), b"HTTP/1.1 404 Not OK\r\n");
        let header = Header::read_from(page.stream(HttpStream::Header).unwrap());
        assert_eq!(header.get("Content-Type"), Some("text/html"));
        assert_eq!(page.stream(HttpStream::Content).unwrap().as_bytes(), b"<b>nope</b>");
    }

    #[test]
    fn jpeg_blocked_and_flash_blocked() {
        let mut cfg = config();
        cfg.block_images = true;
        cfg.block_flash = true;

        let mut jpeg = response(None, ("a", "/"), &[0xFF, 0xD8, 0xFF, 0xE0, 0x00]);
        assert_eq!(
            HttpResponseRule.inspect(&mut jpeg, &cfg).unwrap().reason,
            Some(BlockReason::ImageContent)
        );

        let mut flv = response(Some("video/x-flv"), ("a", "/"), b"FLV\x01\x05");
        assert_eq!(
            HttpResponseRule.inspect(&mut flv, &cfg).unwrap().reason,
            Some(BlockReason::FlashContent)
        );
    }

    #[test]
    fn images_allowed_when_toggle_off() {
        let mut obj = response(Some("image/gif"), ("a", "/"), b"GIF89a");
        assert!(!HttpResponseRule.inspect(&mut obj, &config()).unwrap().blocked);
    }

    #[test]
    fn short_binary_body_is_allowed() {
        let mut cfg = config();
        cfg.block_images = true;
        let mut obj = response(Some("image/gif"), ("a", "/"), b"GIF");
        assert!(!HttpResponseRule.inspect(&mut obj, &cfg).unwrap().blocked);
    }

    #[test]
    fn html_stop_word_is_case_insensitive() {
        let mut cfg = config();
        cfg.html_stop_word = "forbidden".into();
        let mut obj = response(
            Some("text/html; charset=utf-8"),
            ("news.example", "/"),
            b"<p>This page is FORBIDDEN</p>",
        );
        let result = HttpResponseRule.inspect(&mut obj, &cfg).unwrap();
        assert!(result.blocked);
        assert_eq!(result.reason, Some(BlockReason::HtmlStopWord));
    }

    #[test]
    fn latin1_body_matches_accented_stop_word() {
        let mut cfg = config();
        cfg.html_stop_word = "Caf\u{e9}".into();
        let mut obj = response(
            Some("text/html; charset=iso-8859-1"),
            ("a", "/"),
            b"<p>CAF\xc9 du coin</p>",
        );
        let result = HttpResponseRule.inspect(&mut obj, &cfg).unwrap();
        assert_eq!(result.reason, Some(BlockReason::HtmlStopWord));
    }

    #[test]
    fn skip_domain_overrides_stop_word() {
        let mut cfg = config();
        cfg.html_stop_word = "forbidden".into();
        cfg.skip_domain = "NEWS.example".into();
        let mut obj = response(Some("text/html"), ("news.example", "/"), b"This page is FORBIDDEN");
        assert!(!HttpResponseRule.inspect(&mut obj, &cfg).unwrap().blocked);
    }

    #[test]
    fn html_without_stop_word_is_allowed() {
        let mut obj = response(Some("text/html"), ("a", "/"), b"GIF looks like an image");
        let mut cfg = config();
        cfg.block_images = true;
        assert!(!HttpResponseRule.inspect(&mut obj, &cfg).unwrap().blocked);
    }

    #[test]
    fn gzip_html_is_inflated_before_search() {
        use flate2::write::GzEncoder;
        use flate2::Compression;

        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(b"<html>Forbidden fruit</html>").unwrap();
        let gz = enc.finish().unwrap();

        let mut obj = response(Some("text/html"), ("a", "/"), &gz);
        let mut header = Header::read_from(obj.stream(HttpStream::Header).unwrap());
        header.add("Content-Encoding", "gzip");
        header.write_to(obj.stream_mut(HttpStream::Header).unwrap()).unwrap();

        let mut cfg = config();
        cfg.html_stop_word = "forbidden".into();
        assert!(HttpResponseRule.inspect(&mut obj, &cfg).unwrap().blocked);
    }

    #[test]
    fn url_stop_word_blocks_request() {
        let mut cfg = config();
        cfg.url_stop_word = "Casino".into();
        let mut obj = request("GET /play/casino HTTP/1.1", "games.test");
        let result = HttpRequestRule.inspect(&mut obj, &cfg).unwrap();
        assert!(result.blocked);
        assert_eq!(result.reason, Some(BlockReason::UrlStopWord));
        assert!(result.injected.is_some());
    }

    #[test]
    fn skip_domain_allows_request() {
        let mut cfg = config();
        cfg.url_stop_word = "casino".into();
        cfg.skip_domain = "games.test".into();
        let mut obj = request("GET /play/casino HTTP/1.1", "games.test");
        assert!(!HttpRequestRule.inspect(&mut obj, &cfg).unwrap().blocked);
    }
}
