//! Streaming HTML injection.
//!
//! Appends a fragment at the end of `<body>` (i.e. just before the closing
//! tag) without re-parsing the whole document into a DOM.

use crate::{Result, ServeError};
use lol_html::html_content::ContentType;
use lol_html::{element, HtmlRewriter, Settings};

/// Inject `fragment` before `</body>`. Documents without a `<body>` element
/// pass through unchanged.
pub fn inject_before_body_close(html: &[u8], fragment: &str) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(html.len() + fragment.len());

    let mut rewriter = HtmlRewriter::new(
        Settings {
            element_content_handlers: vec![element!("body", |el| {
                el.append(fragment, ContentType::Html);
                Ok(())
            })],
            ..Settings::default()
        },
        |chunk: &[u8]| out.extend_from_slice(chunk),
    );

    rewriter
        .write(html)
        .map_err(|e| ServeError::Rewrite(e.to_string()))?;
    rewriter
        .end()
        .map_err(|e| ServeError::Rewrite(e.to_string()))?;

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragment_lands_before_closing_body() {
        let html = b"<html><body><p>page</p></body></html>";
        let out = inject_before_body_close(html, "<div id=\"panel\">files</div>").unwrap();
        let out = String::from_utf8(out).unwrap();
        assert_eq!(
            out,
            "<html><body><p>page</p><div id=\"panel\">files</div></body></html>"
        );
    }

    #[test]
    fn document_without_body_passes_through() {
        let html = b"<p>fragmentary</p>";
        let out = inject_before_body_close(html, "<div>x</div>").unwrap();
        assert_eq!(out, html.to_vec());
    }
}
