//! Output variables: what a render reports back to its caller.
//!
//! Templates consume these as plain values (`url`, `width`, `srcset`, ...);
//! auto-tag mode additionally gets a ready `<img>` fragment built with maud.
//! Lazy renders swap the real URL into `data-src` and put the placeholder in
//! `src`, which is the contract the front-end loader expects.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use maud::{html, Markup, PreEscaped};

/// Everything a finished render exposes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputVars {
    /// Cache file name, relative to the cache directory.
    pub url: String,
    /// Public URL (configured prefix + file name).
    pub url_prefixed: String,
    pub width: u32,
    pub height: u32,
    pub mime: String,
    /// `data:` URI of the encoded bytes, when the request asked for one.
    pub base64: Option<String>,
    pub srcset: Option<String>,
    pub sizes: Option<String>,
    /// Public URL of the lazy/dominant placeholder variant.
    pub placeholder_url: Option<String>,
    pub alt: Option<String>,
    /// Extra attribute text spliced verbatim into the auto tag.
    pub attributes: Option<String>,
    pub cache_hit: bool,
    pub fallback_used: bool,
}

/// Build a `data:` URI for encoded image bytes.
pub fn data_uri(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", BASE64.encode(bytes))
}

impl OutputVars {
    /// The `<img>` fragment for auto-tag mode.
    ///
    /// With a placeholder the real image moves to `data-src`/`data-srcset`;
    /// otherwise a base64 payload, when present, inlines as the `src`.
    pub fn img_tag(&self) -> Markup {
        let tag = match &self.placeholder_url {
            Some(placeholder) => html! {
                img src=(placeholder)
                    data-src=(self.url_prefixed)
                    width=(self.width)
                    height=(self.height)
                    alt=[self.alt.as_deref()]
                    data-srcset=[self.srcset.as_deref()]
                    sizes=[self.sizes.as_deref()];
            },
            None => {
                let src = self.base64.as_deref().unwrap_or(&self.url_prefixed);
                html! {
                    img src=(src)
                        width=(self.width)
                        height=(self.height)
                        alt=[self.alt.as_deref()]
                        srcset=[self.srcset.as_deref()]
                        sizes=[self.sizes.as_deref()];
                }
            }
        };
        match self.attributes.as_deref().map(str::trim) {
            Some(extra) if !extra.is_empty() => {
                PreEscaped(tag.into_string().replacen("<img", &format!("<img {extra}"), 1))
            }
            _ => tag,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> OutputVars {
        OutputVars {
            url: "cat_0_abc.jpg".into(),
            url_prefixed: "/media/cat_0_abc.jpg".into(),
            width: 400,
            height: 300,
            mime: "image/jpeg".into(),
            ..Default::default()
        }
    }

    #[test]
    fn plain_tag_carries_dimensions_and_src() {
        let html = vars().img_tag().into_string();
        assert!(html.contains(r#"src="/media/cat_0_abc.jpg""#));
        assert!(html.contains(r#"width="400""#));
        assert!(html.contains(r#"height="300""#));
        assert!(!html.contains("data-src"));
    }

    #[test]
    fn lazy_tag_moves_the_real_url_to_data_src() {
        let mut v = vars();
        v.placeholder_url = Some("/media/cat_0_abc_lazy.jpg".into());
        v.srcset = Some("/media/cat_0_abc_w200.jpg 200w".into());
        let html = v.img_tag().into_string();
        assert!(html.contains(r#"src="/media/cat_0_abc_lazy.jpg""#));
        assert!(html.contains(r#"data-src="/media/cat_0_abc.jpg""#));
        assert!(html.contains("data-srcset="));
        assert!(!html.contains(" srcset="));
    }

    #[test]
    fn base64_payload_inlines_as_src() {
        let mut v = vars();
        v.base64 = Some("data:image/jpeg;base64,AAAA".into());
        let html = v.img_tag().into_string();
        assert!(html.contains(r#"src="data:image/jpeg;base64,AAAA""#));
    }

    #[test]
    fn alt_text_is_escaped() {
        let mut v = vars();
        v.alt = Some("<script>alert('x')</script>".into());
        let html = v.img_tag().into_string();
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn extra_attributes_splice_into_the_tag() {
        let mut v = vars();
        v.attributes = Some(r#"class="hero" id="main""#.into());
        let html = v.img_tag().into_string();
        assert!(html.starts_with(r#"<img class="hero" id="main""#), "{html}");
    }

    #[test]
    fn data_uri_format() {
        assert_eq!(data_uri("image/png", b"abc"), "data:image/png;base64,YWJj");
    }
}
