//! Presents the configured search engine under our own name.

use crate::agent::page::PageHandle;
use crate::config::BrandingConfig;
use crate::error::PageError;
use serde_json::json;

/// Rewrites the brand word in text, title and meta tags, keeps doing so for
/// nodes added later, and hides logo images when asked to.
const REBRAND: &str = r#"function(from, to, hideLogos, markers) {
    const escaped = from.replace(/[.*+?^${}()|[\]\\]/g, '\\$&');
    const pattern = new RegExp(escaped, 'gi');

    function replaceText(node) {
        if (node.nodeType === Node.TEXT_NODE) {
            if (pattern.test(node.textContent)) {
                node.textContent = node.textContent.replace(pattern, to);
            }
            pattern.lastIndex = 0;
        } else {
            for (const child of node.childNodes) {
                replaceText(child);
            }
        }
    }

    if (document.body) {
        replaceText(document.body);
    }
    document.title = document.title.replace(pattern, to);
    document.querySelectorAll('meta[content]').forEach(meta => {
        meta.content = meta.content.replace(pattern, to);
    });

    if (!window.__brandObserver && document.body) {
        window.__brandObserver = new MutationObserver(mutations => {
            mutations.forEach(m => m.addedNodes.forEach(n => {
                if (n.nodeType === Node.ELEMENT_NODE || n.nodeType === Node.TEXT_NODE) {
                    replaceText(n);
                }
            }));
        });
        window.__brandObserver.observe(document.body, { childList: true, subtree: true });
    }

    if (hideLogos && !document.getElementById('__brand_logo_style')) {
        const selectors = markers.map(m => 'img[src*="' + CSS.escape(m) + '"]');
        selectors.push('img[alt*="' + CSS.escape(from) + ' logo" i]');
        selectors.push('img[title*="' + CSS.escape(from) + '" i]');
        const style = document.createElement('style');
        style.id = '__brand_logo_style';
        style.textContent = selectors.join(',\n') + ' { display: none !important; }';
        (document.head || document.documentElement).appendChild(style);
    }
    return true;
}"#;

/// Served in place of the search engine's logo images
pub const LOGO_SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="120" height="32" viewBox="0 0 120 32"><rect width="32" height="32" rx="8" fill="#4f46e5"/><path d="M9 24 16 8l7 16h-3.4l-1.3-3.2h-4.6L12.4 24zm5-6h4l-2-5.1z" fill="#fff"/><text x="40" y="23" font-family="system-ui,sans-serif" font-size="18" font-weight="600" fill="#4f46e5">Asta</text></svg>"##;

#[derive(Debug, Clone)]
pub struct Branding {
    config: BrandingConfig,
}

impl Branding {
    pub fn new(config: BrandingConfig) -> Self {
        Self { config }
    }

    /// URL as shown to the user, with the search host renamed.
    pub fn display_url(&self, url: &str) -> String {
        if !self.config.enabled || self.config.search_host.is_empty() {
            return url.to_string();
        }
        url.replace(&self.config.search_host, &self.config.display_host)
    }

    /// Whether a resource URL is one of the search engine's logos.
    pub fn is_logo_request(&self, url: &str) -> bool {
        self.config.enabled
            && self
                .config
                .logo_markers
                .iter()
                .any(|marker| !marker.is_empty() && url.contains(marker.as_str()))
    }

    /// Request URL patterns (`*` wildcards) that catch every logo marker.
    pub fn logo_url_patterns(&self) -> Vec<String> {
        if !self.config.enabled {
            return Vec::new();
        }
        self.config
            .logo_markers
            .iter()
            .filter(|marker| !marker.is_empty())
            .map(|marker| format!("*{}*", marker))
            .collect()
    }

    /// Whether `url` is served by the rebranded search engine.
    pub fn is_search_page(&self, url: &str) -> bool {
        !self.config.search_host.is_empty() && url.contains(&self.config.search_host)
    }

    /// Rebrand the document currently shown by `page`.
    pub async fn apply(&self, page: &dyn PageHandle) -> Result<(), PageError> {
        if !self.config.enabled {
            return Ok(());
        }

        let url = page.current_url().await?;
        let hide_logos = self.is_search_page(&url);
        page.call_function(
            REBRAND,
            vec![
                json!(self.config.replace),
                json!(self.config.with),
                json!(hide_logos),
                json!(self.config.logo_markers),
            ],
        )
        .await?;
        tracing::debug!("Applied branding to {}", url);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_url() {
        let branding = Branding::new(BrandingConfig::default());
        assert_eq!(
            branding.display_url("https://search.brave.com/search?q=rust"),
            "https://search.asta/search?q=rust"
        );
        assert_eq!(
            branding.display_url("https://example.com/"),
            "https://example.com/"
        );
    }

    #[test]
    fn test_disabled_branding_is_transparent() {
        let branding = Branding::new(BrandingConfig {
            enabled: false,
            ..BrandingConfig::default()
        });
        assert_eq!(
            branding.display_url("https://search.brave.com/"),
            "https://search.brave.com/"
        );
        assert!(!branding.is_logo_request("https://cdn.search.brave.com/brave-logo.svg"));
    }

    #[test]
    fn test_logo_request_detection() {
        let branding = Branding::new(BrandingConfig::default());
        assert!(branding.is_logo_request("https://cdn.search.brave.com/brave-logo-light.svg"));
        assert!(!branding.is_logo_request("https://cdn.search.brave.com/favicon.ico"));
    }

    #[test]
    fn test_logo_url_patterns() {
        let branding = Branding::new(BrandingConfig {
            logo_markers: vec!["brave-logo".to_string(), String::new()],
            ..BrandingConfig::default()
        });
        assert_eq!(branding.logo_url_patterns(), vec!["*brave-logo*".to_string()]);

        let disabled = Branding::new(BrandingConfig {
            enabled: false,
            ..BrandingConfig::default()
        });
        assert!(disabled.logo_url_patterns().is_empty());
    }
}
