use serde::{Deserialize, Serialize};
use url::Url;

/// Sender metadata reported by the transport, never by the message itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSender {
    /// Process-identity token of the sending context (the extension id for
    /// extension pages, the page's own id otherwise).
    pub id: String,
    /// Full URL of the sending document.
    pub url: String,
    /// Tab hosting the sender, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<u32>,
}

impl MessageSender {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            tab_id: None,
        }
    }

    pub fn with_tab(mut self, tab_id: u32) -> Self {
        self.tab_id = Some(tab_id);
        self
    }

    /// `scheme://host[:port]` of the sender URL, or `None` when the URL does
    /// not parse or has an opaque origin.
    pub fn origin(&self) -> Option<String> {
        let parsed = Url::parse(&self.url).ok()?;
        let host = parsed.host_str()?;
        Some(match parsed.port() {
            Some(port) => format!("{}://{}:{}", parsed.scheme(), host, port),
            None => format!("{}://{}", parsed.scheme(), host),
        })
    }
}
