use regex::Regex;

/// Replacement title when host commentary hides the real category name.
pub const UNKNOWN_TITLE: &str = "UNKNOWN";

/// Recovers category titles polluted by host commentary, e.g.
/// `(Alex: We'll give you the category "SPACE") ...` becomes `SPACE`.
#[derive(Debug, Clone)]
pub struct TitleCleaner {
    quoted: Regex,
    called: Regex,
}

impl TitleCleaner {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            quoted: Regex::new(r#""([^"]+)""#)?,
            called: Regex::new(r"category\s+(?:called|named)\s+([A-Z]+)")?,
        })
    }

    /// Returns the cleaned title. Titles without commentary come back unchanged.
    pub fn clean<'a>(&self, title: &'a str) -> std::borrow::Cow<'a, str> {
        use std::borrow::Cow;

        if title.trim().is_empty() {
            return Cow::Borrowed(UNKNOWN_TITLE);
        }
        if !title.contains("Alex:") {
            return Cow::Borrowed(title);
        }
        for re in [&self.quoted, &self.called] {
            if let Some(m) = re.captures(title).and_then(|c| c.get(1)) {
                return Cow::Owned(m.as_str().to_string());
            }
        }
        Cow::Borrowed(UNKNOWN_TITLE)
    }
}
