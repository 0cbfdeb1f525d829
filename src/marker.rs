//! Data markers embed a settled value into the rendered markup, right
//! next to the subtree it belongs to, such that the loader of the same
//! name on the client may pick it up instead of loading it again.
//!
//! A marker is rendered as a JSON script element:
//!
//! ```html
//! <script type="application/json" id="__NEXT_DATA__STREAM__list">{"value":[1,2,3]}</script>
//! ```

use std::{
    collections::HashMap,
    sync::{Arc, OnceLock},
};

use leptos::prelude::*;
use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::MarkerError;

pub const MARKER_ID_PREFIX: &str = "__NEXT_DATA__STREAM__";

/// The element id of the marker for `name`.
pub fn marker_id(name: &str) -> String {
    format!("{MARKER_ID_PREFIX}{name}")
}

fn script_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // any script element carrying an id, with the body up to the
        // closing tag; markers never contain a literal `<`
        Regex::new(r#"(?s)<script\b[^>]*?\bid="([^"]*)"[^>]*>(.*?)</script>"#)
            .expect("marker pattern is valid")
    })
}

#[derive(Serialize, Deserialize)]
struct Body {
    value: Value,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DataMarker {
    name: String,
    value: Value,
}

impl DataMarker {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn id(&self) -> String {
        marker_id(&self.name)
    }

    /// The JSON body of the script element, with every `<` escaped such
    /// that the body cannot close the element early.
    pub fn body(&self) -> String {
        serde_json::to_string(&Body {
            value: self.value.clone(),
        })
        // serializing a `Value` into a string cannot fail
        .unwrap_or_default()
        .replace('<', "\\u003c")
    }

    pub fn view(self) -> impl IntoView {
        view! { <script type="application/json" id=self.id() inner_html=self.body()></script> }
    }

    pub fn to_html(&self) -> String {
        self.clone().view().to_html()
    }

    /// Rebuild a marker from its element id and body.
    pub fn parse(id: &str, body: &str) -> Result<Self, MarkerError> {
        let name = id
            .strip_prefix(MARKER_ID_PREFIX)
            .ok_or_else(|| MarkerError::NotAMarker { id: id.to_string() })?;
        let body: Body = serde_json::from_str(body).map_err(|source| MarkerError::Body {
            name: name.to_string(),
            source,
        })?;
        Ok(Self::new(name, body.value))
    }
}

/// The markers found in a document, each of which may be taken once.
#[derive(Clone, Debug, Default)]
pub struct MarkerSet {
    inner: Arc<Mutex<HashMap<String, Value>>>,
}

impl MarkerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect every data marker in `html`.  Malformed markers are
    /// skipped.
    pub fn from_html(html: &str) -> Self {
        let markers = Self::new();
        for captures in script_pattern().captures_iter(html) {
            let id = unescape_attr(&captures[1]);
            match DataMarker::parse(&id, &captures[2]) {
                Ok(marker) => markers.insert(marker),
                Err(MarkerError::NotAMarker { .. }) => {}
                Err(error) => tracing::warn!(%id, %error, "skipping malformed data marker"),
            }
        }
        markers
    }

    pub fn insert(&self, marker: DataMarker) {
        self.inner.lock().insert(marker.name, marker.value);
    }

    /// Consume the marker for `name`.
    pub fn take(&self, name: &str) -> Option<Value> {
        self.inner.lock().remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.lock().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

// reverses the attribute escaping applied by the renderer
fn unescape_attr(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn render_escapes_script_close() {
        let marker = DataMarker::new("note", json!("</script><b>"));
        let html = marker.to_html();
        assert_eq!(html.matches("</script>").count(), 1);
        assert!(html.starts_with(r#"<script type="application/json" id="__NEXT_DATA__STREAM__note">"#));
        assert!(html.contains(r#"{"value":"\u003c/script>\u003cb>"}"#));
    }

    #[test]
    fn collect_from_document() {
        let list = DataMarker::new("list", json!([1, 2, 3]));
        let quoted = DataMarker::new("say \"hi\"", json!({ "text": "</script>" }));
        let html = format!(
            "<p>before</p>{}<script type=\"application/json\" id=\"other\">{{}}</script>{}<p>after</p>",
            list.to_html(),
            quoted.to_html(),
        );
        let markers = MarkerSet::from_html(&html);
        assert_eq!(markers.len(), 2);
        assert_eq!(markers.take("list"), Some(json!([1, 2, 3])));
        assert_eq!(markers.take("say \"hi\""), Some(json!({ "text": "</script>" })));
        // consumed at most once
        assert_eq!(markers.take("list"), None);
    }

    #[test]
    fn attribute_order_does_not_matter() {
        let html = format!(
            "<script id=\"{}late\" type=\"application/json\">{{\"value\":1}}</script>",
            MARKER_ID_PREFIX,
        );
        assert_eq!(MarkerSet::from_html(&html).take("late"), Some(json!(1)));
    }

    #[test]
    fn skip_malformed_body() {
        let html = format!(
            "<script type=\"application/json\" id=\"{}broken\">{{not json</script>",
            MARKER_ID_PREFIX,
        );
        assert!(MarkerSet::from_html(&html).is_empty());
        assert!(matches!(
            DataMarker::parse(&marker_id("broken"), "{not json"),
            Err(MarkerError::Body { .. }),
        ));
    }
}
