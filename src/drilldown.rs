use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A chart click event as the UI layer delivers it: the id of the chart that
/// fired it, plus the clicked points. Callbacks can fire for unrelated input
/// changes, so `source` is checked before the payload is trusted.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClickEvent {
    pub source: String,
    #[serde(default)]
    pub points: Vec<ClickPoint>,
}

/// One clicked chart element. `x` is a day index or category label, `y` the
/// bar height, `trace` the series name, and `rows` any detail records the
/// chart attached to the element when it was built.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClickPoint {
    #[serde(default)]
    pub x: Option<Value>,
    #[serde(default)]
    pub y: Option<f64>,
    #[serde(default)]
    pub trace: Option<String>,
    #[serde(default)]
    pub rows: Vec<Value>,
}

impl ClickEvent {
    pub fn parse(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    /// The first clicked point, if the event came from `expected_source` and
    /// actually carries a selection. Everything else is a no-op, not an
    /// error: stale events and foreign callbacks produce empty output.
    pub fn selection(&self, expected_source: &str) -> Option<&ClickPoint> {
        if self.source != expected_source {
            return None;
        }
        self.points.first()
    }
}

impl ClickPoint {
    /// The clicked day index / category as a display string.
    pub fn x_label(&self) -> Option<String> {
        match &self.x {
            Some(Value::Number(n)) => {
                if let Some(i) = n.as_i64() {
                    Some(i.to_string())
                } else {
                    n.as_f64().map(|f| f.to_string())
                }
            }
            Some(Value::String(s)) => {
                // Date pickers and numeric axes both arrive as strings at
                // times; collapse integral floats ("3.0" → "3").
                match s.parse::<f64>() {
                    Ok(f) if f.fract() == 0.0 => Some(format!("{}", f as i64)),
                    _ => Some(s.clone()),
                }
            }
            _ => None,
        }
    }

    /// Whether the clicked bar had value zero (nothing to drill into).
    pub fn is_zero(&self) -> bool {
        matches!(self.y, Some(y) if y == 0.0)
    }
}

/// The outcome of resolving a click: detail rows for the companion table and
/// a human-readable heading. Recomputed on every click, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct ClickSelection<R> {
    pub rows: Vec<R>,
    pub heading: String,
}

impl<R> ClickSelection<R> {
    pub fn empty() -> Self {
        Self {
            rows: Vec::new(),
            heading: String::new(),
        }
    }

    pub fn new(rows: Vec<R>, heading: impl Into<String>) -> Self {
        Self {
            rows,
            heading: heading.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_click_event() {
        let raw = r#"{
            "source": "home-errors-graph",
            "points": [{"x": 3, "y": 12.0, "trace": "failures", "rows": []}]
        }"#;
        let ev = ClickEvent::parse(raw).unwrap();
        assert_eq!(ev.source, "home-errors-graph");
        assert_eq!(ev.points.len(), 1);
        assert_eq!(ev.points[0].y, Some(12.0));
    }

    #[test]
    fn test_selection_empty_points_is_no_selection() {
        let ev = ClickEvent {
            source: "home-errors-graph".into(),
            points: vec![],
        };
        assert!(ev.selection("home-errors-graph").is_none());
    }

    #[test]
    fn test_selection_foreign_source_is_no_op() {
        let ev = ClickEvent {
            source: "some-other-graph".into(),
            points: vec![ClickPoint {
                x: Some(json!(1)),
                y: Some(5.0),
                trace: Some("VR".into()),
                rows: vec![],
            }],
        };
        assert!(ev.selection("home-errors-graph").is_none());
    }

    #[test]
    fn test_x_label_variants() {
        let p = |x: Value| ClickPoint {
            x: Some(x),
            y: None,
            trace: None,
            rows: vec![],
        };
        assert_eq!(p(json!(7)).x_label().as_deref(), Some("7"));
        assert_eq!(p(json!(7.0)).x_label().as_deref(), Some("7"));
        assert_eq!(p(json!("3.0")).x_label().as_deref(), Some("3"));
        assert_eq!(p(json!("2024-01-05")).x_label().as_deref(), Some("2024-01-05"));

        let none = ClickPoint {
            x: None,
            y: None,
            trace: None,
            rows: vec![],
        };
        assert!(none.x_label().is_none());
    }

    #[test]
    fn test_is_zero() {
        let p = ClickPoint {
            x: None,
            y: Some(0.0),
            trace: None,
            rows: vec![],
        };
        assert!(p.is_zero());
        let q = ClickPoint { y: Some(2.0), ..p.clone() };
        assert!(!q.is_zero());
        let r = ClickPoint { y: None, ..p };
        assert!(!r.is_zero());
    }
}
