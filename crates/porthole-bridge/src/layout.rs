//! Element geometry for `getBoundingClientRects`.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;

use porthole_core::message::{MeasureRequest, MeasureResponse};
use porthole_core::{Rect, Viewport};

/// Source of element rectangles and the viewport size.
pub trait LayoutProbe {
    /// Bounding rectangle of the element with id `element_id`.
    fn bounding_rect(&self, element_id: &str) -> Option<Rect>;

    /// Current viewport size.
    fn viewport(&self) -> Viewport;
}

/// Measure every element in `request`. Elements that cannot be found are
/// left out of the response.
pub fn measure(probe: &dyn LayoutProbe, request: &MeasureRequest) -> MeasureResponse {
    let collect = |pairs: &[(Value, String)]| -> Vec<(Value, Rect)> {
        pairs
            .iter()
            .filter_map(|(token, element_id)| match probe.bounding_rect(element_id) {
                Some(rect) => Some((token.clone(), rect)),
                None => {
                    debug!(element_id = element_id.as_str(), "element not found, skipping");
                    None
                }
            })
            .collect()
    };
    MeasureResponse {
        id: request.id.clone(),
        beacons: collect(&request.beacons),
        anchors: collect(&request.anchors),
    }
}

/// Fixed geometry, set by hand.
#[derive(Debug, Default)]
pub struct StaticLayout {
    rects: RefCell<BTreeMap<String, Rect>>,
    viewport: Cell<Viewport>,
}

impl StaticLayout {
    #[must_use]
    pub fn new(viewport: Viewport) -> Self {
        Self {
            rects: RefCell::default(),
            viewport: Cell::new(viewport),
        }
    }

    pub fn place(&self, element_id: impl Into<String>, rect: Rect) {
        self.rects.borrow_mut().insert(element_id.into(), rect);
    }

    pub fn remove(&self, element_id: &str) {
        self.rects.borrow_mut().remove(element_id);
    }

    pub fn resize(&self, viewport: Viewport) {
        self.viewport.set(viewport);
    }
}

impl LayoutProbe for StaticLayout {
    fn bounding_rect(&self, element_id: &str) -> Option<Rect> {
        self.rects.borrow().get(element_id).copied()
    }

    fn viewport(&self) -> Viewport {
        self.viewport.get()
    }
}

/// Live DOM geometry of the current window.
#[cfg(feature = "web")]
#[derive(Debug, Default, Clone, Copy)]
pub struct DomLayout;

#[cfg(feature = "web")]
impl LayoutProbe for DomLayout {
    fn bounding_rect(&self, element_id: &str) -> Option<Rect> {
        use wasm_bindgen::JsCast;

        let element = web_sys::window()?
            .document()?
            .get_element_by_id(element_id)?;
        let bounds = element.get_bounding_client_rect();
        let (offset_left, offset_top) = element
            .dyn_ref::<web_sys::HtmlElement>()
            .map_or((0.0, 0.0), |html| {
                (f64::from(html.offset_left()), f64::from(html.offset_top()))
            });
        Some(Rect {
            x: bounds.x(),
            y: bounds.y(),
            width: bounds.width(),
            height: bounds.height(),
            offset_left,
            offset_top,
        })
    }

    fn viewport(&self) -> Viewport {
        let Some(window) = web_sys::window() else {
            return Viewport::default();
        };
        let dimension = |v: Result<wasm_bindgen::JsValue, wasm_bindgen::JsValue>| {
            v.ok().and_then(|v| v.as_f64()).unwrap_or(0.0)
        };
        Viewport {
            width: dimension(window.inner_width()),
            height: dimension(window.inner_height()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn rect(x: f64) -> Rect {
        Rect {
            x,
            y: 2.0,
            width: 10.0,
            height: 4.0,
            offset_left: x,
            offset_top: 2.0,
        }
    }

    #[test]
    fn measure_keeps_tokens_and_skips_missing_elements() {
        let layout = StaticLayout::new(Viewport {
            width: 800.0,
            height: 600.0,
        });
        layout.place("todo-1", rect(1.0));
        layout.place("menu", rect(5.0));

        let request = MeasureRequest {
            id: "popup".into(),
            beacons: vec![(json!(["todo", 1]), "todo-1".into()), (json!(2), "gone".into())],
            anchors: vec![(json!("a"), "menu".into())],
        };
        let response = measure(&layout, &request);

        assert_eq!(
            response,
            MeasureResponse {
                id: "popup".into(),
                beacons: vec![(json!(["todo", 1]), rect(1.0))],
                anchors: vec![(json!("a"), rect(5.0))],
            }
        );
    }

    #[test]
    fn static_layout_tracks_changes() {
        let layout = StaticLayout::default();
        layout.place("x", rect(0.0));
        layout.remove("x");
        assert_eq!(layout.bounding_rect("x"), None);
        layout.resize(Viewport {
            width: 10.0,
            height: 20.0,
        });
        assert_eq!(layout.viewport().height, 20.0);
    }
}
