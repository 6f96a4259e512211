use super::types::Element;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Site {
    pub element: Element,
    pub position: [f64; 3],
}

impl Site {
    pub fn new(element: Element, position: [f64; 3]) -> Self {
        Self { element, position }
    }
}
