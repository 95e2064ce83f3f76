//! Locators: opaque selectors resolved by the remote session.
//!
//! A [`Selector`] never touches the UI itself. It is handed to a
//! [`crate::driver::SearchContext`], which returns the current matches.

use crate::result::{EsperarError, EsperarResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pixel position of an element's top-left corner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Point {
    /// X coordinate
    pub x: i32,
    /// Y coordinate
    pub y: i32,
}

impl Point {
    /// Create a new point
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Absolute displacement to `other` on each axis
    #[must_use]
    pub const fn displacement(&self, other: &Self) -> (u32, u32) {
        (self.x.abs_diff(other.x), self.y.abs_diff(other.y))
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Selector type for locating elements
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "by", content = "value", rename_all = "snake_case")]
pub enum Selector {
    /// CSS selector (e.g., "button.primary")
    Css(String),
    /// XPath selector
    XPath(String),
    /// Element id attribute
    Id(String),
    /// Element name attribute
    Name(String),
    /// Single class name
    ClassName(String),
    /// Tag name
    TagName(String),
    /// Exact link text
    LinkText(String),
    /// Mobile accessibility identifier
    AccessibilityId(String),
    /// Rendered text content
    Text(String),
}

impl Selector {
    /// Create a CSS selector
    #[must_use]
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    /// Create an XPath selector
    #[must_use]
    pub fn xpath(expression: impl Into<String>) -> Self {
        Self::XPath(expression.into())
    }

    /// Create an id selector
    #[must_use]
    pub fn id(id: impl Into<String>) -> Self {
        Self::Id(id.into())
    }

    /// Create a name selector
    #[must_use]
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    /// Create a text selector
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Create an accessibility id selector
    #[must_use]
    pub fn accessibility_id(id: impl Into<String>) -> Self {
        Self::AccessibilityId(id.into())
    }

    /// Strategy name as understood by WebDriver-style back ends
    #[must_use]
    pub const fn strategy(&self) -> &'static str {
        match self {
            Self::Css(_) => "css",
            Self::XPath(_) => "xpath",
            Self::Id(_) => "id",
            Self::Name(_) => "name",
            Self::ClassName(_) => "class",
            Self::TagName(_) => "tag",
            Self::LinkText(_) => "link",
            Self::AccessibilityId(_) => "accessibility_id",
            Self::Text(_) => "text",
        }
    }

    /// Raw selector value
    #[must_use]
    pub fn value(&self) -> &str {
        match self {
            Self::Css(v)
            | Self::XPath(v)
            | Self::Id(v)
            | Self::Name(v)
            | Self::ClassName(v)
            | Self::TagName(v)
            | Self::LinkText(v)
            | Self::AccessibilityId(v)
            | Self::Text(v) => v,
        }
    }

    /// Reject selectors no back end can evaluate
    ///
    /// # Errors
    ///
    /// Returns [`EsperarError::InvalidLocator`] for an empty value or a
    /// class name containing whitespace.
    pub fn validate(&self) -> EsperarResult<()> {
        if self.value().trim().is_empty() {
            return Err(EsperarError::InvalidLocator {
                locator: self.to_string(),
                message: "selector value is empty".to_string(),
            });
        }
        if let Self::ClassName(class) = self {
            if class.split_whitespace().count() > 1 {
                return Err(EsperarError::InvalidLocator {
                    locator: self.to_string(),
                    message: "compound class names are not permitted".to_string(),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.strategy(), self.value())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    mod point_tests {
        use super::*;

        #[test]
        fn test_displacement_is_absolute() {
            let a = Point::new(10, 4);
            let b = Point::new(7, 9);
            assert_eq!(a.displacement(&b), (3, 5));
            assert_eq!(b.displacement(&a), (3, 5));
        }

        #[test]
        fn test_display() {
            assert_eq!(Point::new(-2, 8).to_string(), "(-2, 8)");
        }
    }

    mod selector_tests {
        use super::*;

        #[test]
        fn test_display_includes_strategy() {
            assert_eq!(Selector::css("#login").to_string(), "css=#login");
            assert_eq!(Selector::xpath("//a").to_string(), "xpath=//a");
            assert_eq!(
                Selector::accessibility_id("submit").to_string(),
                "accessibility_id=submit"
            );
        }

        #[test]
        fn test_validate_rejects_empty() {
            let err = Selector::css("  ").validate().unwrap_err();
            assert!(err.is_fatal());
        }

        #[test]
        fn test_validate_rejects_compound_class() {
            assert!(Selector::ClassName("btn primary".into()).validate().is_err());
            assert!(Selector::ClassName("btn".into()).validate().is_ok());
        }

        #[test]
        fn test_serde_shape() {
            let json = serde_json::to_string(&Selector::id("user")).unwrap();
            assert_eq!(json, r#"{"by":"id","value":"user"}"#);
            let back: Selector = serde_json::from_str(&json).unwrap();
            assert_eq!(back, Selector::id("user"));
        }
    }
}
