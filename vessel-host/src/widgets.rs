//! Base widget library
//!
//! Every published component can use these widgets without declaring them.
//! Script-provided `components` with the same name take precedence.

use crate::executor::ScriptValue;
use std::collections::BTreeMap;
use std::fmt;

pub const BASE_WIDGETS: &[&str] = &[
    "VBtn",
    "VAlert",
    "VApp",
    "VToolbar",
    "VToolbarItems",
    "VAutocomplete",
    "VCombobox",
    "VSwitch",
    "VTextField",
    "VWindow",
    "VTooltip",
];

/// A component usable from a template
#[derive(Clone)]
pub enum ComponentRef {
    /// Provided by the host's widget library
    Base(&'static str),

    /// Declared by the component's own script
    Script(ScriptValue),
}

impl ComponentRef {
    pub fn is_base(&self) -> bool {
        matches!(self, Self::Base(_))
    }
}

impl fmt::Debug for ComponentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Base(name) => f.debug_tuple("Base").field(name).finish(),
            Self::Script(_) => f.write_str("Script(..)"),
        }
    }
}

pub fn base_widget_library() -> BTreeMap<String, ComponentRef> {
    BASE_WIDGETS
        .iter()
        .map(|name| (name.to_string(), ComponentRef::Base(name)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_contains_every_widget() {
        let library = base_widget_library();
        assert_eq!(library.len(), BASE_WIDGETS.len());
        assert!(library.values().all(ComponentRef::is_base));
        assert!(library.contains_key("VTextField"));
    }
}
