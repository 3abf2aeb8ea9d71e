//! Error and style sinks
//!
//! The runtime never surfaces file-local failures to its caller. They are
//! handed to an [`ErrorSink`] and loading carries on. Stylesheets declared by
//! components go to a [`StyleSink`], which hands back the disposable that
//! removes them again.

use crate::error::ExtensionError;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;
use vessel_api::{Disposable, DisposeFn, ExtensionId};

/// Receives errors reported while loading an extension
pub trait ErrorSink {
    fn report(&self, extension: &ExtensionId, error: &ExtensionError);
}

/// Logs every report through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn report(&self, extension: &ExtensionId, error: &ExtensionError) {
        tracing::error!(
            extension = %extension,
            path = error.path().unwrap_or("-"),
            error = %error,
            "Extension error"
        );
    }
}

/// One report kept by [`RecordingErrorSink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportedError {
    pub extension: ExtensionId,
    pub path: Option<String>,
    pub message: String,
}

/// Keeps every report in memory, in arrival order
#[derive(Debug, Clone, Default)]
pub struct RecordingErrorSink {
    reports: Rc<RefCell<Vec<ReportedError>>>,
}

impl RecordingErrorSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<ReportedError> {
        self.reports.borrow().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.reports
            .borrow()
            .iter()
            .map(|report| report.message.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.reports.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.reports.borrow_mut().clear();
    }
}

impl ErrorSink for RecordingErrorSink {
    fn report(&self, extension: &ExtensionId, error: &ExtensionError) {
        tracing::debug!(extension = %extension, error = %error, "Recorded extension error");
        self.reports.borrow_mut().push(ReportedError {
            extension: extension.clone(),
            path: error.path().map(str::to_string),
            message: error.to_string(),
        });
    }
}

/// Accepts stylesheet text on behalf of an extension
pub trait StyleSink {
    /// Inject `css`; disposing the returned handle removes it
    fn inject(&self, extension: &ExtensionId, css: &str) -> Box<dyn Disposable>;
}

/// A stylesheet held by [`MemoryStyleSink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectedStyle {
    pub id: u64,
    pub extension: ExtensionId,
    pub css: String,
}

/// Keeps injected stylesheets in memory until their disposable runs
#[derive(Debug, Clone, Default)]
pub struct MemoryStyleSink {
    sheets: Rc<RefCell<BTreeMap<u64, InjectedStyle>>>,
    next_id: Rc<Cell<u64>>,
}

impl MemoryStyleSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live stylesheets in injection order
    pub fn sheets(&self) -> Vec<InjectedStyle> {
        self.sheets.borrow().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sheets.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sheets.borrow().is_empty()
    }
}

impl StyleSink for MemoryStyleSink {
    fn inject(&self, extension: &ExtensionId, css: &str) -> Box<dyn Disposable> {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.sheets.borrow_mut().insert(
            id,
            InjectedStyle {
                id,
                extension: extension.clone(),
                css: css.to_string(),
            },
        );
        tracing::debug!(extension = %extension, id, bytes = css.len(), "Injected stylesheet");

        let sheets = Rc::clone(&self.sheets);
        Box::new(DisposeFn::new(move || {
            sheets.borrow_mut().remove(&id);
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_sink_keeps_order() {
        let sink = RecordingErrorSink::new();
        let ext = ExtensionId::new("ext");
        for file in ["a.txt", "b.txt"] {
            sink.report(
                &ext,
                &ExtensionError::NotAComponentFile {
                    path: format!("ui/{file}"),
                    file: file.to_string(),
                },
            );
        }

        let reports = sink.reports();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].path.as_deref(), Some("ui/a.txt"));
        assert!(reports[1].message.contains("\"b.txt\""));
    }

    #[test]
    fn test_style_disposal_removes_sheet() {
        let sink = MemoryStyleSink::new();
        let ext = ExtensionId::new("ext");
        let mut first = sink.inject(&ext, ".a {}");
        let _second = sink.inject(&ext, ".b {}");
        assert_eq!(sink.len(), 2);

        first.dispose();
        let sheets = sink.sheets();
        assert_eq!(sheets.len(), 1);
        assert_eq!(sheets[0].css, ".b {}");
    }
}
