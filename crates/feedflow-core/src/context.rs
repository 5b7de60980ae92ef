//! Opaque key/value bag attached to work items for log correlation.

use std::fmt;
use std::sync::Arc;

/// An ordered, append-only key/value bag carried alongside a work item.
///
/// The pipeline never interprets the contents; it only renders them into log
/// lines and events so that slow or stalled items can be correlated back to
/// the entity they belong to (a match id, a tournament id, a feed name).
///
/// Cloning is cheap: the entries are shared behind an `Arc`.
///
/// # Example
///
/// ```rust
/// use feedflow_core::LogContext;
///
/// let ctx = LogContext::new()
///     .with("match_id", "40291")
///     .with("feed", "live-odds");
/// assert_eq!(ctx.to_string(), "match_id=40291 feed=live-odds");
/// ```
#[derive(Clone, Debug, Default)]
pub struct LogContext {
    entries: Arc<Vec<(String, String)>>,
}

impl LogContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a new context with the given key/value pair appended.
    ///
    /// Duplicate keys are kept; the bag is opaque to the pipeline.
    pub fn with(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut entries = match Arc::try_unwrap(self.entries) {
            Ok(entries) => entries,
            Err(shared) => shared.as_ref().clone(),
        };
        entries.push((key.into(), value.into()));
        Self {
            entries: Arc::new(entries),
        }
    }

    /// Returns true if the context carries no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over the entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for LogContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{k}={v}")?;
        }
        Ok(())
    }
}
