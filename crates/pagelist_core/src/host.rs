//! Seams to the wiki that hosts the page-list engine. The parsing core only
//! ever talks to these traits; `site::StaticSite` implements all of them.

use std::sync::atomic::{AtomicU8, Ordering};

use tracing::debug;

use crate::title::Title;

static VERBOSITY: AtomicU8 = AtomicU8::new(0);

pub trait TitleResolver {
    fn resolve_title(&self, text: &str) -> Option<Title>;
}

pub trait NamespaceResolver {
    fn namespace_index(&self, name: &str) -> Option<i32>;
}

pub trait SubcategorySource {
    /// Subcategory names of `category` down to `depth` levels (1 or 2).
    fn subcategories_of(&self, category: &str, depth: u8) -> Vec<String>;
}

pub trait TimestampNormalizer {
    /// Returns the 14-digit `YYYYMMDDHHMMSS` form, or `None` when unparsable.
    fn normalize_timestamp(&self, text: &str) -> Option<String>;
}

pub trait RequestContext {
    fn request_value(&self, key: &str, default: &str) -> String;
}

pub trait Capabilities {
    fn caller_has_capability(&self, name: &str) -> bool;
}

pub trait Diagnostics {
    fn set_verbosity(&self, level: u8);
}

/// Everything a directive invocation may consult, borrowed for its duration.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub titles: &'a dyn TitleResolver,
    pub namespaces: &'a dyn NamespaceResolver,
    pub subcategories: &'a dyn SubcategorySource,
    pub timestamps: &'a dyn TimestampNormalizer,
    pub request: &'a dyn RequestContext,
    pub capabilities: &'a dyn Capabilities,
    pub diagnostics: &'a dyn Diagnostics,
}

impl<'a> Collaborators<'a> {
    /// Borrow every seam from one host object.
    pub fn uniform<H>(host: &'a H) -> Self
    where
        H: TitleResolver
            + NamespaceResolver
            + SubcategorySource
            + TimestampNormalizer
            + RequestContext
            + Capabilities
            + Diagnostics,
    {
        Self {
            titles: host,
            namespaces: host,
            subcategories: host,
            timestamps: host,
            request: host,
            capabilities: host,
            diagnostics: host,
        }
    }

    pub fn with_diagnostics(self, diagnostics: &'a dyn Diagnostics) -> Self {
        Self {
            diagnostics,
            ..self
        }
    }
}

/// Process-wide verbosity set by the `debug` parameter.
pub fn verbosity() -> u8 {
    VERBOSITY.load(Ordering::Relaxed)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn set_verbosity(&self, level: u8) {
        let previous = VERBOSITY.swap(level, Ordering::Relaxed);
        if previous != level {
            debug!(level, previous, "page list verbosity changed");
        }
    }
}
