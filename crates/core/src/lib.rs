//! Repair EPUB archives whose internal file names were replaced by
//! percent-encoded strings.
//!
//! The [`pipeline::Pipeline`] maps obfuscated names back to canonical ones
//! using the package manifest, renames entries, rewrites references, drops
//! the encryption descriptor, repairs TOC links through chapter headings and
//! finally audits what is left unresolved.

pub mod archive;
pub mod audit;
pub mod classify;
pub mod config;
pub mod encryption;
pub mod error;
pub mod layout;
pub mod manifest;
pub mod output;
pub mod pipeline;
pub mod rename;
pub mod report;
pub mod rewrite;
pub mod security;
pub mod toc;
pub mod token;
pub mod xml;

pub mod prelude {
    pub use crate::archive::{Archive, ArchiveEntry};
    pub use crate::audit::{AuditReport, Severity};
    pub use crate::error::*;
    pub use crate::layout::Layout;
    pub use crate::manifest::ManifestMapping;
    pub use crate::pipeline::{fix_bytes, Pipeline, PipelineOutput};
    pub use crate::report::{Level, Reporter, Stage};
    pub use crate::toc::TocOutcome;
}
