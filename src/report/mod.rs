//! Report construction, export and summaries.

pub mod builder;
pub mod export;
pub mod summary;

pub use builder::{build_project_report, ReportOptions};
pub use export::{build_reports_archive, export_project_data, write_atomically};
pub use summary::write_summary;
