//! kairos-report: text and CSV renderings of an analysis report and of a
//! consolidated multi-assessment report.

pub mod csv;
pub mod text;

pub use csv::{
    generate_csv_report, write_consolidated_csv_tables, write_csv_report, write_csv_tables,
};
pub use text::{
    generate_consolidated_text, generate_text, write_consolidated_text, write_text_report,
};
