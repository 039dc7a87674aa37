//! kairos-core: IRT-style response analysis engine.
//!
//! Turns an answer key and a roster of multiple-choice answers into ability
//! estimates, item parameters, a reliability figure and a ranked list of peer
//! tutors. Results can be persisted as a JSON export bundle and several
//! bundles can be aggregated and compared.
//!
//! ```no_run
//! use kairos_core::model::{AnswerKey, Roster, StudentAnswers};
//!
//! let key = AnswerKey::from_letters("ABCC")?;
//! let roster = Roster::new(vec![
//!     StudentAnswers::new("S1", ["A", "B", "C", "C"]),
//!     StudentAnswers::new("S2", ["A", "A", "A", "A"]),
//! ]);
//! let report = kairos_core::analyze(&key, &roster)?;
//! report.to_bundle().save_json("dados_tri.json".as_ref())?;
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod ability;
pub mod aggregate;
pub mod config;
pub mod engine;
pub mod error;
pub mod items;
pub mod matrix;
pub mod model;
pub mod parser;
pub mod reliability;
pub mod report;
pub mod statistics;
pub mod traits;
pub mod tutors;

pub use engine::{analyze, Analyzer, Estimation};
pub use error::{AnalysisError, DegenerateInput};
pub use report::{AnalysisReport, ExportBundle};
pub use statistics::Estimate;
