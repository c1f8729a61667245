//! Summary artifacts: the map-reduce summary, its mind-map structure, and the
//! exercise workbook derived from it.

pub mod mindmap;
pub mod summarizer;
pub mod workbook;

pub use mindmap::{layout, parse_structure, MindMap, NodeKind, NodePlacement, Theme};
pub use summarizer::{FinalSummary, SummaryError, Summarizer};
pub use workbook::{generate_workbook, Workbook};
