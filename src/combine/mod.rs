pub mod join;
pub mod union;

pub use join::{join_period, JoinOutcome, JOINED_SUFFIX};
pub use union::{union_tables, UnionOutcome, CORPUS_FILE};
