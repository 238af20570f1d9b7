//! Minimum spanning arborescences and their composite.

pub mod cmsa;
pub mod edmonds;
pub mod store;

pub use cmsa::{Cmsa, CmsaWeighting};
pub use edmonds::{find_msa, find_msa_in_matrix, Arborescence};
pub use store::CmsaStore;
