//! Collection orchestration: fan out to every source, merge the partial
//! results into one snapshot.

mod dynamic;
mod static_facts;

pub use dynamic::{DynamicCollector, InstantQueries};
pub use static_facts::StaticCollector;
