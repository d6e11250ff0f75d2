mod distance;
mod error;
mod node;
mod query;
mod split;
mod tree;

pub use distance::{euclidean, CachedDistance};
pub use error::TreeError;
pub use query::{Query, QueryIter};
pub use split::{
    BalancedPartition, DefaultSplit, PartitionPolicy, PromotionPolicy, RandomPromotion, Split,
    SplitFunction, SplitPolicy,
};
pub use tree::{MTree, DEFAULT_MIN_CAPACITY};
