pub mod membership;
pub mod query_cache;
pub mod reconciler;

pub use membership::{MEMBERSHIP_KEY, MembershipIndex};
pub use query_cache::{CacheKey, QueryCache};
pub use reconciler::{CacheEvent, CacheReconciler};
