//! Construction-time rewrites of element lists.
//!
//! [`rewrite_cached`] starts a pipeline from its last filled cache.
//! [`merge_heads`] shares the common head of several pipelines and fans out
//! where they diverge.

mod cache;
mod merge;

pub use cache::{rewrite_cached, CacheReplay, Rewritten};
pub use merge::{merge_heads, MergeHeads};
