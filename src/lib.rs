//! Tag alias resolution, hierarchy expansion and tag-filtered image queries
//! for an image board, plus the per-user activity feed.

pub mod alias;
pub mod config;
pub mod error;
pub mod hierarchy;
pub mod history;
pub mod model;
pub mod planner;
pub mod search;
pub mod store;

pub use alias::{resolve_alias, AliasResolution};
pub use error::{QueryError, Result};
pub use hierarchy::{expand_hierarchy, HierarchyCache};
pub use history::{get_user_history, HistoryItem, HistoryPage};
pub use planner::{
    plan_and_execute, ImagePage, ImageQuery, MatchMode, Pagination, SortDirection, SortField,
};
pub use search::{TagDetail, TagSearch, TagSearchRequest};
