//! Request-level entry points.
//!
//! Each call runs in its own read transaction, so alias resolution, hierarchy
//! expansion and the image query all see the same data.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use sea_orm::{ConnectionTrait, DatabaseConnection, TransactionTrait};
use serde::Serialize;

use crate::alias::resolve_alias;
use crate::error::{QueryError, Result};
use crate::hierarchy::HierarchyCache;
use crate::history::{self, HistoryPage};
use crate::model::tag;
use crate::planner::{
    self, ImagePage, ImageQuery, MatchMode, Pagination, SortDirection, SortField,
};
use crate::store::{self, TagSummary};

/// Everything about one tag that a detail view needs.
#[derive(Clone, Debug, Serialize)]
pub struct TagDetail {
    pub requested_id: i32,
    /// Set when `requested_id` was an alias and the detail is of its target.
    pub redirected: bool,
    pub tag: tag::Model,
    pub aliases: Vec<TagSummary>,
    pub parent: Option<TagSummary>,
    pub children: Vec<TagSummary>,
    pub hierarchy: BTreeSet<i32>,
    /// Distinct images linked anywhere in `hierarchy`.
    pub image_count: u64,
}

/// A multi-tag image search as requested, before any resolution.
#[derive(Clone, Debug, Default)]
pub struct TagSearchRequest {
    pub tag_ids: Vec<i32>,
    pub mode: MatchMode,
    pub sort: SortField,
    pub direction: SortDirection,
    pub page: Pagination,
}

pub struct TagSearch {
    db: DatabaseConnection,
    hierarchy: HierarchyCache,
}

impl TagSearch {
    pub fn new(db: DatabaseConnection, hierarchy_cache_ttl: Duration) -> Self {
        if !hierarchy_cache_ttl.is_zero() {
            info!("Hierarchy cache enabled, entries live for {hierarchy_cache_ttl:?}");
        }
        Self {
            db,
            hierarchy: HierarchyCache::new(hierarchy_cache_ttl),
        }
    }

    pub fn hierarchy_cache(&self) -> &HierarchyCache {
        &self.hierarchy
    }

    /// Resolves `tag_id` and expands its hierarchy. `None` if the tag is
    /// unknown or is an alias of a tag that no longer exists.
    async fn tag_group<C: ConnectionTrait>(
        &self,
        db: &C,
        tag_id: i32,
    ) -> Result<Option<Arc<BTreeSet<i32>>>> {
        let resolution = resolve_alias(db, tag_id).await?;
        if !resolution.found {
            return Ok(None);
        }
        if resolution.was_alias(tag_id)
            && store::find_tag(db, resolution.canonical_id).await?.is_none()
        {
            debug!("Tag {tag_id} aliases missing tag {}", resolution.canonical_id);
            return Ok(None);
        }
        let group = self.hierarchy.expand(db, resolution.canonical_id).await?;
        Ok(Some(group))
    }

    pub async fn tag_detail(&self, tag_id: i32) -> Result<TagDetail> {
        let txn = self.db.begin().await?;

        let resolution = resolve_alias(&txn, tag_id).await?;
        let tag = if resolution.found {
            store::find_tag(&txn, resolution.canonical_id).await?
        } else {
            None
        };
        // an alias pointing at a deleted tag is as good as unknown
        let tag = tag.ok_or(QueryError::TagNotFound(tag_id))?;

        let hierarchy = self.hierarchy.expand(&txn, tag.id).await?;
        let image_count = planner::count_images(
            &txn,
            &ImageQuery {
                groups: vec![(*hierarchy).clone()],
                ..Default::default()
            },
        )
        .await?;

        let parent = match tag.inherited_from {
            Some(parent_id) => store::find_tag(&txn, parent_id).await?.map(TagSummary::from),
            None => None,
        };
        let aliases = store::aliases(&txn, tag.id).await?;
        let children = store::children(&txn, tag.id).await?;

        txn.commit().await?;

        Ok(TagDetail {
            requested_id: tag_id,
            redirected: resolution.was_alias(tag_id),
            tag,
            aliases,
            parent,
            children,
            hierarchy: (*hierarchy).clone(),
            image_count,
        })
    }

    /// Images tagged with `tag_id` or any of its descendants. Unlike
    /// [`search_images`](Self::search_images), an unknown tag is an error.
    pub async fn images_for_tag(
        &self,
        tag_id: i32,
        sort: SortField,
        direction: SortDirection,
        page: Pagination,
    ) -> Result<ImagePage> {
        let txn = self.db.begin().await?;

        let group = self
            .tag_group(&txn, tag_id)
            .await?
            .ok_or(QueryError::TagNotFound(tag_id))?;
        let query = ImageQuery {
            groups: vec![(*group).clone()],
            mode: MatchMode::Any,
            sort,
            direction,
            page,
        };
        let result = planner::plan_and_execute(&txn, &query).await?;

        txn.commit().await?;
        Ok(result)
    }

    /// Images matching the requested tags. Unknown tags never match; with
    /// [`MatchMode::All`] one unknown tag empties the result.
    pub async fn search_images(&self, request: &TagSearchRequest) -> Result<ImagePage> {
        let txn = self.db.begin().await?;

        let mut groups = Vec::with_capacity(request.tag_ids.len());
        for &tag_id in &request.tag_ids {
            match self.tag_group(&txn, tag_id).await? {
                Some(group) => groups.push((*group).clone()),
                None => {
                    debug!("Requested tag {tag_id} does not exist");
                    groups.push(BTreeSet::new());
                }
            }
        }

        let query = ImageQuery {
            groups,
            mode: request.mode,
            sort: request.sort,
            direction: request.direction,
            page: request.page,
        };
        let result = planner::plan_and_execute(&txn, &query).await?;

        txn.commit().await?;
        Ok(result)
    }

    pub async fn user_history(&self, user_id: i32, page: Pagination) -> Result<HistoryPage> {
        let txn = self.db.begin().await?;
        let result = history::get_user_history(&txn, user_id, page).await?;
        txn.commit().await?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::*;

    /// swimsuit(1) <- school swimsuit(2) <- old school swimsuit(3),
    /// mizugi(4) aliases swimsuit, hat(5) stands alone.
    async fn board() -> TagSearch {
        let db = setup_db().await;
        insert_tag(&db, 1, "swimsuit", None, None).await;
        insert_tag(&db, 2, "school swimsuit", None, Some(1)).await;
        insert_tag(&db, 3, "old school swimsuit", None, Some(2)).await;
        insert_tag(&db, 4, "mizugi", Some(1), None).await;
        insert_tag(&db, 5, "hat", None, None).await;
        for id in 10..=13 {
            insert_image(&db, id, 0.0, 0).await;
        }
        link(&db, 1, 10).await;
        link(&db, 3, 11).await;
        link(&db, 3, 12).await;
        link(&db, 5, 12).await;
        link(&db, 5, 13).await;
        TagSearch::new(db, Duration::ZERO)
    }

    #[tokio::test]
    async fn alias_detail_redirects_to_canonical_tag() {
        let search = board().await;
        let detail = search.tag_detail(4).await.unwrap();

        assert!(detail.redirected);
        assert_eq!(detail.tag.id, 1);
        assert_eq!(detail.hierarchy, BTreeSet::from([1, 2, 3]));
        assert_eq!(detail.image_count, 3);
        assert_eq!(detail.aliases.len(), 1);
        assert_eq!(detail.children.iter().map(|c| c.id).collect::<Vec<_>>(), vec![2]);
        assert!(detail.parent.is_none());
    }

    #[tokio::test]
    async fn detail_of_unknown_tag_is_not_found() {
        let search = board().await;
        let err = search.tag_detail(99).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn single_tag_listing_includes_descendants() {
        let search = board().await;
        let page = search
            .images_for_tag(2, SortField::Id, SortDirection::Asc, Pagination::default())
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.image_ids(), vec![11, 12]);

        let err = search
            .images_for_tag(99, SortField::Id, SortDirection::Asc, Pagination::default())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn alias_of_deleted_tag_is_not_found_everywhere() {
        let search = board().await;
        insert_tag(&search.db, 6, "dangling", Some(404), None).await;
        link(&search.db, 6, 13).await;

        assert!(search.tag_detail(6).await.unwrap_err().is_not_found());
        let err = search
            .images_for_tag(6, SortField::Id, SortDirection::Asc, Pagination::default())
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let request = TagSearchRequest {
            tag_ids: vec![6],
            ..Default::default()
        };
        assert_eq!(search.search_images(&request).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn search_resolves_each_requested_tag_separately() {
        let search = board().await;
        let mut request = TagSearchRequest {
            tag_ids: vec![4, 5],
            mode: MatchMode::All,
            direction: SortDirection::Asc,
            ..Default::default()
        };
        let all = search.search_images(&request).await.unwrap();
        assert_eq!(all.image_ids(), vec![12]);

        request.mode = MatchMode::Any;
        let any = search.search_images(&request).await.unwrap();
        assert_eq!(any.image_ids(), vec![10, 11, 12, 13]);

        request.tag_ids.push(99);
        assert_eq!(search.search_images(&request).await.unwrap().total, 4);

        request.mode = MatchMode::All;
        let all = search.search_images(&request).await.unwrap();
        assert_eq!(all.total, 0);
    }

    #[tokio::test]
    async fn empty_request_lists_everything() {
        let search = board().await;
        let page = search
            .search_images(&TagSearchRequest::default())
            .await
            .unwrap();
        assert_eq!(page.total, 4);
    }
}
