//! Two-stage image query over tag filters.
//!
//! Stage 1 works only on `tag_links` and yields image ids. Stage 2 hydrates
//! `images` rows for one page. The total is always counted on the stage-1
//! predicate, never on hydrated rows.

use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;

use itertools::Itertools;
use log::debug;
use sea_orm::sea_query::SelectStatement;
use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, EntityTrait, Order, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, QueryTrait, Select,
};
use serde::Serialize;

use crate::error::Result;
use crate::model::{image, tag_link};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum MatchMode {
    /// At least one requested tag (or a descendant) is linked.
    #[default]
    Any,
    /// Every requested tag has a link somewhere within its own hierarchy.
    All,
}

impl FromStr for MatchMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "any" => Ok(Self::Any),
            "all" => Ok(Self::All),
            other => Err(format!("unknown match mode `{other}`")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    Id,
    DateAdded,
    Rating,
    Favorites,
    Width,
    Height,
}

impl SortField {
    fn column(self) -> image::Column {
        match self {
            Self::Id => image::Column::Id,
            Self::DateAdded => image::Column::DateAdded,
            Self::Rating => image::Column::BayesianRating,
            Self::Favorites => image::Column::Favorites,
            Self::Width => image::Column::Width,
            Self::Height => image::Column::Height,
        }
    }
}

impl FromStr for SortField {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "id" | "image_id" => Ok(Self::Id),
            "date" | "date_added" => Ok(Self::DateAdded),
            "rating" | "bayesian_rating" => Ok(Self::Rating),
            "favorites" => Ok(Self::Favorites),
            "width" => Ok(Self::Width),
            "height" => Ok(Self::Height),
            other => Err(format!("unknown sort field `{other}`")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    fn order(self) -> Order {
        match self {
            Self::Asc => Order::Asc,
            Self::Desc => Order::Desc,
        }
    }
}

impl FromStr for SortDirection {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(format!("unknown sort direction `{other}`")),
        }
    }
}

/// 1-based page window. Callers validate that both numbers are positive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pagination {
    pub page: u64,
    pub per_page: u64,
}

impl Pagination {
    pub fn new(page: u64, per_page: u64) -> Self {
        Self { page, per_page }
    }

    pub fn offset(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.per_page)
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 20,
        }
    }
}

/// A fully resolved image query.
///
/// `groups` holds one expanded id set per originally requested tag; an empty
/// set stands for a tag that did not resolve. No groups at all means no tag
/// filter.
#[derive(Clone, Debug, Default)]
pub struct ImageQuery {
    pub groups: Vec<BTreeSet<i32>>,
    pub mode: MatchMode,
    pub sort: SortField,
    pub direction: SortDirection,
    pub page: Pagination,
}

#[derive(Clone, Debug, Serialize)]
pub struct ImagePage {
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
    pub images: Vec<image::Model>,
}

impl ImagePage {
    fn empty(total: u64, page: Pagination) -> Self {
        Self {
            total,
            page: page.page,
            per_page: page.per_page,
            images: Vec::new(),
        }
    }

    pub fn image_ids(&self) -> Vec<i32> {
        self.images.iter().map(|image| image.id).collect_vec()
    }
}

/// Stage-1 predicate over `tag_links`.
enum LinkFilter {
    Unfiltered,
    /// Resolved to a predicate that no image can satisfy.
    Unmatchable,
    Condition(Condition),
}

fn link_filter(query: &ImageQuery) -> LinkFilter {
    if query.groups.is_empty() {
        return LinkFilter::Unfiltered;
    }

    match query.mode {
        MatchMode::Any => {
            let ids: BTreeSet<i32> = query.groups.iter().flatten().copied().collect();
            if ids.is_empty() {
                return LinkFilter::Unmatchable;
            }
            LinkFilter::Condition(Condition::all().add(tag_link::Column::TagId.is_in(ids)))
        }
        MatchMode::All => {
            if query.groups.iter().any(|group| group.is_empty()) {
                return LinkFilter::Unmatchable;
            }

            // one existence check per requested tag, each against that tag's own subtree
            let mut groups = query.groups.iter();
            let mut condition = Condition::all();
            if let Some(first) = groups.next() {
                condition = condition.add(tag_link::Column::TagId.is_in(first.iter().copied()));
            }
            for group in groups {
                condition = condition.add(
                    tag_link::Column::ImageId.in_subquery(image_ids_linked_to(group)),
                );
            }
            LinkFilter::Condition(condition)
        }
    }
}

fn image_ids_linked_to(tag_ids: &BTreeSet<i32>) -> SelectStatement {
    tag_link::Entity::find()
        .select_only()
        .column(tag_link::Column::ImageId)
        .filter(tag_link::Column::TagId.is_in(tag_ids.iter().copied()))
        .into_query()
}

fn matching_image_ids(condition: Condition) -> Select<tag_link::Entity> {
    tag_link::Entity::find()
        .select_only()
        .column(tag_link::Column::ImageId)
        .distinct()
        .filter(condition)
}

/// Number of images matching `query`'s filter, ignoring its page window.
pub async fn count_images<C: ConnectionTrait>(db: &C, query: &ImageQuery) -> Result<u64> {
    let total = match link_filter(query) {
        LinkFilter::Unfiltered => image::Entity::find().count(db).await?,
        LinkFilter::Unmatchable => 0,
        LinkFilter::Condition(condition) => matching_image_ids(condition).count(db).await?,
    };
    Ok(total)
}

/// Runs `query` and returns the requested page with the full match count.
pub async fn plan_and_execute<C: ConnectionTrait>(db: &C, query: &ImageQuery) -> Result<ImagePage> {
    let page = query.page;

    let condition = match link_filter(query) {
        LinkFilter::Unfiltered => return unfiltered_page(db, query).await,
        LinkFilter::Unmatchable => {
            debug!("Tag filter cannot match any image");
            return Ok(ImagePage::empty(0, page));
        }
        LinkFilter::Condition(condition) => condition,
    };

    let total = matching_image_ids(condition.clone()).count(db).await?;
    if total == 0 || page.offset() >= total {
        debug!("Nothing to hydrate for page {} of {total} matches", page.page);
        return Ok(ImagePage::empty(total, page));
    }

    let images = if query.sort == SortField::Id {
        // the link table's own image_id column carries the order
        let ids = matching_image_ids(condition)
            .order_by(tag_link::Column::ImageId, query.direction.order())
            .offset(page.offset())
            .limit(page.per_page)
            .into_tuple::<i32>()
            .all(db)
            .await?;
        debug!("Stage 1 narrowed to {} image ids", ids.len());
        hydrate_in_order(db, &ids).await?
    } else {
        let narrowed = tag_link::Entity::find()
            .select_only()
            .column(tag_link::Column::ImageId)
            .filter(condition)
            .into_query();
        sorted_images(db, query, Some(narrowed)).await?
    };

    Ok(ImagePage {
        total,
        page: page.page,
        per_page: page.per_page,
        images,
    })
}

async fn unfiltered_page<C: ConnectionTrait>(db: &C, query: &ImageQuery) -> Result<ImagePage> {
    let page = query.page;
    let total = count_images(db, query).await?;
    if page.offset() >= total {
        return Ok(ImagePage::empty(total, page));
    }

    let images = sorted_images(db, query, None).await?;
    Ok(ImagePage {
        total,
        page: page.page,
        per_page: page.per_page,
        images,
    })
}

/// Orders `images` by the query's sort key, with id as tie-break, and fetches
/// only the rows of the requested page.
async fn sorted_images<C: ConnectionTrait>(
    db: &C,
    query: &ImageQuery,
    narrowed: Option<SelectStatement>,
) -> Result<Vec<image::Model>> {
    let order = query.direction.order();
    let mut select = image::Entity::find();
    if let Some(narrowed) = narrowed {
        select = select.filter(image::Column::Id.in_subquery(narrowed));
    }
    if query.sort != SortField::Id {
        select = select.order_by(query.sort.column(), order.clone());
    }

    let images = select
        .order_by(image::Column::Id, order)
        .offset(query.page.offset())
        .limit(query.page.per_page)
        .all(db)
        .await?;
    Ok(images)
}

/// Fetches `ids` and returns the rows in the same order. Ids whose row has
/// disappeared are skipped.
async fn hydrate_in_order<C: ConnectionTrait>(db: &C, ids: &[i32]) -> Result<Vec<image::Model>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut rows: HashMap<i32, image::Model> = image::Entity::find()
        .filter(image::Column::Id.is_in(ids.iter().copied()))
        .all(db)
        .await?
        .into_iter()
        .map(|image| (image.id, image))
        .collect();

    Ok(ids.iter().filter_map(|id| rows.remove(id)).collect_vec())
}
