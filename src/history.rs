//! A user's activity feed, merged from three history tables.
//!
//! All three sources are loaded for the user, merged and sorted in memory, then
//! sliced to the requested page. This keeps the ordering rules in one place at
//! the cost of loading the user's full history per request.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use itertools::Itertools;
use log::debug;
use sea_orm::{ColumnTrait, Condition, ConnectionTrait, EntityTrait, QueryFilter};
use serde::Serialize;

use crate::error::Result;
use crate::model::tag_audit_log::TagAuditAction;
use crate::model::tag_history::TagUsageAction;
use crate::model::{image_status_history, tag_audit_log, tag_history, ImageStatus};
use crate::planner::Pagination;
use crate::store::{self, TagSummary};

// Tie-break ranks for equal timestamps, lowest first.
const METADATA_PRIORITY: u8 = 1;
const USAGE_PRIORITY: u8 = 2;
const STATUS_PRIORITY: u8 = 3;

/// A history row before tag titles are attached.
#[derive(Clone, Debug)]
enum SourceRow {
    Metadata(tag_audit_log::Model),
    Usage(tag_history::Model),
    Status(image_status_history::Model),
}

impl SourceRow {
    fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Metadata(row) => row.created_at,
            Self::Usage(row) => row.date,
            Self::Status(row) => row.created_at,
        }
    }

    fn priority(&self) -> u8 {
        match self {
            Self::Metadata(_) => METADATA_PRIORITY,
            Self::Usage(_) => USAGE_PRIORITY,
            Self::Status(_) => STATUS_PRIORITY,
        }
    }

    fn row_id(&self) -> i32 {
        match self {
            Self::Metadata(row) => row.id,
            Self::Usage(row) => row.id,
            Self::Status(row) => row.id,
        }
    }

    fn tag_ids(&self) -> Vec<i32> {
        match self {
            Self::Metadata(row) => [
                row.tag_id,
                row.old_alias_of,
                row.new_alias_of,
                row.old_parent,
                row.new_parent,
                row.source_tag_id,
            ]
            .into_iter()
            .flatten()
            .collect_vec(),
            Self::Usage(row) => row.tag_id.into_iter().collect_vec(),
            Self::Status(_) => Vec::new(),
        }
    }
}

/// Newest first; equal timestamps by variant priority, then newest row id.
fn feed_order(a: &SourceRow, b: &SourceRow) -> Ordering {
    b.timestamp()
        .cmp(&a.timestamp())
        .then_with(|| a.priority().cmp(&b.priority()))
        .then_with(|| b.row_id().cmp(&a.row_id()))
}

/// Reference to another tag from a history row. `title` is `None` when the
/// tag has since been deleted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TagRef {
    pub id: i32,
    pub title: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "field", rename_all = "snake_case")]
pub enum TagChange {
    Title {
        old: Option<String>,
        new: Option<String>,
    },
    Type {
        old: Option<i32>,
        new: Option<i32>,
    },
    Alias {
        old: Option<TagRef>,
        new: Option<TagRef>,
    },
    Parent {
        old: Option<TagRef>,
        new: Option<TagRef>,
    },
    Source {
        source: Option<TagRef>,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TagMetadataChange {
    pub id: i32,
    pub action: TagAuditAction,
    pub tag_id: Option<i32>,
    pub tag: Option<TagSummary>,
    pub change: TagChange,
    pub user_id: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TagUsageChange {
    pub id: i32,
    pub action: TagUsageAction,
    pub tag_id: Option<i32>,
    pub tag: Option<TagSummary>,
    pub image_id: i32,
    pub user_id: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ImageStatusChange {
    pub id: i32,
    pub image_id: i32,
    pub old_status: i32,
    pub new_status: i32,
    pub user_id: Option<i32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HistoryItem {
    TagMetadata(TagMetadataChange),
    TagUsage(TagUsageChange),
    ImageStatus(ImageStatusChange),
}

impl HistoryItem {
    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            Self::TagMetadata(item) => item.created_at,
            Self::TagUsage(item) => item.created_at,
            Self::ImageStatus(item) => item.created_at,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct HistoryPage {
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
    pub items: Vec<HistoryItem>,
}

/// Loads, merges and paginates every public history event caused by `user_id`.
pub async fn get_user_history<C: ConnectionTrait>(
    db: &C,
    user_id: i32,
    page: Pagination,
) -> Result<HistoryPage> {
    let metadata = tag_audit_log::Entity::find()
        .filter(tag_audit_log::Column::UserId.eq(user_id))
        .all(db)
        .await?;
    let usage = tag_history::Entity::find()
        .filter(tag_history::Column::UserId.eq(user_id))
        .all(db)
        .await?;
    let status = public_status_rows(db, user_id).await?;
    debug!(
        "History for user {user_id}: {} metadata, {} usage, {} status rows",
        metadata.len(),
        usage.len(),
        status.len()
    );

    let rows = metadata
        .into_iter()
        .map(SourceRow::Metadata)
        .chain(usage.into_iter().map(SourceRow::Usage))
        .chain(status.into_iter().map(SourceRow::Status))
        .sorted_by(feed_order)
        .collect_vec();

    let total = rows.len() as u64;
    let page_rows = rows
        .into_iter()
        .skip(page.offset() as usize)
        .take(page.per_page as usize)
        .collect_vec();

    let tag_ids: BTreeSet<i32> = page_rows.iter().flat_map(SourceRow::tag_ids).collect();
    let titles: HashMap<i32, TagSummary> = store::find_summaries(db, &tag_ids)
        .await?
        .into_iter()
        .map(|summary| (summary.id, summary))
        .collect();

    let items = page_rows
        .into_iter()
        .map(|row| into_item(row, &titles))
        .collect_vec();

    Ok(HistoryPage {
        total,
        page: page.page,
        per_page: page.per_page,
        items,
    })
}

/// Status changes touching a public status on either end. Moderation-only
/// transitions are left out entirely.
async fn public_status_rows<C: ConnectionTrait>(
    db: &C,
    user_id: i32,
) -> Result<Vec<image_status_history::Model>> {
    let public = ImageStatus::public_codes();
    let rows = image_status_history::Entity::find()
        .filter(image_status_history::Column::UserId.eq(user_id))
        .filter(
            Condition::any()
                .add(image_status_history::Column::OldStatus.is_in(public.clone()))
                .add(image_status_history::Column::NewStatus.is_in(public)),
        )
        .all(db)
        .await?;
    Ok(rows)
}

fn into_item(row: SourceRow, titles: &HashMap<i32, TagSummary>) -> HistoryItem {
    let summary = |id: Option<i32>| id.and_then(|id| titles.get(&id).cloned());
    let tag_ref = |id: Option<i32>| {
        id.map(|id| TagRef {
            id,
            title: titles.get(&id).map(|summary| summary.title.clone()),
        })
    };

    match row {
        SourceRow::Metadata(row) => {
            let change = match row.action {
                TagAuditAction::Rename => TagChange::Title {
                    old: row.old_title,
                    new: row.new_title,
                },
                TagAuditAction::TypeChange => TagChange::Type {
                    old: row.old_type,
                    new: row.new_type,
                },
                TagAuditAction::AliasSet | TagAuditAction::AliasRemoved => TagChange::Alias {
                    old: tag_ref(row.old_alias_of),
                    new: tag_ref(row.new_alias_of),
                },
                TagAuditAction::ParentSet | TagAuditAction::ParentRemoved => TagChange::Parent {
                    old: tag_ref(row.old_parent),
                    new: tag_ref(row.new_parent),
                },
                TagAuditAction::SourceLinked | TagAuditAction::SourceUnlinked => {
                    TagChange::Source {
                        source: tag_ref(row.source_tag_id),
                    }
                }
            };
            HistoryItem::TagMetadata(TagMetadataChange {
                id: row.id,
                action: row.action,
                tag_id: row.tag_id,
                tag: summary(row.tag_id),
                change,
                user_id: row.user_id,
                created_at: row.created_at,
            })
        }
        SourceRow::Usage(row) => HistoryItem::TagUsage(TagUsageChange {
            id: row.id,
            action: row.action,
            tag_id: row.tag_id,
            tag: summary(row.tag_id),
            image_id: row.image_id,
            user_id: row.user_id,
            created_at: row.date,
        }),
        SourceRow::Status(row) => HistoryItem::ImageStatus(ImageStatusChange {
            id: row.id,
            image_id: row.image_id,
            old_status: row.old_status,
            new_status: row.new_status,
            user_id: row.user_id,
            created_at: row.created_at,
        }),
    }
}
