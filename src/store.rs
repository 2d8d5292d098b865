//! Read access to the tag graph, plus schema bootstrap.
//!
//! Nothing in this module writes to `tags`; structural changes belong to the
//! moderation side of the board.

use std::collections::BTreeSet;

use itertools::Itertools;
use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Schema,
};
use serde::Serialize;

use crate::error::Result;
use crate::model::{image, image_status_history, tag, tag_audit_log, tag_history, tag_link};

/// Creates every table this crate reads from, with the indexes declared on
/// their entities, skipping whatever already exists.
pub async fn create_tables<C: ConnectionTrait>(db: &C) -> Result<()> {
    create_table(tag::Entity, db).await?;
    create_table(tag_link::Entity, db).await?;
    create_table(image::Entity, db).await?;
    create_table(tag_audit_log::Entity, db).await?;
    create_table(tag_history::Entity, db).await?;
    create_table(image_status_history::Entity, db).await?;
    Ok(())
}

async fn create_table<E: EntityTrait, C: ConnectionTrait>(entity: E, db: &C) -> Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let mut stmt = schema.create_table_from_entity(entity);
    stmt.if_not_exists();
    db.execute(builder.build(&stmt)).await?;

    // `create_table_from_entity` leaves out `#[sea_orm(indexed)]` columns
    for mut index in schema.create_index_from_entity(E::default()) {
        index.if_not_exists();
        db.execute(builder.build(&index)).await?;
    }

    Ok(())
}

/// Id and title of a tag, used wherever a tag is referenced rather than shown.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TagSummary {
    pub id: i32,
    pub title: String,
}

impl From<tag::Model> for TagSummary {
    fn from(tag: tag::Model) -> Self {
        Self {
            id: tag.id,
            title: tag.title,
        }
    }
}

pub async fn find_tag<C: ConnectionTrait>(db: &C, tag_id: i32) -> Result<Option<tag::Model>> {
    Ok(tag::Entity::find_by_id(tag_id).one(db).await?)
}

/// Summaries for the given ids. Ids without a row are simply missing from the result.
pub async fn find_summaries<C: ConnectionTrait>(
    db: &C,
    tag_ids: &BTreeSet<i32>,
) -> Result<Vec<TagSummary>> {
    if tag_ids.is_empty() {
        return Ok(Vec::new());
    }

    let summaries = tag::Entity::find()
        .filter(tag::Column::Id.is_in(tag_ids.iter().copied()))
        .order_by_asc(tag::Column::Id)
        .all(db)
        .await?
        .into_iter()
        .map(TagSummary::from)
        .collect_vec();

    Ok(summaries)
}

/// Ids of every tag whose `inherited_from` points into `parents`.
pub async fn child_ids<C: ConnectionTrait>(db: &C, parents: &[i32]) -> Result<Vec<i32>> {
    if parents.is_empty() {
        return Ok(Vec::new());
    }

    let ids = tag::Entity::find()
        .select_only()
        .column(tag::Column::Id)
        .filter(tag::Column::InheritedFrom.is_in(parents.iter().copied()))
        .into_tuple::<i32>()
        .all(db)
        .await?;

    Ok(ids)
}

pub async fn children<C: ConnectionTrait>(db: &C, parent_id: i32) -> Result<Vec<TagSummary>> {
    let children = tag::Entity::find()
        .filter(tag::Column::InheritedFrom.eq(parent_id))
        .order_by_asc(tag::Column::Title)
        .order_by_asc(tag::Column::Id)
        .all(db)
        .await?
        .into_iter()
        .map(TagSummary::from)
        .collect_vec();

    Ok(children)
}

/// Tags that are pure synonyms of `canonical_id`.
pub async fn aliases<C: ConnectionTrait>(db: &C, canonical_id: i32) -> Result<Vec<TagSummary>> {
    let aliases = tag::Entity::find()
        .filter(tag::Column::AliasOf.eq(canonical_id))
        .order_by_asc(tag::Column::Title)
        .order_by_asc(tag::Column::Id)
        .all(db)
        .await?
        .into_iter()
        .map(TagSummary::from)
        .collect_vec();

    Ok(aliases)
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fixtures shared by the test modules.

    use chrono::{DateTime, TimeZone, Utc};
    use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, Set};

    use super::create_tables;
    use crate::model::{image, tag, tag_link, ImageStatus};

    pub async fn setup_db() -> DatabaseConnection {
        let mut opt = ConnectOptions::new("sqlite::memory:");
        // every pooled connection would otherwise get its own empty database
        opt.max_connections(1).sqlx_logging(false);

        let db = Database::connect(opt).await.unwrap();
        create_tables(&db).await.unwrap();
        db
    }

    pub fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_600_000_000 + secs, 0).unwrap()
    }

    pub async fn insert_tag(
        db: &DatabaseConnection,
        id: i32,
        title: &str,
        alias_of: Option<i32>,
        inherited_from: Option<i32>,
    ) {
        tag::ActiveModel {
            id: Set(id),
            title: Set(title.to_string()),
            tag_type: Set(1),
            alias_of: Set(alias_of),
            inherited_from: Set(inherited_from),
            usage_count: Set(0),
        }
        .insert(db)
        .await
        .unwrap();
    }

    pub async fn insert_image(db: &DatabaseConnection, id: i32, rating: f64, favorites: i32) {
        image::ActiveModel {
            id: Set(id),
            user_id: Set(1),
            status: Set(ImageStatus::Active.code()),
            filename: Set(format!("{id}.jpg")),
            date_added: Set(ts(id as i64)),
            width: Set(800),
            height: Set(600),
            bayesian_rating: Set(rating),
            favorites: Set(favorites),
        }
        .insert(db)
        .await
        .unwrap();
    }

    pub async fn link(db: &DatabaseConnection, tag_id: i32, image_id: i32) {
        tag_link::ActiveModel {
            tag_id: Set(tag_id),
            image_id: Set(image_id),
            user_id: Set(Some(1)),
            date_linked: Set(ts(0)),
        }
        .insert(db)
        .await
        .unwrap();
    }
}

#[cfg(test)]
mod tests {
    use sea_orm::{DbBackend, Statement};

    use super::testing::*;
    use super::*;

    #[tokio::test]
    async fn create_tables_is_repeatable() {
        let db = setup_db().await;
        create_tables(&db).await.unwrap();
    }

    #[tokio::test]
    async fn indexed_columns_get_indexes() {
        let db = setup_db().await;
        let rows = db
            .query_all(Statement::from_string(
                DbBackend::Sqlite,
                "SELECT m.tbl_name AS tbl, i.name AS col \
                 FROM sqlite_master m, pragma_index_info(m.name) i \
                 WHERE m.type = 'index'",
            ))
            .await
            .unwrap();
        let indexed: BTreeSet<(String, String)> = rows
            .iter()
            .map(|row| {
                (
                    row.try_get::<String>("", "tbl").unwrap(),
                    row.try_get::<String>("", "col").unwrap(),
                )
            })
            .collect();

        for (table, column) in [
            ("tags", "alias_of"),
            ("tags", "inherited_from"),
            ("tag_links", "image_id"),
            ("tag_audit_log", "user_id"),
            ("tag_history", "user_id"),
            ("image_status_history", "user_id"),
        ] {
            assert!(
                indexed.contains(&(table.to_string(), column.to_string())),
                "missing index on {table}.{column}, have {indexed:?}"
            );
        }
    }

    #[tokio::test]
    async fn lookups_skip_missing_rows() {
        let db = setup_db().await;
        insert_tag(&db, 1, "swimsuit", None, None).await;
        insert_tag(&db, 2, "school swimsuit", None, Some(1)).await;
        insert_tag(&db, 3, "mizugi", Some(1), None).await;

        let summaries = find_summaries(&db, &BTreeSet::from([1, 2, 99])).await.unwrap();
        assert_eq!(summaries.iter().map(|s| s.id).collect_vec(), vec![1, 2]);

        assert_eq!(child_ids(&db, &[1]).await.unwrap(), vec![2]);
        assert!(child_ids(&db, &[]).await.unwrap().is_empty());

        let aliases = aliases(&db, 1).await.unwrap();
        assert_eq!(aliases, vec![TagSummary { id: 3, title: "mizugi".into() }]);

        assert!(find_tag(&db, 42).await.unwrap().is_none());
    }
}
