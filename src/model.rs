use itertools::Itertools;

pub mod tag {
    use sea_orm::entity::prelude::*;
    use serde::Serialize;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize)]
    #[sea_orm(table_name = "tags")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,

        // not unique, legacy data carries duplicate titles
        #[sea_orm(column_type = "Text")]
        pub title: String,
        pub tag_type: i32,

        #[sea_orm(indexed)]
        pub alias_of: Option<i32>,
        #[sea_orm(indexed)]
        pub inherited_from: Option<i32>,

        /// Links to this exact tag id, not hierarchy-inclusive.
        pub usage_count: i32,
    }

    #[derive(Debug, DeriveRelation, EnumIter)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod tag_link {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "tag_links")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub tag_id: i32,
        // the composite key only covers lookups by tag_id
        #[sea_orm(primary_key, auto_increment = false, indexed)]
        pub image_id: i32,

        pub user_id: Option<i32>,
        pub date_linked: DateTimeUtc,
    }

    #[derive(Debug, DeriveRelation, EnumIter)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod image {
    use sea_orm::entity::prelude::*;
    use serde::Serialize;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
    #[sea_orm(table_name = "images")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,

        pub user_id: i32,
        /// Raw [`super::ImageStatus`] code.
        pub status: i32,

        #[sea_orm(column_type = "Text")]
        pub filename: String,
        pub date_added: DateTimeUtc,
        pub width: i32,
        pub height: i32,
        #[sea_orm(column_type = "Double")]
        pub bayesian_rating: f64,
        pub favorites: i32,
    }

    #[derive(Debug, DeriveRelation, EnumIter)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod tag_audit_log {
    use sea_orm::entity::prelude::*;
    use serde::Serialize;

    /// Kind of moderation action recorded against a tag.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize)]
    #[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
    #[serde(rename_all = "snake_case")]
    pub enum TagAuditAction {
        #[sea_orm(string_value = "rename")]
        Rename,
        #[sea_orm(string_value = "type_change")]
        TypeChange,
        #[sea_orm(string_value = "alias_set")]
        AliasSet,
        #[sea_orm(string_value = "alias_removed")]
        AliasRemoved,
        #[sea_orm(string_value = "parent_set")]
        ParentSet,
        #[sea_orm(string_value = "parent_removed")]
        ParentRemoved,
        #[sea_orm(string_value = "source_linked")]
        SourceLinked,
        #[sea_orm(string_value = "source_unlinked")]
        SourceUnlinked,
    }

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "tag_audit_log")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,

        pub tag_id: Option<i32>,
        #[sea_orm(indexed)]
        pub user_id: i32,
        pub action: TagAuditAction,

        pub old_title: Option<String>,
        pub new_title: Option<String>,
        pub old_type: Option<i32>,
        pub new_type: Option<i32>,
        pub old_alias_of: Option<i32>,
        pub new_alias_of: Option<i32>,
        pub old_parent: Option<i32>,
        pub new_parent: Option<i32>,
        pub source_tag_id: Option<i32>,

        pub created_at: DateTimeUtc,
    }

    #[derive(Debug, DeriveRelation, EnumIter)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod tag_history {
    use sea_orm::entity::prelude::*;
    use serde::Serialize;

    #[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize)]
    #[sea_orm(rs_type = "String", db_type = "String(StringLen::N(8))")]
    #[serde(rename_all = "snake_case")]
    pub enum TagUsageAction {
        #[sea_orm(string_value = "add")]
        Add,
        #[sea_orm(string_value = "remove")]
        Remove,
    }

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "tag_history")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,

        pub image_id: i32,
        pub tag_id: Option<i32>,
        #[sea_orm(indexed)]
        pub user_id: i32,
        pub action: TagUsageAction,

        pub date: DateTimeUtc,
    }

    #[derive(Debug, DeriveRelation, EnumIter)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod image_status_history {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "image_status_history")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,

        pub image_id: i32,
        pub old_status: i32,
        pub new_status: i32,
        // system-initiated changes have no actor
        #[sea_orm(indexed)]
        pub user_id: Option<i32>,

        pub created_at: DateTimeUtc,
    }

    #[derive(Debug, DeriveRelation, EnumIter)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

/// Image visibility status, stored as a small integer on `images.status`
/// and on both ends of `image_status_history`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ImageStatus {
    Other = -4,
    Inappropriate = -3,
    LowQuality = -2,
    Repost = -1,
    Review = 0,
    Active = 1,
    Spoiler = 2,
}

/// Statuses that may surface in a user-facing feed. Everything else is
/// moderation-only.
pub const PUBLIC_STATUSES: [ImageStatus; 3] =
    [ImageStatus::Active, ImageStatus::Repost, ImageStatus::Spoiler];

impl ImageStatus {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            -4 => Some(Self::Other),
            -3 => Some(Self::Inappropriate),
            -2 => Some(Self::LowQuality),
            -1 => Some(Self::Repost),
            0 => Some(Self::Review),
            1 => Some(Self::Active),
            2 => Some(Self::Spoiler),
            _ => None,
        }
    }

    pub fn is_public(self) -> bool {
        PUBLIC_STATUSES.contains(&self)
    }

    pub fn public_codes() -> Vec<i32> {
        PUBLIC_STATUSES.iter().map(|s| s.code()).collect_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_round_trip() {
        for code in -4..=2 {
            let status = ImageStatus::from_code(code).unwrap();
            assert_eq!(status.code(), code);
        }
        assert_eq!(ImageStatus::from_code(3), None);
    }

    #[test]
    fn only_active_repost_spoiler_are_public() {
        assert!(ImageStatus::Active.is_public());
        assert!(ImageStatus::Repost.is_public());
        assert!(ImageStatus::Spoiler.is_public());
        assert!(!ImageStatus::Review.is_public());
        assert!(!ImageStatus::LowQuality.is_public());
        assert!(!ImageStatus::Inappropriate.is_public());
        assert!(!ImageStatus::Other.is_public());
    }
}
