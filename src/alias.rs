use log::debug;
use sea_orm::ConnectionTrait;

use crate::error::Result;
use crate::store;

/// Outcome of looking a tag id up for querying.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AliasResolution {
    pub found: bool,
    /// The id to query as. Equal to the input when the tag is unknown or not an alias.
    pub canonical_id: i32,
}

impl AliasResolution {
    pub fn was_alias(&self, requested_id: i32) -> bool {
        self.found && self.canonical_id != requested_id
    }
}

/// Redirects an alias to its target, following exactly one hop.
///
/// Aliases are not chained in valid data. If a chain does exist, only its first
/// link is followed, so `A -> B -> C` resolves `A` to `B`.
pub async fn resolve_alias<C: ConnectionTrait>(db: &C, tag_id: i32) -> Result<AliasResolution> {
    let tag = match store::find_tag(db, tag_id).await? {
        Some(tag) => tag,
        None => {
            debug!("Tag {tag_id} not found while resolving alias");
            return Ok(AliasResolution {
                found: false,
                canonical_id: tag_id,
            });
        }
    };

    let canonical_id = match tag.alias_of {
        Some(target) => {
            debug!("Tag {tag_id} is an alias of {target}");
            target
        }
        None => tag_id,
    };

    Ok(AliasResolution {
        found: true,
        canonical_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::*;

    #[tokio::test]
    async fn unknown_tag_is_reported_unchanged() {
        let db = setup_db().await;
        let res = resolve_alias(&db, 7).await.unwrap();
        assert_eq!(
            res,
            AliasResolution {
                found: false,
                canonical_id: 7
            }
        );
        assert!(!res.was_alias(7));
    }

    #[tokio::test]
    async fn plain_tag_is_its_own_canonical() {
        let db = setup_db().await;
        insert_tag(&db, 1, "swimsuit", None, None).await;
        let res = resolve_alias(&db, 1).await.unwrap();
        assert!(res.found);
        assert_eq!(res.canonical_id, 1);
    }

    #[tokio::test]
    async fn alias_follows_only_one_hop() {
        let db = setup_db().await;
        insert_tag(&db, 3, "c", None, None).await;
        insert_tag(&db, 2, "b", Some(3), None).await;
        insert_tag(&db, 1, "a", Some(2), None).await;

        let res = resolve_alias(&db, 1).await.unwrap();
        assert_eq!(res.canonical_id, 2);
        assert!(res.was_alias(1));
    }

    #[tokio::test]
    async fn self_alias_does_not_loop() {
        let db = setup_db().await;
        insert_tag(&db, 5, "loop", Some(5), None).await;
        assert_eq!(resolve_alias(&db, 5).await.unwrap().canonical_id, 5);
    }

    #[tokio::test]
    async fn repeated_resolution_is_stable() {
        let db = setup_db().await;
        insert_tag(&db, 2, "target", None, None).await;
        insert_tag(&db, 1, "alias", Some(2), None).await;

        let first = resolve_alias(&db, 1).await.unwrap();
        let second = resolve_alias(&db, 1).await.unwrap();
        assert_eq!(first, second);
    }
}
