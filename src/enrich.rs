//! Resolution of user references into [`UserView`]s.
//!
//! Records such as expenses and group memberships carry bare user ids, at the
//! root (who paid, who created) and inside child collections (each
//! participant). Before responding, the service gathers every distinct id
//! across the whole result set, fetches them in one batched lookup and writes
//! the resolved views back into the records.

use crate::models::UserView;
use crate::store::{StoreError, StoreState, TableDef, from_document, key};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};

/// A record with user-reference fields.
///
/// Implementations list their designated reference fields, root-level ones and
/// those on every item of their child collections, in both methods. Neither
/// method may add, drop or reorder records or child items.
pub trait Enrichable {
    /// Hands every referenced user id to `visit`, empty ones included.
    fn collect_user_refs<'a>(&'a self, visit: &mut dyn FnMut(&'a str));

    /// Replaces every attached view with `resolve(id)` for its reference field.
    fn attach_users(&mut self, resolve: &dyn Fn(&str) -> UserView);
}

/// Batched user fetch. Ids without a user record are simply absent from the
/// returned map.
#[async_trait]
pub trait UserLookup: Send + Sync {
    async fn fetch_users(&self, ids: &[String]) -> Result<HashMap<String, UserView>, StoreError>;
}

/// UserDirectory
///
/// [`UserLookup`] over the users table: one `batch_get` per call.
#[derive(Clone)]
pub struct UserDirectory {
    store: StoreState,
    table: TableDef,
}

impl UserDirectory {
    pub fn new(store: StoreState, table: TableDef) -> Self {
        Self { store, table }
    }
}

#[async_trait]
impl UserLookup for UserDirectory {
    async fn fetch_users(&self, ids: &[String]) -> Result<HashMap<String, UserView>, StoreError> {
        let keys = ids.iter().map(|id| key([("userId", id.as_str())])).collect();
        let docs = self.store.batch_get(&self.table, keys).await?;

        let mut users = HashMap::with_capacity(docs.len());
        for doc in docs {
            let user: UserView = from_document(&self.table, doc)?;
            users.insert(user.user_id.clone(), user);
        }
        Ok(users)
    }
}

/// What one enrichment pass did, for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichSummary {
    /// Distinct non-empty ids sent to the lookup.
    pub requested: usize,
    /// How many of those came back.
    pub resolved: usize,
}

/// Resolves the user references of `entities` in place.
///
/// All distinct non-empty ids are fetched in a single call to `users`; when
/// there are none, no call is made. References whose id was not returned
/// (and empty references) get the zero-value [`UserView`]. Record order and
/// child order are left untouched. A failed fetch fails the whole enrichment
/// and leaves the records as they were.
pub async fn enrich<E: Enrichable>(
    entities: &mut [E],
    users: &dyn UserLookup,
) -> Result<EnrichSummary, StoreError> {
    let mut ids = BTreeSet::new();
    for entity in entities.iter() {
        entity.collect_user_refs(&mut |id| {
            if !id.is_empty() {
                ids.insert(id.to_string());
            }
        });
    }

    if ids.is_empty() {
        return Ok(EnrichSummary::default());
    }

    let ids: Vec<String> = ids.into_iter().collect();
    let resolved = users.fetch_users(&ids).await?;

    let resolve = |id: &str| resolved.get(id).cloned().unwrap_or_default();
    for entity in entities.iter_mut() {
        entity.attach_users(&resolve);
    }

    Ok(EnrichSummary {
        requested: ids.len(),
        resolved: ids.iter().filter(|id| resolved.contains_key(*id)).count(),
    })
}

/// [`enrich`] for a single record.
pub async fn enrich_one<E: Enrichable>(
    entity: &mut E,
    users: &dyn UserLookup,
) -> Result<EnrichSummary, StoreError> {
    enrich(std::slice::from_mut(entity), users).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Expense, GroupMember, Participant};
    use std::sync::Mutex;

    /// Serves a fixed set of users and records every request.
    struct FakeLookup {
        users: Vec<UserView>,
        requests: Mutex<Vec<Vec<String>>>,
        fail: bool,
    }

    impl FakeLookup {
        fn with(ids: &[&str]) -> Self {
            Self {
                users: ids.iter().map(|id| user(id)).collect(),
                requests: Mutex::new(Vec::new()),
                fail: false,
            }
        }

        fn requests(&self) -> Vec<Vec<String>> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl UserLookup for FakeLookup {
        async fn fetch_users(
            &self,
            ids: &[String],
        ) -> Result<HashMap<String, UserView>, StoreError> {
            self.requests.lock().unwrap().push(ids.to_vec());
            if self.fail {
                return Err(StoreError::Request {
                    operation: "batch_get",
                    table: "users".into(),
                    message: "boom".into(),
                });
            }
            Ok(self
                .users
                .iter()
                .filter(|u| ids.contains(&u.user_id))
                .map(|u| (u.user_id.clone(), u.clone()))
                .collect())
        }
    }

    fn user(id: &str) -> UserView {
        UserView {
            user_id: id.to_string(),
            username: format!("{id}-login"),
            display_name: format!("User {id}"),
            role: "member".to_string(),
        }
    }

    fn expense(id: &str, paid_by: &str, created_by: &str, participants: &[&str]) -> Expense {
        Expense {
            expense_id: id.to_string(),
            paid_by: paid_by.to_string(),
            created_by: created_by.to_string(),
            participants: participants
                .iter()
                .map(|p| Participant {
                    user_id: p.to_string(),
                    ..Participant::default()
                })
                .collect(),
            ..Expense::default()
        }
    }

    #[tokio::test]
    async fn fetches_each_distinct_id_once_in_a_single_call() {
        let lookup = FakeLookup::with(&["u1", "u2", "u3"]);
        let mut expenses = vec![
            expense("e1", "u1", "u3", &["u1", "u2"]),
            expense("e2", "u2", "u3", &["u2", "u1", "u1"]),
        ];

        let summary = enrich(&mut expenses, &lookup).await.unwrap();

        assert_eq!(lookup.requests(), vec![vec!["u1", "u2", "u3"]]);
        assert_eq!(summary, EnrichSummary { requested: 3, resolved: 3 });
        assert_eq!(expenses[0].paid_by_user, user("u1"));
        assert_eq!(expenses[0].created_by_user, user("u3"));
        assert_eq!(expenses[1].participants[0].user, user("u2"));
        assert_eq!(expenses[1].participants[2].user, user("u1"));
    }

    #[tokio::test]
    async fn no_references_means_no_fetch() {
        let lookup = FakeLookup::with(&["u1"]);
        let mut expenses = vec![expense("e1", "", "", &[]), expense("e2", "", "", &[""])];

        let summary = enrich(&mut expenses, &lookup).await.unwrap();
        assert!(lookup.requests().is_empty());
        assert_eq!(summary, EnrichSummary::default());

        let mut none: Vec<Expense> = Vec::new();
        enrich(&mut none, &lookup).await.unwrap();
        assert!(lookup.requests().is_empty());
    }

    #[tokio::test]
    async fn unresolved_ids_stay_zero_valued_and_order_is_kept() {
        let lookup = FakeLookup::with(&["u1"]);
        let mut expenses = vec![
            expense("e2", "u2", "u1", &["u1", "u2"]),
            expense("e1", "u1", "", &["u2", "u1"]),
        ];

        let summary = enrich(&mut expenses, &lookup).await.unwrap();

        assert_eq!(summary, EnrichSummary { requested: 2, resolved: 1 });
        let ids: Vec<_> = expenses.iter().map(|e| e.expense_id.as_str()).collect();
        assert_eq!(ids, ["e2", "e1"]);

        assert_eq!(expenses[0].paid_by_user, UserView::default());
        assert_eq!(expenses[0].participants[0].user, user("u1"));
        assert_eq!(expenses[0].participants[1].user, UserView::default());
        assert_eq!(expenses[1].participants[0].user_id, "u2");
        assert_eq!(expenses[1].participants[0].user, UserView::default());
        assert_eq!(expenses[1].created_by_user, UserView::default());
    }

    #[tokio::test]
    async fn running_twice_gives_the_same_result() {
        let lookup = FakeLookup::with(&["u1", "u3"]);
        let mut once = vec![
            expense("e1", "u1", "u2", &["u1", "u3"]),
            expense("e2", "u3", "u1", &["u2"]),
        ];
        let mut twice = once.clone();

        enrich(&mut once, &lookup).await.unwrap();
        enrich(&mut twice, &lookup).await.unwrap();
        enrich(&mut twice, &lookup).await.unwrap();

        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn fetch_failure_is_fatal_and_leaves_records_untouched() {
        let lookup = FakeLookup {
            fail: true,
            ..FakeLookup::with(&["u1"])
        };
        let mut expenses = vec![expense("e1", "u1", "", &["u1"])];
        let before = expenses.clone();

        assert!(enrich(&mut expenses, &lookup).await.is_err());
        assert_eq!(expenses, before);
    }

    #[tokio::test]
    async fn group_members_resolve_their_own_user() {
        let lookup = FakeLookup::with(&["u1"]);
        let mut members = vec![
            GroupMember {
                user_id: "u1".into(),
                group_id: "g1".into(),
                ..GroupMember::default()
            },
            GroupMember {
                user_id: "u9".into(),
                group_id: "g1".into(),
                ..GroupMember::default()
            },
        ];

        enrich(&mut members, &lookup).await.unwrap();

        assert_eq!(members[0].user, Some(user("u1")));
        assert_eq!(members[1].user, Some(UserView::default()));
    }

    #[tokio::test]
    async fn enrich_one_resolves_a_single_record() {
        let lookup = FakeLookup::with(&["u2"]);
        let mut single = expense("e1", "u2", "u2", &["u2"]);
        let summary = enrich_one(&mut single, &lookup).await.unwrap();
        assert_eq!(summary.requested, 1);
        assert_eq!(single.paid_by_user, user("u2"));
        assert_eq!(single.participants[0].user, user("u2"));
    }
}
