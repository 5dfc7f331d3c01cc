use axum::http::Method;

use crate::{
    handlers::{BoxedHandler, financial, handler, messages},
    router::RouteTable,
};

/// api_routes
///
/// The API route table. Every template is prefixed with `base_path` (the
/// gateway stage, `""` for none). Registration order is match order, so more
/// specific literals never need to come first: no two templates here overlap.
pub fn api_routes(base_path: &str) -> RouteTable<BoxedHandler> {
    let at = |template: &str| format!("{base_path}{template}");
    let mut routes = RouteTable::new();

    routes
        // Chat with the assistant.
        .register(Method::GET, &at("/messages"), handler(messages::list_messages))
        .register(Method::POST, &at("/messages"), handler(messages::post_message))
        // Groups and memberships.
        .register(Method::GET, &at("/groups"), handler(financial::list_groups))
        .register(Method::GET, &at("/groups/{groupId}"), handler(financial::get_group))
        .register(
            Method::GET,
            &at("/groups/{groupId}/users"),
            handler(financial::list_group_users),
        )
        // Expenses.
        .register(
            Method::GET,
            &at("/groups/{groupId}/expenses"),
            handler(financial::list_group_expenses),
        )
        .register(
            Method::POST,
            &at("/groups/{groupId}/expenses"),
            handler(financial::create_expense),
        )
        .register(
            Method::GET,
            &at("/groups/{groupId}/expenses/{expenseId}"),
            handler(financial::get_expense),
        )
        .register(
            Method::GET,
            &at("/expenses/categories"),
            handler(financial::list_categories),
        )
        .register(
            Method::GET,
            &at("/expenses/split-types"),
            handler(financial::list_split_types),
        )
        // Receipt images.
        .register(
            Method::POST,
            &at("/groups/{groupId}/receipts"),
            handler(financial::create_receipt_upload),
        );

    routes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_endpoint_is_registered_once_in_order() {
        let routes = api_routes("");
        let entries: Vec<_> = routes
            .entries()
            .map(|(method, template)| format!("{method} {template}"))
            .collect();
        assert_eq!(
            entries,
            [
                "GET /messages",
                "POST /messages",
                "GET /groups",
                "GET /groups/{groupId}",
                "GET /groups/{groupId}/users",
                "GET /groups/{groupId}/expenses",
                "POST /groups/{groupId}/expenses",
                "GET /groups/{groupId}/expenses/{expenseId}",
                "GET /expenses/categories",
                "GET /expenses/split-types",
                "POST /groups/{groupId}/receipts",
            ]
        );
    }

    #[test]
    fn base_path_prefixes_every_template() {
        let routes = api_routes("/prod");
        assert!(routes.entries().all(|(_, t)| t.starts_with("/prod/")));
        let hit = routes
            .dispatch(&Method::GET, "/prod/groups/g-1/expenses/e-9")
            .unwrap();
        assert_eq!(hit.params.get("groupId"), Some("g-1"));
        assert_eq!(hit.params.get("expenseId"), Some("e-9"));
        assert!(routes.dispatch(&Method::GET, "/groups/g-1").is_none());
    }
}
