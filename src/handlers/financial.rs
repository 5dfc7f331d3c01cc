use chrono::{SecondsFormat, Utc};
use uuid::Uuid;

use super::{ApiRequest, HandlerResult};
use crate::{
    AppState,
    enrich::{enrich, enrich_one},
    error::ApiError,
    models::{
        CreateExpenseRequest, Expense, GroupMember, Participant, ReceiptUploadRequest,
        ReceiptUploadResponse, UserView,
    },
    response::ApiResponse,
    storage::receipt_key,
    store::{
        KeyCondition, Query, from_document, from_documents, key,
        schema::{EXPENSES_BY_DATE_INDEX, MEMBERS_BY_GROUP_INDEX},
        to_document,
    },
};

pub const EXPENSE_CATEGORIES: &[&str] = &["FOOD"];
pub const SPLIT_TYPES: &[&str] = &["PERCENTAGE"];

const GROUP_ID: (&str, &str) = ("groupId", "Group ID");
const EXPENSE_ID: (&str, &str) = ("expenseId", "Expense ID");

/// list_groups
///
/// [Authenticated] The caller's group memberships.
#[utoipa::path(
    get,
    path = "/groups",
    responses(
        (status = 200, description = "Groups of the caller", body = [GroupMember]),
        (status = 403, description = "Missing or invalid identity")
    )
)]
pub async fn list_groups(state: AppState, req: ApiRequest) -> HandlerResult {
    let caller = req.identity()?;
    let table = &state.tables.group_members;

    let docs = state
        .store
        .query(table, Query::on_table(KeyCondition::eq("userId", caller.subject_id.as_str())))
        .await?;
    let groups: Vec<GroupMember> = from_documents(table, docs)?;

    tracing::info!(user = %caller.subject_id, count = groups.len(), "listed groups");
    ApiResponse::ok(&groups)
}

/// get_group
///
/// [Authenticated] The caller's membership of one group. A group the caller does
/// not belong to is reported as not found.
#[utoipa::path(
    get,
    path = "/groups/{groupId}",
    params(("groupId" = String, Path, description = "Group identifier")),
    responses(
        (status = 200, description = "Membership", body = GroupMember),
        (status = 403, description = "Missing or invalid identity"),
        (status = 404, description = "Group not found")
    )
)]
pub async fn get_group(state: AppState, req: ApiRequest) -> HandlerResult {
    let caller = req.identity()?;
    let group_id = req.param(GROUP_ID.0, GROUP_ID.1)?;
    let table = &state.tables.group_members;

    let doc = state
        .store
        .get(
            table,
            key([("userId", caller.subject_id.as_str()), ("groupId", group_id)]),
        )
        .await?
        .ok_or_else(|| ApiError::not_found("Group not found"))?;

    let group: GroupMember = from_document(table, doc)?;
    ApiResponse::ok(&group)
}

/// list_group_users
///
/// Members of a group, each with its resolved user.
#[utoipa::path(
    get,
    path = "/groups/{groupId}/users",
    params(("groupId" = String, Path, description = "Group identifier")),
    responses(
        (status = 200, description = "Members with user details", body = [GroupMember]),
        (status = 500, description = "Store failure")
    )
)]
pub async fn list_group_users(state: AppState, req: ApiRequest) -> HandlerResult {
    let group_id = req.param(GROUP_ID.0, GROUP_ID.1)?;
    let table = &state.tables.group_members;

    let docs = state
        .store
        .query(
            table,
            Query::on_index(MEMBERS_BY_GROUP_INDEX, KeyCondition::eq("groupId", group_id)),
        )
        .await?;
    let mut members: Vec<GroupMember> = from_documents(table, docs)?;

    let summary = enrich(&mut members, &state.user_directory()).await?;
    tracing::info!(
        group = group_id,
        count = members.len(),
        users_requested = summary.requested,
        users_resolved = summary.resolved,
        "listed group users"
    );
    ApiResponse::ok(&members)
}

/// list_group_expenses
///
/// Expenses of a group, most recent `dateTime` first, enriched with payer,
/// creator and participant users. The store's order is returned as-is.
#[utoipa::path(
    get,
    path = "/groups/{groupId}/expenses",
    params(("groupId" = String, Path, description = "Group identifier")),
    responses(
        (status = 200, description = "Expenses, newest first", body = [Expense]),
        (status = 500, description = "Store failure")
    )
)]
pub async fn list_group_expenses(state: AppState, req: ApiRequest) -> HandlerResult {
    let group_id = req.param(GROUP_ID.0, GROUP_ID.1)?;
    let table = &state.tables.expenses;

    let docs = state
        .store
        .query(
            table,
            Query::on_index(EXPENSES_BY_DATE_INDEX, KeyCondition::eq("groupId", group_id))
                .descending(),
        )
        .await?;
    let mut expenses: Vec<Expense> = from_documents(table, docs)?;

    let summary = enrich(&mut expenses, &state.user_directory()).await?;
    tracing::info!(
        group = group_id,
        count = expenses.len(),
        users_requested = summary.requested,
        users_resolved = summary.resolved,
        "listed group expenses"
    );
    ApiResponse::ok(&expenses)
}

/// create_expense
///
/// [Authenticated] Records a new expense in the group from the path. The server
/// assigns the id, the creator (the caller) and the creation time. The stored
/// record is returned without user enrichment.
#[utoipa::path(
    post,
    path = "/groups/{groupId}/expenses",
    params(("groupId" = String, Path, description = "Group identifier")),
    request_body = CreateExpenseRequest,
    responses(
        (status = 201, description = "Expense created", body = Expense),
        (status = 400, description = "Invalid expense"),
        (status = 403, description = "Missing or invalid identity")
    )
)]
pub async fn create_expense(state: AppState, req: ApiRequest) -> HandlerResult {
    let caller = req.identity()?;
    let group_id = req.param(GROUP_ID.0, GROUP_ID.1)?;
    let payload: CreateExpenseRequest = req.json()?;

    if payload.paid_by.trim().is_empty() {
        return Err(ApiError::validation("Payer is missing"));
    }
    if payload.participants.iter().any(|p| p.user_id.trim().is_empty()) {
        return Err(ApiError::validation("Participant user ID is missing"));
    }

    let expense = Expense {
        expense_id: Uuid::new_v4().to_string(),
        group_id: group_id.to_string(),
        title: payload.title,
        category: payload.category,
        amount: payload.amount,
        date_time: payload.date_time,
        paid_by: payload.paid_by,
        image_url: payload.image_url,
        split_type: payload.split_type,
        participants: payload
            .participants
            .into_iter()
            .map(|p| Participant {
                user: UserView::default(),
                ..p
            })
            .collect(),
        paid_by_user: UserView::default(),
        created_by: caller.subject_id.clone(),
        created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        created_by_user: UserView::default(),
    };

    let table = &state.tables.expenses;
    state.store.put(table, to_document(table, &expense)?).await?;

    tracing::info!(
        group = group_id,
        expense = %expense.expense_id,
        user = %caller.subject_id,
        "expense created"
    );
    ApiResponse::created(&expense)
}

/// get_expense
///
/// One expense, enriched.
#[utoipa::path(
    get,
    path = "/groups/{groupId}/expenses/{expenseId}",
    params(
        ("groupId" = String, Path, description = "Group identifier"),
        ("expenseId" = String, Path, description = "Expense identifier")
    ),
    responses(
        (status = 200, description = "Expense", body = Expense),
        (status = 404, description = "Expense not found")
    )
)]
pub async fn get_expense(state: AppState, req: ApiRequest) -> HandlerResult {
    let group_id = req.param(GROUP_ID.0, GROUP_ID.1)?;
    let expense_id = req.param(EXPENSE_ID.0, EXPENSE_ID.1)?;
    let table = &state.tables.expenses;

    let doc = state
        .store
        .get(table, key([("groupId", group_id), ("expenseId", expense_id)]))
        .await?
        .ok_or_else(|| ApiError::not_found("Expense not found"))?;

    let mut expense: Expense = from_document(table, doc)?;
    enrich_one(&mut expense, &state.user_directory()).await?;
    ApiResponse::ok(&expense)
}

/// list_categories
#[utoipa::path(
    get,
    path = "/expenses/categories",
    responses((status = 200, description = "Expense categories", body = [String]))
)]
pub async fn list_categories(_state: AppState, _req: ApiRequest) -> HandlerResult {
    ApiResponse::ok(EXPENSE_CATEGORIES)
}

/// list_split_types
#[utoipa::path(
    get,
    path = "/expenses/split-types",
    responses((status = 200, description = "Split types", body = [String]))
)]
pub async fn list_split_types(_state: AppState, _req: ApiRequest) -> HandlerResult {
    ApiResponse::ok(SPLIT_TYPES)
}

/// create_receipt_upload
///
/// [Authenticated] A short-lived URL the client PUTs a receipt image to. The
/// returned `resourceKey` goes into the expense's `imageUrl`.
#[utoipa::path(
    post,
    path = "/groups/{groupId}/receipts",
    params(("groupId" = String, Path, description = "Group identifier")),
    request_body = ReceiptUploadRequest,
    responses(
        (status = 200, description = "Upload URL", body = ReceiptUploadResponse),
        (status = 400, description = "Not an image"),
        (status = 403, description = "Missing or invalid identity")
    )
)]
pub async fn create_receipt_upload(state: AppState, req: ApiRequest) -> HandlerResult {
    let caller = req.identity()?;
    let group_id = req.param(GROUP_ID.0, GROUP_ID.1)?;
    let payload: ReceiptUploadRequest = req.json()?;

    if payload.filename.trim().is_empty() {
        return Err(ApiError::validation("Filename is missing"));
    }
    if !payload.file_type.starts_with("image/") {
        return Err(ApiError::validation("Receipts must be images"));
    }

    let resource_key = receipt_key(group_id, &payload.filename);
    let upload_url = state
        .storage
        .get_presigned_upload_url(&resource_key, &payload.file_type)
        .await
        .map_err(ApiError::Storage)?;

    tracing::info!(group = group_id, user = %caller.subject_id, key = %resource_key, "receipt upload url issued");
    ApiResponse::ok(&ReceiptUploadResponse {
        upload_url,
        resource_key,
    })
}
