use chrono::{DateTime, Duration, SecondsFormat, Utc};
use uuid::Uuid;

use super::{ApiRequest, HandlerResult};
use crate::{
    AppState,
    assistant::TextCommand,
    error::ApiError,
    models::{ASSISTANT_USERNAME, ChatMessage, PostMessageRequest, ROLE_ASSISTANT, ROLE_USER},
    response::ApiResponse,
    store::{KeyCondition, Query, from_documents, to_document},
};

/// Chat timestamps double as sort keys, so they carry microseconds.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// list_messages
///
/// [Authenticated] The caller's conversation, oldest first, as the store
/// returns it.
#[utoipa::path(
    get,
    path = "/messages",
    responses(
        (status = 200, description = "Chat history", body = [ChatMessage]),
        (status = 403, description = "Missing or invalid identity")
    )
)]
pub async fn list_messages(state: AppState, req: ApiRequest) -> HandlerResult {
    let caller = req.identity()?;
    let table = &state.tables.messages;

    let docs = state
        .store
        .query(table, Query::on_table(KeyCondition::eq("userId", caller.subject_id.as_str())))
        .await?;
    let messages: Vec<ChatMessage> = from_documents(table, docs)?;

    tracing::info!(user = %caller.subject_id, count = messages.len(), "listed chat messages");
    ApiResponse::ok(&messages)
}

/// post_message
///
/// [Authenticated] Stores the caller's message, forwards it to the assistant and
/// stores the reply. Responds 201 with both messages, user message first.
///
/// The reply's `createdAt` is kept strictly after the user message's so the two
/// never share a sort key.
#[utoipa::path(
    post,
    path = "/messages",
    request_body = PostMessageRequest,
    responses(
        (status = 201, description = "User message and assistant reply", body = [ChatMessage]),
        (status = 400, description = "Empty or unparseable message"),
        (status = 403, description = "Missing or invalid identity"),
        (status = 500, description = "Store or assistant failure")
    )
)]
pub async fn post_message(state: AppState, req: ApiRequest) -> HandlerResult {
    let caller = req.identity()?;
    let payload: PostMessageRequest = req.json()?;
    if payload.content.trim().is_empty() {
        return Err(ApiError::validation("Message content is missing"));
    }
    let table = &state.tables.messages;

    let sent_at = Utc::now();
    let user_message = ChatMessage {
        id: Uuid::new_v4().to_string(),
        user_id: caller.subject_id.clone(),
        username: caller.display_name.clone(),
        role: ROLE_USER.to_string(),
        content: payload.content,
        created_at: timestamp(sent_at),
    };
    state
        .store
        .put(table, to_document(table, &user_message)?)
        .await?;

    let command = TextCommand {
        id: caller.subject_id.clone(),
        username: caller.display_name.clone(),
        content: user_message.content.clone(),
    };
    let reply = state.assistant.send_text_command(&command).await?;

    let replied_at = Utc::now().max(sent_at + Duration::microseconds(1));
    let assistant_message = ChatMessage {
        id: Uuid::new_v4().to_string(),
        user_id: caller.subject_id.clone(),
        username: ASSISTANT_USERNAME.to_string(),
        role: ROLE_ASSISTANT.to_string(),
        content: reply,
        created_at: timestamp(replied_at),
    };
    state
        .store
        .put(table, to_document(table, &assistant_message)?)
        .await?;

    tracing::info!(user = %caller.subject_id, "chat message answered");
    ApiResponse::created(&[user_message, assistant_message])
}
