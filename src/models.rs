use serde::{Deserialize, Deserializer, Serialize, de::Error as _};
use serde_json::Number;
use ts_rs::TS;
use utoipa::ToSchema;

use crate::enrich::Enrichable;

// --- Shared Value Types ---

/// Numeric
///
/// Monetary amounts and percentage shares. Clients and older records send these
/// either as JSON numbers or as numeric strings (`"12.50"`); both are accepted and
/// the value is always written back as a JSON number.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Numeric(Number);

impl Default for Numeric {
    fn default() -> Self {
        Self(Number::from(0))
    }
}

impl From<u32> for Numeric {
    fn from(value: u32) -> Self {
        Self(Number::from(value))
    }
}

impl<'de> Deserialize<'de> for Numeric {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(Number),
            Text(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Number(n) => Ok(Self(n)),
            Repr::Text(s) => s
                .trim()
                .parse::<Number>()
                .map(Self)
                .map_err(|_| D::Error::custom(format!("invalid number: {s:?}"))),
        }
    }
}

// --- Core Application Schemas (Mapped to the Store) ---

/// UserView
///
/// The public projection of a user record from the users table. It is attached to
/// expenses and memberships during enrichment and is never written back with them.
/// `UserView::default()` is the zero view used for unresolved references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase", default)]
#[ts(export)]
pub struct UserView {
    pub user_id: String,
    pub username: String,
    /// Name shown in the UI.
    #[serde(rename = "showableName")]
    pub display_name: String,
    pub role: String,
}

/// Participant
///
/// One share of an expense. `user` is filled in by enrichment from `user_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase", default)]
#[ts(export)]
pub struct Participant {
    pub user_id: String,
    #[ts(type = "number")]
    #[schema(value_type = f64)]
    pub share: Numeric,
    pub user: UserView,
}

/// Expense
///
/// A record from the expenses table, keyed by `(group_id, expense_id)` and listed
/// through the `groupId-dateTime-index`. `paid_by_user`, `created_by_user` and each
/// participant's `user` exist only in responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase", default)]
#[ts(export)]
pub struct Expense {
    pub expense_id: String,
    pub group_id: String,
    pub title: String,
    pub category: String,
    #[ts(type = "number")]
    #[schema(value_type = f64)]
    pub amount: Numeric,
    /// When the expense happened (client-supplied, RFC 3339). Sort key of the date index.
    pub date_time: String,
    pub paid_by: String,
    pub image_url: String,
    pub split_type: String,
    pub participants: Vec<Participant>,
    pub paid_by_user: UserView,
    pub created_by: String,
    /// Server-assigned on creation.
    pub created_at: String,
    pub created_by_user: UserView,
}

impl Enrichable for Expense {
    fn collect_user_refs<'a>(&'a self, visit: &mut dyn FnMut(&'a str)) {
        visit(&self.paid_by);
        visit(&self.created_by);
        for participant in &self.participants {
            visit(&participant.user_id);
        }
    }

    fn attach_users(&mut self, resolve: &dyn Fn(&str) -> UserView) {
        self.paid_by_user = resolve(&self.paid_by);
        self.created_by_user = resolve(&self.created_by);
        for participant in &mut self.participants {
            participant.user = resolve(&participant.user_id);
        }
    }
}

/// GroupMember
///
/// Membership of a user in a splitter group, keyed by `(user_id, group_id)`.
/// `user` is only present on responses that were enriched (the group users listing).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase", default)]
#[ts(export)]
pub struct GroupMember {
    pub user_id: String,
    pub group_id: String,
    pub group_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserView>,
}

impl Enrichable for GroupMember {
    fn collect_user_refs<'a>(&'a self, visit: &mut dyn FnMut(&'a str)) {
        visit(&self.user_id);
    }

    fn attach_users(&mut self, resolve: &dyn Fn(&str) -> UserView) {
        self.user = Some(resolve(&self.user_id));
    }
}

/// ChatMessage
///
/// One line of a user's conversation with the assistant. Keyed by
/// `(user_id, created_at)`; `role` is `"user"` or `"assistant"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase", default)]
#[ts(export)]
pub struct ChatMessage {
    pub id: String,
    pub user_id: String,
    pub username: String,
    pub role: String,
    pub content: String,
    pub created_at: String,
}

pub const ROLE_USER: &str = "user";
pub const ROLE_ASSISTANT: &str = "assistant";
/// Author name stored on assistant replies.
pub const ASSISTANT_USERNAME: &str = "ai-assistant";

// --- Request Payloads (Input Schemas) ---

/// PostMessageRequest
///
/// Input payload for `POST /messages`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct PostMessageRequest {
    #[schema(example = "How much do I owe for the trip?")]
    pub content: String,
}

/// CreateExpenseRequest
///
/// Input payload for `POST /groups/{groupId}/expenses`. The group comes from the
/// path; id, creator and creation time are assigned by the server.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase", default)]
#[ts(export)]
pub struct CreateExpenseRequest {
    pub title: String,
    #[schema(example = "FOOD")]
    pub category: String,
    #[ts(type = "number")]
    #[schema(value_type = f64, example = 42.5)]
    pub amount: Numeric,
    #[schema(example = "2024-05-01T19:30:00Z")]
    pub date_time: String,
    pub paid_by: String,
    pub image_url: String,
    #[schema(example = "PERCENTAGE")]
    pub split_type: String,
    pub participants: Vec<Participant>,
}

/// ReceiptUploadRequest
///
/// Input payload for requesting a short-lived upload URL for an expense receipt
/// (`POST /groups/{groupId}/receipts`).
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, TS, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ReceiptUploadRequest {
    /// The original filename, used to derive the file extension.
    #[schema(example = "dinner.jpg")]
    pub filename: String,
    /// The MIME type the upload is constrained to.
    #[schema(example = "image/jpeg")]
    pub file_type: String,
}

/// ReceiptUploadResponse
///
/// The presigned PUT URL and the object key to store as the expense `imageUrl`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ReceiptUploadResponse {
    pub upload_url: String,
    pub resource_key: String,
}
