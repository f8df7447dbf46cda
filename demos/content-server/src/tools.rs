//! Content tools exposed over MCP

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use cms_mcp_server::{
    FieldSchema, LoggingLevel, McpError, McpResult, NoParams, ParamSchema, ToolContext,
    ToolParams, TypedTool, Violation,
};

use crate::store::{ContentStore, EntryChanges, EntryStatus, NewEntry};

fn to_payload<T: serde::Serialize>(value: &T) -> McpResult<Value> {
    Ok(serde_json::to_value(value)?)
}

pub struct ListSections {
    store: Arc<ContentStore>,
}

impl ListSections {
    pub fn new(store: Arc<ContentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl TypedTool for ListSections {
    type Params = NoParams;

    fn name(&self) -> &str {
        "list_sections"
    }

    fn description(&self) -> &str {
        "List sections and the fields their entries carry"
    }

    async fn execute(&self, _params: NoParams, _ctx: &ToolContext) -> McpResult<Value> {
        Ok(json!({ "sections": to_payload(&self.store.sections().await)? }))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListEntriesParams {
    section_id: Option<i64>,
    status: Option<String>,
}

impl ToolParams for ListEntriesParams {
    fn schema() -> ParamSchema {
        ParamSchema::new()
            .field(FieldSchema::integer("sectionId").minimum(1))
            .field(FieldSchema::one_of("status", ["draft", "live"]))
    }
}

pub struct ListEntries {
    store: Arc<ContentStore>,
}

impl ListEntries {
    pub fn new(store: Arc<ContentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl TypedTool for ListEntries {
    type Params = ListEntriesParams;

    fn name(&self) -> &str {
        "list_entries"
    }

    fn description(&self) -> &str {
        "List entries, optionally by section and status"
    }

    async fn execute(&self, params: ListEntriesParams, _ctx: &ToolContext) -> McpResult<Value> {
        let status = params.status.as_deref().and_then(EntryStatus::parse);
        let entries = self.store.list_entries(params.section_id, status).await?;
        Ok(json!({ "entries": to_payload(&entries)?, "total": entries.len() }))
    }
}

#[derive(Debug, Deserialize)]
pub struct EntryIdParams {
    id: i64,
}

impl ToolParams for EntryIdParams {
    fn schema() -> ParamSchema {
        ParamSchema::new().field(
            FieldSchema::integer("id")
                .required()
                .minimum(1)
                .description("Entry id"),
        )
    }
}

pub struct GetEntry {
    store: Arc<ContentStore>,
}

impl GetEntry {
    pub fn new(store: Arc<ContentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl TypedTool for GetEntry {
    type Params = EntryIdParams;

    fn name(&self) -> &str {
        "get_entry"
    }

    fn description(&self) -> &str {
        "Fetch one entry with its field values"
    }

    async fn execute(&self, params: EntryIdParams, _ctx: &ToolContext) -> McpResult<Value> {
        to_payload(&self.store.get_entry(params.id).await?)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEntryParams {
    section_id: i64,
    title: String,
    slug: Option<String>,
    #[serde(default)]
    fields: Map<String, Value>,
}

impl ToolParams for CreateEntryParams {
    fn schema() -> ParamSchema {
        ParamSchema::new()
            .field(FieldSchema::integer("sectionId").required().minimum(1))
            .field(FieldSchema::string("title").required().min_length(1).max_length(200))
            .field(
                FieldSchema::string("slug")
                    .max_length(120)
                    .description("Defaults to the title in lowercase-dash form"),
            )
            .field(FieldSchema::object("fields").description("Field values keyed by handle"))
            .deny_unknown_fields()
    }

    fn validate(&self) -> Vec<Violation> {
        match &self.slug {
            Some(slug)
                if !slug
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') =>
            {
                vec![Violation::new("slug", "may only contain a-z, 0-9 and '-'")]
            }
            _ => Vec::new(),
        }
    }
}

pub struct CreateEntry {
    store: Arc<ContentStore>,
}

impl CreateEntry {
    pub fn new(store: Arc<ContentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl TypedTool for CreateEntry {
    type Params = CreateEntryParams;

    fn name(&self) -> &str {
        "create_entry"
    }

    fn description(&self) -> &str {
        "Create an entry in a section; new entries start as drafts"
    }

    async fn execute(&self, params: CreateEntryParams, ctx: &ToolContext) -> McpResult<Value> {
        let entry = self
            .store
            .create_entry(NewEntry {
                section_id: params.section_id,
                title: params.title,
                slug: params.slug,
                fields: params.fields,
            })
            .await?;
        ctx.log(
            LoggingLevel::Info,
            json!({ "created": entry.id, "slug": entry.slug }),
        )
        .await;
        to_payload(&entry)
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateEntryParams {
    id: i64,
    title: Option<String>,
    slug: Option<String>,
    fields: Option<Map<String, Value>>,
}

impl ToolParams for UpdateEntryParams {
    fn schema() -> ParamSchema {
        ParamSchema::new()
            .field(FieldSchema::integer("id").required().minimum(1))
            .field(FieldSchema::string("title").min_length(1).max_length(200))
            .field(FieldSchema::string("slug").min_length(1).max_length(120))
            .field(FieldSchema::object("fields"))
            .deny_unknown_fields()
    }

    fn validate(&self) -> Vec<Violation> {
        if self.title.is_none() && self.slug.is_none() && self.fields.is_none() {
            return vec![Violation::new(
                "(arguments)",
                "at least one of title, slug or fields is required",
            )];
        }
        Vec::new()
    }
}

pub struct UpdateEntry {
    store: Arc<ContentStore>,
}

impl UpdateEntry {
    pub fn new(store: Arc<ContentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl TypedTool for UpdateEntry {
    type Params = UpdateEntryParams;

    fn name(&self) -> &str {
        "update_entry"
    }

    fn description(&self) -> &str {
        "Change an entry's title, slug or field values in place"
    }

    async fn execute(&self, params: UpdateEntryParams, _ctx: &ToolContext) -> McpResult<Value> {
        let entry = self
            .store
            .update_entry(
                params.id,
                EntryChanges {
                    title: params.title,
                    slug: params.slug,
                    fields: params.fields,
                },
            )
            .await?;
        to_payload(&entry)
    }
}

pub struct DeleteEntry {
    store: Arc<ContentStore>,
}

impl DeleteEntry {
    pub fn new(store: Arc<ContentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl TypedTool for DeleteEntry {
    type Params = EntryIdParams;

    fn name(&self) -> &str {
        "delete_entry"
    }

    fn description(&self) -> &str {
        "Delete an entry and any drafts pending for it"
    }

    async fn execute(&self, params: EntryIdParams, _ctx: &ToolContext) -> McpResult<Value> {
        let (entry, drafts) = self.store.delete_entry(params.id).await?;
        Ok(json!({ "deleted": entry.id, "draftsDiscarded": drafts }))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDraftParams {
    entry_id: i64,
    title: Option<String>,
    #[serde(default)]
    fields: Map<String, Value>,
}

impl ToolParams for CreateDraftParams {
    fn schema() -> ParamSchema {
        ParamSchema::new()
            .field(FieldSchema::integer("entryId").required().minimum(1))
            .field(FieldSchema::string("title").min_length(1).max_length(200))
            .field(FieldSchema::object("fields"))
            .deny_unknown_fields()
    }
}

pub struct CreateDraft {
    store: Arc<ContentStore>,
}

impl CreateDraft {
    pub fn new(store: Arc<ContentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl TypedTool for CreateDraft {
    type Params = CreateDraftParams;

    fn name(&self) -> &str {
        "create_draft"
    }

    fn description(&self) -> &str {
        "Stage changes to an entry without touching the live version"
    }

    async fn execute(&self, params: CreateDraftParams, _ctx: &ToolContext) -> McpResult<Value> {
        let draft = self
            .store
            .create_draft(params.entry_id, params.title, params.fields)
            .await?;
        to_payload(&draft)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishDraftParams {
    draft_id: i64,
}

impl ToolParams for PublishDraftParams {
    fn schema() -> ParamSchema {
        ParamSchema::new().field(FieldSchema::integer("draftId").required().minimum(1))
    }
}

pub struct PublishDraft {
    store: Arc<ContentStore>,
}

impl PublishDraft {
    pub fn new(store: Arc<ContentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl TypedTool for PublishDraft {
    type Params = PublishDraftParams;

    fn name(&self) -> &str {
        "publish_draft"
    }

    fn description(&self) -> &str {
        "Apply a draft to its entry and make the entry live"
    }

    async fn execute(&self, params: PublishDraftParams, ctx: &ToolContext) -> McpResult<Value> {
        let draft = self.store.get_draft(params.draft_id).await?;
        ctx.notify_progress(
            1.0,
            Some(2.0),
            Some(&format!(
                "Applying {} field(s) to entry {}",
                draft.fields.len(),
                draft.entry_id
            )),
        )
        .await;
        ctx.log(
            LoggingLevel::Notice,
            json!({ "publishing": draft.id, "entry": draft.entry_id }),
        )
        .await;

        let entry = self.store.publish_draft(params.draft_id).await.map_err(|e| {
            if let McpError::NotFound { .. } = e {
                // published concurrently by another session
                McpError::validation(format!("Draft {} is no longer pending", params.draft_id))
            } else {
                e
            }
        })?;

        ctx.notify_progress(2.0, Some(2.0), Some("Published")).await;
        to_payload(&entry)
    }
}
