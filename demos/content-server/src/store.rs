//! In-memory content model: sections, entries and drafts

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use cms_mcp_server::{McpError, McpResult};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDefinition {
    pub handle: String,
    pub required: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub id: i64,
    pub handle: String,
    pub name: String,
    pub fields: Vec<FieldDefinition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Draft,
    Live,
}

impl EntryStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(Self::Draft),
            "live" => Some(Self::Live),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub id: i64,
    pub section_id: i64,
    pub title: String,
    pub slug: String,
    pub status: EntryStatus,
    pub fields: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Draft {
    pub id: i64,
    pub entry_id: i64,
    pub title: Option<String>,
    pub fields: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct NewEntry {
    pub section_id: i64,
    pub title: String,
    pub slug: Option<String>,
    pub fields: Map<String, Value>,
}

#[derive(Debug, Default)]
pub struct EntryChanges {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub fields: Option<Map<String, Value>>,
}

#[derive(Default)]
struct Content {
    sections: BTreeMap<i64, Section>,
    entries: BTreeMap<i64, Entry>,
    drafts: BTreeMap<i64, Draft>,
    next_entry_id: i64,
    next_draft_id: i64,
}

impl Content {
    fn section(&self, id: i64) -> McpResult<&Section> {
        self.sections
            .get(&id)
            .ok_or_else(|| McpError::not_found("Section", id))
    }

    fn check_slug(&self, section_id: i64, slug: &str, except: Option<i64>) -> McpResult<()> {
        let taken = self.entries.values().any(|e| {
            e.section_id == section_id && e.slug == slug && Some(e.id) != except
        });
        if taken {
            return Err(McpError::validation(format!(
                "Slug '{}' is already used in section {}",
                slug, section_id
            )));
        }
        Ok(())
    }
}

/// Lowercase, dash-separated form of a title
pub fn slugify(title: &str) -> String {
    title
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

fn check_required(section: &Section, fields: &Map<String, Value>) -> McpResult<()> {
    let missing: Vec<&str> = section
        .fields
        .iter()
        .filter(|f| f.required && fields.get(&f.handle).is_none_or(Value::is_null))
        .map(|f| f.handle.as_str())
        .collect();
    if missing.is_empty() {
        return Ok(());
    }
    Err(McpError::validation(format!(
        "Section '{}' requires field(s): {}",
        section.handle,
        missing.join(", ")
    )))
}

fn check_known(section: &Section, fields: &Map<String, Value>) -> McpResult<()> {
    if let Some(unknown) = fields
        .keys()
        .find(|k| !section.fields.iter().any(|f| &f.handle == *k))
    {
        return Err(McpError::validation(format!(
            "Section '{}' has no field '{}'",
            section.handle, unknown
        )));
    }
    Ok(())
}

pub struct ContentStore {
    content: RwLock<Content>,
}

impl ContentStore {
    fn from_content(content: Content) -> Self {
        Self {
            content: RwLock::new(Content {
                next_entry_id: content.next_entry_id.max(1),
                next_draft_id: content.next_draft_id.max(1),
                ..content
            }),
        }
    }

    /// Two sections and one published entry
    pub fn with_sample_content() -> Self {
        let field = |handle: &str, required: bool| FieldDefinition {
            handle: handle.to_string(),
            required,
        };
        let mut content = Content::default();
        content.sections.insert(
            1,
            Section {
                id: 1,
                handle: "news".into(),
                name: "News".into(),
                fields: vec![field("body", true), field("summary", false)],
            },
        );
        content.sections.insert(
            2,
            Section {
                id: 2,
                handle: "pages".into(),
                name: "Pages".into(),
                fields: vec![field("body", true), field("heroImage", false)],
            },
        );

        let now = Utc::now();
        let mut fields = Map::new();
        fields.insert("body".into(), Value::String("Hello from the CMS.".into()));
        content.entries.insert(
            1,
            Entry {
                id: 1,
                section_id: 1,
                title: "Welcome".into(),
                slug: "welcome".into(),
                status: EntryStatus::Live,
                fields,
                created_at: now,
                updated_at: now,
            },
        );
        content.next_entry_id = 2;
        Self::from_content(content)
    }

    pub async fn section_count(&self) -> usize {
        self.content.read().await.sections.len()
    }

    pub async fn entry_count(&self) -> usize {
        self.content.read().await.entries.len()
    }

    pub async fn sections(&self) -> Vec<Section> {
        self.content.read().await.sections.values().cloned().collect()
    }

    pub async fn list_entries(
        &self,
        section_id: Option<i64>,
        status: Option<EntryStatus>,
    ) -> McpResult<Vec<Entry>> {
        let content = self.content.read().await;
        if let Some(id) = section_id {
            content.section(id)?;
        }
        Ok(content
            .entries
            .values()
            .filter(|e| section_id.is_none_or(|id| e.section_id == id))
            .filter(|e| status.is_none_or(|s| e.status == s))
            .cloned()
            .collect())
    }

    pub async fn get_entry(&self, id: i64) -> McpResult<Entry> {
        self.content
            .read()
            .await
            .entries
            .get(&id)
            .cloned()
            .ok_or_else(|| McpError::not_found("Entry", id))
    }

    pub async fn create_entry(&self, new: NewEntry) -> McpResult<Entry> {
        let mut content = self.content.write().await;
        let section = content.section(new.section_id)?;
        check_known(section, &new.fields)?;
        check_required(section, &new.fields)?;

        let slug = new.slug.unwrap_or_else(|| slugify(&new.title));
        if slug.is_empty() {
            return Err(McpError::validation("Slug cannot be empty"));
        }
        content.check_slug(new.section_id, &slug, None)?;

        let now = Utc::now();
        let entry = Entry {
            id: content.next_entry_id,
            section_id: new.section_id,
            title: new.title,
            slug,
            status: EntryStatus::Draft,
            fields: new.fields,
            created_at: now,
            updated_at: now,
        };
        content.next_entry_id += 1;
        content.entries.insert(entry.id, entry.clone());
        Ok(entry)
    }

    pub async fn update_entry(&self, id: i64, changes: EntryChanges) -> McpResult<Entry> {
        let mut content = self.content.write().await;
        let current = content
            .entries
            .get(&id)
            .cloned()
            .ok_or_else(|| McpError::not_found("Entry", id))?;
        let section = content.section(current.section_id)?;

        let mut updated = current;
        if let Some(fields) = changes.fields {
            check_known(section, &fields)?;
            updated.fields.extend(fields);
            check_required(section, &updated.fields)?;
        }
        if let Some(title) = changes.title {
            updated.title = title;
        }
        if let Some(slug) = changes.slug {
            content.check_slug(updated.section_id, &slug, Some(id))?;
            updated.slug = slug;
        }
        updated.updated_at = Utc::now();
        content.entries.insert(id, updated.clone());
        Ok(updated)
    }

    /// Removes the entry and its pending drafts
    pub async fn delete_entry(&self, id: i64) -> McpResult<(Entry, usize)> {
        let mut content = self.content.write().await;
        let entry = content
            .entries
            .remove(&id)
            .ok_or_else(|| McpError::not_found("Entry", id))?;
        let before = content.drafts.len();
        content.drafts.retain(|_, d| d.entry_id != id);
        let dropped = before - content.drafts.len();
        Ok((entry, dropped))
    }

    pub async fn create_draft(
        &self,
        entry_id: i64,
        title: Option<String>,
        fields: Map<String, Value>,
    ) -> McpResult<Draft> {
        let mut content = self.content.write().await;
        let entry = content
            .entries
            .get(&entry_id)
            .ok_or_else(|| McpError::not_found("Entry", entry_id))?;
        check_known(content.section(entry.section_id)?, &fields)?;

        let draft = Draft {
            id: content.next_draft_id,
            entry_id,
            title,
            fields,
            created_at: Utc::now(),
        };
        content.next_draft_id += 1;
        content.drafts.insert(draft.id, draft.clone());
        Ok(draft)
    }

    pub async fn get_draft(&self, id: i64) -> McpResult<Draft> {
        self.content
            .read()
            .await
            .drafts
            .get(&id)
            .cloned()
            .ok_or_else(|| McpError::not_found("Draft", id))
    }

    /// Apply a draft to its entry and make the entry live
    pub async fn publish_draft(&self, draft_id: i64) -> McpResult<Entry> {
        let mut content = self.content.write().await;
        let draft = content
            .drafts
            .get(&draft_id)
            .cloned()
            .ok_or_else(|| McpError::not_found("Draft", draft_id))?;
        let mut entry = content
            .entries
            .get(&draft.entry_id)
            .cloned()
            .ok_or_else(|| McpError::tool_execution(format!(
                "Draft {} belongs to missing entry {}",
                draft_id, draft.entry_id
            )))?;

        entry.fields.extend(draft.fields);
        check_required(content.section(entry.section_id)?, &entry.fields)?;
        if let Some(title) = draft.title {
            entry.title = title;
        }
        entry.status = EntryStatus::Live;
        entry.updated_at = Utc::now();

        content.drafts.remove(&draft_id);
        content.entries.insert(entry.id, entry.clone());
        Ok(entry)
    }
}
