use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::engine::RunError;
use crate::protocol::InputSchema;
use crate::sdk::RunContext;

pub type WorkflowHandler =
    Arc<dyn Fn(RunContext) -> BoxFuture<'static, Result<(), RunError>> + Send + Sync>;

/// Lowercases `title` and collapses every run of characters outside
/// `[a-z0-9]` into a single `-`, trimming dashes at either end.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;

    for c in title.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }

    slug
}

#[derive(Clone)]
pub struct WorkflowDefinition {
    pub slug: String,
    pub title: String,
    pub description: Option<String>,
    /// Fields collected before the handler starts, unless the run is
    /// started with prefilled data.
    pub input: Option<InputSchema>,
    handler: WorkflowHandler,
}

impl WorkflowDefinition {
    pub fn new<F, Fut>(title: impl Into<String>, handler: F) -> Self
    where
        F: Fn(RunContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), RunError>> + Send + 'static,
    {
        let title = title.into();
        Self {
            slug: slugify(&title),
            title,
            description: None,
            input: None,
            handler: Arc::new(move |ctx| handler(ctx).boxed()),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_input(mut self, schema: InputSchema) -> Self {
        self.input = Some(schema);
        self
    }

    pub fn meta(&self) -> WorkflowMeta {
        WorkflowMeta {
            slug: self.slug.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            input: self.input.clone(),
        }
    }

    pub(crate) fn call(&self, ctx: RunContext) -> BoxFuture<'static, Result<(), RunError>> {
        (self.handler)(ctx)
    }
}

impl std::fmt::Debug for WorkflowDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowDefinition")
            .field("slug", &self.slug)
            .field("title", &self.title)
            .field("description", &self.description)
            .field("input", &self.input)
            .finish_non_exhaustive()
    }
}

/// Public listing entry for a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowMeta {
    pub slug: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<InputSchema>,
}

#[derive(Debug, Clone, Default)]
pub struct WorkflowRegistry {
    workflows: HashMap<String, WorkflowDefinition>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `definition`, replacing any workflow with the same slug.
    pub fn register(&mut self, definition: WorkflowDefinition) {
        if self.workflows.contains_key(&definition.slug) {
            tracing::warn!(slug = %definition.slug, "Replacing registered workflow");
        }
        self.workflows.insert(definition.slug.clone(), definition);
    }

    pub fn with(mut self, definition: WorkflowDefinition) -> Self {
        self.register(definition);
        self
    }

    /// Looks up by slug; a title is accepted too since it slugifies to the same key.
    pub fn get(&self, name: &str) -> Option<&WorkflowDefinition> {
        self.workflows.get(&slugify(name))
    }

    /// All workflows, ordered by title.
    pub fn list(&self) -> Vec<WorkflowMeta> {
        let mut list: Vec<WorkflowMeta> = self.workflows.values().map(|w| w.meta()).collect();
        list.sort_by(|a, b| a.title.cmp(&b.title));
        list
    }

    pub fn len(&self) -> usize {
        self.workflows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }
}
