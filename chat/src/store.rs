use crate::cache::CacheSnapshot;
use crate::message::ChatMessage;
use crate::message::MessagePatch;
use datapillar_api::WorkflowGraph;
use serde_json::Value;

/// Conversation state for one chat session. Every mutation goes through a
/// method here so that snapshotting and hydration see a consistent view.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatStore {
    messages: Vec<ChatMessage>,
    workflow: Option<WorkflowGraph>,
    last_prompt: Option<String>,
    is_initialized: bool,
    viewport: Option<Value>,
    selected_model_id: Option<String>,
    default_model_id: Option<String>,
}

impl ChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn message(&self, id: &str) -> Option<&ChatMessage> {
        self.messages.iter().find(|message| message.id == id)
    }

    pub fn workflow(&self) -> Option<&WorkflowGraph> {
        self.workflow.as_ref()
    }

    pub fn last_prompt(&self) -> Option<&str> {
        self.last_prompt.as_deref()
    }

    pub fn is_initialized(&self) -> bool {
        self.is_initialized
    }

    pub fn viewport(&self) -> Option<&Value> {
        self.viewport.as_ref()
    }

    pub fn selected_model_id(&self) -> Option<&str> {
        self.selected_model_id.as_deref()
    }

    pub fn default_model_id(&self) -> Option<&str> {
        self.default_model_id.as_deref()
    }

    /// Model sent with the next request: the user's choice, else the default.
    pub fn effective_model_id(&self) -> Option<&str> {
        self.selected_model_id().or(self.default_model_id())
    }

    /// No messages, no workflow and no last prompt.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.workflow.is_none() && self.last_prompt.is_none()
    }

    pub fn add_message(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Replaces the message `id` with `f(current)`. Returns `false` and leaves
    /// the store untouched when no such message exists.
    pub fn update_message<F>(&mut self, id: &str, f: F) -> bool
    where
        F: FnOnce(&ChatMessage) -> ChatMessage,
    {
        let Some(slot) = self.messages.iter_mut().find(|message| message.id == id) else {
            return false;
        };
        let mut next = f(&*slot);
        next.id = slot.id.clone();
        *slot = next;
        true
    }

    pub fn patch_message(&mut self, id: &str, patch: MessagePatch) -> bool {
        self.update_message(id, |message| patch.apply(message))
    }

    pub fn set_workflow(&mut self, workflow: WorkflowGraph) {
        self.workflow = Some(workflow);
    }

    pub fn set_last_prompt(&mut self, prompt: impl Into<String>) {
        self.last_prompt = Some(prompt.into());
    }

    pub fn mark_initialized(&mut self) {
        self.is_initialized = true;
    }

    pub fn set_viewport(&mut self, viewport: Option<Value>) {
        self.viewport = viewport;
    }

    pub fn set_selected_model_id(&mut self, model_id: Option<String>) {
        self.selected_model_id = model_id;
    }

    pub fn set_default_model_id(&mut self, model_id: Option<String>) {
        self.default_model_id = model_id;
    }

    /// Restores a cached snapshot, but only into an empty store so that live
    /// state is never overwritten by a stale cache.
    pub fn hydrate_from_cache(&mut self, snapshot: CacheSnapshot) -> bool {
        if !self.is_empty() {
            return false;
        }
        let CacheSnapshot {
            messages,
            workflow,
            last_prompt,
            is_initialized,
            viewport,
            selected_model_id,
            default_model_id,
        } = snapshot;
        self.messages = messages;
        self.workflow = workflow;
        self.last_prompt = last_prompt;
        self.is_initialized = is_initialized;
        self.viewport = viewport;
        if selected_model_id.is_some() {
            self.selected_model_id = selected_model_id;
        }
        if default_model_id.is_some() {
            self.default_model_id = default_model_id;
        }
        true
    }

    /// Clears the conversation. The model selection carries over.
    pub fn reset(&mut self) {
        *self = Self {
            selected_model_id: self.selected_model_id.take(),
            default_model_id: self.default_model_id.take(),
            ..Self::default()
        };
    }

    pub fn snapshot(&self) -> CacheSnapshot {
        CacheSnapshot {
            messages: self.messages.clone(),
            workflow: self.workflow.clone(),
            last_prompt: self.last_prompt.clone(),
            is_initialized: self.is_initialized,
            viewport: self.viewport.clone(),
            selected_model_id: self.selected_model_id.clone(),
            default_model_id: self.default_model_id.clone(),
        }
    }
}
