//! Per-task conversational memory.
//!
//! Every agent taking part in a discussion keeps its history in a [`Memory`]: an
//! ordered, capacity-bounded list of role-tagged [`Message`]s. Memories live in a
//! [`MemoryManager`] keyed by task identifier, and a [`TaskContext`] ties an agent
//! (or a scheduler) to one task identifier without any process-global state.
//!
//! # Example
//!
//! ```rust
//! use roundtable::memory::{MemoryManager, TaskContext};
//! use roundtable::{Message, Role};
//! use std::sync::Arc;
//!
//! let manager = Arc::new(MemoryManager::new());
//! let ctx = TaskContext::new(Arc::clone(&manager));
//!
//! ctx.memory().write().unwrap().append(Message::new(Role::User, "hello"));
//! assert_eq!(ctx.memory().read().unwrap().len(), 1);
//!
//! ctx.clear();
//! assert!(ctx.memory().read().unwrap().is_empty());
//! ```

use crate::client_wrapper::{Message, Role};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock};
use uuid::Uuid;

/// Number of messages a [`Memory`] keeps before evicting the oldest one.
pub const DEFAULT_MEMORY_CAPACITY: usize = 100;

/// Ordered, size-bounded message history.
///
/// Appending to a full memory drops the oldest message first (strict FIFO, no
/// summarisation), so the memory always holds the `capacity` most recent messages
/// in chronological order.
#[derive(Debug, Clone)]
pub struct Memory {
    history: VecDeque<Message>,
    capacity: usize,
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl Memory {
    /// Create an empty memory holding up to [`DEFAULT_MEMORY_CAPACITY`] messages.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MEMORY_CAPACITY)
    }

    /// Create an empty memory with a custom capacity (at least one message).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            history: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a message, evicting the oldest entry when the memory is full.
    pub fn append(&mut self, message: Message) {
        if self.history.len() >= self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(message);
    }

    /// Snapshot of the stored messages, oldest first.
    pub fn history(&self) -> Vec<Message> {
        self.history.iter().cloned().collect()
    }

    /// Iterate the stored messages, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.history.iter()
    }

    /// Messages written by the given role, oldest first.
    pub fn by_role(&self, role: Role) -> Vec<Message> {
        self.history
            .iter()
            .filter(|m| m.role == role)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }
}

/// A memory shared between an agent (reader + writer) and the scorer (reader).
pub type SharedMemory = Arc<RwLock<Memory>>;

/// Maps task identifiers to their [`Memory`].
///
/// Entries are created lazily by [`get_or_create`](MemoryManager::get_or_create) and
/// removed by [`clear_task`](MemoryManager::clear_task). The task map is guarded by a
/// read/write lock; writers to a single task's memory are serialised by the
/// scheduling layer (one in-flight execution per agent).
#[derive(Debug)]
pub struct MemoryManager {
    memories: RwLock<HashMap<String, SharedMemory>>,
    capacity: usize,
}

impl Default for MemoryManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryManager {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MEMORY_CAPACITY)
    }

    /// Create a manager whose memories hold up to `capacity` messages each.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            memories: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Return the memory for `task_id`, creating an empty one on first access.
    pub fn get_or_create(&self, task_id: &str) -> SharedMemory {
        {
            let memories = self.memories.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(memory) = memories.get(task_id) {
                return Arc::clone(memory);
            }
        }

        let mut memories = self.memories.write().unwrap_or_else(PoisonError::into_inner);
        let capacity = self.capacity;
        Arc::clone(
            memories
                .entry(task_id.to_string())
                .or_insert_with(|| Arc::new(RwLock::new(Memory::with_capacity(capacity)))),
        )
    }

    /// Return the memory for `task_id` only if it already exists.
    pub fn get(&self, task_id: &str) -> Option<SharedMemory> {
        self.memories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(task_id)
            .cloned()
    }

    /// Drop the memory for `task_id`. Returns `false` when there was nothing to remove.
    pub fn clear_task(&self, task_id: &str) -> bool {
        let removed = self
            .memories
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(task_id)
            .is_some();
        if removed {
            log::debug!("memory for task '{}' cleared", task_id);
        }
        removed
    }

    /// Number of tasks currently holding a memory.
    pub fn task_count(&self) -> usize {
        self.memories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Explicit handle on one discussion's task identifier and the manager that stores
/// its memory.
///
/// Cloning a `TaskContext` is cheap and every clone refers to the same task, so one
/// context can be handed to every agent of a discussion and to its scheduler. The
/// memory is looked up on demand, which means that after [`clear`](TaskContext::clear)
/// the next access starts from an empty history.
#[derive(Debug, Clone)]
pub struct TaskContext {
    task_id: Arc<str>,
    manager: Arc<MemoryManager>,
    created_at: DateTime<Utc>,
}

impl TaskContext {
    /// Create a context with a freshly generated task identifier.
    pub fn new(manager: Arc<MemoryManager>) -> Self {
        Self::with_task_id(format!("task_{}", Uuid::new_v4().simple()), manager)
    }

    /// Create a context bound to a caller-chosen task identifier.
    pub fn with_task_id(task_id: impl AsRef<str>, manager: Arc<MemoryManager>) -> Self {
        Self {
            task_id: Arc::from(task_id.as_ref()),
            manager,
            created_at: Utc::now(),
        }
    }

    /// A new context on the same manager with a fresh task identifier.
    pub fn renew(&self) -> Self {
        Self::new(Arc::clone(&self.manager))
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn manager(&self) -> &Arc<MemoryManager> {
        &self.manager
    }

    /// The memory of this task, created on first access.
    pub fn memory(&self) -> SharedMemory {
        self.manager.get_or_create(&self.task_id)
    }

    /// Remove this task's memory from the manager.
    pub fn clear(&self) -> bool {
        self.manager.clear_task(&self.task_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(i: usize) -> Message {
        Message::new(Role::User, format!("message {}", i))
    }

    #[test]
    fn test_memory_evicts_oldest_when_full() {
        let mut memory = Memory::new();
        for i in 0..101 {
            memory.append(msg(i));
        }

        assert_eq!(memory.len(), 100);
        let history = memory.history();
        assert_eq!(&*history[0].content, "message 1");
        assert_eq!(&*history[99].content, "message 100");
        assert!(history.iter().all(|m| &*m.content != "message 0"));
        for (offset, m) in history.iter().enumerate() {
            assert_eq!(&*m.content, format!("message {}", offset + 1));
        }
    }

    #[test]
    fn test_memory_custom_capacity() {
        let mut memory = Memory::with_capacity(2);
        memory.append(msg(0));
        memory.append(msg(1));
        memory.append(msg(2));

        assert_eq!(memory.capacity(), 2);
        let contents: Vec<String> = memory.iter().map(|m| m.content.to_string()).collect();
        assert_eq!(contents, vec!["message 1", "message 2"]);
    }

    #[test]
    fn test_memory_by_role() {
        let mut memory = Memory::new();
        memory.append(Message::new(Role::User, "question"));
        memory.append(Message::new(Role::Assistant, "answer"));

        let answers = memory.by_role(Role::Assistant);
        assert_eq!(answers.len(), 1);
        assert_eq!(&*answers[0].content, "answer");
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let manager = MemoryManager::new();
        let first = manager.get_or_create("task-a");
        let second = manager.get_or_create("task-a");

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(manager.task_count(), 1);
    }

    #[test]
    fn test_clear_task_twice_is_noop() {
        let manager = MemoryManager::new();
        manager
            .get_or_create("task-a")
            .write()
            .unwrap()
            .append(msg(0));

        assert!(manager.clear_task("task-a"));
        assert!(!manager.clear_task("task-a"));
        assert!(manager.get("task-a").is_none());
        assert!(manager.get_or_create("task-a").read().unwrap().is_empty());
    }

    #[test]
    fn test_task_context_ids_are_unique() {
        let manager = Arc::new(MemoryManager::new());
        let a = TaskContext::new(Arc::clone(&manager));
        let b = a.renew();

        assert_ne!(a.task_id(), b.task_id());
        assert!(a.task_id().starts_with("task_"));
        assert!(Arc::ptr_eq(a.manager(), b.manager()));
    }

    #[test]
    fn test_task_context_clones_share_memory() {
        let manager = Arc::new(MemoryManager::with_capacity(10));
        let ctx = TaskContext::with_task_id("shared", manager);
        let clone = ctx.clone();

        ctx.memory().write().unwrap().append(msg(0));
        assert_eq!(clone.memory().read().unwrap().len(), 1);
        assert_eq!(clone.memory().read().unwrap().capacity(), 10);

        clone.clear();
        assert!(ctx.memory().read().unwrap().is_empty());
    }
}
