//! Read path (spec.md §4.7): thread/message fetchers, the pagination
//! windows `ListMessages` exposes, and body decryption.
//!
//! Split out of `runtime.rs` the way the teacher splits `Database`'s
//! transaction-facing methods into `database/transactions.rs` — one
//! `impl Runtime` block per concern, all operating on the same struct.

use crate::runtime::Runtime;
use progressdb_core::error::{ProgressError, ProgressResult};
use progressdb_core::key::{KeyEncoder, ParsedKey};
use progressdb_core::model::{Message, Thread, Version};
use progressdb_core::types::Page;
use progressdb_core::types::PageRequest;
use progressdb_security::EnvelopeCipher;
use progressdb_storage::iter::{page_after, page_around_anchor, page_before, page_default, Window};

impl Runtime {
    /// `GetThread(thread_key)`.
    pub fn get_thread(&self, thread_key: &str) -> ProgressResult<Thread> {
        get_thread(&self.main, thread_key)
    }

    /// `ListThreads()`, newest-created first is not guaranteed; callers
    /// that need an order should sort on `created_ts` themselves.
    pub fn list_threads(&self) -> Vec<Thread> {
        self.main
            .scan_prefix("t:")
            .into_iter()
            .filter(|(key, _)| matches!(KeyEncoder::parse(key), Ok(ParsedKey::Thread { .. })))
            .filter_map(|(_, bytes)| serde_json::from_slice(&bytes).ok())
            .collect()
    }

    /// `GetLatestMessage(msg_key)`: the live record at `msg_key` already
    /// is the latest version (spec.md §3); prior states live separately
    /// under `version:msg:<msg_key>:*`.
    pub fn get_latest_message(&self, msg_key: &str) -> ProgressResult<Message> {
        let message = self
            .main
            .get(msg_key)
            .ok_or_else(|| ProgressError::NotFound(format!("message {msg_key}")))
            .and_then(|bytes| decode_message(&bytes))?;
        self.decrypt_for_owning_thread(msg_key, message)
    }

    /// `ListMessageVersions(msg_key)`, ascending by `(ts, seq)`.
    pub fn list_message_versions(&self, msg_key: &str) -> ProgressResult<Vec<Version>> {
        let prefix = format!("version:msg:{msg_key}:");
        self.main
            .scan_prefix(&prefix)
            .into_iter()
            .map(|(_, bytes)| serde_json::from_slice(&bytes).map_err(ProgressError::from))
            .collect()
    }

    /// `ListMessages(thread_key, limit?, before?, after?, anchor?)`.
    pub fn list_messages(&self, thread_key: &str, req: PageRequest) -> ProgressResult<Page<Message>> {
        let thread = self.get_thread(thread_key)?;
        let limit = self.limits.clamp_page_limit(req.limit);
        let prefix = KeyEncoder::msg_prefix(thread_key);
        let is_deleted = |bytes: &[u8]| decode_message(bytes).map(|m| m.deleted).unwrap_or(false);

        let window = match (&req.anchor, &req.before, &req.after) {
            (Some(anchor), _, _) => page_around_anchor(self.main.as_ref(), &prefix, anchor, limit.max(1) / 2, &is_deleted),
            (None, Some(before), _) => page_before(self.main.as_ref(), &prefix, before, limit, &is_deleted),
            (None, None, Some(after)) => page_after(self.main.as_ref(), &prefix, after, limit, &is_deleted),
            (None, None, None) => page_default(self.main.as_ref(), &prefix, limit, &is_deleted),
        };

        let Window { items, has_before, has_after } = window;
        let before_anchor = items.first().map(|(k, _)| k.clone());
        let after_anchor = items.last().map(|(k, _)| k.clone());

        let mut messages = Vec::with_capacity(items.len());
        for (_, bytes) in items {
            let message = decode_message(&bytes)?;
            if message.deleted {
                continue;
            }
            messages.push(self.decrypt_body(&thread, message)?);
        }

        let total = crate::index::message_count(self.index.as_ref(), thread_key);
        Ok(Page { count: messages.len(), items: messages, has_before, has_after, before_anchor, after_anchor, total })
    }

    fn decrypt_for_owning_thread(&self, msg_key: &str, message: Message) -> ProgressResult<Message> {
        let thread_key = match KeyEncoder::parse(msg_key) {
            Ok(ParsedKey::Message { thread_key, .. }) => thread_key,
            _ => return Ok(message),
        };
        let thread = self.get_thread(&thread_key)?;
        self.decrypt_body(&thread, message)
    }

    fn decrypt_body(&self, thread: &Thread, mut message: Message) -> ProgressResult<Message> {
        if let Some(meta) = &thread.kms_meta {
            let dek = self.kms.unwrap_dek(meta)?;
            let cipher = EnvelopeCipher::from_dek(&dek);
            message.body = cipher.decrypt_body(&message.body, &self.config.encryption.fields)?;
        }
        Ok(message)
    }
}

fn get_thread(main: &std::sync::Arc<dyn progressdb_storage::engine::StorageEngine>, thread_key: &str) -> ProgressResult<Thread> {
    main.get(&KeyEncoder::thread_meta_key(thread_key))
        .ok_or_else(|| ProgressError::NotFound(format!("thread {thread_key}")))
        .and_then(|bytes| serde_json::from_slice(&bytes).map_err(ProgressError::from))
}

fn decode_message(bytes: &[u8]) -> ProgressResult<Message> {
    serde_json::from_slice(bytes).map_err(ProgressError::from)
}
