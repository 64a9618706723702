//! Client-side comment state: an in-memory nested comment tree with
//! optimistic mutations and server reconciliation.
//!
//! Nesting depth is capped at 2, so the tree is a fixed two-level shape:
//! top-level nodes each own a flat list of reply nodes. There is no general
//! recursive tree machinery; "find node by id" descends at most one level.
//!
//! Every mutating action follows the same two-phase protocol:
//!
//! 1. `stage_*` applies the local tentative mutation and hands back either a
//!    correlation id (new comments) or a snapshot of the pre-mutation state
//!    (likes, edits) or the removed node itself (deletes).
//! 2. When the request resolves, `commit_*` replaces tentative fields with
//!    the authoritative server values, or `rollback_*` / `abort_*` /
//!    `restore_*` puts the exact pre-mutation state back.
//!
//! Reconciliation is keyed by comment id and no-ops silently when the id is
//! no longer present, so a late response for a node that was deleted
//! mid-flight cannot corrupt the tree.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::db::models::{CommentAuthor, EnrichedComment};

/// One node of the two-level tree. `replies` is only populated on top-level
/// nodes; reply nodes always carry an empty list.
#[derive(Debug, Clone)]
pub struct CommentNode {
    pub comment: EnrichedComment,
    /// True until the server confirms the comment exists.
    pub pending: bool,
    pub replies: Vec<CommentNode>,
}

impl CommentNode {
    fn confirmed(comment: EnrichedComment) -> Self {
        Self {
            comment,
            pending: false,
            replies: Vec::new(),
        }
    }
}

/// Pagination metadata for the currently loaded page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageMeta {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
    pub has_next: bool,
    pub has_prev: bool,
}

/// Pre-toggle like state, captured before the optimistic flip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LikeSnapshot {
    pub liked: bool,
    pub like_count: i64,
}

/// Pre-edit content, captured before the optimistic replacement.
#[derive(Debug, Clone, PartialEq)]
pub struct EditSnapshot {
    pub content: String,
    pub updated_at: DateTime<Utc>,
}

/// A node removed optimistically, with enough position information to
/// reinsert it conservatively if the delete request fails.
#[derive(Debug, Clone)]
pub struct RemovedComment {
    node: CommentNode,
    /// Index of the owning top-level thread, or None for a top-level node.
    thread: Option<usize>,
    index: usize,
}

/// A draft comment staged before the create request is sent.
#[derive(Debug, Clone)]
pub struct CommentDraft {
    pub content: String,
    pub parent_id: Option<Uuid>,
    pub author: CommentAuthor,
}

/// Explicit controller over the fetched comment page. One instance per
/// content page; injected where needed, never a global.
#[derive(Debug, Default)]
pub struct CommentTreeController {
    roots: Vec<CommentNode>,
    page: Option<PageMeta>,
}

impl CommentTreeController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the tree with a freshly fetched page. Ordering is the server
    /// contract: top-level newest-first, replies oldest-first.
    pub fn load_page(
        &mut self,
        comments: Vec<(EnrichedComment, Vec<EnrichedComment>)>,
        page: PageMeta,
    ) {
        self.roots = comments
            .into_iter()
            .map(|(comment, replies)| CommentNode {
                comment,
                pending: false,
                replies: replies.into_iter().map(CommentNode::confirmed).collect(),
            })
            .collect();
        self.page = Some(page);
    }

    pub fn page_meta(&self) -> Option<PageMeta> {
        self.page
    }

    pub fn roots(&self) -> &[CommentNode] {
        &self.roots
    }

    /// Aggregate comment count for the page header badge, recomputed from
    /// the actual tree shape so it cannot drift from a cached counter.
    pub fn total_comments(&self) -> i64 {
        self.roots
            .iter()
            .map(|root| 1 + root.replies.len() as i64)
            .sum()
    }

    pub fn find(&self, id: Uuid) -> Option<&CommentNode> {
        for root in &self.roots {
            if root.comment.id == id {
                return Some(root);
            }
            if let Some(reply) = root.replies.iter().find(|r| r.comment.id == id) {
                return Some(reply);
            }
        }
        None
    }

    fn find_mut(&mut self, id: Uuid) -> Option<&mut CommentNode> {
        for root in &mut self.roots {
            if root.comment.id == id {
                return Some(root);
            }
            if let Some(reply) = root.replies.iter_mut().find(|r| r.comment.id == id) {
                return Some(reply);
            }
        }
        None
    }

    /// Index of the top-level thread whose subtree contains `id`.
    fn thread_of(&self, id: Uuid) -> Option<usize> {
        self.roots.iter().position(|root| {
            root.comment.id == id || root.replies.iter().any(|r| r.comment.id == id)
        })
    }

    // ── Submit ───────────────────────────────────────────────────────────

    /// Insert a pending placeholder for a new comment and return its
    /// correlation id. New top-level comments are prepended (newest-first);
    /// new replies are appended to their thread (oldest-first). Returns None
    /// when the named parent is no longer in the tree.
    pub fn stage_comment(&mut self, draft: CommentDraft) -> Option<Uuid> {
        let correlation = Uuid::new_v4();
        let now = Utc::now();
        let placeholder = CommentNode {
            comment: EnrichedComment {
                id: correlation,
                content: draft.content,
                parent_id: draft.parent_id,
                author: draft.author,
                reply_count: 0,
                like_count: 0,
                viewer_liked: false,
                created_at: now,
                updated_at: now,
            },
            pending: true,
            replies: Vec::new(),
        };

        match draft.parent_id {
            None => {
                self.roots.insert(0, placeholder);
                Some(correlation)
            }
            Some(parent_id) => {
                // A reply to a reply still lives in the owning thread's flat
                // list; only the direct parent's reply count is bumped.
                let thread = self.thread_of(parent_id)?;
                self.find_mut(parent_id)
                    .map(|parent| parent.comment.reply_count += 1)?;
                self.roots[thread].replies.push(placeholder);
                Some(correlation)
            }
        }
    }

    /// Replace a placeholder with the server-confirmed comment: real id,
    /// real timestamps, authoritative counts.
    pub fn commit_comment(&mut self, correlation: Uuid, authoritative: EnrichedComment) {
        if let Some(node) = self.find_mut(correlation) {
            if node.pending {
                node.comment = authoritative;
                node.pending = false;
            }
        }
    }

    /// Remove a placeholder after a failed create and restore the parent's
    /// reply count. The caller surfaces the error; there is no silent retry.
    pub fn abort_comment(&mut self, correlation: Uuid) {
        let parent_id = match self.find(correlation) {
            Some(node) if node.pending => node.comment.parent_id,
            _ => return,
        };
        self.detach(correlation);
        if let Some(pid) = parent_id {
            if let Some(parent) = self.find_mut(pid) {
                parent.comment.reply_count = (parent.comment.reply_count - 1).max(0);
            }
        }
    }

    // ── Like toggle ──────────────────────────────────────────────────────

    /// Flip the viewer's like state locally before the request is sent.
    /// Returns the pre-toggle snapshot for rollback, or None when the node
    /// is absent.
    pub fn stage_like(&mut self, id: Uuid) -> Option<LikeSnapshot> {
        let node = self.find_mut(id)?;
        let snapshot = LikeSnapshot {
            liked: node.comment.viewer_liked,
            like_count: node.comment.like_count,
        };
        node.comment.viewer_liked = !snapshot.liked;
        node.comment.like_count += if snapshot.liked { -1 } else { 1 };
        Some(snapshot)
    }

    /// Reconcile to the server's authoritative like state. Guards against
    /// races where a second toggle landed mid-flight.
    pub fn commit_like(&mut self, id: Uuid, liked: bool, like_count: i64) {
        if let Some(node) = self.find_mut(id) {
            node.comment.viewer_liked = liked;
            node.comment.like_count = like_count;
        }
    }

    /// Restore the exact pre-toggle state after a failed toggle request.
    pub fn rollback_like(&mut self, id: Uuid, snapshot: LikeSnapshot) {
        if let Some(node) = self.find_mut(id) {
            node.comment.viewer_liked = snapshot.liked;
            node.comment.like_count = snapshot.like_count;
        }
    }

    // ── Edit ─────────────────────────────────────────────────────────────

    /// Replace content optimistically, caching the pre-edit content so a
    /// failed edit rolls back with the same parity as like toggles.
    pub fn stage_edit(&mut self, id: Uuid, content: String) -> Option<EditSnapshot> {
        let node = self.find_mut(id)?;
        let snapshot = EditSnapshot {
            content: std::mem::replace(&mut node.comment.content, content),
            updated_at: node.comment.updated_at,
        };
        node.comment.updated_at = Utc::now();
        Some(snapshot)
    }

    pub fn commit_edit(&mut self, id: Uuid, content: String, updated_at: DateTime<Utc>) {
        if let Some(node) = self.find_mut(id) {
            node.comment.content = content;
            node.comment.updated_at = updated_at;
        }
    }

    pub fn rollback_edit(&mut self, id: Uuid, snapshot: EditSnapshot) {
        if let Some(node) = self.find_mut(id) {
            node.comment.content = snapshot.content;
            node.comment.updated_at = snapshot.updated_at;
        }
    }

    // ── Delete ───────────────────────────────────────────────────────────

    /// Remove a node immediately, returning it with its position so a failed
    /// delete can reinsert it conservatively.
    pub fn remove_comment(&mut self, id: Uuid) -> Option<RemovedComment> {
        let removed = self.detach(id)?;
        if let Some(pid) = removed.node.comment.parent_id {
            if let Some(parent) = self.find_mut(pid) {
                parent.comment.reply_count = (parent.comment.reply_count - 1).max(0);
            }
        }
        Some(removed)
    }

    /// Put a removed node back after a failed delete request.
    pub fn restore_comment(&mut self, removed: RemovedComment) {
        let RemovedComment {
            node,
            thread,
            index,
        } = removed;
        if let Some(pid) = node.comment.parent_id {
            if let Some(parent) = self.find_mut(pid) {
                parent.comment.reply_count += 1;
            }
        }
        match thread {
            None => {
                let at = index.min(self.roots.len());
                self.roots.insert(at, node);
            }
            Some(t) => {
                if let Some(root) = self.roots.get_mut(t) {
                    let at = index.min(root.replies.len());
                    root.replies.insert(at, node);
                } else {
                    // Owning thread disappeared; keep the node visible.
                    self.roots.push(node);
                }
            }
        }
    }

    fn detach(&mut self, id: Uuid) -> Option<RemovedComment> {
        if let Some(i) = self.roots.iter().position(|r| r.comment.id == id) {
            return Some(RemovedComment {
                node: self.roots.remove(i),
                thread: None,
                index: i,
            });
        }
        for (t, root) in self.roots.iter_mut().enumerate() {
            if let Some(j) = root.replies.iter().position(|r| r.comment.id == id) {
                return Some(RemovedComment {
                    node: root.replies.remove(j),
                    thread: Some(t),
                    index: j,
                });
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn author(name: &str) -> CommentAuthor {
        CommentAuthor {
            id: Uuid::new_v4(),
            name: name.to_string(),
            image: None,
        }
    }

    fn comment(content: &str, parent_id: Option<Uuid>) -> EnrichedComment {
        let now = Utc::now();
        EnrichedComment {
            id: Uuid::new_v4(),
            content: content.to_string(),
            parent_id,
            author: author("tester"),
            reply_count: 0,
            like_count: 0,
            viewer_liked: false,
            created_at: now,
            updated_at: now,
        }
    }

    fn meta() -> PageMeta {
        PageMeta {
            page: 1,
            limit: 10,
            total: 1,
            total_pages: 1,
            has_next: false,
            has_prev: false,
        }
    }

    fn loaded_controller() -> (CommentTreeController, Uuid, Uuid) {
        // One thread: a top-level comment with one reply.
        let top = comment("Nice!", None);
        let top_id = top.id;
        let mut reply = comment("Thanks!", Some(top_id));
        reply.like_count = 2;
        let reply_id = reply.id;
        let mut top = top;
        top.reply_count = 1;

        let mut controller = CommentTreeController::new();
        controller.load_page(vec![(top, vec![reply])], meta());
        (controller, top_id, reply_id)
    }

    #[test]
    fn load_page_builds_two_level_tree() {
        let (controller, top_id, reply_id) = loaded_controller();
        assert_eq!(controller.roots().len(), 1);
        assert!(controller.find(top_id).is_some());
        assert!(controller.find(reply_id).is_some());
        assert_eq!(controller.total_comments(), 2);
    }

    #[test]
    fn staged_top_level_comment_is_prepended() {
        let (mut controller, _, _) = loaded_controller();
        let correlation = controller
            .stage_comment(CommentDraft {
                content: "First!".to_string(),
                parent_id: None,
                author: author("a"),
            })
            .unwrap();
        assert_eq!(controller.roots()[0].comment.id, correlation);
        assert!(controller.roots()[0].pending);
        assert_eq!(controller.total_comments(), 3);
    }

    #[test]
    fn staged_reply_is_appended_and_bumps_parent_count() {
        let (mut controller, top_id, _) = loaded_controller();
        let correlation = controller
            .stage_comment(CommentDraft {
                content: "Me too".to_string(),
                parent_id: Some(top_id),
                author: author("b"),
            })
            .unwrap();
        let root = &controller.roots()[0];
        assert_eq!(root.comment.reply_count, 2);
        assert_eq!(root.replies.last().unwrap().comment.id, correlation);
    }

    #[test]
    fn reply_to_a_reply_lands_in_the_owning_thread() {
        let (mut controller, _, reply_id) = loaded_controller();
        let correlation = controller
            .stage_comment(CommentDraft {
                content: "depth two".to_string(),
                parent_id: Some(reply_id),
                author: author("c"),
            })
            .unwrap();
        let root = &controller.roots()[0];
        assert_eq!(root.replies.len(), 2);
        assert_eq!(root.replies[1].comment.id, correlation);
        // The direct parent's reply count was bumped, not the thread root's.
        assert_eq!(root.replies[0].comment.reply_count, 1);
        assert_eq!(root.comment.reply_count, 1);
    }

    #[test]
    fn stage_comment_for_missing_parent_returns_none() {
        let (mut controller, _, _) = loaded_controller();
        let result = controller.stage_comment(CommentDraft {
            content: "orphan".to_string(),
            parent_id: Some(Uuid::new_v4()),
            author: author("x"),
        });
        assert!(result.is_none());
        assert_eq!(controller.total_comments(), 2);
    }

    #[test]
    fn commit_comment_swaps_in_authoritative_fields() {
        let (mut controller, _, _) = loaded_controller();
        let correlation = controller
            .stage_comment(CommentDraft {
                content: "draft".to_string(),
                parent_id: None,
                author: author("a"),
            })
            .unwrap();
        let confirmed = comment("draft", None);
        let real_id = confirmed.id;
        controller.commit_comment(correlation, confirmed);

        assert!(controller.find(correlation).is_none());
        let node = controller.find(real_id).unwrap();
        assert!(!node.pending);
    }

    #[test]
    fn abort_comment_removes_placeholder_and_restores_count() {
        let (mut controller, top_id, _) = loaded_controller();
        let correlation = controller
            .stage_comment(CommentDraft {
                content: "doomed".to_string(),
                parent_id: Some(top_id),
                author: author("a"),
            })
            .unwrap();
        controller.abort_comment(correlation);
        assert!(controller.find(correlation).is_none());
        assert_eq!(controller.find(top_id).unwrap().comment.reply_count, 1);
        assert_eq!(controller.total_comments(), 2);
    }

    #[test]
    fn abort_comment_ignores_confirmed_nodes() {
        let (mut controller, top_id, _) = loaded_controller();
        controller.abort_comment(top_id);
        assert!(controller.find(top_id).is_some());
    }

    #[test]
    fn like_toggle_commit_reconciles_to_server_state() {
        let (mut controller, _, reply_id) = loaded_controller();
        let snapshot = controller.stage_like(reply_id).unwrap();
        assert_eq!(snapshot, LikeSnapshot { liked: false, like_count: 2 });
        let node = controller.find(reply_id).unwrap();
        assert!(node.comment.viewer_liked);
        assert_eq!(node.comment.like_count, 3);

        // Server saw a concurrent like from someone else.
        controller.commit_like(reply_id, true, 4);
        let node = controller.find(reply_id).unwrap();
        assert_eq!(node.comment.like_count, 4);
    }

    #[test]
    fn like_rollback_restores_exact_pre_toggle_state() {
        let (mut controller, _, reply_id) = loaded_controller();
        let snapshot = controller.stage_like(reply_id).unwrap();
        controller.rollback_like(reply_id, snapshot);
        let node = controller.find(reply_id).unwrap();
        assert!(!node.comment.viewer_liked);
        assert_eq!(node.comment.like_count, 2);
    }

    #[test]
    fn double_toggle_nets_to_original_state() {
        let (mut controller, top_id, _) = loaded_controller();
        let first = controller.stage_like(top_id).unwrap();
        controller.commit_like(top_id, true, 1);
        let second = controller.stage_like(top_id).unwrap();
        controller.commit_like(top_id, false, 0);

        let node = controller.find(top_id).unwrap();
        assert_eq!(node.comment.viewer_liked, first.liked);
        assert_eq!(node.comment.like_count, first.like_count);
        assert!(second.liked);
    }

    #[test]
    fn late_like_reconciliation_after_delete_is_a_silent_noop() {
        let (mut controller, _, reply_id) = loaded_controller();
        let snapshot = controller.stage_like(reply_id).unwrap();
        controller.remove_comment(reply_id).unwrap();
        // The toggle response arrives after the node is gone.
        controller.commit_like(reply_id, true, 3);
        controller.rollback_like(reply_id, snapshot);
        assert!(controller.find(reply_id).is_none());
    }

    #[test]
    fn edit_rollback_restores_content_and_timestamp() {
        let (mut controller, top_id, _) = loaded_controller();
        let before = controller.find(top_id).unwrap().comment.clone();
        let snapshot = controller.stage_edit(top_id, "edited".to_string()).unwrap();
        assert_eq!(controller.find(top_id).unwrap().comment.content, "edited");

        controller.rollback_edit(top_id, snapshot);
        let after = controller.find(top_id).unwrap();
        assert_eq!(after.comment.content, before.content);
        assert_eq!(after.comment.updated_at, before.updated_at);
    }

    #[test]
    fn remove_and_restore_round_trips_position_and_counts() {
        let (mut controller, top_id, reply_id) = loaded_controller();
        let removed = controller.remove_comment(reply_id).unwrap();
        assert_eq!(controller.find(top_id).unwrap().comment.reply_count, 0);
        assert_eq!(controller.total_comments(), 1);

        controller.restore_comment(removed);
        assert!(controller.find(reply_id).is_some());
        assert_eq!(controller.find(top_id).unwrap().comment.reply_count, 1);
        assert_eq!(controller.total_comments(), 2);
    }

    #[test]
    fn remove_top_level_node_restores_at_original_index() {
        let mut controller = CommentTreeController::new();
        let a = comment("a", None);
        let b = comment("b", None);
        let b_id = b.id;
        controller.load_page(vec![(a, vec![]), (b, vec![])], meta());

        let removed = controller.remove_comment(b_id).unwrap();
        assert_eq!(controller.roots().len(), 1);
        controller.restore_comment(removed);
        assert_eq!(controller.roots()[1].comment.id, b_id);
    }

    #[test]
    fn concurrent_mutations_on_different_nodes_do_not_interfere() {
        let (mut controller, top_id, reply_id) = loaded_controller();
        // A like on the reply and a new reply on the root in flight at once.
        let like_snapshot = controller.stage_like(reply_id).unwrap();
        let correlation = controller
            .stage_comment(CommentDraft {
                content: "parallel".to_string(),
                parent_id: Some(top_id),
                author: author("d"),
            })
            .unwrap();

        controller.rollback_like(reply_id, like_snapshot);
        controller.commit_comment(correlation, comment("parallel", Some(top_id)));

        let reply = controller.find(reply_id).unwrap();
        assert!(!reply.comment.viewer_liked);
        assert_eq!(controller.find(top_id).unwrap().comment.reply_count, 2);
    }
}
