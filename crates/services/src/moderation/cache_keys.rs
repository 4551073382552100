//! Pure mapping from an action and its identity to the cache keys that go
//! stale once the action commits.

use std::fmt;

use domains::{BoardId, TagId, ThreadId};

use super::action::{Action, ActionKind};

/// Key family as it appears in the action configuration table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyFamily {
    Index,
    Directory,
    Thread,
    Post,
    Tags,
    Tag,
    Image,
    New,
    Popular,
    Favorited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Index(BoardId),
    Directory(BoardId),
    Thread(BoardId, ThreadId),
    /// Post listing of one thread
    Post(BoardId, ThreadId),
    Tags(BoardId),
    Tag(BoardId, TagId),
    Image(BoardId),
    New(BoardId),
    Popular(BoardId),
    Favorited(BoardId),
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(b) => write!(f, "index:{b}"),
            Self::Directory(b) => write!(f, "directory:{b}"),
            Self::Thread(b, t) => write!(f, "thread:{b}:{t}"),
            Self::Post(b, t) => write!(f, "post:{b}:{t}"),
            Self::Tags(b) => write!(f, "tags:{b}"),
            Self::Tag(b, t) => write!(f, "tag:{b}:{t}"),
            Self::Image(b) => write!(f, "image:{b}"),
            Self::New(b) => write!(f, "new:{b}"),
            Self::Popular(b) => write!(f, "popular:{b}"),
            Self::Favorited(b) => write!(f, "favorited:{b}"),
        }
    }
}

/// Insertion-ordered set of keys. Duplicates keep their first position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheKeySet {
    keys: Vec<CacheKey>,
}

impl CacheKeySet {
    pub fn insert(&mut self, key: CacheKey) {
        if !self.keys.contains(&key) {
            self.keys.push(key);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CacheKey> {
        self.keys.iter()
    }

    pub fn to_strings(&self) -> Vec<String> {
        self.keys.iter().map(ToString::to_string).collect()
    }

    /// Expands one configuration template for the given identity.
    /// Families that need an id the action does not carry are skipped.
    fn extend_from(
        &mut self,
        families: &[KeyFamily],
        board: BoardId,
        thread: Option<ThreadId>,
        tag: Option<TagId>,
    ) {
        for family in families {
            let key = match family {
                KeyFamily::Index => Some(CacheKey::Index(board)),
                KeyFamily::Directory => Some(CacheKey::Directory(board)),
                KeyFamily::Thread => thread.map(|t| CacheKey::Thread(board, t)),
                KeyFamily::Post => thread.map(|t| CacheKey::Post(board, t)),
                KeyFamily::Tags => Some(CacheKey::Tags(board)),
                KeyFamily::Tag => tag.map(|t| CacheKey::Tag(board, t)),
                KeyFamily::Image => Some(CacheKey::Image(board)),
                KeyFamily::New => Some(CacheKey::New(board)),
                KeyFamily::Popular => Some(CacheKey::Popular(board)),
                KeyFamily::Favorited => Some(CacheKey::Favorited(board)),
            };
            if let Some(key) = key {
                self.insert(key);
            }
        }
    }
}

/// Keys made stale by `action`. When a post delete cascaded into a thread
/// delete, the thread-delete template is unioned in.
pub fn derive(action: &Action, cascaded_thread_delete: bool) -> CacheKeySet {
    let board = action.board();
    let thread = action.thread();
    let tag = action.tag();

    let mut set = CacheKeySet::default();
    set.extend_from(action.kind().profile().stale, board, thread, tag);
    if cascaded_thread_delete {
        set.extend_from(ActionKind::DeleteThread.profile().stale, board, thread, tag);
    }
    set
}
