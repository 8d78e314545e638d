use serde::{Deserialize, Serialize};
use rill_types::{ContentHasher, Identity, ObjectId, Timestamp};

use crate::error::{StoreError, StoreResult};

/// The kind of a stored object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    /// Raw file content.
    Blob,
    /// Directory listing.
    Tree,
    /// History node.
    Commit,
}

impl ObjectKind {
    /// The domain-separated hasher for this kind. Identical bytes stored
    /// under different kinds produce different ids.
    pub const fn hasher(&self) -> ContentHasher {
        match self {
            Self::Blob => ContentHasher::new("rill-blob-v1"),
            Self::Tree => ContentHasher::new("rill-tree-v1"),
            Self::Commit => ContentHasher::new("rill-commit-v1"),
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::Tree => "tree",
            Self::Commit => "commit",
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The unit of storage: a kind tag plus the object's canonical bytes.
///
/// The store never interprets the bytes; decoding belongs to [`Blob`],
/// [`Tree`], and [`Commit`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    pub kind: ObjectKind,
    pub data: Vec<u8>,
}

impl StoredObject {
    pub fn new(kind: ObjectKind, data: Vec<u8>) -> Self {
        Self { kind, data }
    }

    /// The content-addressed id of this object.
    pub fn compute_id(&self) -> ObjectId {
        self.kind.hasher().hash(&self.data)
    }

    /// Size of the canonical bytes.
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn expect_kind(&self, expected: ObjectKind) -> StoreResult<()> {
        if self.kind != expected {
            return Err(StoreError::WrongKind {
                id: self.compute_id(),
                expected: expected.as_str(),
                actual: self.kind.as_str(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Blob
// ---------------------------------------------------------------------------

/// Raw file content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Blob {
    pub data: Vec<u8>,
}

impl Blob {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn to_stored_object(&self) -> StoredObject {
        StoredObject::new(ObjectKind::Blob, self.data.clone())
    }

    pub fn from_stored_object(obj: &StoredObject) -> StoreResult<Self> {
        obj.expect_kind(ObjectKind::Blob)?;
        Ok(Self {
            data: obj.data.clone(),
        })
    }

    /// The id this blob will have once stored.
    pub fn id(&self) -> ObjectId {
        self.to_stored_object().compute_id()
    }
}

// ---------------------------------------------------------------------------
// Tree
// ---------------------------------------------------------------------------

/// File mode of a tree entry, using the conventional octal values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryMode {
    Regular,
    Executable,
    Symlink,
    Directory,
}

impl EntryMode {
    pub fn bits(&self) -> u32 {
        match self {
            Self::Regular => 0o100644,
            Self::Executable => 0o100755,
            Self::Symlink => 0o120000,
            Self::Directory => 0o040000,
        }
    }

    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            0o100644 => Some(Self::Regular),
            0o100755 => Some(Self::Executable),
            0o120000 => Some(Self::Symlink),
            0o040000 => Some(Self::Directory),
            _ => None,
        }
    }
}

/// One entry of a tree: mode, name, and the referenced object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub mode: EntryMode,
    pub name: String,
    pub id: ObjectId,
}

impl TreeEntry {
    pub fn new(mode: EntryMode, name: impl Into<String>, id: ObjectId) -> Self {
        Self {
            mode,
            name: name.into(),
            id,
        }
    }

    /// Entries referencing subtrees recurse during merges; everything else
    /// is leaf content.
    pub fn is_tree(&self) -> bool {
        self.mode == EntryMode::Directory
    }
}

/// A directory listing. Entries are kept sorted by name so the canonical
/// encoding (and therefore the tree id) is deterministic.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    entries: Vec<TreeEntry>,
}

impl Tree {
    /// Build a tree from entries; sorts them by name.
    pub fn from_entries(mut entries: Vec<TreeEntry>) -> Self {
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Self { entries }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[TreeEntry] {
        &self.entries
    }

    /// Look up an entry by name.
    pub fn entry(&self, name: &str) -> Option<&TreeEntry> {
        self.entries
            .binary_search_by(|e| e.name.as_str().cmp(name))
            .ok()
            .map(|i| &self.entries[i])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_stored_object(&self) -> StoreResult<StoredObject> {
        let data =
            serde_json::to_vec(self).map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(StoredObject::new(ObjectKind::Tree, data))
    }

    pub fn from_stored_object(obj: &StoredObject) -> StoreResult<Self> {
        obj.expect_kind(ObjectKind::Tree)?;
        serde_json::from_slice(&obj.data).map_err(|e| StoreError::CorruptObject {
            id: obj.compute_id(),
            reason: e.to_string(),
        })
    }

    /// The id this tree will have once stored.
    pub fn id(&self) -> StoreResult<ObjectId> {
        Ok(self.to_stored_object()?.compute_id())
    }
}

// ---------------------------------------------------------------------------
// Commit
// ---------------------------------------------------------------------------

/// An immutable history node.
///
/// The commit id is the hash of the canonical encoding below; changing the
/// tree, any parent, either identity line, or the message yields a
/// different id.
///
/// ```text
/// tree <hex>
/// parent <hex>          (one line per parent, in order)
/// author <name> <email> <secs> <zone>
/// committer <name> <email> <secs> <zone>
///
/// <message>
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Commit {
    pub tree: ObjectId,
    pub parents: Vec<ObjectId>,
    pub author: Identity,
    pub committer: Identity,
    pub message: String,
}

impl Commit {
    /// The canonical encoding that feeds the commit hash.
    pub fn canonical_encoding(&self) -> Vec<u8> {
        let mut out = String::new();
        out.push_str("tree ");
        out.push_str(&self.tree.to_hex());
        out.push('\n');
        for parent in &self.parents {
            out.push_str("parent ");
            out.push_str(&parent.to_hex());
            out.push('\n');
        }
        out.push_str("author ");
        out.push_str(&self.author.canonical_line());
        out.push('\n');
        out.push_str("committer ");
        out.push_str(&self.committer.canonical_line());
        out.push('\n');
        out.push('\n');
        out.push_str(&self.message);
        out.into_bytes()
    }

    pub fn to_stored_object(&self) -> StoredObject {
        StoredObject::new(ObjectKind::Commit, self.canonical_encoding())
    }

    pub fn from_stored_object(obj: &StoredObject) -> StoreResult<Self> {
        obj.expect_kind(ObjectKind::Commit)?;
        let id = obj.compute_id();
        let text = std::str::from_utf8(&obj.data).map_err(|e| StoreError::CorruptObject {
            id,
            reason: e.to_string(),
        })?;
        decode_commit(text).map_err(|reason| StoreError::CorruptObject { id, reason })
    }

    /// The id this commit will have once stored.
    pub fn id(&self) -> ObjectId {
        self.to_stored_object().compute_id()
    }

    /// First line of the message.
    pub fn short_message(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }

    /// Root commits have no parents.
    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    /// Parent by index, if present.
    pub fn parent(&self, index: usize) -> Option<ObjectId> {
        self.parents.get(index).copied()
    }
}

fn decode_commit(text: &str) -> Result<Commit, String> {
    let (header, message) = text
        .split_once("\n\n")
        .ok_or_else(|| "missing header/message separator".to_string())?;

    let mut tree = None;
    let mut parents = Vec::new();
    let mut author = None;
    let mut committer = None;

    for line in header.lines() {
        if let Some(hex) = line.strip_prefix("tree ") {
            tree = Some(ObjectId::from_hex(hex).map_err(|e| e.to_string())?);
        } else if let Some(hex) = line.strip_prefix("parent ") {
            parents.push(ObjectId::from_hex(hex).map_err(|e| e.to_string())?);
        } else if let Some(rest) = line.strip_prefix("author ") {
            author = Some(decode_identity(rest)?);
        } else if let Some(rest) = line.strip_prefix("committer ") {
            committer = Some(decode_identity(rest)?);
        } else {
            return Err(format!("unrecognized header line: {line}"));
        }
    }

    Ok(Commit {
        tree: tree.ok_or_else(|| "missing tree line".to_string())?,
        parents,
        author: author.ok_or_else(|| "missing author line".to_string())?,
        committer: committer.ok_or_else(|| "missing committer line".to_string())?,
        message: message.to_string(),
    })
}

fn decode_identity(line: &str) -> Result<Identity, String> {
    let open = line.find('<').ok_or_else(|| format!("bad identity: {line}"))?;
    let close = line[open..]
        .find('>')
        .map(|i| open + i)
        .ok_or_else(|| format!("bad identity: {line}"))?;
    let name = line[..open].trim_end().to_string();
    let email = line[open + 1..close].to_string();

    let mut tail = line[close + 1..].split_whitespace();
    let seconds: i64 = tail
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| format!("bad identity timestamp: {line}"))?;
    let zone = tail
        .next()
        .ok_or_else(|| format!("bad identity zone: {line}"))?;
    if zone.len() != 5 {
        return Err(format!("bad identity zone: {line}"));
    }
    let sign: i16 = if zone.starts_with('-') { -1 } else { 1 };
    let hours: i16 = zone[1..3].parse().map_err(|_| format!("bad zone: {line}"))?;
    let minutes: i16 = zone[3..5].parse().map_err(|_| format!("bad zone: {line}"))?;

    Ok(Identity::new(
        name,
        email,
        Timestamp::new(seconds, sign * (hours * 60 + minutes)),
    ))
}
