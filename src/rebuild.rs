//! Collaborators used to repopulate an index from the records it covers.

use crate::key::{Key, RecordId};

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The collection ended while it was being browsed. Not a failure.
    #[error("end of collection")]
    EndOfCollection,

    #[error("unknown cluster {0}")]
    UnknownCluster(String),

    #[error("{0}")]
    Failed(String),
}

/// What a record contributes to the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexedValue {
    Single(Key),
    /// Every key maps to the same record.
    Many(Vec<Key>),
}

impl IndexedValue {
    pub fn keys(&self) -> &[Key] {
        match self {
            IndexedValue::Single(key) => std::slice::from_ref(key),
            IndexedValue::Many(keys) => keys,
        }
    }
}

/// A record as seen by the index. `value` is `None` when the record has no
/// value for the indexed field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub rid: RecordId,
    pub value: Option<IndexedValue>,
}

pub type Documents<'a> = Box<dyn Iterator<Item = Result<Document, SourceError>> + Send + 'a>;

/// The record collections an index is built from.
pub trait RecordSource: Send + Sync {
    /// Number of records in `cluster`, used for progress reporting.
    fn count(&self, cluster: &str) -> Result<u64, SourceError>;

    fn browse(&self, cluster: &str) -> Result<Documents<'_>, SourceError>;
}

pub trait ProgressListener: Send {
    fn on_begin(&mut self, _total: u64) {}

    fn on_progress(&mut self, _done: u64, _total: u64) {}

    fn on_completion(&mut self, _succeeded: bool) {}
}

/// Ignores progress.
impl ProgressListener for () {}

/// A source over documents held in memory, keyed by cluster name.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    clusters: Vec<(String, Vec<Document>)>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cluster(mut self, name: impl Into<String>, documents: Vec<Document>) -> Self {
        self.clusters.push((name.into(), documents));
        self
    }

    fn documents(&self, cluster: &str) -> Result<&[Document], SourceError> {
        self.clusters
            .iter()
            .find(|(name, _)| name == cluster)
            .map(|(_, documents)| documents.as_slice())
            .ok_or_else(|| SourceError::UnknownCluster(cluster.to_string()))
    }
}

impl RecordSource for MemorySource {
    fn count(&self, cluster: &str) -> Result<u64, SourceError> {
        Ok(self.documents(cluster)?.len() as u64)
    }

    fn browse(&self, cluster: &str) -> Result<Documents<'_>, SourceError> {
        Ok(Box::new(self.documents(cluster)?.iter().cloned().map(Ok)))
    }
}
