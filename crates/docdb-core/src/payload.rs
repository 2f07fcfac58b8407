use crate::values::Document;

/// The kind of item a command payload carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Insert,
    Update,
    Replace,
    Delete,
}

/// The document batch attached to a write command.
///
/// A command reads its batch exactly once: after [`consume`](Self::consume)
/// the cursor sits at the end and later calls yield nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct SplittablePayload {
    kind: PayloadKind,
    documents: Vec<Document>,
    position: usize,
}

impl SplittablePayload {
    pub fn new(kind: PayloadKind, documents: Vec<Document>) -> Self {
        Self {
            kind,
            documents,
            position: 0,
        }
    }

    pub fn kind(&self) -> PayloadKind {
        self.kind
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.documents.len() - self.position
    }

    pub fn is_consumed(&self) -> bool {
        self.position == self.documents.len()
    }

    pub fn consume(&mut self) -> Vec<Document> {
        let batch = self.documents.split_off(self.position);
        self.documents.extend(batch.iter().cloned());
        self.position = self.documents.len();
        tracing::trace!(
            target: "docdb::payload",
            kind = ?self.kind,
            count = batch.len(),
            "consumed payload"
        );
        batch
    }
}
