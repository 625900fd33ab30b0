use crate::types::DocumentId;
use bson::Document as BsonDocument;
use serde::{Deserialize, Serialize};

/// A stored record: a BSON document plus its storage key.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Document {
    pub id: DocumentId,
    pub data: BsonDocument,
}

impl Document {
    #[must_use]
    pub fn new(data: BsonDocument) -> Self {
        Self { id: DocumentId::new(), data }
    }

    #[must_use]
    pub const fn with_id(id: DocumentId, data: BsonDocument) -> Self {
        Self { id, data }
    }
}
