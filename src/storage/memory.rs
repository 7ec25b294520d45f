use std::collections::HashMap;

use super::{
    DocumentStore, StorageError,
    document::{Document, ID_FIELD, assign_id},
    filter::Filter,
};

#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: HashMap<String, Vec<Document>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self, collection: &str) -> usize {
        self.collections.get(collection).map_or(0, Vec::len)
    }
}

impl DocumentStore for MemoryStore {
    fn insert(&mut self, collection: &str, document: Document) -> Result<String, StorageError> {
        let (id, document) = assign_id(document);
        let documents = self.collections.entry(collection.to_string()).or_default();

        if documents
            .iter()
            .any(|existing| existing.get(ID_FIELD) == document.get(ID_FIELD))
        {
            return Err(StorageError::DuplicateKey(id));
        }

        documents.push(document);
        Ok(id)
    }

    fn find(&mut self, collection: &str, filter: &Filter) -> Result<Vec<Document>, StorageError> {
        Ok(self
            .collections
            .get(collection)
            .map(|documents| {
                documents
                    .iter()
                    .filter(|document| filter.matches(document))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
