//! Document codec used to persist index definitions.
//!
//! A document is a JSON object. The codec turns it into a field -> bytes map;
//! the map is then framed into a single cell value with `bincode`.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub type Document = Map<String, Value>;

/// field name -> encoded field value
pub type EncodedFields = BTreeMap<String, Vec<u8>>;

/// Document <-> field map. Must round-trip exactly.
pub trait DocumentCodec: Send + Sync {
    fn serialize(&self, doc: &Document) -> Result<EncodedFields>;

    fn deserialize(&self, fields: &EncodedFields) -> Result<Document>;
}

/// Each field encoded as JSON text
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl DocumentCodec for JsonCodec {
    fn serialize(&self, doc: &Document) -> Result<EncodedFields> {
        doc.iter()
            .map(|(name, value)| Ok::<_, Error>((name.clone(), serde_json::to_vec(value)?)))
            .collect()
    }

    fn deserialize(&self, fields: &EncodedFields) -> Result<Document> {
        fields
            .iter()
            .map(|(name, bytes)| Ok::<_, Error>((name.clone(), serde_json::from_slice(bytes)?)))
            .collect()
    }
}

/// Encode any serializable struct into one cell value
pub fn encode_document<T: Serialize>(codec: &dyn DocumentCodec, value: &T) -> Result<Vec<u8>> {
    let Value::Object(doc) = serde_json::to_value(value)? else {
        return Err(Error::serialization("document must serialize to an object"));
    };
    let fields = codec.serialize(&doc)?;
    Ok(bincode::serialize(&fields)?)
}

/// Inverse of `encode_document`
pub fn decode_document<T: DeserializeOwned>(codec: &dyn DocumentCodec, bytes: &[u8]) -> Result<T> {
    let fields: EncodedFields = bincode::deserialize(bytes)?;
    let doc = codec.deserialize(&fields)?;
    Ok(serde_json::from_value(Value::Object(doc))?)
}
