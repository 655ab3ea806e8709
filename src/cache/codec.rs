//! Value encoding for cached entries.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::SerializationFormat;
use crate::store::StoreError;

/// Encodes values to bytes in the configured format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Serializer {
    format: SerializationFormat,
}

impl Serializer {
    pub fn new(format: SerializationFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> SerializationFormat {
        self.format
    }

    pub fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, StoreError> {
        match self.format {
            SerializationFormat::Json => {
                serde_json::to_vec(value).map_err(|e| StoreError::Serialization(e.to_string()))
            }
            // Named fields keep struct encodings self-describing.
            SerializationFormat::MessagePack => {
                rmp_serde::to_vec_named(value).map_err(|e| StoreError::Serialization(e.to_string()))
            }
        }
    }

    pub fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, StoreError> {
        match self.format {
            SerializationFormat::Json => {
                serde_json::from_slice(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
            }
            SerializationFormat::MessagePack => {
                rmp_serde::from_slice(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Prediction {
        label: String,
        score: f64,
        features: Vec<i64>,
        note: Option<String>,
    }

    const FORMATS: [SerializationFormat; 2] =
        [SerializationFormat::Json, SerializationFormat::MessagePack];

    #[test]
    fn test_supported_shapes_survive_both_formats() {
        let shapes = [
            json!(42),
            json!(-7),
            json!(2.5),
            json!("text"),
            json!(null),
            json!([1, "two", [3.0, false]]),
            json!({"nested": {"list": [1, 2, 3], "flag": true}, "empty": {}}),
        ];
        for format in FORMATS {
            let codec = Serializer::new(format);
            for shape in &shapes {
                let bytes = codec.serialize(shape).unwrap();
                let back: serde_json::Value = codec.deserialize(&bytes).unwrap();
                assert_eq!(&back, shape, "{format:?}");
            }
        }
    }

    #[test]
    fn test_typed_record_roundtrip() {
        let record = Prediction {
            label: "cat".into(),
            score: 0.93,
            features: vec![3, -1, 40],
            note: None,
        };
        for format in FORMATS {
            let codec = Serializer::new(format);
            let back: Prediction = codec.deserialize(&codec.serialize(&record).unwrap()).unwrap();
            assert_eq!(back, record);
        }
    }

    #[test]
    fn test_garbage_is_a_serialization_error() {
        let codec = Serializer::new(SerializationFormat::Json);
        let err = codec.deserialize::<Prediction>(b"{not json").unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
    }
}
