use crate::error::TransportError;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Capability required of every value that crosses a distributed transport.
/// It is implemented for any type that `serde` can round-trip, which covers
/// primitives, strings, tuples, and the standard sequence and associative
/// containers.
pub trait Payload: Serialize + DeserializeOwned + Clone + Send + 'static {}

impl<T> Payload for T where T: Serialize + DeserializeOwned + Clone + Send + 'static {}

/// An object that can encode a particular type to, and decode it from, a
/// `Vec<u8>`. The implementation can be based on a `serde` data format, or
/// anything else.
pub trait Coder {
    type Type;

    /// Convert an instance of the encodable type to bytes.
    fn encode(&self, inst: &Self::Type) -> Result<Vec<u8>, TransportError>;

    /// Decode a buffer of bytes to the decodable type.
    fn decode(&self, data: &[u8]) -> Result<Self::Type, TransportError>;
}

/// `Coder` based on the CBOR data format.
pub struct CborCoder<T> {
    phantom: std::marker::PhantomData<T>,
}

impl<T> CborCoder<T> {
    pub fn new() -> Self {
        Self {
            phantom: std::marker::PhantomData::<T> {},
        }
    }
}

impl<T> Coder for CborCoder<T>
where
    T: Serialize + DeserializeOwned,
{
    type Type = T;

    fn encode(&self, inst: &Self::Type) -> Result<Vec<u8>, TransportError> {
        let mut buffer = Vec::new();
        ciborium::ser::into_writer(inst, &mut buffer)
            .map_err(|e| TransportError::Codec(format!("{:?}", e)))?;
        Ok(buffer)
    }

    fn decode(&self, data: &[u8]) -> Result<Self::Type, TransportError> {
        ciborium::de::from_reader(data).map_err(|e| TransportError::Codec(format!("{:?}", e)))
    }
}

impl<T> Default for CborCoder<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode a run of values as one message body.
pub(crate) fn encode_values<T: Payload>(values: &[T]) -> Result<Vec<u8>, TransportError> {
    CborCoder::<Vec<T>>::new().encode(&values.to_vec())
}

/// Decode a message body produced by [`encode_values`].
pub(crate) fn decode_values<T: Payload>(data: &[u8]) -> Result<Vec<T>, TransportError> {
    CborCoder::<Vec<T>>::new().decode(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn cbor_coder_handles_associative_containers() {
        let coder = CborCoder::<BTreeMap<String, Vec<i32>>>::new();
        let mut map = BTreeMap::new();
        map.insert("even".to_string(), vec![0, 2, 4]);
        map.insert("odd".to_string(), vec![1, 3]);
        let bytes = coder.encode(&map).unwrap();
        assert_eq!(coder.decode(&bytes).unwrap(), map);
    }

    #[test]
    fn decoding_garbage_is_a_codec_error() {
        let coder = CborCoder::<Vec<f64>>::new();
        match coder.decode(&[0xff, 0x00, 0x13]) {
            Err(TransportError::Codec(_)) => {}
            other => panic!("expected a codec error, got {:?}", other),
        }
    }

    #[test]
    fn value_runs_keep_their_order() {
        let bytes = encode_values(&["a".to_string(), "b".to_string()]).unwrap();
        let values: Vec<String> = decode_values(&bytes).unwrap();
        assert_eq!(values, vec!["a", "b"]);
    }
}
