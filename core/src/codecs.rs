//! Concrete [`MessageEncoder`](crate::traits::codec::MessageEncoder) /
//! [`MessageDecoder`](crate::traits::codec::MessageDecoder) implementations,
//! gated behind the `codec` feature so consumers who bring their own
//! serialization don't pay for `serde_json`.

use crate::traits::codec::{MessageDecoder, MessageEncoder};
use bytes::{Bytes, BytesMut};
use serde::{de::DeserializeOwned, Serialize};
use std::marker::PhantomData;

/// A JSON-backed codec, matching the worked example in the wire format
/// scenarios: `{"foo":"bar","baz":42}`.
#[derive(Debug, Default, Clone)]
pub struct JsonCodec<T> {
    _marker: PhantomData<T>,
}

impl<T> JsonCodec<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> MessageEncoder for JsonCodec<T>
where
    T: Serialize,
{
    type Item = T;
    type Error = serde_json::Error;

    fn encode(&self, item: Self::Item) -> Result<Bytes, Self::Error> {
        serde_json::to_vec(&item).map(Bytes::from)
    }
}

impl<T> MessageDecoder for JsonCodec<T>
where
    T: DeserializeOwned,
{
    type Item = T;
    type Error = serde_json::Error;

    fn decode(&self, bytes: BytesMut) -> Result<Self::Item, Self::Error> {
        serde_json::from_slice(&bytes)
    }
}
