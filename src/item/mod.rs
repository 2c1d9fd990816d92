//! Items and the item codec
//!
//! An item is an envelope (id, etag, updated) plus a typed payload. The codec
//! flattens it into the string hash the remote engine stores.

mod codec;
mod value;

pub use codec::{
    ItemCodec, Record, ETAG_HASH_FIELD, FIELD_LIST, ID_HASH_FIELD, PAYLOAD_HASH_FIELD,
    UPDATED_HASH_FIELD,
};
pub use value::{Item, Value};
