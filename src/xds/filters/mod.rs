//! HTTP filter configuration for the listener filter chains.
//!
//! Filters are emitted in a fixed order: ext_authz (when configured), CORS, global rate
//! limiting (when configured) and finally the router.

pub mod http;

use envoy_types::pb::google::protobuf::Any;
use prost::Message;

/// Encode a prost message into an Envoy `Any`.
pub fn any_from_message<M: Message>(type_url: impl Into<String>, msg: &M) -> Any {
    Any { type_url: type_url.into(), value: msg.encode_to_vec() }
}
