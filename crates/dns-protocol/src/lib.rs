//! Minimal DNS wire support for load generation.
//!
//! Only what a query replayer needs is implemented:
//! - Encoding a single-question query, optionally carrying an EDNS0
//!   Client Subnet option (RFC 7871)
//! - Decoding the fixed response header (ID, flags, RCODE, counts)
//! - Parsing `name type [subnet]` input lines into questions
//!
//! Resource record bodies in responses are never decoded; the load
//! generator only needs the response size and code.

pub mod error;
pub mod message;
pub mod query;
pub mod rcode;
pub mod rtype;

pub use error::{ProtocolError, ProtocolResult};
pub use message::{encode_query, with_message_id, ClientSubnet, ResponseHeader, HEADER_LEN};
pub use query::Question;
pub use rcode::{ResponseCode, RCODE_COUNT};
pub use rtype::RecordType;
