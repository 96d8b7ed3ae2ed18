//! Query message encoding and response header decoding.
//!
//! Message layout per RFC 1035 §4.1. The OPT pseudo-record follows
//! RFC 6891 §6.1.2 and the Client Subnet option RFC 7871 §6.

use crate::error::{ProtocolError, ProtocolResult};
use crate::rcode::ResponseCode;
use crate::rtype::RecordType;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Fixed header size in octets.
pub const HEADER_LEN: usize = 12;

pub const CLASS_IN: u16 = 1;
pub const TYPE_OPT: u16 = 41;
pub const OPTION_CLIENT_SUBNET: u16 = 8;

/// Advertised UDP payload size in the OPT record.
pub const EDNS_UDP_PAYLOAD: u16 = 1232;

const MAX_NAME_LEN: usize = 255;
const MAX_LABEL_LEN: usize = 63;

const FLAG_QR: u16 = 0x8000;
const FLAG_TC: u16 = 0x0200;
const FLAG_RD: u16 = 0x0100;

const FAMILY_IPV4: u16 = 1;
const FAMILY_IPV6: u16 = 2;

/// EDNS0 Client Subnet carried with a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientSubnet {
    pub address: IpAddr,
    pub source_prefix: u8,
}

impl ClientSubnet {
    /// A full-length prefix for a single address (/32 or /128).
    pub fn host(address: IpAddr) -> Self {
        Self {
            address,
            source_prefix: max_prefix(&address),
        }
    }

    pub fn family(&self) -> u16 {
        match self.address {
            IpAddr::V4(_) => FAMILY_IPV4,
            IpAddr::V6(_) => FAMILY_IPV6,
        }
    }

    /// Address octets truncated to the prefix, with trailing bits zeroed.
    fn prefix_octets(&self) -> Vec<u8> {
        let mut octets = match self.address {
            IpAddr::V4(v4) => v4.octets().to_vec(),
            IpAddr::V6(v6) => v6.octets().to_vec(),
        };
        let prefix = self.source_prefix as usize;
        octets.truncate(prefix.div_ceil(8));

        let spare_bits = octets.len() * 8 - prefix;
        if let Some(last) = octets.last_mut() {
            *last &= 0xFFu8 << spare_bits;
        }
        octets
    }
}

fn max_prefix(address: &IpAddr) -> u8 {
    match address {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

impl FromStr for ClientSubnet {
    type Err = ProtocolError;

    /// Parse `addr` or `addr/prefix`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ProtocolError::InvalidSubnet(s.to_string());

        let (addr, prefix) = match s.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (s, None),
        };
        let address: IpAddr = addr.parse().map_err(|_| invalid())?;

        match prefix {
            None => Ok(Self::host(address)),
            Some(p) => {
                let source_prefix: u8 = p.parse().map_err(|_| invalid())?;
                if source_prefix > max_prefix(&address) {
                    return Err(invalid());
                }
                Ok(Self {
                    address,
                    source_prefix,
                })
            }
        }
    }
}

impl fmt::Display for ClientSubnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.source_prefix)
    }
}

/// Encode a recursive query with a single question.
pub fn encode_query(
    id: u16,
    name: &str,
    rtype: RecordType,
    subnet: Option<&ClientSubnet>,
) -> ProtocolResult<Bytes> {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + name.len() + 6 + 32);

    buf.put_u16(id);
    buf.put_u16(FLAG_RD);
    buf.put_u16(1); // QDCOUNT
    buf.put_u16(0); // ANCOUNT
    buf.put_u16(0); // NSCOUNT
    buf.put_u16(u16::from(subnet.is_some()));

    encode_name(&mut buf, name)?;
    buf.put_u16(rtype.code());
    buf.put_u16(CLASS_IN);

    if let Some(subnet) = subnet {
        encode_opt(&mut buf, subnet);
    }

    Ok(buf.freeze())
}

fn encode_name(buf: &mut BytesMut, name: &str) -> ProtocolResult<()> {
    let invalid = |reason: &str| ProtocolError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let relative = name.strip_suffix('.').unwrap_or(name);
    if relative.is_empty() {
        buf.put_u8(0);
        return Ok(());
    }

    let mut wire_len = 1;
    for label in relative.split('.') {
        if label.is_empty() {
            return Err(invalid("empty label"));
        }
        if label.len() > MAX_LABEL_LEN {
            return Err(invalid("label longer than 63 octets"));
        }
        wire_len += label.len() + 1;
        if wire_len > MAX_NAME_LEN {
            return Err(invalid("name longer than 255 octets"));
        }
        buf.put_u8(label.len() as u8);
        buf.put_slice(label.as_bytes());
    }
    buf.put_u8(0);
    Ok(())
}

fn encode_opt(buf: &mut BytesMut, subnet: &ClientSubnet) {
    let address = subnet.prefix_octets();
    let option_len = 4 + address.len() as u16;

    buf.put_u8(0); // root owner name
    buf.put_u16(TYPE_OPT);
    buf.put_u16(EDNS_UDP_PAYLOAD);
    buf.put_u32(0); // extended RCODE, version, flags
    buf.put_u16(4 + option_len);

    buf.put_u16(OPTION_CLIENT_SUBNET);
    buf.put_u16(option_len);
    buf.put_u16(subnet.family());
    buf.put_u8(subnet.source_prefix);
    buf.put_u8(0); // scope prefix
    buf.put_slice(&address);
}

/// Copy an encoded message, replacing its ID.
pub fn with_message_id(message: &[u8], id: u16) -> ProtocolResult<Bytes> {
    if message.len() < HEADER_LEN {
        return Err(ProtocolError::ShortMessage {
            len: message.len(),
            need: HEADER_LEN,
        });
    }
    let mut buf = BytesMut::from(message);
    buf[..2].copy_from_slice(&id.to_be_bytes());
    Ok(buf.freeze())
}

/// The fixed header of a received message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    pub id: u16,
    pub flags: u16,
    pub qdcount: u16,
    pub ancount: u16,
    pub nscount: u16,
    pub arcount: u16,
}

impl ResponseHeader {
    pub fn parse(data: &[u8]) -> ProtocolResult<Self> {
        if data.len() < HEADER_LEN {
            return Err(ProtocolError::ShortMessage {
                len: data.len(),
                need: HEADER_LEN,
            });
        }

        let mut cur = &data[..HEADER_LEN];
        Ok(Self {
            id: cur.get_u16(),
            flags: cur.get_u16(),
            qdcount: cur.get_u16(),
            ancount: cur.get_u16(),
            nscount: cur.get_u16(),
            arcount: cur.get_u16(),
        })
    }

    pub fn is_response(&self) -> bool {
        self.flags & FLAG_QR != 0
    }

    pub fn is_truncated(&self) -> bool {
        self.flags & FLAG_TC != 0
    }

    pub fn response_code(&self) -> ResponseCode {
        ResponseCode::from_flags(self.flags)
    }
}
