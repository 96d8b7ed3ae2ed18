//! Query descriptors parsed from input lines.

use crate::error::{ProtocolError, ProtocolResult};
use crate::message::{encode_query, ClientSubnet};
use crate::rtype::RecordType;
use bytes::Bytes;
use std::fmt;
use std::str::FromStr;

/// One question to send: `name type [subnet]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub name: String,
    pub rtype: RecordType,
    pub subnet: Option<ClientSubnet>,
}

impl Question {
    pub fn new(name: impl Into<String>, rtype: RecordType) -> Self {
        Self {
            name: name.into(),
            rtype,
            subnet: None,
        }
    }

    pub fn with_subnet(mut self, subnet: ClientSubnet) -> Self {
        self.subnet = Some(subnet);
        self
    }

    /// Parse one input line.
    ///
    /// Returns `Ok(None)` for blank lines and `;`/`#` comments. Tokens after
    /// the optional subnet are ignored.
    pub fn parse_line(line: &str) -> ProtocolResult<Option<Self>> {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with(';') || trimmed.starts_with('#') {
            return Ok(None);
        }

        let mut fields = trimmed.split_whitespace();
        let (Some(name), Some(qtype)) = (fields.next(), fields.next()) else {
            return Err(ProtocolError::InvalidFormat(line.to_string()));
        };

        let rtype: RecordType = qtype.parse()?;
        let subnet = fields.next().map(str::parse::<ClientSubnet>).transpose()?;

        Ok(Some(Self {
            name: name.to_string(),
            rtype,
            subnet,
        }))
    }

    /// The name in fully-qualified form (trailing dot).
    pub fn fqdn(&self) -> String {
        if self.name.ends_with('.') {
            self.name.clone()
        } else {
            format!("{}.", self.name)
        }
    }

    /// Encode this question as a query message with the given ID.
    pub fn encode(&self, id: u16) -> ProtocolResult<Bytes> {
        encode_query(id, &self.name, self.rtype, self.subnet.as_ref())
    }
}

impl FromStr for Question {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_line(s)?.ok_or_else(|| ProtocolError::InvalidFormat(s.to_string()))
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.fqdn(), self.rtype)?;
        if let Some(subnet) = &self.subnet {
            write!(f, " {}", subnet)?;
        }
        Ok(())
    }
}
