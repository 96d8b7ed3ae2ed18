//! DNS resource record types (RFC 1035 §3.2.2 and the IANA registry).

use crate::error::ProtocolError;
use std::fmt;
use std::str::FromStr;

/// A query type code.
///
/// Stored as the raw 16-bit code so that types without a mnemonic can
/// still be queried using the RFC 3597 `TYPEnnn` syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordType(u16);

// Mnemonics accepted in input files, in code order.
const MNEMONICS: &[(&str, u16)] = &[
    ("A", 1),
    ("NS", 2),
    ("CNAME", 5),
    ("SOA", 6),
    ("PTR", 12),
    ("HINFO", 13),
    ("MX", 15),
    ("TXT", 16),
    ("RP", 17),
    ("AFSDB", 18),
    ("SIG", 24),
    ("KEY", 25),
    ("AAAA", 28),
    ("LOC", 29),
    ("SRV", 33),
    ("NAPTR", 35),
    ("KX", 36),
    ("CERT", 37),
    ("DNAME", 39),
    ("OPT", 41),
    ("APL", 42),
    ("DS", 43),
    ("SSHFP", 44),
    ("IPSECKEY", 45),
    ("RRSIG", 46),
    ("NSEC", 47),
    ("DNSKEY", 48),
    ("DHCID", 49),
    ("NSEC3", 50),
    ("NSEC3PARAM", 51),
    ("TLSA", 52),
    ("SMIMEA", 53),
    ("HIP", 55),
    ("CDS", 59),
    ("CDNSKEY", 60),
    ("OPENPGPKEY", 61),
    ("CSYNC", 62),
    ("ZONEMD", 63),
    ("SVCB", 64),
    ("HTTPS", 65),
    ("SPF", 99),
    ("EUI48", 108),
    ("EUI64", 109),
    ("TKEY", 249),
    ("TSIG", 250),
    ("IXFR", 251),
    ("AXFR", 252),
    ("ANY", 255),
    ("URI", 256),
    ("CAA", 257),
];

impl RecordType {
    pub const A: Self = Self(1);
    pub const NS: Self = Self(2);
    pub const CNAME: Self = Self(5);
    pub const SOA: Self = Self(6);
    pub const PTR: Self = Self(12);
    pub const MX: Self = Self(15);
    pub const TXT: Self = Self(16);
    pub const AAAA: Self = Self(28);
    pub const SRV: Self = Self(33);
    pub const DS: Self = Self(43);
    pub const DNSKEY: Self = Self(48);
    pub const HTTPS: Self = Self(65);
    pub const ANY: Self = Self(255);

    /// Wrap a raw type code.
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// The raw type code written to the wire.
    pub const fn code(self) -> u16 {
        self.0
    }

    /// The registered mnemonic, if this type has one.
    pub fn mnemonic(self) -> Option<&'static str> {
        MNEMONICS
            .iter()
            .find(|(_, code)| *code == self.0)
            .map(|(name, _)| *name)
    }
}

impl FromStr for RecordType {
    type Err = ProtocolError;

    /// Parse a mnemonic (case-insensitive) or `TYPEnnn`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.to_ascii_uppercase();

        if let Some((_, code)) = MNEMONICS.iter().find(|(name, _)| *name == upper) {
            return Ok(Self(*code));
        }

        upper
            .strip_prefix("TYPE")
            .and_then(|digits| digits.parse::<u16>().ok())
            .map(Self)
            .ok_or_else(|| ProtocolError::UnknownType(s.to_string()))
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mnemonic() {
            Some(name) => f.write_str(name),
            None => write!(f, "TYPE{}", self.0),
        }
    }
}
