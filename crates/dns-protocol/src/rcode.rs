//! Response codes carried in the 4-bit RCODE header field.

use std::fmt;

/// Number of distinct header response codes (4 bits).
///
/// Extended codes signalled through EDNS are not tracked; per-code tables
/// are sized by this constant.
pub const RCODE_COUNT: usize = 16;

const NAMES: [&str; RCODE_COUNT] = [
    "NOERROR",
    "FORMERR",
    "SERVFAIL",
    "NXDOMAIN",
    "NOTIMP",
    "REFUSED",
    "YXDOMAIN",
    "YXRRSET",
    "NXRRSET",
    "NOTAUTH",
    "NOTZONE",
    "DSOTYPENI",
    "RCODE12",
    "RCODE13",
    "RCODE14",
    "RCODE15",
];

/// A header response code. Always in `0..RCODE_COUNT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResponseCode(u8);

impl ResponseCode {
    pub const NO_ERROR: Self = Self(0);
    pub const FORM_ERR: Self = Self(1);
    pub const SERV_FAIL: Self = Self(2);
    pub const NX_DOMAIN: Self = Self(3);
    pub const NOT_IMP: Self = Self(4);
    pub const REFUSED: Self = Self(5);

    /// Extract the code from the header flags word.
    pub const fn from_flags(flags: u16) -> Self {
        Self((flags & 0x000F) as u8)
    }

    /// Code for a table index, if the index is in range.
    pub fn from_index(index: usize) -> Option<Self> {
        (index < RCODE_COUNT).then(|| Self(index as u8))
    }

    /// Position of this code in a `[_; RCODE_COUNT]` table.
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    pub fn name(self) -> &'static str {
        NAMES[self.index()]
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
