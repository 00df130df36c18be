//! DHCPv4 message codec
//!
//! Maps between the fixed-layout BOOTP/DHCP wire format of RFC 2131
//! (Figure 1) and the structured [`DhcpMessage`] value. The options field
//! is carried as an opaque trailing blob and never interpreted.

use bytes::{Buf as _, BufMut as _, Bytes, BytesMut};
use std::{borrow::Cow, fmt, net::Ipv4Addr};
use thiserror::Error;

/// Length of the fixed header that precedes the options field.
pub const HEADER_LEN: usize = 236;
/// Width of the `chaddr` slot.
pub const CHADDR_LEN: usize = 16;
/// Width of the `sname` slot, terminator included.
pub const SNAME_LEN: usize = 64;
/// Width of the `file` slot, terminator included.
pub const FILE_LEN: usize = 128;

/// Errors produced while decoding, encoding or building a message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Message truncated: got {len} bytes, need at least 236")]
    TruncatedMessage { len: usize },

    #[error("Field '{field}' is {actual} bytes long, at most {max} fit")]
    FieldTooLong {
        field: &'static str,
        max: usize,
        actual: usize,
    },

    #[error("Field '{field}' must be exactly {expected} bytes, got {actual}")]
    InvalidFieldLength {
        field: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// The `op` field. Values other than 1 and 2 are kept as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    BootRequest,
    BootReply,
    Unknown(u8),
}

impl From<u8> for Opcode {
    fn from(value: u8) -> Self {
        match value {
            1 => Opcode::BootRequest,
            2 => Opcode::BootReply,
            other => Opcode::Unknown(other),
        }
    }
}

impl From<Opcode> for u8 {
    fn from(value: Opcode) -> Self {
        match value {
            Opcode::BootRequest => 1,
            Opcode::BootReply => 2,
            Opcode::Unknown(other) => other,
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Opcode::BootRequest => f.write_str("BOOTREQUEST"),
            Opcode::BootReply => f.write_str("BOOTREPLY"),
            Opcode::Unknown(op) => write!(f, "UNKNOWN({op})"),
        }
    }
}

/// Selects one of the four IPv4 address fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressField {
    Ciaddr,
    Yiaddr,
    Siaddr,
    Giaddr,
}

impl AddressField {
    fn name(self) -> &'static str {
        match self {
            AddressField::Ciaddr => "ciaddr",
            AddressField::Yiaddr => "yiaddr",
            AddressField::Siaddr => "siaddr",
            AddressField::Giaddr => "giaddr",
        }
    }
}

/// One BOOTP/DHCP packet.
///
/// `xid`, `secs` and `flags` are stored as the little-endian reading of
/// their wire bytes, so a decode/encode pass never reorders them. Address
/// fields keep their wire octets in order. `sname` and `file` hold the raw
/// bytes before the slot's terminator; they are only read as text on request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhcpMessage {
    opcode: Opcode,
    htype: u8,
    hlen: u8,
    hops: u8,
    xid: u32,
    secs: i16,
    flags: i16,
    ciaddr: Ipv4Addr,
    yiaddr: Ipv4Addr,
    siaddr: Ipv4Addr,
    giaddr: Ipv4Addr,
    chaddr: [u8; CHADDR_LEN],
    sname: Bytes,
    file: Bytes,
    options: Bytes,
}

impl Default for DhcpMessage {
    fn default() -> Self {
        Self {
            opcode: Opcode::BootRequest,
            htype: 1,
            hlen: 6,
            hops: 0,
            xid: 0,
            secs: 0,
            flags: 0,
            ciaddr: Ipv4Addr::UNSPECIFIED,
            yiaddr: Ipv4Addr::UNSPECIFIED,
            siaddr: Ipv4Addr::UNSPECIFIED,
            giaddr: Ipv4Addr::UNSPECIFIED,
            chaddr: [0; CHADDR_LEN],
            sname: Bytes::new(),
            file: Bytes::new(),
            options: Bytes::new(),
        }
    }
}

impl DhcpMessage {
    /// Decodes a message from a received datagram.
    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        if buf.len() < HEADER_LEN {
            return Err(CodecError::TruncatedMessage { len: buf.len() });
        }

        let mut cursor = buf;
        let opcode = Opcode::from(cursor.get_u8());
        let htype = cursor.get_u8();
        let hlen = cursor.get_u8();
        let hops = cursor.get_u8();
        let xid = cursor.get_u32_le();
        let secs = cursor.get_i16_le();
        let flags = cursor.get_i16_le();
        let ciaddr = get_ipv4(&mut cursor);
        let yiaddr = get_ipv4(&mut cursor);
        let siaddr = get_ipv4(&mut cursor);
        let giaddr = get_ipv4(&mut cursor);
        let mut chaddr = [0u8; CHADDR_LEN];
        cursor.copy_to_slice(&mut chaddr);
        let sname = get_slot(&mut cursor, SNAME_LEN);
        let file = get_slot(&mut cursor, FILE_LEN);
        let options = Bytes::copy_from_slice(cursor);

        Ok(Self {
            opcode,
            htype,
            hlen,
            hops,
            xid,
            secs,
            flags,
            ciaddr,
            yiaddr,
            siaddr,
            giaddr,
            chaddr,
            sname,
            file,
            options,
        })
    }

    /// Encodes the message into exactly `236 + options.len()` bytes.
    pub fn encode(&self) -> Result<Bytes, CodecError> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_u8(self.opcode.into());
        buf.put_u8(self.htype);
        buf.put_u8(self.hlen);
        buf.put_u8(self.hops);
        buf.put_u32_le(self.xid);
        buf.put_i16_le(self.secs);
        buf.put_i16_le(self.flags);
        buf.put_slice(&self.ciaddr.octets());
        buf.put_slice(&self.yiaddr.octets());
        buf.put_slice(&self.siaddr.octets());
        buf.put_slice(&self.giaddr.octets());
        buf.put_slice(&self.chaddr);
        put_slot(&mut buf, "sname", &self.sname, SNAME_LEN)?;
        put_slot(&mut buf, "file", &self.file, FILE_LEN)?;
        debug_assert_eq!(buf.len(), HEADER_LEN);
        buf.put_slice(&self.options);
        Ok(buf.freeze())
    }

    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.options.len()
    }

    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    pub fn set_opcode(&mut self, opcode: Opcode) -> &mut Self {
        self.opcode = opcode;
        self
    }

    pub fn htype(&self) -> u8 {
        self.htype
    }

    pub fn set_htype(&mut self, htype: u8) -> &mut Self {
        self.htype = htype;
        self
    }

    pub fn hlen(&self) -> u8 {
        self.hlen
    }

    pub fn set_hlen(&mut self, hlen: u8) -> &mut Self {
        self.hlen = hlen;
        self
    }

    pub fn hops(&self) -> u8 {
        self.hops
    }

    pub fn set_hops(&mut self, hops: u8) -> &mut Self {
        self.hops = hops;
        self
    }

    pub fn xid(&self) -> u32 {
        self.xid
    }

    pub fn set_xid(&mut self, xid: u32) -> &mut Self {
        self.xid = xid;
        self
    }

    pub fn secs(&self) -> i16 {
        self.secs
    }

    pub fn set_secs(&mut self, secs: i16) -> &mut Self {
        self.secs = secs;
        self
    }

    pub fn flags(&self) -> i16 {
        self.flags
    }

    pub fn set_flags(&mut self, flags: i16) -> &mut Self {
        self.flags = flags;
        self
    }

    pub fn ciaddr(&self) -> Ipv4Addr {
        self.ciaddr
    }

    pub fn set_ciaddr(&mut self, addr: Ipv4Addr) -> &mut Self {
        self.ciaddr = addr;
        self
    }

    pub fn yiaddr(&self) -> Ipv4Addr {
        self.yiaddr
    }

    pub fn set_yiaddr(&mut self, addr: Ipv4Addr) -> &mut Self {
        self.yiaddr = addr;
        self
    }

    pub fn siaddr(&self) -> Ipv4Addr {
        self.siaddr
    }

    pub fn set_siaddr(&mut self, addr: Ipv4Addr) -> &mut Self {
        self.siaddr = addr;
        self
    }

    pub fn giaddr(&self) -> Ipv4Addr {
        self.giaddr
    }

    pub fn set_giaddr(&mut self, addr: Ipv4Addr) -> &mut Self {
        self.giaddr = addr;
        self
    }

    /// Sets an address field from raw octets, which must be exactly 4 bytes.
    pub fn set_address(
        &mut self,
        field: AddressField,
        octets: &[u8],
    ) -> Result<&mut Self, CodecError> {
        let octets: [u8; 4] = octets
            .try_into()
            .map_err(|_| CodecError::InvalidFieldLength {
                field: field.name(),
                expected: 4,
                actual: octets.len(),
            })?;
        let addr = Ipv4Addr::from(octets);
        Ok(match field {
            AddressField::Ciaddr => self.set_ciaddr(addr),
            AddressField::Yiaddr => self.set_yiaddr(addr),
            AddressField::Siaddr => self.set_siaddr(addr),
            AddressField::Giaddr => self.set_giaddr(addr),
        })
    }

    pub fn chaddr(&self) -> &[u8; CHADDR_LEN] {
        &self.chaddr
    }

    /// Replaces the whole 16-byte `chaddr` slot.
    pub fn set_chaddr(&mut self, chaddr: &[u8]) -> Result<&mut Self, CodecError> {
        self.chaddr = chaddr
            .try_into()
            .map_err(|_| CodecError::InvalidFieldLength {
                field: "chaddr",
                expected: CHADDR_LEN,
                actual: chaddr.len(),
            })?;
        Ok(self)
    }

    /// Stores a hardware address of up to 16 bytes, zero-padding the rest
    /// of `chaddr` and setting `hlen` to its length.
    pub fn set_client_hardware_address(&mut self, addr: &[u8]) -> Result<&mut Self, CodecError> {
        if addr.len() > CHADDR_LEN {
            return Err(CodecError::FieldTooLong {
                field: "chaddr",
                max: CHADDR_LEN,
                actual: addr.len(),
            });
        }
        let mut chaddr = [0u8; CHADDR_LEN];
        chaddr[..addr.len()].copy_from_slice(addr);
        self.chaddr = chaddr;
        // bounded by CHADDR_LEN above
        self.hlen = addr.len() as u8;
        Ok(self)
    }

    /// The meaningful part of `chaddr` as colon-separated lowercase hex.
    pub fn hardware_address_string(&self) -> String {
        let len = usize::from(self.hlen).min(CHADDR_LEN);
        crate::network::format_hardware_address(&self.chaddr[..len])
    }

    /// Server host name as text. Invalid UTF-8 is replaced for display only.
    pub fn sname(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.sname)
    }

    pub fn sname_bytes(&self) -> &[u8] {
        &self.sname
    }

    /// Sets the server host name; at most 63 bytes fit beside the terminator.
    pub fn set_sname(&mut self, sname: impl Into<Bytes>) -> Result<&mut Self, CodecError> {
        let sname = sname.into();
        check_slot("sname", &sname, SNAME_LEN)?;
        self.sname = sname;
        Ok(self)
    }

    /// Boot file name as text. Invalid UTF-8 is replaced for display only.
    pub fn file(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.file)
    }

    pub fn file_bytes(&self) -> &[u8] {
        &self.file
    }

    /// Sets the boot file name; at most 127 bytes fit beside the terminator.
    pub fn set_file(&mut self, file: impl Into<Bytes>) -> Result<&mut Self, CodecError> {
        let file = file.into();
        check_slot("file", &file, FILE_LEN)?;
        self.file = file;
        Ok(self)
    }

    pub fn options(&self) -> &Bytes {
        &self.options
    }

    pub fn set_options(&mut self, options: impl Into<Bytes>) -> &mut Self {
        self.options = options.into();
        self
    }
}

fn get_ipv4(cursor: &mut &[u8]) -> Ipv4Addr {
    let mut octets = [0u8; 4];
    cursor.copy_to_slice(&mut octets);
    Ipv4Addr::from(octets)
}

/// Reads a fixed slot and returns the bytes before the first zero byte.
fn get_slot(cursor: &mut &[u8], slot: usize) -> Bytes {
    let bytes = &cursor[..slot];
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(slot);
    let value = Bytes::copy_from_slice(&bytes[..end]);
    cursor.advance(slot);
    value
}

fn check_slot(field: &'static str, value: &[u8], slot: usize) -> Result<(), CodecError> {
    if value.len() >= slot {
        return Err(CodecError::FieldTooLong {
            field,
            max: slot - 1,
            actual: value.len(),
        });
    }
    Ok(())
}

fn put_slot(
    buf: &mut BytesMut,
    field: &'static str,
    value: &[u8],
    slot: usize,
) -> Result<(), CodecError> {
    check_slot(field, value, slot)?;
    buf.put_slice(value);
    buf.put_bytes(0, slot - value.len());
    Ok(())
}
