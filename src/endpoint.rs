use std::fmt;
use std::mem;
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::error::Error;

/// IPv4 endpoint: address plus port.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct V4Endpoint {
    pub address: Ipv4Addr,
    pub port: u16,
}

impl V4Endpoint {
    pub const fn new(address: Ipv4Addr, port: u16) -> V4Endpoint {
        V4Endpoint { address, port }
    }

    /// `127.0.0.1:port`.
    pub const fn localhost(port: u16) -> V4Endpoint {
        V4Endpoint::new(Ipv4Addr::LOCALHOST, port)
    }
}

impl fmt::Display for V4Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// Parses one decimal field, rejecting empty input, non-digits, and leading
/// zeros on multi-digit values.
fn parse_field(s: &str, max: u32, what: &str) -> Result<u32, Error> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::InvalidArgument(format!("malformed {what}: {s:?}")));
    }
    if s.len() > 1 && s.starts_with('0') {
        return Err(Error::InvalidArgument(format!(
            "leading zero in {what}: {s:?}"
        )));
    }
    match s.parse::<u32>() {
        Ok(value) if value <= max => Ok(value),
        _ => Err(Error::InvalidArgument(format!("{what} out of range: {s:?}"))),
    }
}

impl FromStr for V4Endpoint {
    type Err = Error;

    /// Accepts `A.B.C.D:P` with `A..D` in `[0, 255]` and `P` in `[0, 65535]`.
    fn from_str(s: &str) -> Result<V4Endpoint, Error> {
        let (addr, port) = s
            .split_once(':')
            .ok_or_else(|| Error::InvalidArgument(format!("missing port in {s:?}")))?;
        let mut octets = [0u8; 4];
        let mut fields = addr.split('.');
        for octet in octets.iter_mut() {
            let field = fields
                .next()
                .ok_or_else(|| Error::InvalidArgument(format!("malformed address: {addr:?}")))?;
            *octet = parse_field(field, 255, "octet")? as u8;
        }
        if fields.next().is_some() {
            return Err(Error::InvalidArgument(format!(
                "malformed address: {addr:?}"
            )));
        }
        let port = parse_field(port, u16::MAX as u32, "port")? as u16;
        Ok(V4Endpoint::new(Ipv4Addr::from(octets), port))
    }
}

/// Packs an endpoint into a `sockaddr_in` for bind/connect.
pub fn to_sockaddr_in(ep: V4Endpoint) -> libc::sockaddr_in {
    let mut saddr: libc::sockaddr_in = unsafe { mem::zeroed() };
    saddr.sin_family = libc::AF_INET as libc::sa_family_t;
    saddr.sin_port = ep.port.to_be();
    saddr.sin_addr.s_addr = u32::from_ne_bytes(ep.address.octets());
    saddr
}

/// Inverse of [`to_sockaddr_in`].
pub fn from_sockaddr_in(saddr: &libc::sockaddr_in) -> V4Endpoint {
    V4Endpoint::new(
        Ipv4Addr::from(saddr.sin_addr.s_addr.to_ne_bytes()),
        u16::from_be(saddr.sin_port),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed() {
        let ep: V4Endpoint = "127.0.0.1:8080".parse().unwrap();
        assert_eq!(ep, V4Endpoint::localhost(8080));
        let ep: V4Endpoint = "255.255.255.255:65535".parse().unwrap();
        assert_eq!(ep.port, 65535);
        let ep: V4Endpoint = "0.0.0.0:0".parse().unwrap();
        assert_eq!(ep.address, Ipv4Addr::UNSPECIFIED);
    }

    #[test]
    fn rejects_malformed() {
        for input in [
            "127.0.0.1",        // missing port
            "127.0.0:80",       // three octets
            "127.0.0.0.1:80",   // five octets
            "127.0.0.01:80",    // leading zero octet
            "256.0.0.1:80",     // octet out of range
            "127.0.0.1:65536",  // port out of range
            "127.0.0.x:80",     // non-digit octet
            "127.0.0.1:8x",     // non-digit port
            "127.0.0.1:",       // empty port
            ".0.0.1:80",        // empty octet
        ] {
            assert!(input.parse::<V4Endpoint>().is_err(), "accepted {input:?}");
        }
    }

    #[test]
    fn sockaddr_round_trip() {
        let ep = V4Endpoint::localhost(12345);
        assert_eq!(from_sockaddr_in(&to_sockaddr_in(ep)), ep);
    }

    #[test]
    fn display() {
        assert_eq!(V4Endpoint::localhost(80).to_string(), "127.0.0.1:80");
    }
}
