//! Address helpers

use std::net::{IpAddr, Ipv4Addr, UdpSocket};

use crate::constants::DEFAULT_CONTROL_PORT;

/// Best-effort LAN IPv4 address of this machine.
///
/// Asks the routing table which local address would be used to reach a
/// non-local destination. No packet is sent. Falls back to loopback when
/// the machine has no route.
pub fn local_ipv4() -> IpAddr {
    let probe = || -> std::io::Result<IpAddr> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.connect((Ipv4Addr::new(192, 0, 2, 1), 9))?;
        Ok(socket.local_addr()?.ip())
    };

    match probe() {
        Ok(ip) if !ip.is_loopback() && !ip.is_unspecified() => ip,
        _ => IpAddr::V4(Ipv4Addr::LOCALHOST),
    }
}

/// Append the default control port when `address` has none
pub fn normalize_peer_address(address: &str) -> String {
    let address = address.trim();
    let has_port = match address.rsplit_once(':') {
        // Bare IPv6 literals contain colons but no bracketed port
        Some((host, port)) => {
            port.parse::<u16>().is_ok() && (!host.contains(':') || host.ends_with(']'))
        }
        None => false,
    };
    if has_port {
        address.to_string()
    } else if address.contains(':') && !address.starts_with('[') {
        format!("[{}]:{}", address, DEFAULT_CONTROL_PORT)
    } else {
        format!("{}:{}", address, DEFAULT_CONTROL_PORT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_ipv4_is_usable() {
        let ip = local_ipv4();
        assert!(ip.is_ipv4());
        assert!(!ip.is_unspecified());
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize_peer_address("10.0.0.5:9090"), "10.0.0.5:9090");
        assert_eq!(normalize_peer_address("10.0.0.5"), "10.0.0.5:9090");
        assert_eq!(normalize_peer_address(" desk.local "), "desk.local:9090");
        assert_eq!(normalize_peer_address("[fe80::1]:9191"), "[fe80::1]:9191");
        assert_eq!(normalize_peer_address("fe80::1"), "[fe80::1]:9090");
    }
}
