//! Wake strategies for a sleeping backend
//!
//! A backend is either woken by broadcasting a wake-on-LAN magic packet on
//! the local network, or by calling an HTTP endpoint (a smart plug, a BMC,
//! a hypervisor API) that powers it on.

use crate::config::{HttpMethod, WakeTarget};
use crate::error::WakeError;
use crate::magic::{MacAddress, MagicPacket, MAGIC_PACKET_LEN};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use tokio::net::UdpSocket;
use tracing::{debug, info};

/// Limited broadcast destination for magic packets (discard port)
pub const BROADCAST_TARGET: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::BROADCAST, 9);

/// The configured way of waking the backend
#[derive(Debug, Clone)]
pub enum WakeStrategy {
    Broadcast(BroadcastWake),
    Http(HttpWake),
}

impl WakeStrategy {
    pub fn from_target(target: WakeTarget, client: reqwest::Client) -> Self {
        match target {
            WakeTarget::Broadcast {
                mac_address,
                ip_address,
                interface,
            } => WakeStrategy::Broadcast(BroadcastWake {
                mac_address,
                ip_address,
                interface,
            }),
            WakeTarget::Http { start_url, method } => WakeStrategy::Http(HttpWake {
                client,
                start_url,
                method,
            }),
        }
    }

    /// Issue one wake attempt
    pub async fn wake(&self) -> Result<(), WakeError> {
        match self {
            WakeStrategy::Broadcast(broadcast) => broadcast.wake().await,
            WakeStrategy::Http(http) => http.wake().await,
        }
    }
}

/// Wake by calling a start URL
#[derive(Debug, Clone)]
pub struct HttpWake {
    client: reqwest::Client,
    start_url: String,
    method: HttpMethod,
}

impl HttpWake {
    pub async fn wake(&self) -> Result<(), WakeError> {
        info!(method = %self.method, url = %self.start_url, "Attempting to start backend");

        let response = send(&self.client, self.method, &self.start_url).await?;
        debug!(status = %response.status(), "Start call answered");
        Ok(())
    }
}

/// Issue a bodyless GET or POST. Only transport failures are errors.
pub(crate) async fn send(
    client: &reqwest::Client,
    method: HttpMethod,
    url: &str,
) -> Result<reqwest::Response, reqwest::Error> {
    let request = match method {
        HttpMethod::Get => client.get(url),
        HttpMethod::Post => client.post(url),
    };
    request.send().await
}

/// Wake by broadcasting a magic packet
#[derive(Debug, Clone)]
pub struct BroadcastWake {
    mac_address: MacAddress,
    ip_address: String,
    interface: Option<String>,
}

impl BroadcastWake {
    pub async fn wake(&self) -> Result<(), WakeError> {
        let source = match self.interface.as_deref() {
            Some(name) => Some(interface_source_address(name)?),
            None => None,
        };

        let packet = MagicPacket::new(self.mac_address);

        info!(
            mac = %self.mac_address,
            ip = %self.ip_address,
            source = ?source,
            target = %BROADCAST_TARGET,
            "Broadcasting magic packet"
        );

        send_magic_packet(&packet, source, SocketAddr::V4(BROADCAST_TARGET)).await
    }
}

/// Send one magic packet from `source` (any address when `None`) to `target`.
///
/// The socket lives only for this call.
pub async fn send_magic_packet(
    packet: &MagicPacket,
    source: Option<Ipv4Addr>,
    target: SocketAddr,
) -> Result<(), WakeError> {
    let local = SocketAddr::from((source.unwrap_or(Ipv4Addr::UNSPECIFIED), 0));
    let socket = UdpSocket::bind(local).await?;
    socket.set_broadcast(true)?;
    socket.connect(target).await?;

    let sent = socket.send(packet.as_bytes()).await?;
    if sent != MAGIC_PACKET_LEN {
        return Err(WakeError::TransmissionIncomplete(sent));
    }

    debug!(bytes = sent, %target, "Magic packet sent");
    Ok(())
}

/// First IPv4 address that is not a loopback address
pub fn select_source_address(addrs: &[IpAddr]) -> Option<Ipv4Addr> {
    addrs.iter().find_map(|addr| match addr {
        IpAddr::V4(v4) if !v4.is_loopback() => Some(*v4),
        _ => None,
    })
}

/// Resolve the broadcast source address of a named interface
pub fn interface_source_address(name: &str) -> Result<Ipv4Addr, WakeError> {
    let unavailable = |reason: &str| WakeError::InterfaceUnavailable {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let addrs = interface_addresses(name)
        .map_err(|e| unavailable(&e.to_string()))?
        .ok_or_else(|| unavailable("no such interface"))?;

    select_source_address(&addrs)
        .ok_or_else(|| unavailable("no non-loopback IPv4 address associated with interface"))
}

/// Addresses bound to `name`, or `None` if no interface has that name
#[cfg(unix)]
fn interface_addresses(name: &str) -> std::io::Result<Option<Vec<IpAddr>>> {
    use std::ffi::CStr;
    use std::net::Ipv6Addr;

    struct IfAddrs(*mut libc::ifaddrs);

    impl Drop for IfAddrs {
        fn drop(&mut self) {
            if !self.0.is_null() {
                // SAFETY: the pointer came from a successful getifaddrs and is freed once
                unsafe { libc::freeifaddrs(self.0) };
            }
        }
    }

    let mut head: *mut libc::ifaddrs = std::ptr::null_mut();
    // SAFETY: getifaddrs only writes the list head through the valid out pointer
    if unsafe { libc::getifaddrs(&mut head) } != 0 {
        return Err(std::io::Error::last_os_error());
    }
    let list = IfAddrs(head);

    let mut found = false;
    let mut addrs = Vec::new();
    let mut cursor = list.0;

    while !cursor.is_null() {
        // SAFETY: cursor walks the list returned by getifaddrs, which stays
        // alive until `list` is dropped
        let entry = unsafe { &*cursor };
        cursor = entry.ifa_next;

        if entry.ifa_name.is_null() {
            continue;
        }
        // SAFETY: non-null ifa_name is a NUL-terminated string owned by the list
        let entry_name = unsafe { CStr::from_ptr(entry.ifa_name) };
        if entry_name.to_bytes() != name.as_bytes() {
            continue;
        }
        found = true;

        if entry.ifa_addr.is_null() {
            continue;
        }
        // SAFETY: ifa_addr was checked for null above
        let family = unsafe { (*entry.ifa_addr).sa_family } as i32;
        if family == libc::AF_INET {
            // SAFETY: AF_INET entries point at a sockaddr_in
            let sin = unsafe { &*(entry.ifa_addr as *const libc::sockaddr_in) };
            addrs.push(IpAddr::V4(Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr))));
        } else if family == libc::AF_INET6 {
            // SAFETY: AF_INET6 entries point at a sockaddr_in6
            let sin6 = unsafe { &*(entry.ifa_addr as *const libc::sockaddr_in6) };
            addrs.push(IpAddr::V6(Ipv6Addr::from(sin6.sin6_addr.s6_addr)));
        }
    }

    Ok(found.then_some(addrs))
}

#[cfg(not(unix))]
fn interface_addresses(_name: &str) -> std::io::Result<Option<Vec<IpAddr>>> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "interface lookup is only supported on unix",
    ))
}
