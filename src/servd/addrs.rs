//! Interface address lookup.

use std::net::{Ipv4Addr, SocketAddrV4};

use crate::servd::ServdError;

pub trait InterfaceAddrs: Send {
    /// First IPv4 address on `interface`, if any.
    fn ipv4_of(&self, interface: &str) -> Result<Option<Ipv4Addr>, ServdError>;
}

/// The host's interfaces, via `getifaddrs(3)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemInterfaces;

impl InterfaceAddrs for SystemInterfaces {
    fn ipv4_of(&self, interface: &str) -> Result<Option<Ipv4Addr>, ServdError> {
        let addrs = nix::ifaddrs::getifaddrs().map_err(|source| ServdError::Interfaces {
            interface: interface.to_string(),
            source,
        })?;
        Ok(addrs
            .filter(|ifa| ifa.interface_name == interface)
            .filter_map(|ifa| ifa.address)
            .find_map(|addr| addr.as_sockaddr_in().map(|sin| *SocketAddrV4::from(*sin).ip())))
    }
}
