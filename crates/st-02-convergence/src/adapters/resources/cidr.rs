use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// IPv4 network in CIDR notation, e.g. `10.0.1.0/24`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ipv4Cidr {
    network: Ipv4Addr,
    prefix: u8,
}

impl Ipv4Cidr {
    fn mask(prefix: u8) -> u32 {
        if prefix == 0 {
            0
        } else {
            u32::MAX << (32 - u32::from(prefix))
        }
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    /// Whether `other` lies entirely within this network.
    pub fn contains(&self, other: &Ipv4Cidr) -> bool {
        other.prefix >= self.prefix
            && u32::from(other.network) & Self::mask(self.prefix) == u32::from(self.network)
    }

    /// First usable host address, conventionally the gateway.
    pub fn gateway(&self) -> Ipv4Addr {
        if self.prefix >= 31 {
            return self.network;
        }
        Ipv4Addr::from(u32::from(self.network) + 1)
    }
}

impl FromStr for Ipv4Cidr {
    type Err = String;

    /// Host bits must be zero.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = raw
            .split_once('/')
            .ok_or_else(|| format!("'{}' is not in address/prefix form", raw))?;
        let addr: Ipv4Addr = addr
            .parse()
            .map_err(|_| format!("'{}' is not an IPv4 address", addr))?;
        let prefix: u8 = prefix
            .parse()
            .ok()
            .filter(|p| *p <= 32)
            .ok_or_else(|| format!("'{}' is not a prefix length between 0 and 32", prefix))?;

        if u32::from(addr) & !Self::mask(prefix) != 0 {
            return Err(format!("'{}' has host bits set", raw));
        }

        Ok(Self {
            network: addr,
            prefix,
        })
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}
