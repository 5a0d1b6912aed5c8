use std::fmt;
use std::str::FromStr;

use crate::error::TransportError;

/// The transport family a session identity is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Tcp,
    Udp,
    Serial,
    Snmp,
}

impl TransportKind {
    /// Canonical upper-case token used in identity strings.
    pub fn as_str(self) -> &'static str {
        match self {
            TransportKind::Tcp => "TCP",
            TransportKind::Udp => "UDP",
            TransportKind::Serial => "SERIAL",
            TransportKind::Snmp => "SNMP",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The string key uniquely naming a session/transport pairing.
///
/// Canonical form is `"<address-or-device>:<port-or-NULL>:<KIND>"`, e.g.
/// `"192.168.1.10:6668:TCP"` or `"tty1:NULL:SERIAL"`. The text form is the
/// session's external key and is embedded into every stage sub-identity and
/// into stamp metadata.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    pub device: String,
    pub port: Option<u16>,
    pub kind: TransportKind,
}

impl Identity {
    pub fn new(device: impl Into<String>, port: Option<u16>, kind: TransportKind) -> Self {
        Self {
            device: device.into(),
            port,
            kind,
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) => write!(f, "{}:{}:{}", self.device, port, self.kind),
            None => write!(f, "{}:NULL:{}", self.device, self.kind),
        }
    }
}

impl FromStr for Identity {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason| TransportError::InvalidIdentity {
            value: s.to_string(),
            reason,
        };

        // The device part may itself contain colons (IPv6), so split off the
        // kind and port from the right.
        let (rest, kind_token) = s.rsplit_once(':').ok_or(invalid("missing transport kind"))?;
        let (device, port_token) = rest.rsplit_once(':').ok_or(invalid("missing port field"))?;

        if device.is_empty() {
            return Err(invalid("empty device field"));
        }

        let kind = match kind_token {
            "TCP" => TransportKind::Tcp,
            "UDP" => TransportKind::Udp,
            "SERIAL" => TransportKind::Serial,
            "SNMP" => TransportKind::Snmp,
            _ => return Err(invalid("unknown transport kind")),
        };

        let port = match port_token {
            "NULL" => None,
            token => Some(
                token
                    .parse::<u16>()
                    .map_err(|_| invalid("port is not a u16 or NULL"))?,
            ),
        };

        Ok(Identity {
            device: device.to_string(),
            port,
            kind,
        })
    }
}
