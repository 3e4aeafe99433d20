//! Virtual network template rendering

use crate::error::{NebulaError, Result};
use infragate_core::BackendError;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use tera::{Context, Tera};

/// An IPv4 network in CIDR notation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Cidr {
    pub network: Ipv4Addr,
    pub prefix: u8,
}

impl Ipv4Cidr {
    /// Parses `10.0.0.0/24`; a bare address is a /32
    pub fn parse(value: &str) -> infragate_core::Result<Self> {
        let invalid = || BackendError::ResourceNotValid(format!("{:?} is not an IPv4 network", value));

        let (addr, prefix) = match value.trim().split_once('/') {
            Some((addr, prefix)) => (addr, prefix.parse::<u8>().map_err(|_| invalid())?),
            None => (value.trim(), 32),
        };
        if prefix > 32 {
            return Err(invalid());
        }
        let addr: Ipv4Addr = addr.parse().map_err(|_| invalid())?;

        let network = Ipv4Addr::from(u32::from(addr) & Self::mask_bits(prefix));
        Ok(Self { network, prefix })
    }

    fn mask_bits(prefix: u8) -> u32 {
        if prefix == 0 {
            0
        } else {
            u32::MAX << (32 - u32::from(prefix))
        }
    }

    pub fn netmask(&self) -> Ipv4Addr {
        Ipv4Addr::from(Self::mask_bits(self.prefix))
    }

    /// First usable host address and number of usable hosts
    pub fn host_range(&self) -> (Ipv4Addr, u64) {
        let base = u32::from(self.network);
        match self.prefix {
            32 => (self.network, 1),
            31 => (self.network, 2),
            prefix => {
                let size = 1u64 << (32 - u32::from(prefix));
                (Ipv4Addr::from(base + 1), size - 2)
            }
        }
    }
}

/// Prefix length of a dotted netmask such as `255.255.255.0`
pub fn mask_to_prefix(mask: &str) -> Option<u32> {
    let bits = u32::from(mask.parse::<Ipv4Addr>().ok()?);
    // only contiguous masks are valid
    (bits.leading_ones() + bits.trailing_zeros() == 32).then(|| bits.leading_ones())
}

/// Parameters of a new virtual network
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VnetSpec {
    pub name: String,
    pub bridge: String,
    pub vlan_id: Option<i64>,
    pub address: Option<Ipv4Cidr>,
    pub gateway: Option<String>,
}

const VNET_TEMPLATE: &str = r#"NAME = {{ name | one_quote }}
VN_MAD = "bridge"
BRIDGE = {{ bridge | one_quote }}
{% if vlan_id is defined %}VLAN_ID = "{{ vlan_id }}"
{% endif %}{% if address is defined %}NETWORK_ADDRESS = "{{ address.network }}"
NETWORK_MASK = "{{ address.mask }}"
AR = [ TYPE = "IP4", IP = "{{ address.first }}", SIZE = "{{ address.size }}" ]
{% endif %}{% if gateway is defined %}GATEWAY = {{ gateway | one_quote }}
{% endif %}"#;

/// Double-quoted template value with `\` and `"` escaped
fn one_quote(value: &Value, _: &HashMap<String, Value>) -> tera::Result<Value> {
    let raw = value
        .as_str()
        .ok_or_else(|| tera::Error::msg("one_quote expects a string"))?;
    Ok(Value::String(format!(
        "\"{}\"",
        raw.replace('\\', "\\\\").replace('"', "\\\"")
    )))
}

impl VnetSpec {
    fn context(&self) -> Context {
        let mut context = Context::new();
        context.insert("name", &self.name);
        context.insert("bridge", &self.bridge);
        if let Some(vlan) = self.vlan_id {
            context.insert("vlan_id", &vlan);
        }
        if let Some(cidr) = &self.address {
            let (first, size) = cidr.host_range();
            context.insert(
                "address",
                &json!({
                    "network": cidr.network.to_string(),
                    "mask": cidr.netmask().to_string(),
                    "first": first.to_string(),
                    "size": size,
                }),
            );
        }
        if let Some(gateway) = &self.gateway {
            context.insert("gateway", gateway);
        }
        context
    }

    /// Renders the template accepted by `onevnet create`
    pub fn render(&self) -> Result<String> {
        let mut tera = Tera::default();
        tera.register_filter("one_quote", one_quote);
        tera.add_raw_template("vnet", VNET_TEMPLATE)
            .and_then(|_| tera.render("vnet", &self.context()))
            .map_err(|e| NebulaError::Template(template_error_detail(&e)))
    }
}

/// Tera error message with its causes appended
fn template_error_detail(err: &tera::Error) -> String {
    let mut detail = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        detail.push_str(": ");
        detail.push_str(&cause.to_string());
        source = cause.source();
    }
    detail
}
