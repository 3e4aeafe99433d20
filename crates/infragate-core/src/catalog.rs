//! Static kinds, actions and mixins of the infrastructure model
//!
//! The catalog doubles as the capability registry: every mixin an adapter
//! attaches must be resolvable here. Backends extend it once at startup with
//! their own template mixins (os_tpl, resource_tpl, availability zones).

use crate::error::{BackendError, Result};
use crate::model::{type_identifier, ActionDef, Kind, Location, Mixin};
use std::collections::BTreeMap;

pub const CORE_SCHEME: &str = "http://schemas.ogf.org/occi/core#";
pub const INFRA_SCHEME: &str = "http://schemas.ogf.org/occi/infrastructure#";
pub const COMPUTE_ACTION_SCHEME: &str = "http://schemas.ogf.org/occi/infrastructure/compute/action#";
pub const NETWORK_ACTION_SCHEME: &str = "http://schemas.ogf.org/occi/infrastructure/network/action#";
pub const STORAGE_ACTION_SCHEME: &str = "http://schemas.ogf.org/occi/infrastructure/storage/action#";
pub const NETWORK_MIXIN_SCHEME: &str = "http://schemas.ogf.org/occi/infrastructure/network#";
pub const NETWORKINTERFACE_MIXIN_SCHEME: &str =
    "http://schemas.ogf.org/occi/infrastructure/networkinterface#";

/// Scheme of backend-provided OS template mixins
pub const OS_TPL_SCHEME: &str = "http://occi.localhost/occi/infrastructure/os_tpl#";
/// Scheme of backend-provided resource template mixins
pub const RESOURCE_TPL_SCHEME: &str = "http://occi.localhost/occi/infrastructure/resource_tpl#";
pub const REGION_SCHEME: &str = "http://occi.localhost/occi/infrastructure/region#";
pub const AVAILABILITY_ZONE_SCHEME: &str =
    "http://occi.localhost/occi/infrastructure/availability_zone#";

pub mod kinds {
    pub const COMPUTE: &str = "http://schemas.ogf.org/occi/infrastructure#compute";
    pub const NETWORK: &str = "http://schemas.ogf.org/occi/infrastructure#network";
    pub const STORAGE: &str = "http://schemas.ogf.org/occi/infrastructure#storage";
    pub const NETWORKINTERFACE: &str = "http://schemas.ogf.org/occi/infrastructure#networkinterface";
    pub const STORAGELINK: &str = "http://schemas.ogf.org/occi/infrastructure#storagelink";
    pub const IPRESERVATION: &str = "http://schemas.ogf.org/occi/infrastructure#ipreservation";
}

pub mod mixins {
    pub const OS_TPL: &str = "http://schemas.ogf.org/occi/infrastructure#os_tpl";
    pub const RESOURCE_TPL: &str = "http://schemas.ogf.org/occi/infrastructure#resource_tpl";
    pub const REGION: &str = "http://schemas.ogf.org/occi/infrastructure#region";
    pub const AVAILABILITY_ZONE: &str = "http://schemas.ogf.org/occi/infrastructure#availability_zone";
    pub const IPNETWORK: &str = "http://schemas.ogf.org/occi/infrastructure/network#ipnetwork";
    pub const IPNETWORKINTERFACE: &str =
        "http://schemas.ogf.org/occi/infrastructure/networkinterface#ipnetworkinterface";
}

pub mod actions {
    pub const COMPUTE_START: &str = "http://schemas.ogf.org/occi/infrastructure/compute/action#start";
    pub const COMPUTE_STOP: &str = "http://schemas.ogf.org/occi/infrastructure/compute/action#stop";
    pub const COMPUTE_RESTART: &str =
        "http://schemas.ogf.org/occi/infrastructure/compute/action#restart";
    pub const COMPUTE_SUSPEND: &str =
        "http://schemas.ogf.org/occi/infrastructure/compute/action#suspend";
    pub const NETWORK_UP: &str = "http://schemas.ogf.org/occi/infrastructure/network/action#up";
    pub const NETWORK_DOWN: &str = "http://schemas.ogf.org/occi/infrastructure/network/action#down";
    pub const STORAGE_ONLINE: &str =
        "http://schemas.ogf.org/occi/infrastructure/storage/action#online";
    pub const STORAGE_OFFLINE: &str =
        "http://schemas.ogf.org/occi/infrastructure/storage/action#offline";
}

/// Canonical attribute names
pub mod attrs {
    pub const ID: &str = "occi.core.id";
    pub const TITLE: &str = "occi.core.title";
    pub const SUMMARY: &str = "occi.core.summary";

    pub const COMPUTE_ARCHITECTURE: &str = "occi.compute.architecture";
    pub const COMPUTE_CORES: &str = "occi.compute.cores";
    pub const COMPUTE_HOSTNAME: &str = "occi.compute.hostname";
    pub const COMPUTE_SPEED: &str = "occi.compute.speed";
    pub const COMPUTE_MEMORY: &str = "occi.compute.memory";
    pub const COMPUTE_STATE: &str = "occi.compute.state";

    pub const NETWORK_VLAN: &str = "occi.network.vlan";
    pub const NETWORK_LABEL: &str = "occi.network.label";
    pub const NETWORK_STATE: &str = "occi.network.state";
    pub const NETWORK_ADDRESS: &str = "occi.network.address";
    pub const NETWORK_GATEWAY: &str = "occi.network.gateway";
    pub const NETWORK_ALLOCATION: &str = "occi.network.allocation";

    pub const STORAGE_SIZE: &str = "occi.storage.size";
    pub const STORAGE_STATE: &str = "occi.storage.state";

    pub const NI_INTERFACE: &str = "occi.networkinterface.interface";
    pub const NI_MAC: &str = "occi.networkinterface.mac";
    pub const NI_STATE: &str = "occi.networkinterface.state";
    pub const NI_ADDRESS: &str = "occi.networkinterface.address";
    pub const NI_GATEWAY: &str = "occi.networkinterface.gateway";
    pub const NI_ALLOCATION: &str = "occi.networkinterface.allocation";

    pub const SL_DEVICEID: &str = "occi.storagelink.deviceid";
    pub const SL_MOUNTPOINT: &str = "occi.storagelink.mountpoint";
    pub const SL_STATE: &str = "occi.storagelink.state";

    pub const AVAILABILITY_ZONE_NAME: &str = "occi.availability_zone.name";
}

/// Kinds, actions and mixins known to this process
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    kinds: BTreeMap<String, Kind>,
    actions: BTreeMap<String, ActionDef>,
    mixins: BTreeMap<String, Mixin>,
}

impl Catalog {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The standard infrastructure model
    pub fn infrastructure() -> Self {
        let mut catalog = Self::empty();

        let compute_actions = [
            ActionDef::new(COMPUTE_ACTION_SCHEME, "start", "Start compute instance"),
            ActionDef::new(COMPUTE_ACTION_SCHEME, "stop", "Stop compute instance")
                .with_attributes(&["method"]),
            ActionDef::new(COMPUTE_ACTION_SCHEME, "restart", "Restart compute instance")
                .with_attributes(&["method"]),
            ActionDef::new(COMPUTE_ACTION_SCHEME, "suspend", "Suspend compute instance")
                .with_attributes(&["method"]),
        ];
        let network_actions = [
            ActionDef::new(NETWORK_ACTION_SCHEME, "up", "Activate network"),
            ActionDef::new(NETWORK_ACTION_SCHEME, "down", "Deactivate network"),
        ];
        let storage_actions = [
            ActionDef::new(STORAGE_ACTION_SCHEME, "online", "Activate storage"),
            ActionDef::new(STORAGE_ACTION_SCHEME, "offline", "Deactivate storage"),
        ];

        let ids = |defs: &[ActionDef]| -> Vec<String> {
            defs.iter().map(|a| a.type_identifier()).collect()
        };

        catalog.insert_kind(
            Kind::new(INFRA_SCHEME, "compute", "Compute Resource", Location::Resource)
                .with_attributes(&[
                    attrs::ID,
                    attrs::TITLE,
                    attrs::SUMMARY,
                    attrs::COMPUTE_ARCHITECTURE,
                    attrs::COMPUTE_CORES,
                    attrs::COMPUTE_HOSTNAME,
                    attrs::COMPUTE_SPEED,
                    attrs::COMPUTE_MEMORY,
                    attrs::COMPUTE_STATE,
                ])
                .with_actions(&ids(&compute_actions[..])),
        );
        catalog.insert_kind(
            Kind::new(INFRA_SCHEME, "network", "Network Resource", Location::Resource)
                .with_attributes(&[
                    attrs::ID,
                    attrs::TITLE,
                    attrs::SUMMARY,
                    attrs::NETWORK_VLAN,
                    attrs::NETWORK_LABEL,
                    attrs::NETWORK_STATE,
                ])
                .with_actions(&ids(&network_actions[..])),
        );
        catalog.insert_kind(
            Kind::new(INFRA_SCHEME, "storage", "Storage Resource", Location::Resource)
                .with_attributes(&[
                    attrs::ID,
                    attrs::TITLE,
                    attrs::SUMMARY,
                    attrs::STORAGE_SIZE,
                    attrs::STORAGE_STATE,
                ])
                .with_actions(&ids(&storage_actions[..])),
        );
        catalog.insert_kind(
            Kind::new(INFRA_SCHEME, "networkinterface", "Network Interface", Location::Link)
                .with_attributes(&[
                    attrs::ID,
                    attrs::TITLE,
                    attrs::NI_INTERFACE,
                    attrs::NI_MAC,
                    attrs::NI_STATE,
                ]),
        );
        catalog.insert_kind(
            Kind::new(INFRA_SCHEME, "storagelink", "Storage Link", Location::Link).with_attributes(
                &[
                    attrs::ID,
                    attrs::TITLE,
                    attrs::SL_DEVICEID,
                    attrs::SL_MOUNTPOINT,
                    attrs::SL_STATE,
                ],
            ),
        );
        catalog.insert_kind(
            Kind::new(INFRA_SCHEME, "ipreservation", "IP Reservation", Location::Resource)
                .with_attributes(&[attrs::ID, attrs::TITLE, attrs::NETWORK_ADDRESS]),
        );

        for action in compute_actions
            .into_iter()
            .chain(network_actions)
            .chain(storage_actions)
        {
            catalog.actions.insert(action.type_identifier(), action);
        }

        for mixin in [
            Mixin::new(INFRA_SCHEME, "os_tpl", "OS Template").applies_to(kinds::COMPUTE),
            Mixin::new(INFRA_SCHEME, "resource_tpl", "Resource Template")
                .applies_to(kinds::COMPUTE),
            Mixin::new(INFRA_SCHEME, "region", "Region"),
            Mixin::new(INFRA_SCHEME, "availability_zone", "Availability Zone"),
            Mixin::new(NETWORK_MIXIN_SCHEME, "ipnetwork", "IP Networking Mixin")
                .applies_to(kinds::NETWORK),
            Mixin::new(
                NETWORKINTERFACE_MIXIN_SCHEME,
                "ipnetworkinterface",
                "IP Network Interface Mixin",
            )
            .applies_to(kinds::NETWORKINTERFACE),
        ] {
            catalog.mixins.insert(mixin.type_identifier(), mixin);
        }

        catalog
    }

    fn insert_kind(&mut self, kind: Kind) {
        self.kinds.insert(kind.type_identifier(), kind);
    }

    /// Registers a backend-provided mixin.
    ///
    /// Every dependency must already be known. Re-registering the same type
    /// identifier replaces the previous definition.
    pub fn add_mixin(&mut self, mixin: Mixin) -> Result<()> {
        if let Some(missing) = mixin.depends.iter().find(|d| !self.mixins.contains_key(d.as_str())) {
            return Err(BackendError::Configuration(format!(
                "mixin {} depends on unknown mixin {}",
                mixin.type_identifier(),
                missing
            )));
        }
        self.mixins.insert(mixin.type_identifier(), mixin);
        Ok(())
    }

    pub fn kind(&self, type_id: &str) -> Option<&Kind> {
        self.kinds.get(type_id)
    }

    pub fn kind_by_term(&self, term: &str) -> Option<&Kind> {
        self.kinds.values().find(|k| k.term == term)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &Kind> {
        self.kinds.values()
    }

    pub fn action(&self, type_id: &str) -> Option<&ActionDef> {
        self.actions.get(type_id)
    }

    pub fn actions(&self) -> impl Iterator<Item = &ActionDef> {
        self.actions.values()
    }

    pub fn mixin(&self, type_id: &str) -> Option<&Mixin> {
        self.mixins.get(type_id)
    }

    pub fn mixins(&self) -> impl Iterator<Item = &Mixin> {
        self.mixins.values()
    }

    /// Mixins depending on the given one, e.g. all OS templates
    pub fn mixins_related_to<'a>(&'a self, type_id: &'a str) -> impl Iterator<Item = &'a Mixin> + 'a {
        self.mixins
            .values()
            .filter(move |m| m.depends.iter().any(|d| d == type_id))
    }
}

/// Builds an OS template mixin for a backend image/template key
pub fn os_tpl_mixin(term: &str, title: &str) -> Mixin {
    Mixin::new(OS_TPL_SCHEME, term, title)
        .depends_on(mixins::OS_TPL)
        .applies_to(kinds::COMPUTE)
}

/// Builds a resource template mixin, optionally carrying attribute defaults
pub fn resource_tpl_mixin(term: &str, title: &str) -> Mixin {
    Mixin::new(RESOURCE_TPL_SCHEME, term, title)
        .depends_on(mixins::RESOURCE_TPL)
        .applies_to(kinds::COMPUTE)
}

pub fn region_mixin(term: &str) -> Mixin {
    Mixin::new(REGION_SCHEME, term, format!("Region {}", term)).depends_on(mixins::REGION)
}

pub fn availability_zone_mixin(term: &str) -> Mixin {
    Mixin::new(AVAILABILITY_ZONE_SCHEME, term, format!("Availability zone {}", term))
        .depends_on(mixins::AVAILABILITY_ZONE)
        .with_default(attrs::AVAILABILITY_ZONE_NAME, serde_json::json!(term))
}

/// Type identifier of a backend-provided OS template
pub fn os_tpl_id(term: &str) -> String {
    type_identifier(OS_TPL_SCHEME, term)
}

pub fn resource_tpl_id(term: &str) -> String {
    type_identifier(RESOURCE_TPL_SCHEME, term)
}

pub fn availability_zone_id(term: &str) -> String {
    type_identifier(AVAILABILITY_ZONE_SCHEME, term)
}

pub fn region_id(term: &str) -> String {
    type_identifier(REGION_SCHEME, term)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infrastructure_kinds() {
        let catalog = Catalog::infrastructure();
        let compute = catalog.kind(kinds::COMPUTE).unwrap();
        assert_eq!(compute.term, "compute");
        assert!(!compute.is_link());
        assert!(compute.supports_action(actions::COMPUTE_START));

        assert!(catalog.kind(kinds::NETWORKINTERFACE).unwrap().is_link());
        assert!(catalog.kind_by_term("storagelink").unwrap().is_link());
        assert!(catalog.kind_by_term("bogus").is_none());
    }

    #[test]
    fn test_every_kind_action_is_defined() {
        let catalog = Catalog::infrastructure();
        for kind in catalog.kinds() {
            for action in &kind.actions {
                assert!(catalog.action(action).is_some(), "{} undefined", action);
            }
        }
    }

    #[test]
    fn test_add_mixin_requires_known_dependencies() {
        let mut catalog = Catalog::infrastructure();
        catalog.add_mixin(os_tpl_mixin("ubuntu", "Ubuntu")).unwrap();
        assert_eq!(catalog.mixins_related_to(mixins::OS_TPL).count(), 1);

        let orphan = Mixin::new(OS_TPL_SCHEME, "orphan", "Orphan").depends_on("http://nowhere#x");
        assert!(matches!(
            catalog.add_mixin(orphan),
            Err(BackendError::Configuration(_))
        ));
    }
}
