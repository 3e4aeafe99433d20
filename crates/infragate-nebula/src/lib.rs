//! OpenNebula backend for infragate
//!
//! Maps the canonical model onto OpenNebula objects:
//!
//! | kind             | OpenNebula object               |
//! |------------------|---------------------------------|
//! | compute          | VM (`onevm`)                    |
//! | network          | virtual network (`onevnet`)     |
//! | storage          | image (`oneimage`)              |
//! | networkinterface | NIC inside a VM template        |
//! | storagelink      | image-backed disk inside a VM   |
//!
//! VM templates are offered as OS templates and clusters as availability
//! zones. All calls go through [`NebulaApi`]; [`OneCli`] implements it on
//! top of the OpenNebula command line tools.

pub mod backend;
pub mod cli;
pub mod compute;
pub mod disk;
pub mod error;
pub mod links;
pub mod network;
pub mod nic;
pub mod record;
pub mod storage;
pub mod template;

pub use backend::{
    BACKEND_NAME, NebulaBackend, NebulaSettings, RESOURCE_TEMPLATES, template_term,
};
pub use cli::{ImageRequest, InstantiateRequest, NebulaApi, OneCli, PowerAction};
pub use error::{NebulaError, Result};
pub use record::{ClusterRecord, ImageRecord, TemplateRecord, VmRecord, VnetRecord};
