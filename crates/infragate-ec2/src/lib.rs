//! Amazon EC2 backend for infragate
//!
//! Instances serve compute, VPCs serve network and EBS volumes serve
//! storage. AMIs from the configured owners become OS templates and the
//! configured instance types become resource templates.

pub mod api;
pub mod backend;
pub mod compute;
pub mod error;
pub mod network;
pub mod record;
pub mod storage;

pub use api::{Ec2Api, SdkEc2};
pub use backend::{BACKEND_NAME, DEFAULT_INSTANCE_TYPE, Ec2Backend, Ec2Settings, instance_size};
pub use error::{Ec2Error, Result};
pub use record::{
    ImageRecord, InstanceRecord, InstanceState, NetworkRequest, RunRequest, VolumeRecord,
    VolumeRequest, VpcRecord,
};
