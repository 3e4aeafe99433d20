//! EC2 API seam and its `aws-sdk-ec2` implementation

use crate::error::{Ec2Error, Result};
use crate::record::{
    ImageRecord, InstanceRecord, InstanceState, RunRequest, VolumeRecord, VolumeRequest, VpcRecord,
};
use async_trait::async_trait;
use aws_sdk_ec2::Client;
use aws_sdk_ec2::config::Region;
use aws_sdk_ec2::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_ec2::types::{
    Filter, Instance, InstanceType, Placement, ResourceType, Tag, TagSpecification, VpcState,
};

/// Operations the adapters need from EC2
#[async_trait]
pub trait Ec2Api: Send + Sync {
    /// All instances when `ids` is empty
    async fn describe_instances(&self, ids: &[String]) -> Result<Vec<InstanceRecord>>;
    async fn run_instance(&self, request: &RunRequest) -> Result<String>;
    async fn terminate_instance(&self, id: &str) -> Result<()>;
    async fn start_instance(&self, id: &str) -> Result<()>;
    async fn stop_instance(&self, id: &str, force: bool) -> Result<()>;
    async fn reboot_instance(&self, id: &str) -> Result<()>;

    async fn describe_vpcs(&self, ids: &[String]) -> Result<Vec<VpcRecord>>;
    async fn create_vpc(&self, cidr: &str) -> Result<String>;
    async fn delete_vpc(&self, vpc_id: &str) -> Result<()>;
    async fn create_subnet(
        &self,
        vpc_id: &str,
        cidr: &str,
        availability_zone: Option<&str>,
    ) -> Result<String>;
    async fn delete_subnet(&self, subnet_id: &str) -> Result<()>;
    async fn create_internet_gateway(&self) -> Result<String>;
    async fn attach_internet_gateway(&self, gateway_id: &str, vpc_id: &str) -> Result<()>;
    async fn detach_internet_gateway(&self, gateway_id: &str, vpc_id: &str) -> Result<()>;
    async fn delete_internet_gateway(&self, gateway_id: &str) -> Result<()>;
    /// Sets the `Name` tag
    async fn tag_name(&self, resource_id: &str, name: &str) -> Result<()>;
    /// Removes the gateways and subnets of the VPC, then the VPC
    async fn delete_network(&self, vpc_id: &str) -> Result<()>;

    async fn describe_volumes(&self, ids: &[String]) -> Result<Vec<VolumeRecord>>;
    async fn create_volume(&self, request: &VolumeRequest) -> Result<String>;
    async fn delete_volume(&self, id: &str) -> Result<()>;

    async fn describe_images(&self, owners: &[String]) -> Result<Vec<ImageRecord>>;
}

fn api_error<E, R>(operation: &str, err: SdkError<E, R>) -> Ec2Error
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let code = err.code().unwrap_or("Unknown").to_string();
    let message = err
        .message()
        .map(str::to_string)
        .unwrap_or_else(|| DisplayErrorContext(&err).to_string());
    Ec2Error::from_code(operation, &code, message)
}

fn name_tag(tags: &[Tag]) -> Option<String> {
    tags.iter()
        .find(|t| t.key() == Some("Name"))
        .and_then(|t| t.value())
        .map(str::to_string)
}

fn tag_spec(resource: ResourceType, name: &str) -> TagSpecification {
    TagSpecification::builder()
        .resource_type(resource)
        .tags(Tag::builder().key("Name").value(name).build())
        .build()
}

fn id_filter(ids: &[String]) -> Option<Vec<String>> {
    (!ids.is_empty()).then(|| ids.to_vec())
}

fn instance_record(instance: &Instance) -> InstanceRecord {
    InstanceRecord {
        id: instance.instance_id().unwrap_or_default().to_string(),
        name: name_tag(instance.tags()),
        state: instance
            .state()
            .and_then(|s| s.name())
            .map(|n| InstanceState::parse(n.as_str()))
            .unwrap_or(InstanceState::Unknown),
        image_id: instance.image_id().map(str::to_string),
        instance_type: instance.instance_type().map(|t| t.as_str().to_string()),
        availability_zone: instance
            .placement()
            .and_then(|p| p.availability_zone())
            .map(str::to_string),
        architecture: instance.architecture().map(|a| a.as_str().to_string()),
        core_count: instance.cpu_options().and_then(|c| c.core_count()),
        private_dns: instance
            .private_dns_name()
            .filter(|n| !n.is_empty())
            .map(str::to_string),
    }
}

/// `Ec2Api` over the official SDK client
#[derive(Debug, Clone)]
pub struct SdkEc2 {
    client: Client,
}

impl SdkEc2 {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Loads credentials and region from the standard AWS sources;
    /// `region` overrides the discovered region
    pub async fn connect(region: Option<String>) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(Region::new(region));
        }
        let config = loader.load().await;
        tracing::debug!("EC2 client for region {:?}", config.region());
        Self::new(Client::new(&config))
    }
}

#[async_trait]
impl Ec2Api for SdkEc2 {
    async fn describe_instances(&self, ids: &[String]) -> Result<Vec<InstanceRecord>> {
        let mut records = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let output = self
                .client
                .describe_instances()
                .set_instance_ids(id_filter(ids))
                .set_next_token(next_token)
                .send()
                .await
                .map_err(|e| api_error("DescribeInstances", e))?;

            for reservation in output.reservations() {
                records.extend(reservation.instances().iter().map(instance_record));
            }
            next_token = output.next_token().map(str::to_string);
            if next_token.is_none() {
                break;
            }
        }
        Ok(records)
    }

    async fn run_instance(&self, request: &RunRequest) -> Result<String> {
        let mut run = self
            .client
            .run_instances()
            .image_id(&request.image_id)
            .instance_type(InstanceType::from(request.instance_type.as_str()))
            .min_count(1)
            .max_count(1);
        if let Some(zone) = &request.availability_zone {
            run = run.placement(Placement::builder().availability_zone(zone).build());
        }
        if let Some(name) = &request.name {
            run = run.tag_specifications(tag_spec(ResourceType::Instance, name));
        }

        let output = run.send().await.map_err(|e| api_error("RunInstances", e))?;
        output
            .instances()
            .first()
            .and_then(|i| i.instance_id())
            .map(str::to_string)
            .ok_or(Ec2Error::MissingField {
                operation: "RunInstances",
                field: "instance id",
            })
    }

    async fn terminate_instance(&self, id: &str) -> Result<()> {
        self.client
            .terminate_instances()
            .instance_ids(id)
            .send()
            .await
            .map_err(|e| api_error("TerminateInstances", e))?;
        Ok(())
    }

    async fn start_instance(&self, id: &str) -> Result<()> {
        self.client
            .start_instances()
            .instance_ids(id)
            .send()
            .await
            .map_err(|e| api_error("StartInstances", e))?;
        Ok(())
    }

    async fn stop_instance(&self, id: &str, force: bool) -> Result<()> {
        self.client
            .stop_instances()
            .instance_ids(id)
            .force(force)
            .send()
            .await
            .map_err(|e| api_error("StopInstances", e))?;
        Ok(())
    }

    async fn reboot_instance(&self, id: &str) -> Result<()> {
        self.client
            .reboot_instances()
            .instance_ids(id)
            .send()
            .await
            .map_err(|e| api_error("RebootInstances", e))?;
        Ok(())
    }

    async fn describe_vpcs(&self, ids: &[String]) -> Result<Vec<VpcRecord>> {
        let output = self
            .client
            .describe_vpcs()
            .set_vpc_ids(id_filter(ids))
            .send()
            .await
            .map_err(|e| api_error("DescribeVpcs", e))?;

        Ok(output
            .vpcs()
            .iter()
            .map(|vpc| VpcRecord {
                id: vpc.vpc_id().unwrap_or_default().to_string(),
                name: name_tag(vpc.tags()),
                cidr: vpc.cidr_block().map(str::to_string),
                available: vpc.state() == Some(&VpcState::Available),
            })
            .collect())
    }

    async fn create_vpc(&self, cidr: &str) -> Result<String> {
        let output = self
            .client
            .create_vpc()
            .cidr_block(cidr)
            .send()
            .await
            .map_err(|e| api_error("CreateVpc", e))?;
        output
            .vpc()
            .and_then(|v| v.vpc_id())
            .map(str::to_string)
            .ok_or(Ec2Error::MissingField {
                operation: "CreateVpc",
                field: "vpc id",
            })
    }

    async fn delete_vpc(&self, vpc_id: &str) -> Result<()> {
        self.client
            .delete_vpc()
            .vpc_id(vpc_id)
            .send()
            .await
            .map_err(|e| api_error("DeleteVpc", e))?;
        Ok(())
    }

    async fn create_subnet(
        &self,
        vpc_id: &str,
        cidr: &str,
        availability_zone: Option<&str>,
    ) -> Result<String> {
        let output = self
            .client
            .create_subnet()
            .vpc_id(vpc_id)
            .cidr_block(cidr)
            .set_availability_zone(availability_zone.map(str::to_string))
            .send()
            .await
            .map_err(|e| api_error("CreateSubnet", e))?;
        output
            .subnet()
            .and_then(|s| s.subnet_id())
            .map(str::to_string)
            .ok_or(Ec2Error::MissingField {
                operation: "CreateSubnet",
                field: "subnet id",
            })
    }

    async fn delete_subnet(&self, subnet_id: &str) -> Result<()> {
        self.client
            .delete_subnet()
            .subnet_id(subnet_id)
            .send()
            .await
            .map_err(|e| api_error("DeleteSubnet", e))?;
        Ok(())
    }

    async fn create_internet_gateway(&self) -> Result<String> {
        let output = self
            .client
            .create_internet_gateway()
            .send()
            .await
            .map_err(|e| api_error("CreateInternetGateway", e))?;
        output
            .internet_gateway()
            .and_then(|g| g.internet_gateway_id())
            .map(str::to_string)
            .ok_or(Ec2Error::MissingField {
                operation: "CreateInternetGateway",
                field: "internet gateway id",
            })
    }

    async fn attach_internet_gateway(&self, gateway_id: &str, vpc_id: &str) -> Result<()> {
        self.client
            .attach_internet_gateway()
            .internet_gateway_id(gateway_id)
            .vpc_id(vpc_id)
            .send()
            .await
            .map_err(|e| api_error("AttachInternetGateway", e))?;
        Ok(())
    }

    async fn detach_internet_gateway(&self, gateway_id: &str, vpc_id: &str) -> Result<()> {
        self.client
            .detach_internet_gateway()
            .internet_gateway_id(gateway_id)
            .vpc_id(vpc_id)
            .send()
            .await
            .map_err(|e| api_error("DetachInternetGateway", e))?;
        Ok(())
    }

    async fn delete_internet_gateway(&self, gateway_id: &str) -> Result<()> {
        self.client
            .delete_internet_gateway()
            .internet_gateway_id(gateway_id)
            .send()
            .await
            .map_err(|e| api_error("DeleteInternetGateway", e))?;
        Ok(())
    }

    async fn tag_name(&self, resource_id: &str, name: &str) -> Result<()> {
        self.client
            .create_tags()
            .resources(resource_id)
            .tags(Tag::builder().key("Name").value(name).build())
            .send()
            .await
            .map_err(|e| api_error("CreateTags", e))?;
        Ok(())
    }

    async fn delete_network(&self, vpc_id: &str) -> Result<()> {
        let gateways = self
            .client
            .describe_internet_gateways()
            .filters(Filter::builder().name("attachment.vpc-id").values(vpc_id).build())
            .send()
            .await
            .map_err(|e| api_error("DescribeInternetGateways", e))?;
        for gateway_id in gateways
            .internet_gateways()
            .iter()
            .filter_map(|g| g.internet_gateway_id())
        {
            self.detach_internet_gateway(gateway_id, vpc_id).await?;
            self.delete_internet_gateway(gateway_id).await?;
        }

        let subnets = self
            .client
            .describe_subnets()
            .filters(Filter::builder().name("vpc-id").values(vpc_id).build())
            .send()
            .await
            .map_err(|e| api_error("DescribeSubnets", e))?;
        for subnet_id in subnets.subnets().iter().filter_map(|s| s.subnet_id()) {
            self.delete_subnet(subnet_id).await?;
        }

        self.delete_vpc(vpc_id).await
    }

    async fn describe_volumes(&self, ids: &[String]) -> Result<Vec<VolumeRecord>> {
        let output = self
            .client
            .describe_volumes()
            .set_volume_ids(id_filter(ids))
            .send()
            .await
            .map_err(|e| api_error("DescribeVolumes", e))?;

        Ok(output
            .volumes()
            .iter()
            .map(|volume| VolumeRecord {
                id: volume.volume_id().unwrap_or_default().to_string(),
                name: name_tag(volume.tags()),
                size_gb: volume.size(),
                state: volume
                    .state()
                    .map(|s| s.as_str().to_string())
                    .unwrap_or_default(),
                availability_zone: volume.availability_zone().map(str::to_string),
            })
            .collect())
    }

    async fn create_volume(&self, request: &VolumeRequest) -> Result<String> {
        let mut create = self
            .client
            .create_volume()
            .size(request.size_gb)
            .availability_zone(&request.availability_zone);
        if let Some(name) = &request.name {
            create = create.tag_specifications(tag_spec(ResourceType::Volume, name));
        }

        let output = create.send().await.map_err(|e| api_error("CreateVolume", e))?;
        output
            .volume_id()
            .map(str::to_string)
            .ok_or(Ec2Error::MissingField {
                operation: "CreateVolume",
                field: "volume id",
            })
    }

    async fn delete_volume(&self, id: &str) -> Result<()> {
        self.client
            .delete_volume()
            .volume_id(id)
            .send()
            .await
            .map_err(|e| api_error("DeleteVolume", e))?;
        Ok(())
    }

    async fn describe_images(&self, owners: &[String]) -> Result<Vec<ImageRecord>> {
        let output = self
            .client
            .describe_images()
            .set_owners(id_filter(owners))
            .send()
            .await
            .map_err(|e| api_error("DescribeImages", e))?;

        Ok(output
            .images()
            .iter()
            .filter_map(|image| {
                Some(ImageRecord {
                    id: image.image_id()?.to_string(),
                    name: image.name().map(str::to_string),
                })
            })
            .collect())
    }
}
