//! Network adapter over VPCs

use crate::backend::{BACKEND_NAME, Shared};
use crate::error::Ec2Error;
use crate::record::{NetworkRequest, VpcRecord};
use async_trait::async_trait;
use infragate_core::catalog::{attrs, kinds, mixins, region_id};
use infragate_core::{
    AttachPolicy, BackendError, Entity, EntityAdapter, Identifier, Kind, MixinFilter,
    RequestContext, Result, TransferTable,
};
use serde_json::json;

fn network_transfer() -> TransferTable<VpcRecord> {
    TransferTable::new()
        .attr(attrs::ID, |v: &VpcRecord| Some(json!(v.id)))
        .attr(attrs::TITLE, |v: &VpcRecord| v.name.as_ref().map(|n| json!(n)))
        .attr(attrs::NETWORK_ADDRESS, |v: &VpcRecord| v.cidr.as_ref().map(|c| json!(c)))
        .attr(attrs::NETWORK_STATE, |v: &VpcRecord| {
            Some(json!(if v.available { "active" } else { "inactive" }))
        })
}

/// Objects made so far by one network create
#[derive(Debug)]
struct Provisioned {
    vpc_id: String,
    subnet_id: Option<String>,
    gateway_id: Option<String>,
}

pub struct NetworkAdapter {
    kind: Kind,
    shared: Shared,
    transfer: TransferTable<VpcRecord>,
    mixins: AttachPolicy<VpcRecord>,
}

impl NetworkAdapter {
    pub fn new(shared: Shared) -> Result<Self> {
        Ok(Self {
            kind: shared.kind(kinds::NETWORK)?,
            mixins: AttachPolicy::new()
                .when("ipnetwork", mixins::IPNETWORK, |v: &VpcRecord| v.cidr.is_some())
                .always("region", region_id(&shared.settings.region)),
            shared,
            transfer: network_transfer(),
        })
    }

    fn to_entity(&self, vpc: &VpcRecord) -> Result<Entity> {
        let mut entity = Entity::new(self.kind.type_identifier()).with_id(Identifier::new(&vpc.id));
        self.transfer.apply(vpc, &mut entity);
        self.mixins.attach(&self.shared.catalog, vpc, &mut entity)?;
        Ok(entity)
    }

    /// Name tag, subnet and an attached internet gateway for a new VPC
    async fn provision(
        &self,
        request: &NetworkRequest,
        made: &mut Provisioned,
    ) -> std::result::Result<(), Ec2Error> {
        let api = &self.shared.api;
        if let Some(name) = &request.name {
            api.tag_name(&made.vpc_id, name).await?;
        }
        made.subnet_id = Some(
            api.create_subnet(&made.vpc_id, &request.cidr, request.availability_zone.as_deref())
                .await?,
        );
        let gateway_id = api.create_internet_gateway().await?;
        made.gateway_id = Some(gateway_id.clone());
        api.attach_internet_gateway(&gateway_id, &made.vpc_id).await
    }

    /// Removes what `provision` made, newest first
    async fn roll_back(&self, made: &Provisioned) {
        let api = &self.shared.api;
        if let Some(gateway_id) = &made.gateway_id {
            // the attach is the last step, so a failed create never leaves it attached
            if let Err(e) = api.delete_internet_gateway(gateway_id).await {
                tracing::warn!("Rollback could not delete internet gateway {}: {}", gateway_id, e);
            }
        }
        if let Some(subnet_id) = &made.subnet_id {
            if let Err(e) = api.delete_subnet(subnet_id).await {
                tracing::warn!("Rollback could not delete subnet {}: {}", subnet_id, e);
            }
        }
        if let Err(e) = api.delete_vpc(&made.vpc_id).await {
            tracing::warn!("Rollback could not delete VPC {}: {}", made.vpc_id, e);
        }
    }
}

#[async_trait]
impl EntityAdapter for NetworkAdapter {
    fn kind(&self) -> &Kind {
        &self.kind
    }

    fn backend(&self) -> &str {
        BACKEND_NAME
    }

    async fn identifiers(
        &self,
        filter: &MixinFilter,
        cx: &RequestContext,
    ) -> Result<Vec<Identifier>> {
        Ok(self
            .list(filter, cx)
            .await?
            .into_iter()
            .filter_map(|e| e.id)
            .collect())
    }

    async fn list(&self, filter: &MixinFilter, _cx: &RequestContext) -> Result<Vec<Entity>> {
        let vpcs = self
            .shared
            .api
            .describe_vpcs(&[])
            .await
            .map_err(|e| e.classify(BackendError::EntityRetrieval))?;

        let mut entities = Vec::new();
        for vpc in &vpcs {
            let entity = self.to_entity(vpc)?;
            if entity.matches(filter) {
                entities.push(entity);
            }
        }
        Ok(entities)
    }

    async fn instance(&self, id: &Identifier, _cx: &RequestContext) -> Result<Entity> {
        let vpcs = self
            .shared
            .api
            .describe_vpcs(&[id.to_string()])
            .await
            .map_err(|e| e.classify_lookup(BackendError::EntityRetrieval))?;
        let vpc = vpcs
            .iter()
            .find(|v| v.id == id.as_str())
            .ok_or_else(|| BackendError::EntityNotFound(format!("VPC {} does not exist", id)))?;
        self.to_entity(vpc)
    }

    async fn create(&self, entity: &Entity, _cx: &RequestContext) -> Result<Identifier> {
        if !self.shared.settings.network_create_allowed {
            return Err(BackendError::UserNotAuthorized(
                "network creation is disabled for this backend".to_string(),
            ));
        }
        let cidr = entity
            .attribute_str(attrs::NETWORK_ADDRESS)
            .filter(|a| a.contains('/'))
            .ok_or_else(|| {
                BackendError::ResourceNotValid(format!(
                    "{} must be given as a CIDR block",
                    attrs::NETWORK_ADDRESS
                ))
            })?;

        let request = NetworkRequest {
            cidr: cidr.to_string(),
            name: entity.attribute_str(attrs::TITLE).map(str::to_string),
            availability_zone: self.shared.settings.availability_zone.clone(),
        };
        let vpc_id = self
            .shared
            .api
            .create_vpc(&request.cidr)
            .await
            .map_err(|e| e.classify(BackendError::EntityCreate))?;

        let mut made = Provisioned {
            vpc_id,
            subnet_id: None,
            gateway_id: None,
        };
        if let Err(e) = self.provision(&request, &mut made).await {
            tracing::warn!("Setting up VPC {} failed, rolling back: {}", made.vpc_id, e);
            self.roll_back(&made).await;
            return Err(BackendError::EntityCreate(e.to_string()));
        }

        tracing::info!("Created VPC {} ({})", made.vpc_id, request.cidr);
        Ok(Identifier::new(made.vpc_id))
    }

    async fn delete(&self, id: &Identifier, _cx: &RequestContext) -> Result<()> {
        self.shared
            .api
            .delete_network(id.as_str())
            .await
            .map_err(|e| e.classify_lookup(BackendError::EntityAction))?;
        tracing::info!("Deleted VPC {}", id);
        Ok(())
    }
}
