//! tfplugin6 Provider service
//!
//! Decodes requests, dispatches to [`AuditLogProvider`], and encodes the
//! results. Provider failures travel as diagnostics in the response; gRPC
//! status errors are reserved for malformed requests.

use crate::provider::{
    AuditLogProvider, AuditLogRuleResource, AuditLogRulesDataSource, Diagnostic, ProviderError,
    Value,
};
use crate::server::codec::{self, CodecError};
use crate::server::convert::{diagnostics_to_proto, schema_to_proto};
use crate::server::proto::tfplugin6::{
    self, apply_resource_change, configure_provider, get_metadata, get_provider_schema,
    import_resource_state, plan_resource_change, provider_server::Provider, read_data_source,
    read_resource, stop_provider, upgrade_resource_state, validate_data_resource_config,
    validate_provider_config, validate_resource_config, DynamicValue,
};
use std::collections::HashMap;
use std::sync::Arc;
use tonic::{Request, Response, Status};
use tracing::{debug, info};

pub struct ProviderService {
    provider: Arc<AuditLogProvider>,
}

impl ProviderService {
    pub fn new(provider: Arc<AuditLogProvider>) -> Self {
        Self { provider }
    }

    fn check_resource_type(type_name: &str) -> Result<(), Status> {
        if type_name == AuditLogProvider::resource_type_name() {
            Ok(())
        } else {
            Err(Status::not_found(format!(
                "unknown resource type {}",
                type_name
            )))
        }
    }

    fn check_data_source_type(type_name: &str) -> Result<(), Status> {
        if type_name == AuditLogProvider::data_source_type_name() {
            Ok(())
        } else {
            Err(Status::not_found(format!(
                "unknown data source type {}",
                type_name
            )))
        }
    }
}

fn decode(value: Option<&DynamicValue>) -> Result<Value, Status> {
    codec::decode(value).map_err(|e| Status::invalid_argument(e.to_string()))
}

fn encode(value: &Value) -> Result<Option<DynamicValue>, Status> {
    codec::encode(value)
        .map(Some)
        .map_err(|e: CodecError| Status::internal(e.to_string()))
}

fn error_diagnostics(err: ProviderError) -> Vec<tfplugin6::Diagnostic> {
    diagnostics_to_proto(&err.to_diagnostic().into())
}

#[tonic::async_trait]
impl Provider for ProviderService {
    async fn get_metadata(
        &self,
        _request: Request<get_metadata::Request>,
    ) -> Result<Response<get_metadata::Response>, Status> {
        Ok(Response::new(get_metadata::Response {
            server_capabilities: Some(server_capabilities()),
            diagnostics: Vec::new(),
            data_sources: vec![get_metadata::DataSourceMetadata {
                type_name: AuditLogProvider::data_source_type_name(),
            }],
            resources: vec![get_metadata::ResourceMetadata {
                type_name: AuditLogProvider::resource_type_name(),
            }],
        }))
    }

    async fn get_provider_schema(
        &self,
        _request: Request<get_provider_schema::Request>,
    ) -> Result<Response<get_provider_schema::Response>, Status> {
        let mut resource_schemas = HashMap::new();
        resource_schemas.insert(
            AuditLogProvider::resource_type_name(),
            schema_to_proto(&AuditLogRuleResource::schema()),
        );
        let mut data_source_schemas = HashMap::new();
        data_source_schemas.insert(
            AuditLogProvider::data_source_type_name(),
            schema_to_proto(&AuditLogRulesDataSource::schema()),
        );

        Ok(Response::new(get_provider_schema::Response {
            provider: Some(schema_to_proto(&AuditLogProvider::schema())),
            resource_schemas,
            data_source_schemas,
            diagnostics: Vec::new(),
            provider_meta: None,
            server_capabilities: Some(server_capabilities()),
        }))
    }

    async fn validate_provider_config(
        &self,
        request: Request<validate_provider_config::Request>,
    ) -> Result<Response<validate_provider_config::Response>, Status> {
        let config = decode(request.get_ref().config.as_ref())?;
        let diags = AuditLogProvider::validate_config(&config);
        Ok(Response::new(validate_provider_config::Response {
            diagnostics: diagnostics_to_proto(&diags),
        }))
    }

    async fn validate_resource_config(
        &self,
        request: Request<validate_resource_config::Request>,
    ) -> Result<Response<validate_resource_config::Response>, Status> {
        let req = request.into_inner();
        Self::check_resource_type(&req.type_name)?;
        decode(req.config.as_ref())?;
        Ok(Response::new(validate_resource_config::Response {
            diagnostics: Vec::new(),
        }))
    }

    async fn validate_data_resource_config(
        &self,
        request: Request<validate_data_resource_config::Request>,
    ) -> Result<Response<validate_data_resource_config::Response>, Status> {
        let req = request.into_inner();
        Self::check_data_source_type(&req.type_name)?;
        decode(req.config.as_ref())?;
        Ok(Response::new(validate_data_resource_config::Response {
            diagnostics: Vec::new(),
        }))
    }

    async fn upgrade_resource_state(
        &self,
        request: Request<upgrade_resource_state::Request>,
    ) -> Result<Response<upgrade_resource_state::Response>, Status> {
        let req = request.into_inner();
        Self::check_resource_type(&req.type_name)?;

        let raw = req.raw_state.unwrap_or_default();
        let (state, diagnostics) = if raw.json.is_empty() {
            let diag = Diagnostic::error(
                "Unsupported state format",
                "Only JSON resource state can be upgraded",
            );
            (Value::Null, diagnostics_to_proto(&diag.into()))
        } else {
            let stored =
                codec::decode_json(&raw.json).map_err(|e| Status::invalid_argument(e.to_string()))?;
            (
                codec::conform_to_schema(&stored, &AuditLogRuleResource::schema()),
                Vec::new(),
            )
        };

        debug!("Upgraded state from schema version {}", req.version);
        Ok(Response::new(upgrade_resource_state::Response {
            upgraded_state: encode(&state)?,
            diagnostics,
        }))
    }

    async fn configure_provider(
        &self,
        request: Request<configure_provider::Request>,
    ) -> Result<Response<configure_provider::Response>, Status> {
        let req = request.into_inner();
        info!("Configuring provider (terraform {})", req.terraform_version);
        let config = decode(req.config.as_ref())?;
        let diags = self.provider.configure(&config).await;
        Ok(Response::new(configure_provider::Response {
            diagnostics: diagnostics_to_proto(&diags),
        }))
    }

    async fn read_resource(
        &self,
        request: Request<read_resource::Request>,
    ) -> Result<Response<read_resource::Response>, Status> {
        let req = request.into_inner();
        Self::check_resource_type(&req.type_name)?;
        let current = decode(req.current_state.as_ref())?;

        let result = match self.provider.resource().await {
            Ok(resource) => resource.read(&current).await,
            Err(e) => Err(e),
        };

        let (new_state, diagnostics) = match result {
            Ok(Some(state)) => (state, Vec::new()),
            Ok(None) => (Value::Null, Vec::new()),
            Err(e) => (current, error_diagnostics(e)),
        };

        Ok(Response::new(read_resource::Response {
            new_state: encode(&new_state)?,
            diagnostics,
            private: req.private,
        }))
    }

    async fn plan_resource_change(
        &self,
        request: Request<plan_resource_change::Request>,
    ) -> Result<Response<plan_resource_change::Response>, Status> {
        let req = request.into_inner();
        Self::check_resource_type(&req.type_name)?;
        let prior = decode(req.prior_state.as_ref())?;
        let proposed = decode(req.proposed_new_state.as_ref())?;

        let planned = AuditLogRuleResource::plan(&prior, &proposed);
        Ok(Response::new(plan_resource_change::Response {
            planned_state: encode(&planned)?,
            requires_replace: Vec::new(),
            planned_private: req.prior_private,
            diagnostics: Vec::new(),
            legacy_type_system: false,
        }))
    }

    async fn apply_resource_change(
        &self,
        request: Request<apply_resource_change::Request>,
    ) -> Result<Response<apply_resource_change::Response>, Status> {
        let req = request.into_inner();
        Self::check_resource_type(&req.type_name)?;
        let prior = decode(req.prior_state.as_ref())?;
        let planned = decode(req.planned_state.as_ref())?;

        let resource = match self.provider.resource().await {
            Ok(resource) => resource,
            Err(e) => {
                return Ok(Response::new(apply_resource_change::Response {
                    new_state: encode(&prior)?,
                    private: Vec::new(),
                    diagnostics: error_diagnostics(e),
                    legacy_type_system: false,
                }))
            }
        };

        let result = if planned.is_null() {
            resource.delete(&prior).await.map(|()| Value::Null)
        } else if prior.is_null() {
            resource.create(&planned).await
        } else {
            resource.update(&prior, &planned).await
        };

        // On failure the prior state stands; a failed create leaves nothing
        let (new_state, diagnostics) = match result {
            Ok(state) => (state, Vec::new()),
            Err(e) => (prior, error_diagnostics(e)),
        };

        Ok(Response::new(apply_resource_change::Response {
            new_state: encode(&new_state)?,
            private: req.planned_private,
            diagnostics,
            legacy_type_system: false,
        }))
    }

    async fn import_resource_state(
        &self,
        request: Request<import_resource_state::Request>,
    ) -> Result<Response<import_resource_state::Response>, Status> {
        let req = request.into_inner();
        Self::check_resource_type(&req.type_name)?;
        info!("Importing audit log rule {}", req.id);

        let state = AuditLogRuleResource::import(&req.id);
        Ok(Response::new(import_resource_state::Response {
            imported_resources: vec![import_resource_state::ImportedResource {
                type_name: req.type_name,
                state: encode(&state)?,
                private: Vec::new(),
            }],
            diagnostics: Vec::new(),
        }))
    }

    async fn read_data_source(
        &self,
        request: Request<read_data_source::Request>,
    ) -> Result<Response<read_data_source::Response>, Status> {
        let req = request.into_inner();
        Self::check_data_source_type(&req.type_name)?;

        let result = match self.provider.data_source().await {
            Ok(data_source) => data_source.read().await,
            Err(e) => Err(e),
        };

        let (state, diagnostics) = match result {
            Ok(state) => (encode(&state)?, Vec::new()),
            Err(e) => (None, error_diagnostics(e)),
        };

        Ok(Response::new(read_data_source::Response { state, diagnostics }))
    }

    async fn stop_provider(
        &self,
        _request: Request<stop_provider::Request>,
    ) -> Result<Response<stop_provider::Response>, Status> {
        // Every call runs a single statement; there is nothing to interrupt
        info!("StopProvider received");
        Ok(Response::new(stop_provider::Response {
            error: String::new(),
        }))
    }
}

fn server_capabilities() -> tfplugin6::ServerCapabilities {
    tfplugin6::ServerCapabilities {
        plan_destroy: false,
        get_provider_schema_optional: false,
        move_resource_state: false,
    }
}
