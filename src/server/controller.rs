//! go-plugin `GRPCController` service

use crate::server::proto::plugin::{grpc_controller_server::GrpcController, Empty};
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};
use tracing::info;

/// Stops the server when the client asks the plugin to shut down
pub struct ControllerService {
    shutdown: CancellationToken,
}

impl ControllerService {
    pub fn new(shutdown: CancellationToken) -> Self {
        Self { shutdown }
    }
}

#[tonic::async_trait]
impl GrpcController for ControllerService {
    async fn shutdown(&self, _request: Request<Empty>) -> Result<Response<Empty>, Status> {
        info!("Shutdown requested by plugin client");
        self.shutdown.cancel();
        Ok(Response::new(Empty {}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_cancels_token() {
        let token = CancellationToken::new();
        let svc = ControllerService::new(token.clone());
        assert!(!token.is_cancelled());
        svc.shutdown(Request::new(Empty {})).await.unwrap();
        assert!(token.is_cancelled());
    }
}
