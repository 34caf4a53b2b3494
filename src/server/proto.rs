//! Generated protocol types

/// Terraform Plugin Protocol 6
pub mod tfplugin6 {
    tonic::include_proto!("tfplugin6");
}

/// go-plugin lifecycle control
pub mod plugin {
    tonic::include_proto!("plugin");
}
