//! Small protobuf constructors shared by the resource compilers.

use std::time::Duration;

use envoy_types::pb::envoy::config::core::v3::{
    address, api_config_source::ApiType, config_source::ConfigSourceSpecifier, grpc_service,
    socket_address, Address, ApiConfigSource, ApiVersion, ConfigSource, GrpcService,
    SocketAddress,
};
use envoy_types::pb::google::protobuf::{Duration as ProtoDuration, UInt32Value};

/// Convert a std duration into its protobuf form.
pub fn proto_duration(value: Duration) -> ProtoDuration {
    ProtoDuration { seconds: value.as_secs() as i64, nanos: value.subsec_nanos() as i32 }
}

/// Wrap a count; zero means "not set" for protocol fields where omission differs from zero.
pub fn uint32(value: u32) -> Option<UInt32Value> {
    (value > 0).then_some(UInt32Value { value })
}

pub fn socket_address(host: &str, port: u32) -> Address {
    Address {
        address: Some(address::Address::SocketAddress(SocketAddress {
            address: host.to_string(),
            port_specifier: Some(socket_address::PortSpecifier::PortValue(port)),
            ..Default::default()
        })),
    }
}

/// gRPC service reached through a cluster the proxy already knows about.
pub fn envoy_grpc_service(cluster: &str, timeout: Duration) -> GrpcService {
    GrpcService {
        target_specifier: Some(grpc_service::TargetSpecifier::EnvoyGrpc(grpc_service::EnvoyGrpc {
            cluster_name: cluster.to_string(),
            ..Default::default()
        })),
        timeout: Some(proto_duration(timeout)),
        ..Default::default()
    }
}

/// Config source pointing proxies back at this control plane over gRPC.
pub fn grpc_config_source(cluster: &str, timeout: Duration) -> ConfigSource {
    ConfigSource {
        resource_api_version: ApiVersion::V3 as i32,
        config_source_specifier: Some(ConfigSourceSpecifier::ApiConfigSource(ApiConfigSource {
            api_type: ApiType::Grpc as i32,
            transport_api_version: ApiVersion::V3 as i32,
            grpc_services: vec![envoy_grpc_service(cluster, timeout)],
            ..Default::default()
        })),
        ..Default::default()
    }
}

/// Split a comma separated attribute value, trimming entries and dropping empty ones.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proto_duration_keeps_sub_second_precision() {
        let converted = proto_duration(Duration::from_millis(1500));
        assert_eq!(converted.seconds, 1);
        assert_eq!(converted.nanos, 500_000_000);
    }

    #[test]
    fn test_uint32_omits_zero() {
        assert_eq!(uint32(0), None);
        assert_eq!(uint32(7), Some(UInt32Value { value: 7 }));
    }

    #[test]
    fn test_grpc_config_source_targets_cluster() {
        let source = grpc_config_source("xds_cluster", Duration::from_secs(2));
        let Some(ConfigSourceSpecifier::ApiConfigSource(api)) = source.config_source_specifier else {
            panic!("expected api config source");
        };
        assert_eq!(api.api_type, ApiType::Grpc as i32);
        let Some(grpc_service::TargetSpecifier::EnvoyGrpc(target)) =
            api.grpc_services[0].target_specifier.clone()
        else {
            panic!("expected envoy grpc target");
        };
        assert_eq!(target.cluster_name, "xds_cluster");
        assert_eq!(api.grpc_services[0].timeout.as_ref().map(|t| t.seconds), Some(2));
    }

    #[test]
    fn test_split_list_trims_and_skips_empty() {
        assert_eq!(split_list(" a, b ,,c "), vec!["a", "b", "c"]);
        assert!(split_list("").is_empty());
    }
}
