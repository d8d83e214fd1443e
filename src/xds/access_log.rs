//! Access log configuration for listeners
//!
//! A listener that names its own access log file or log cluster uses only those sinks.
//! Otherwise the process-wide defaults from `envoy.access_log` apply.

use std::collections::BTreeMap;
use std::time::Duration;

use envoy_types::pb::envoy::config::accesslog::v3::{
    access_log::ConfigType as AccessLogConfigType, AccessLog,
};
use envoy_types::pb::envoy::config::core::v3::{
    substitution_format_string::Format, ApiVersion, SubstitutionFormatString,
};
use envoy_types::pb::envoy::extensions::access_loggers::file::v3::{
    file_access_log::AccessLogFormat, FileAccessLog,
};
use envoy_types::pb::envoy::extensions::access_loggers::grpc::v3::{
    CommonGrpcAccessLogConfig, HttpGrpcAccessLogConfig,
};
use envoy_types::pb::google::protobuf::{value::Kind, Struct, Value};

use crate::config::AccessLogConfig;
use crate::domain::listener::{
    ATTR_ACCESS_LOG_CLUSTER, ATTR_ACCESS_LOG_CLUSTER_BUFFER_SIZE, ATTR_ACCESS_LOG_FILE,
    ATTR_ACCESS_LOG_FILE_FIELDS,
};
use crate::domain::Listener;
use crate::xds::filters::any_from_message;
use crate::xds::helpers::{envoy_grpc_service, split_list, uint32};

pub const FILE_ACCESS_LOG_NAME: &str = "envoy.access_loggers.file";
pub const GRPC_ACCESS_LOG_NAME: &str = "envoy.access_loggers.http_grpc";
pub const FILE_ACCESS_LOG_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.access_loggers.file.v3.FileAccessLog";
pub const GRPC_ACCESS_LOG_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.access_loggers.grpc.v3.HttpGrpcAccessLogConfig";

pub const DEFAULT_BUFFER_SIZE: u32 = 16384;
const LISTENER_LOG_TIMEOUT: Duration = Duration::from_secs(5);

/// Access logs for one listener's connection manager.
pub fn build_access_logs(listener: &Listener, defaults: &AccessLogConfig) -> Vec<AccessLog> {
    let attributes = &listener.attributes;
    let file = attributes.get_trimmed(ATTR_ACCESS_LOG_FILE);
    let cluster = attributes.get_trimmed(ATTR_ACCESS_LOG_CLUSTER);

    let mut logs = Vec::new();
    if file.is_none() && cluster.is_none() {
        if let Some(path) = defaults.file.path.as_deref().filter(|path| !path.trim().is_empty()) {
            logs.push(file_access_log(path, &defaults.file.fields));
        }
        if let Some(cluster) = defaults.grpc.cluster.as_deref().filter(|cluster| !cluster.trim().is_empty()) {
            logs.push(grpc_access_log(
                cluster,
                &defaults.grpc.log_name,
                defaults.grpc.timeout(),
                defaults.grpc.buffer_size,
            ));
        }
        return logs;
    }

    if let Some(path) = file {
        let fields = match attributes.get(ATTR_ACCESS_LOG_FILE_FIELDS) {
            Some(fields) => parse_fields(fields),
            None => defaults.file.fields.clone(),
        };
        logs.push(file_access_log(path, &fields));
    }
    if let Some(cluster) = cluster {
        let buffer_size = attributes.get_u32(ATTR_ACCESS_LOG_CLUSTER_BUFFER_SIZE, DEFAULT_BUFFER_SIZE);
        logs.push(grpc_access_log(cluster, &listener.name, LISTENER_LOG_TIMEOUT, buffer_size));
    }
    logs
}

/// Parse `key=format,key=format`; entries without exactly one `=` are skipped.
pub fn parse_fields(value: &str) -> BTreeMap<String, String> {
    split_list(value)
        .iter()
        .filter_map(|entry| {
            let mut parts = entry.split('=');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(key), Some(format), None) if !key.trim().is_empty() => {
                    Some((key.trim().to_string(), format.trim().to_string()))
                }
                _ => None,
            }
        })
        .collect()
}

/// File sink writing one JSON object per request; empty `fields` keeps the proxy's default format.
pub fn file_access_log(path: &str, fields: &BTreeMap<String, String>) -> AccessLog {
    let access_log_format = (!fields.is_empty()).then(|| {
        let json_format = Struct {
            fields: fields
                .iter()
                .map(|(key, format)| {
                    (key.clone(), Value { kind: Some(Kind::StringValue(format.clone())) })
                })
                .collect(),
        };
        AccessLogFormat::LogFormat(SubstitutionFormatString {
            format: Some(Format::JsonFormat(json_format)),
            ..Default::default()
        })
    });

    let config = FileAccessLog { path: path.to_string(), access_log_format };
    AccessLog {
        name: FILE_ACCESS_LOG_NAME.to_string(),
        filter: None,
        config_type: Some(AccessLogConfigType::TypedConfig(any_from_message(
            FILE_ACCESS_LOG_TYPE_URL,
            &config,
        ))),
    }
}

pub fn grpc_access_log(cluster: &str, log_name: &str, timeout: Duration, buffer_size: u32) -> AccessLog {
    let config = HttpGrpcAccessLogConfig {
        common_config: Some(CommonGrpcAccessLogConfig {
            log_name: log_name.to_string(),
            grpc_service: Some(envoy_grpc_service(cluster, timeout)),
            transport_api_version: ApiVersion::V3 as i32,
            buffer_size_bytes: uint32(buffer_size),
            ..Default::default()
        }),
        ..Default::default()
    };

    AccessLog {
        name: GRPC_ACCESS_LOG_NAME.to_string(),
        filter: None,
        config_type: Some(AccessLogConfigType::TypedConfig(any_from_message(
            GRPC_ACCESS_LOG_TYPE_URL,
            &config,
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FileAccessLogConfig, GrpcAccessLogConfig};
    use crate::domain::Attributes;
    use prost::Message;

    fn typed_config(log: &AccessLog) -> &envoy_types::pb::google::protobuf::Any {
        match log.config_type.as_ref() {
            Some(AccessLogConfigType::TypedConfig(any)) => any,
            _ => panic!("expected typed config"),
        }
    }

    fn defaults() -> AccessLogConfig {
        AccessLogConfig {
            file: FileAccessLogConfig {
                path: Some("/var/log/envoy/access.json".into()),
                fields: BTreeMap::from([("status".to_string(), "%RESPONSE_CODE%".to_string())]),
            },
            grpc: GrpcAccessLogConfig { cluster: Some("als".into()), ..Default::default() },
        }
    }

    #[test]
    fn test_listener_without_overrides_uses_defaults() {
        let listener = Listener::new("web", 80, "web");
        let logs = build_access_logs(&listener, &defaults());

        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].name, FILE_ACCESS_LOG_NAME);
        assert_eq!(logs[1].name, GRPC_ACCESS_LOG_NAME);

        let grpc = HttpGrpcAccessLogConfig::decode(typed_config(&logs[1]).value.as_slice()).unwrap();
        let common = grpc.common_config.unwrap();
        assert_eq!(common.log_name, "accesslog");
        assert_eq!(common.buffer_size_bytes.map(|size| size.value), Some(DEFAULT_BUFFER_SIZE));
    }

    #[test]
    fn test_listener_override_replaces_defaults() {
        let listener = Listener::new("web", 80, "web").with_attributes(Attributes::from_iter([
            (ATTR_ACCESS_LOG_FILE, "/tmp/web.log"),
            (ATTR_ACCESS_LOG_FILE_FIELDS, "method=%REQ(:METHOD)%, path=%REQ(:PATH)%,broken"),
        ]));
        let logs = build_access_logs(&listener, &defaults());

        assert_eq!(logs.len(), 1);
        let file = FileAccessLog::decode(typed_config(&logs[0]).value.as_slice()).unwrap();
        assert_eq!(file.path, "/tmp/web.log");
        let Some(AccessLogFormat::LogFormat(format)) = file.access_log_format else {
            panic!("expected log format");
        };
        let Some(Format::JsonFormat(json)) = format.format else {
            panic!("expected json format");
        };
        assert_eq!(json.fields.len(), 2);
        assert!(json.fields.contains_key("method"));
    }

    #[test]
    fn test_listener_cluster_override_names_log_after_listener() {
        let listener = Listener::new("web", 80, "web").with_attributes(Attributes::from_iter([
            (ATTR_ACCESS_LOG_CLUSTER, "als_local"),
            (ATTR_ACCESS_LOG_CLUSTER_BUFFER_SIZE, "1024"),
        ]));
        let logs = build_access_logs(&listener, &defaults());

        assert_eq!(logs.len(), 1);
        let grpc = HttpGrpcAccessLogConfig::decode(typed_config(&logs[0]).value.as_slice()).unwrap();
        let common = grpc.common_config.unwrap();
        assert_eq!(common.log_name, "web");
        assert_eq!(common.buffer_size_bytes.map(|size| size.value), Some(1024));
    }

    #[test]
    fn test_no_sinks_configured() {
        let listener = Listener::new("web", 80, "web");
        assert!(build_access_logs(&listener, &AccessLogConfig::default()).is_empty());
    }
}
