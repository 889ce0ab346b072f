use std::time::Duration;

use chrono::Utc;
use lazy_static::lazy_static;
use tracing_subscriber::EnvFilter;

use crate::ConnectionModel;
use crate::DataSetWriterModel;
use crate::DataValue;
use crate::DemandModel;
use crate::EndpointModel;
use crate::JobConfiguration;
use crate::JobInfoModel;
use crate::JobLifetimeDataModel;
use crate::MessageType;
use crate::MonitoredItemNotificationModel;
use crate::PublishedDataSetModel;
use crate::PublishedDataSetSourceModel;
use crate::PublishedDataSetVariableModel;
use crate::SubscriptionNotificationModel;
use crate::SubscriptionSettingsModel;
use crate::WriterGroupJobModel;
use crate::WriterGroupModel;

lazy_static! {
    static ref LOGGER_INIT: () = {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    };
}

pub fn enable_logger() {
    lazy_static::initialize(&LOGGER_INIT);
}

pub fn connection(url: &str) -> ConnectionModel {
    ConnectionModel::new(EndpointModel {
        url: url.to_string(),
        ..Default::default()
    })
}

pub fn variable(node_id: &str) -> PublishedDataSetVariableModel {
    PublishedDataSetVariableModel {
        id: node_id.to_string(),
        published_variable_node_id: node_id.to_string(),
        ..Default::default()
    }
}

pub fn writer(
    name: &str,
    url: &str,
    nodes: &[&str],
) -> DataSetWriterModel {
    DataSetWriterModel {
        data_set_writer_name: name.to_string(),
        data_set: PublishedDataSetModel {
            data_set_source: PublishedDataSetSourceModel {
                connection: connection(url),
                published_variables: nodes.iter().map(|n| variable(n)).collect(),
                subscription_settings: SubscriptionSettingsModel {
                    publishing_interval: Some(Duration::from_secs(1)),
                    ..Default::default()
                },
            },
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn writer_group(
    id: &str,
    writers: Vec<DataSetWriterModel>,
) -> WriterGroupModel {
    WriterGroupModel {
        writer_group_id: id.to_string(),
        data_set_writers: writers,
        ..Default::default()
    }
}

pub fn value_change(
    node_id: &str,
    value: f64,
) -> MonitoredItemNotificationModel {
    MonitoredItemNotificationModel {
        id: node_id.to_string(),
        message_id: None,
        data_set_field_name: node_id.to_string(),
        node_id: node_id.to_string(),
        display_name: Some(node_id.to_string()),
        value: DataValue::new(value).with_source_timestamp(Utc::now()),
        sequence_number: None,
        is_heartbeat: false,
    }
}

/// Bundle carrying `count` value changes with a string payload of `payload_len` bytes each
pub fn bundle(
    writer: &str,
    count: usize,
    payload_len: usize,
) -> SubscriptionNotificationModel {
    let notifications = (0..count)
        .map(|i| {
            let mut n = value_change(&format!("ns=2;s=Node{i}"), i as f64);
            n.value.value = "x".repeat(payload_len).into();
            n
        })
        .collect();
    SubscriptionNotificationModel {
        subscription_id: writer.to_string(),
        connection_id: "opc.tcp://plc:4840_Best".to_string(),
        endpoint_url: "opc.tcp://plc:4840".to_string(),
        application_uri: Some("urn:plc".to_string()),
        message_type: MessageType::DeltaFrame,
        sequence_number: 1,
        timestamp: Utc::now(),
        notifications,
        context: Some(std::sync::Arc::new(crate::DataSetWriterContext {
            writer_group_id: "group-1".to_string(),
            data_set_writer_name: writer.to_string(),
            ..Default::default()
        })),
    }
}

pub fn job_info(
    id: &str,
    group: WriterGroupModel,
) -> JobInfoModel {
    JobInfoModel {
        id: id.to_string(),
        name: Some(id.to_string()),
        configuration: JobConfiguration::WriterGroup(WriterGroupJobModel {
            writer_group: group,
            ..Default::default()
        }),
        demands: vec![DemandModel::equals("Type", "Publisher")],
        redundancy_config: Default::default(),
        lifetime_data: JobLifetimeDataModel::new(Utc::now()),
    }
}
