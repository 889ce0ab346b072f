use std::time::Duration;

use chrono::DateTime;
use chrono::Utc;

use crate::constants::DEMAND_KEY_DEVICE_ID;
use crate::constants::DEMAND_KEY_SITE_ID;
use crate::constants::DEMAND_KEY_TYPE;
use crate::constants::DEMAND_VALUE_PUBLISHER;
use crate::ConnectionModel;
use crate::DataSetMetaDataModel;
use crate::DataSetWriterModel;
use crate::DemandModel;
use crate::EndpointRegistrationModel;
use crate::JobConfiguration;
use crate::JobInfoModel;
use crate::JobLifetimeDataModel;
use crate::JobMutation;
use crate::JobStatus;
use crate::PublishedDataSetModel;
use crate::PublishedDataSetSourceModel;
use crate::PublishedDataSetVariableModel;
use crate::PublishedItemModel;
use crate::PublisherIdentityConfig;
use crate::RedundancyConfigModel;
use crate::SubscriptionSettingsModel;
use crate::WriterGroupJobModel;
use crate::WriterGroupModel;

/// Everything a reconcile pass needs besides the document itself
#[derive(Debug, Clone)]
pub struct ReconcileContext<'a> {
    pub job_id: &'a str,
    pub registration: &'a EndpointRegistrationModel,
    /// Connection of the request, credential included
    pub connection: ConnectionModel,
    pub defaults: &'a PublisherIdentityConfig,
    pub now: DateTime<Utc>,
}

/// `{base}_{publishing interval in ms}`, where base is the explicit writer
/// name or the endpoint id. Without an interval the base is used as is.
pub fn data_set_writer_name(
    endpoint_id: &str,
    explicit: Option<&str>,
    publishing_interval: Option<Duration>,
) -> String {
    let base = explicit.filter(|n| !n.trim().is_empty()).unwrap_or(endpoint_id);
    match publishing_interval {
        Some(interval) => format!("{}_{}", base, interval.as_millis()),
        None => base.to_string(),
    }
}

/// Scheduling demands placing the job on an agent that can reach the endpoint
pub fn job_demands(registration: &EndpointRegistrationModel) -> Vec<DemandModel> {
    let mut demands = vec![DemandModel::equals(DEMAND_KEY_TYPE, DEMAND_VALUE_PUBLISHER)];
    if let Some(site_id) = registration.site_id.as_deref().filter(|s| !s.is_empty()) {
        demands.push(DemandModel::equals(DEMAND_KEY_SITE_ID, site_id));
    } else if let Some(device_id) = registration.discoverer_id.as_deref().filter(|s| !s.is_empty()) {
        demands.push(DemandModel::equals(DEMAND_KEY_DEVICE_ID, device_id));
    }
    demands
}

/// Job synthesized the first time a node of the endpoint is published
pub fn default_job(ctx: &ReconcileContext<'_>) -> JobInfoModel {
    JobInfoModel {
        id: ctx.job_id.to_string(),
        name: Some(ctx.job_id.to_string()),
        configuration: JobConfiguration::WriterGroup(WriterGroupJobModel {
            writer_group: WriterGroupModel {
                writer_group_id: ctx.job_id.to_string(),
                name: Some(ctx.job_id.to_string()),
                message_type: ctx.defaults.default_message_encoding,
                ..Default::default()
            },
            engine: None,
            messaging_mode: ctx.defaults.default_messaging_mode,
            connection_string: None,
        }),
        demands: job_demands(ctx.registration),
        redundancy_config: RedundancyConfigModel::default(),
        lifetime_data: JobLifetimeDataModel::new(ctx.now),
    }
}

/// Add or replace one published node.
///
/// The node is first removed from every writer of the same endpoint
/// (whatever credential it was published with), then appended to the writer
/// keyed by (connection, derived name), which is created when missing.
pub fn add_published_item(
    group: &mut WriterGroupModel,
    endpoint_id: &str,
    connection: &ConnectionModel,
    item: &PublishedItemModel,
) {
    remove_published_node(group, connection, &item.node_id);

    let name = data_set_writer_name(endpoint_id, item.data_set_writer_name.as_deref(), item.publishing_interval);
    let position = group
        .data_set_writers
        .iter()
        .position(|w| w.data_set_writer_name == name && w.connection() == connection);
    let index = match position {
        Some(index) => index,
        None => {
            group.data_set_writers.push(new_writer(&name, connection, item.publishing_interval));
            group.data_set_writers.len() - 1
        }
    };

    group.data_set_writers[index]
        .data_set
        .data_set_source
        .published_variables
        .push(PublishedDataSetVariableModel {
            id: item.node_id.clone(),
            published_variable_node_id: item.node_id.clone(),
            published_variable_display_name: item.display_name.clone(),
            sampling_interval: item.sampling_interval,
            heartbeat_interval: item.heartbeat_interval,
            queue_size: None,
        });
}

/// Remove a node from every writer of the endpoint; writers left without
/// variables are dropped. Returns whether the node was published.
pub fn remove_published_node(
    group: &mut WriterGroupModel,
    connection: &ConnectionModel,
    node_id: &str,
) -> bool {
    let mut found = false;
    for writer in group
        .data_set_writers
        .iter_mut()
        .filter(|w| w.connection().is_same_endpoint(connection))
    {
        let variables = &mut writer.data_set.data_set_source.published_variables;
        let before = variables.len();
        variables.retain(|v| v.published_variable_node_id != node_id);
        found |= variables.len() != before;
    }
    if found {
        group.data_set_writers.retain(|w| !w.variables().is_empty());
    }
    found
}

/// Flatten the writers back into the published item list
pub fn list_published_items(group: &WriterGroupModel) -> Vec<PublishedItemModel> {
    group
        .data_set_writers
        .iter()
        .flat_map(|writer| {
            writer.variables().iter().map(move |v| PublishedItemModel {
                node_id: v.published_variable_node_id.clone(),
                display_name: v.published_variable_display_name.clone(),
                data_set_writer_name: Some(writer.data_set_writer_name.clone()),
                sampling_interval: v.sampling_interval,
                heartbeat_interval: v.heartbeat_interval,
                publishing_interval: writer.publishing_interval(),
            })
        })
        .collect()
}

/// Advance the lifetime after the writer list changed: a group with writers
/// is active, an empty one canceled. Deleted jobs stay deleted.
pub fn update_job_status(
    job: &mut JobInfoModel,
    now: DateTime<Utc>,
) {
    let has_writers = !job.writer_group_job().writer_group.data_set_writers.is_empty();
    job.lifetime_data.status = match (job.lifetime_data.status, has_writers) {
        (JobStatus::Deleted, _) => JobStatus::Deleted,
        (_, true) => JobStatus::Active,
        (_, false) => JobStatus::Canceled,
    };
    job.lifetime_data.updated = now;
}

/// Apply `change` to the current (or a default) job and decide whether the
/// result must be written. Pure: safe to rerun after a version conflict.
pub fn reconcile_job<R>(
    current: Option<JobInfoModel>,
    ctx: &ReconcileContext<'_>,
    change: impl FnOnce(&mut WriterGroupModel, &ConnectionModel) -> R,
) -> JobMutation<R> {
    let mut job = current.unwrap_or_else(|| default_job(ctx));
    let before = job.writer_group_job().writer_group.data_set_writers.clone();

    let value = change(&mut job.writer_group_job_mut().writer_group, &ctx.connection);
    if job.writer_group_job().writer_group.data_set_writers == before {
        return JobMutation::Unchanged(value);
    }

    job.demands = job_demands(ctx.registration);
    update_job_status(&mut job, ctx.now);
    JobMutation::Put(job, value)
}

fn new_writer(
    name: &str,
    connection: &ConnectionModel,
    publishing_interval: Option<Duration>,
) -> DataSetWriterModel {
    DataSetWriterModel {
        data_set_writer_name: name.to_string(),
        data_set: PublishedDataSetModel {
            data_set_source: PublishedDataSetSourceModel {
                connection: connection.clone(),
                published_variables: Vec::new(),
                subscription_settings: SubscriptionSettingsModel {
                    publishing_interval,
                    ..Default::default()
                },
            },
            data_set_meta_data: DataSetMetaDataModel {
                name: Some(name.to_string()),
                data_set_class_id: None,
            },
            ..Default::default()
        },
        ..Default::default()
    }
}
