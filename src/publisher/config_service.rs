use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::debug;
use tracing::info;
use tracing::instrument;
use tracing::warn;

use super::add_published_item;
use super::list_published_items;
use super::reconcile_job;
use super::remove_published_node;
use super::EndpointRegistry;
use super::ReconcileContext;
use crate::update_job_with_retry;
use crate::ConnectionModel;
use crate::EndpointRegistrationModel;
use crate::JobDocumentStore;
use crate::JobUpdate;
use crate::PublishBulkRequestModel;
use crate::PublishBulkResultModel;
use crate::PublishError;
use crate::PublishStartRequestModel;
use crate::PublishStartResultModel;
use crate::PublishStopRequestModel;
use crate::PublishStopResultModel;
use crate::PublishedItemListRequestModel;
use crate::PublishedItemListResultModel;
use crate::PublisherConfig;
use crate::RequestHeaderModel;
use crate::Result;
use crate::ServiceResultModel;
use crate::VersionedJob;
use crate::WriterGroupModel;
use crate::STATUS_BAD_NODE_ID_UNKNOWN;

/// Adds, removes and lists published nodes of an endpoint.
///
/// Requests are validated and the endpoint resolved before the job document
/// is touched. Writes go through `update_job_with_retry`; every document that
/// was actually written is forwarded to the job listener, if any.
pub struct PublisherConfigService {
    store: Arc<dyn JobDocumentStore>,
    registry: Arc<dyn EndpointRegistry>,
    config: Arc<PublisherConfig>,
    job_listener: Option<mpsc::UnboundedSender<VersionedJob>>,
}

impl PublisherConfigService {
    pub fn new(
        store: Arc<dyn JobDocumentStore>,
        registry: Arc<dyn EndpointRegistry>,
        config: Arc<PublisherConfig>,
    ) -> Self {
        Self {
            store,
            registry,
            config,
            job_listener: None,
        }
    }

    /// Receive every job document this service writes
    pub fn with_job_listener(
        mut self,
        listener: mpsc::UnboundedSender<VersionedJob>,
    ) -> Self {
        self.job_listener = Some(listener);
        self
    }

    #[instrument(skip(self, request))]
    pub async fn node_publish_start(
        &self,
        endpoint_id: &str,
        request: PublishStartRequestModel,
    ) -> Result<PublishStartResultModel> {
        require(endpoint_id, "endpoint_id")?;
        let item = request.item.ok_or(PublishError::MissingField("item"))?;
        require(&item.node_id, "node_id")?;
        let registration = self.resolve(endpoint_id).await?;
        let connection = request_connection(&registration, request.header.as_ref());

        self.reconcile(endpoint_id, &registration, connection, |group, connection| {
            add_published_item(group, endpoint_id, connection, &item)
        })
        .await?;
        info!("[{}] publishing {}", endpoint_id, item.node_id);
        Ok(PublishStartResultModel { error_info: None })
    }

    /// Adds and removes in one document update; results are in request order
    #[instrument(skip(self, request))]
    pub async fn node_publish_bulk(
        &self,
        endpoint_id: &str,
        request: PublishBulkRequestModel,
    ) -> Result<PublishBulkResultModel> {
        require(endpoint_id, "endpoint_id")?;
        for item in &request.nodes_to_add {
            require(&item.node_id, "node_id")?;
        }
        for node_id in &request.nodes_to_remove {
            require(node_id, "node_id")?;
        }
        let registration = self.resolve(endpoint_id).await?;
        let connection = request_connection(&registration, request.header.as_ref());

        let removed = self
            .reconcile(endpoint_id, &registration, connection, |group, connection| {
                for item in &request.nodes_to_add {
                    add_published_item(group, endpoint_id, connection, item);
                }
                request
                    .nodes_to_remove
                    .iter()
                    .map(|node_id| remove_published_node(group, connection, node_id))
                    .collect::<Vec<_>>()
            })
            .await?;

        info!(
            "[{}] bulk update: {} added, {} removed",
            endpoint_id,
            request.nodes_to_add.len(),
            removed.iter().filter(|r| **r).count()
        );
        Ok(PublishBulkResultModel {
            nodes_to_add: request.nodes_to_add.iter().map(|_| ServiceResultModel::good()).collect(),
            nodes_to_remove: request
                .nodes_to_remove
                .iter()
                .zip(removed)
                .map(|(node_id, found)| stop_result(node_id, found))
                .collect(),
        })
    }

    #[instrument(skip(self, request))]
    pub async fn node_publish_stop(
        &self,
        endpoint_id: &str,
        request: PublishStopRequestModel,
    ) -> Result<PublishStopResultModel> {
        require(endpoint_id, "endpoint_id")?;
        require(&request.node_id, "node_id")?;
        let registration = self.resolve(endpoint_id).await?;
        let connection = request_connection(&registration, request.header.as_ref());

        let found = self
            .reconcile(endpoint_id, &registration, connection, |group, connection| {
                remove_published_node(group, connection, &request.node_id)
            })
            .await?;
        if found {
            info!("[{}] stopped publishing {}", endpoint_id, request.node_id);
        }
        let result = stop_result(&request.node_id, found);
        Ok(PublishStopResultModel {
            error_info: (!result.is_good()).then_some(result),
        })
    }

    /// Read only; an endpoint without a job has nothing published
    pub async fn node_publish_list(
        &self,
        endpoint_id: &str,
        _request: PublishedItemListRequestModel,
    ) -> Result<PublishedItemListResultModel> {
        require(endpoint_id, "endpoint_id")?;
        let items = match self.store.get(endpoint_id).await? {
            Some(current) => list_published_items(&current.job.writer_group_job().writer_group),
            None => Vec::new(),
        };
        Ok(PublishedItemListResultModel {
            items,
            continuation_token: None,
        })
    }

    async fn resolve(
        &self,
        endpoint_id: &str,
    ) -> Result<EndpointRegistrationModel> {
        match self.registry.get_endpoint(endpoint_id).await? {
            Some(registration) => Ok(registration),
            None => {
                warn!("endpoint {} is not registered", endpoint_id);
                Err(PublishError::UnknownEndpoint(endpoint_id.to_string()).into())
            }
        }
    }

    /// Fetch-mutate-store on the endpoint's job; the job id is the endpoint id
    async fn reconcile<R>(
        &self,
        endpoint_id: &str,
        registration: &EndpointRegistrationModel,
        connection: ConnectionModel,
        change: impl Fn(&mut WriterGroupModel, &ConnectionModel) -> R,
    ) -> Result<R> {
        let ctx = ReconcileContext {
            job_id: endpoint_id,
            registration,
            connection,
            defaults: &self.config.publisher,
            now: Utc::now(),
        };
        let JobUpdate { value, stored } = update_job_with_retry(
            self.store.as_ref(),
            endpoint_id,
            self.config.retry.job_store,
            |current| Ok(reconcile_job(current, &ctx, &change)),
        )
        .await?;

        if let Some(stored) = stored {
            debug!(
                "[{}] job stored at version {} ({:?}, {} writers)",
                endpoint_id,
                stored.version,
                stored.job.status(),
                stored.job.writer_group_job().writer_group.data_set_writers.len()
            );
            if let Some(listener) = &self.job_listener {
                if listener.send(stored).is_err() {
                    debug!("[{}] job listener is gone", endpoint_id);
                }
            }
        }
        Ok(value)
    }
}

fn require(
    value: &str,
    field: &'static str,
) -> Result<()> {
    if value.trim().is_empty() {
        return Err(PublishError::MissingField(field).into());
    }
    Ok(())
}

fn request_connection(
    registration: &EndpointRegistrationModel,
    header: Option<&RequestHeaderModel>,
) -> ConnectionModel {
    ConnectionModel::new(registration.endpoint.clone()).with_user(header.and_then(|h| h.elevation.clone()))
}

fn stop_result(
    node_id: &str,
    found: bool,
) -> ServiceResultModel {
    if found {
        ServiceResultModel::good()
    } else {
        ServiceResultModel::bad(
            STATUS_BAD_NODE_ID_UNKNOWN,
            format!("node {node_id} is not published"),
        )
    }
}
