use std::collections::BTreeMap;
use std::collections::HashMap;

use crate::DataValue;
use crate::MonitoredItemNotificationModel;
use crate::Variant;

/// One logical change inside a subscription notification: a plain value
/// change, or the collated fields of one event occurrence
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CollatedNotification<'a> {
    pub(crate) first: &'a MonitoredItemNotificationModel,
    pub(crate) value: DataValue,
    /// Raw notifications folded into this change
    pub(crate) count: usize,
}

impl CollatedNotification<'_> {
    /// Key of the change inside a data set payload
    pub(crate) fn field_name(&self) -> &str {
        if !self.first.data_set_field_name.is_empty() {
            &self.first.data_set_field_name
        } else if let Some(name) = &self.first.display_name {
            name
        } else {
            &self.first.node_id
        }
    }
}

/// Group event fields sharing (monitored item id, message id); first
/// occurrence order is kept. A group of one is a data change.
pub(crate) fn collate(notifications: &[MonitoredItemNotificationModel]) -> Vec<CollatedNotification<'_>> {
    let mut groups: Vec<Vec<&MonitoredItemNotificationModel>> = Vec::new();
    let mut index: HashMap<(&str, u32), usize> = HashMap::new();

    for n in notifications {
        match n.message_id {
            Some(message_id) => {
                let key = (n.id.as_str(), message_id);
                match index.get(&key) {
                    Some(i) => groups[*i].push(n),
                    None => {
                        index.insert(key, groups.len());
                        groups.push(vec![n]);
                    }
                }
            }
            None => groups.push(vec![n]),
        }
    }

    groups
        .into_iter()
        .filter_map(|group| {
            let first = *group.first()?;
            if group.len() == 1 {
                return Some(CollatedNotification {
                    first,
                    value: first.value.clone(),
                    count: 1,
                });
            }
            let fields: BTreeMap<String, Variant> = group
                .iter()
                .map(|n| {
                    let key = if n.data_set_field_name.is_empty() {
                        n.node_id.clone()
                    } else {
                        n.data_set_field_name.clone()
                    };
                    (key, n.value.value.clone())
                })
                .collect();
            Some(CollatedNotification {
                first,
                value: DataValue {
                    value: Variant::Map(fields),
                    status_code: first.value.status_code,
                    source_timestamp: first.value.source_timestamp,
                    server_timestamp: first.value.server_timestamp,
                },
                count: group.len(),
            })
        })
        .collect()
}
