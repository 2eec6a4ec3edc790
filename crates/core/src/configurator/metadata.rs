use std::collections::{BTreeMap, BTreeSet};

use tracing::{info, warn};

use crate::configurator::backend::{
    AttributeMetadata, ConfiguratorBackend, LinkedRecordFlags, ValueFlags,
};
use crate::configurator::session::ConfigurationSession;
use crate::domain::ids::{AttributeId, LinkedRecordId, ValueId};

type LinkedFlagMap = BTreeMap<(String, LinkedRecordId), LinkedRecordFlags>;

impl<B: ConfiguratorBackend> ConfigurationSession<B> {
    /// Reads attribute and value flags the configurator payload omits.
    ///
    /// Failures are logged and leave the flags as they were. Returns whether
    /// any metadata was applied.
    pub async fn enrich_metadata(&mut self) -> bool {
        let mut attribute_ids = BTreeSet::new();
        let mut value_ids = BTreeSet::new();
        for line in self.nodes.values().flat_map(|node| node.attribute_lines.iter()) {
            attribute_ids.insert(line.attribute.id);
            value_ids.extend(line.values.iter().map(|value| value.id));
        }
        if attribute_ids.is_empty() {
            return false;
        }

        let attribute_ids = attribute_ids.into_iter().collect::<Vec<_>>();
        let attributes = match self.backend.read_attribute_metadata(&attribute_ids).await {
            Ok(attributes) => attributes,
            Err(error) => {
                warn!(
                    event_name = "configurator.metadata.attributes_failed",
                    session_id = %self.session_id,
                    error = %error,
                    "attribute metadata unavailable; keeping defaults"
                );
                return false;
            }
        };
        let value_flags = if value_ids.is_empty() {
            Vec::new()
        } else {
            let value_ids = value_ids.into_iter().collect::<Vec<_>>();
            match self.backend.read_value_flags(&value_ids).await {
                Ok(flags) => flags,
                Err(error) => {
                    warn!(
                        event_name = "configurator.metadata.values_failed",
                        session_id = %self.session_id,
                        error = %error,
                        "attribute value flags unavailable; keeping defaults"
                    );
                    return false;
                }
            }
        };

        let attributes = attributes
            .into_iter()
            .map(|metadata| (metadata.id, metadata))
            .collect::<BTreeMap<AttributeId, AttributeMetadata>>();
        let value_flags = value_flags
            .into_iter()
            .map(|flags| (flags.id, flags))
            .collect::<BTreeMap<ValueId, ValueFlags>>();
        let linked_flags = self.read_linked_flags(&attributes).await;

        self.apply_metadata(&attributes, &value_flags, &linked_flags);
        info!(
            event_name = "configurator.metadata.applied",
            session_id = %self.session_id,
            attributes = attributes.len(),
            values = value_flags.len(),
            linked_records = linked_flags.len(),
            "attribute metadata applied"
        );
        true
    }

    /// One read per linked model, covering both the records stamped on values
    /// and the records offered in the dropdown.
    async fn read_linked_flags(&self, attributes: &BTreeMap<AttributeId, AttributeMetadata>) -> LinkedFlagMap {
        let mut fetches = BTreeMap::<String, BTreeSet<LinkedRecordId>>::new();
        for line in self.nodes.values().flat_map(|node| node.attribute_lines.iter()) {
            let Some(model) = attributes.get(&line.attribute.id).and_then(|meta| meta.linked_model.as_ref())
            else {
                continue;
            };
            let records = fetches.entry(model.clone()).or_default();
            records.extend(line.values.iter().filter_map(|value| value.linked_record_id));
            records.extend(line.attribute.linked_options.iter().map(|option| option.id));
        }

        let mut linked_flags = LinkedFlagMap::new();
        for (model, record_ids) in fetches {
            if record_ids.is_empty() {
                continue;
            }
            let record_ids = record_ids.into_iter().collect::<Vec<_>>();
            match self.backend.read_linked_record_flags(&model, &record_ids).await {
                Ok(records) => {
                    for record in records {
                        linked_flags.insert((model.clone(), record.id), record);
                    }
                }
                Err(error) => warn!(
                    event_name = "configurator.metadata.linked_records_failed",
                    session_id = %self.session_id,
                    model = %model,
                    error = %error,
                    "linked record flags unavailable for model"
                ),
            }
        }
        linked_flags
    }

    fn apply_metadata(
        &mut self,
        attributes: &BTreeMap<AttributeId, AttributeMetadata>,
        value_flags: &BTreeMap<ValueId, ValueFlags>,
        linked_flags: &LinkedFlagMap,
    ) {
        for node in self.nodes.values_mut() {
            for line in &mut node.attribute_lines {
                if let Some(metadata) = attributes.get(&line.attribute.id) {
                    line.attribute.is_width_check = metadata.is_width_check;
                    line.attribute.pair_with_previous = metadata.pair_with_previous;
                    line.attribute.is_quantity_attribute = metadata.is_quantity;
                    line.attribute.is_gelcoat_required_flag = metadata.is_gelcoat_required_flag;
                    line.attribute.linked_model = metadata.linked_model.clone();
                }
                let model = line.attribute.linked_model.clone();

                for value in &mut line.values {
                    if let Some(flags) = value_flags.get(&value.id) {
                        value.is_opaque = flags.is_opaque;
                        value.is_translucent = flags.is_translucent;
                    }
                    let linked = model.as_ref().zip(value.linked_record_id).and_then(|(model, record_id)| {
                        linked_flags.get(&(model.clone(), record_id))
                    });
                    if let Some(flags) = linked {
                        value.is_opaque = flags.is_opaque;
                        value.is_translucent = flags.is_translucent;
                    }
                }

                if let Some(model) = &model {
                    for option in &mut line.attribute.linked_options {
                        if let Some(flags) = linked_flags.get(&(model.clone(), option.id)) {
                            option.is_opaque = flags.is_opaque;
                            option.is_translucent = flags.is_translucent;
                        }
                    }
                }
            }
            node.normalize();
        }
    }
}
