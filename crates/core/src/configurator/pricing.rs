use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::configurator::backend::CombinationUpdate;
use crate::domain::ids::TemplateId;
use crate::domain::product::{Combination, ProductNode};

/// Identifies one pricing request for one product.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PricingTicket {
    pub template_id: TemplateId,
    pub sequence: u64,
    pub combination: Combination,
    pub quantity: Decimal,
}

/// Last-write-wins bookkeeping: only the newest ticket of a product may
/// update it, and only while its combination is unchanged.
#[derive(Clone, Debug, Default)]
pub struct PricingSequencer {
    next_sequence: u64,
    latest: BTreeMap<TemplateId, u64>,
}

impl PricingSequencer {
    pub fn issue(&mut self, node: &ProductNode, quantity: Decimal) -> PricingTicket {
        self.next_sequence += 1;
        self.latest.insert(node.template_id, self.next_sequence);
        PricingTicket {
            template_id: node.template_id,
            sequence: self.next_sequence,
            combination: node.combination(),
            quantity,
        }
    }

    pub fn is_current(&self, ticket: &PricingTicket, node: &ProductNode) -> bool {
        self.latest.get(&ticket.template_id) == Some(&ticket.sequence)
            && node.combination() == ticket.combination
    }

    pub fn forget(&mut self, template_id: TemplateId) {
        self.latest.remove(&template_id);
    }
}

/// Merges a pricing response into the node it was requested for.
pub fn merge_update(node: &mut ProductNode, quantity: Decimal, update: CombinationUpdate) {
    node.quantity = quantity;
    node.price = update.price;
    node.variant_id = update.variant_id;
    if let Some(display_name) = update.display_name {
        node.display_name = display_name;
    }
    if update.description.is_some() {
        node.description = update.description;
    }
}
