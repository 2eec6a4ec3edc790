use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! record_id {
    ($($(#[$meta:meta])* $name:ident),+ $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(
                Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
            )]
            #[serde(transparent)]
            pub struct $name(pub i64);

            impl $name {
                /// Backend records are addressed by strictly positive ids.
                pub fn is_valid(self) -> bool {
                    self.0 > 0
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", self.0)
                }
            }
        )+
    };
}

record_id!(
    /// Identity of a product template inside a configuration session.
    TemplateId,
    /// A concrete product variant realized for a combination.
    VariantId,
    AttributeId,
    /// Attribute line (PTAL) of one product template.
    LineId,
    /// Attribute value (PTAV) of one attribute line.
    ValueId,
    /// Row of an external master-data table referenced by a linked-record attribute.
    LinkedRecordId,
    CurrencyId,
    CompanyId,
    PricelistId,
    UomId,
    LeadId,
    /// CRM material line being edited in place.
    MaterialLineId,
);
