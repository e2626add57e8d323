//! The six pipeline outputs and their destination tables.

use serde::Serialize;
use std::fmt;

/// One extract→transform→load step, in run order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Entity {
    Person,
    Customer,
    Product,
    Territory,
    Orders,
    Date,
}

impl Entity {
    /// All steps, in the order the pipeline runs them.
    pub const ALL: [Entity; 6] = [
        Entity::Person,
        Entity::Customer,
        Entity::Product,
        Entity::Territory,
        Entity::Orders,
        Entity::Date,
    ];

    /// Destination table, fully replaced on every run.
    pub fn table(self) -> &'static str {
        match self {
            Entity::Person => "dim_pessoa",
            Entity::Customer => "dim_cliente",
            Entity::Product => "dim_produto",
            Entity::Territory => "dim_territorio",
            Entity::Orders => "fato_vendas",
            Entity::Date => "dim_data",
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Entity::Person => "person",
            Entity::Customer => "customer",
            Entity::Product => "product",
            Entity::Territory => "territory",
            Entity::Orders => "orders",
            Entity::Date => "date",
        };
        f.write_str(name)
    }
}
